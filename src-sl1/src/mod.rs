//! Sorted-L1 norm primitives for SLOPE-type estimators
//!
//! Copyright (C) 2025 Pierre F. Aubert pierre(at)spinorama(dot)org
//!
//! This program is free software: you can redistribute it and/or modify
//! it under the terms of the GNU General Public License as published by
//! the Free Software Foundation, either version 3 of the License, or
//! (at your option) any later version.
//!
//! This program is distributed in the hope that it will be useful,
//! but WITHOUT ANY WARRANTY; without even the implied warranty of
//! MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
//! GNU General Public License for more details.
//!
//! You should have received a copy of the GNU General Public License
//! along with this program.  If not, see <https://www.gnu.org/licenses/>.
//!
//! This crate holds the numeric core shared by the slopefit solver:
//! - the sorted-L1 norm itself: evaluation, proximal operator (a stack
//!   based pool-adjacent-violators pass) and its dual norm,
//! - the `Clusters` partition of coefficients by equal magnitude,
//! - the slope-threshold operator that solves the one-cluster subproblem
//!   and reports the cluster's new rank.

pub mod clusters;
pub mod math;
pub mod penalty;
pub mod threshold;

pub use clusters::Clusters;
pub use penalty::SortedL1Norm;
pub use threshold::slope_threshold;
