//! slopefit - Sorted L-One Penalized Estimation for generalized linear models
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
//! Fits SLOPE models: generalized linear regression under the sorted-L1
//! norm, whose weight sequence both selects and clusters coefficients.
//! The solver is the hybrid coordinate-descent / proximal-gradient scheme
//! with IRLS linearization for non-quadratic losses, duality-gap stopping,
//! and warm-started regularization paths; k-fold cross-validation over a
//! (q, gamma) grid runs the folds in parallel.
//!
//! ```no_run
//! use ndarray::{array, Array2};
//! use slopefit::{Slope, SlopeConfigBuilder};
//!
//! let x: Array2<f64> = array![[1.0, 0.3], [0.2, 1.1], [0.5, -0.8]];
//! let y = array![[1.2], [0.3], [-0.4]];
//! let model = Slope::new(SlopeConfigBuilder::new().q(0.2).build());
//! let path = model.path(&x, &y, None, None).unwrap();
//! println!("{} path steps", path.n_steps());
//! ```

mod cd;
mod pgd;
mod solver;

pub mod cv;
pub mod design;
pub mod error;
pub mod lambda;
pub mod losses;
pub mod model;
pub mod standardize;

pub use cv::{cross_validate, CvComboResult, CvConfig, CvResult, Metric};
pub use design::DesignMatrix;
pub use error::{Result, SlopeError};
pub use lambda::LambdaType;
pub use losses::LossFamily;
pub use model::{Slope, SlopeConfig, SlopeConfigBuilder, SlopeFit, SlopePath, SolverKind};
pub use standardize::{Centering, Scaling};

pub use slopefit_sl1 as sl1;
pub use slopefit_sl1::{Clusters, SortedL1Norm};
