//! optimization — L-BFGS minimizer and unified error surface.
//!
//! Purpose
//! -------
//! Provide a cohesive optimization layer for the style-transfer engine: an
//! Argmin-backed minimizer over flat `f64` parameter vectors and a single
//! error/result surface. Callers implement an objective, choose tolerances,
//! and obtain the minimizer's best point and diagnostics without touching
//! backend solver details.
//!
//! Key behaviors
//! -------------
//! - Expose a high-level API for **minimizing** objectives `c(θ)`
//!   (`minimizer`), including configuration of solvers and stopping criteria.
//! - Normalize configuration issues, numerical failures, evaluator contract
//!   violations, and backend solver errors into a single enum
//!   (`errors::OptError`) with a common result alias (`OptResult<T>`).
//!
//! Conventions
//! -----------
//! - Parameters and gradients are `ndarray`-based aliases (`Theta`, `Grad`).
//! - Public optimization entrypoints that can fail return `OptResult<T>`;
//!   callers never see raw Argmin errors.
//! - This layer does no I/O; progress reporting belongs to the transfer
//!   driver (and to the optional `obs_slog` observer).

pub mod errors;
pub mod minimizer;

pub mod prelude {
    pub use super::errors::{OptError, OptResult};
    pub use super::minimizer::prelude::*;
}
