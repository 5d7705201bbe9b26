//! minimizer — L-BFGS over a flat `f64` vector, backed by `argmin`.
//!
//! Implement [`Objective`] and call [`minimize`]. The pieces:
//! - [`adapter`] turns an [`Objective`] into `argmin`'s cost/gradient pair and
//!   primes objectives whose gradient is a by-product of the value pass.
//! - [`solver`] builds the L-BFGS variant picked by [`LineSearcher`] and runs
//!   it into an [`OptimOutcome`].
//! - [`finite_diff`] covers objectives without an analytic gradient.
//! - [`validation`] rejects non-finite costs, gradients and results as soon
//!   as they appear instead of letting the solver consume them.
//!
//! The transfer [`Evaluator`](crate::transfer::evaluator::Evaluator) is the
//! main [`Objective`] implementor; the driver calls [`minimize`] once per
//! round with an iteration cap.

pub mod adapter;
pub mod api;
pub mod finite_diff;
pub mod solver;
pub mod traits;
pub mod types;
pub mod validation;

pub use self::api::minimize;
pub use self::traits::{LineSearcher, MinimizeOptions, Objective, OptimOutcome, Tolerances};
pub use self::types::{Cost, DEFAULT_LBFGS_MEM, FnEvalMap, Grad, Theta};

pub mod prelude {
    pub use super::api::minimize;
    pub use super::traits::{LineSearcher, MinimizeOptions, Objective, OptimOutcome, Tolerances};
    pub use super::types::{Cost, Grad, Theta};
}
