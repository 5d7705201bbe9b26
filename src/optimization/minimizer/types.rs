//! Numeric aliases shared by the minimizer.
//!
//! `Theta` is always the flattened generated image in `(H, W, C)` order; the
//! minimizer itself never looks at its shape.
use std::collections::HashMap;

use argmin::solver::linesearch::{HagerZhangLineSearch, MoreThuenteLineSearch};
use ndarray::Array1;

pub type Theta = Array1<f64>;
pub type Grad = Array1<f64>;
pub type Cost = f64;

/// `argmin` evaluation counters keyed by name, e.g. `"cost_count"`.
pub type FnEvalMap = HashMap<String, u64>;

/// L-BFGS history length used when none is configured.
pub const DEFAULT_LBFGS_MEM: usize = 7;

pub type HagerZhangLS = HagerZhangLineSearch<Theta, Grad, Cost>;
pub type MoreThuenteLS = MoreThuenteLineSearch<Theta, Grad, Cost>;
