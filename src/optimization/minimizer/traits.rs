//! Configuration and result types for [`minimize`](super::minimize), and the
//! [`Objective`] trait the transfer evaluator implements.
use std::str::FromStr;

use argmin::core::TerminationStatus;
use argmin_math::ArgminL2Norm;

use crate::optimization::{
    errors::{OptError, OptResult},
    minimizer::{
        Cost, FnEvalMap, Grad, Theta,
        validation::{validate_theta_hat, validate_value, verify_tol_cost, verify_tol_grad},
    },
};

/// A scalar function of a flat parameter vector.
///
/// `check` runs once on the starting vector. Without a `gradient`
/// implementation the adapter falls back to finite differences.
///
/// Objectives that compute `∇c` during `value` override `gradient_ready` and
/// return `false` whenever their stored gradient does not belong to `theta`;
/// the adapter then re-runs `value` before calling `gradient`.
pub trait Objective {
    fn value(&self, theta: &Theta) -> OptResult<Cost>;
    fn check(&self, theta: &Theta) -> OptResult<()>;

    fn gradient(&self, _theta: &Theta) -> OptResult<Grad> {
        Err(OptError::GradientNotImplemented)
    }

    fn gradient_ready(&self, _theta: &Theta) -> bool {
        true
    }
}

/// Line search inside L-BFGS. Parses `"MoreThuente"` / `"HagerZhang"` in any
/// letter case.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineSearcher {
    MoreThuente,
    HagerZhang,
}

impl FromStr for LineSearcher {
    type Err = OptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("morethuente") {
            Ok(LineSearcher::MoreThuente)
        } else if s.eq_ignore_ascii_case("hagerzhang") {
            Ok(LineSearcher::HagerZhang)
        } else {
            Err(OptError::InvalidLineSearch {
                name: s.to_string(),
                reason: "Expected 'MoreThuente' or 'HagerZhang'.",
            })
        }
    }
}

/// Everything one call to [`minimize`](super::minimize) needs besides the
/// objective and the starting vector.
///
/// The default matches one style-transfer round: at most 20 iterations, no
/// tolerance-based stop, More–Thuente, history
/// [`DEFAULT_LBFGS_MEM`](super::DEFAULT_LBFGS_MEM). `verbose` logs the
/// starting cost and, with `obs_slog`, every iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct MinimizeOptions {
    pub tols: Tolerances,
    pub line_searcher: LineSearcher,
    pub verbose: bool,
    pub lbfgs_mem: Option<usize>,
}

impl MinimizeOptions {
    /// # Errors
    /// [`OptError::InvalidLBFGSMem`] for a history length of zero.
    pub fn new(
        tols: Tolerances, line_searcher: LineSearcher, verbose: bool, lbfgs_mem: Option<usize>,
    ) -> OptResult<Self> {
        if lbfgs_mem == Some(0) {
            return Err(OptError::InvalidLBFGSMem {
                mem: 0,
                reason: "L-BFGS history must hold at least one pair.",
            });
        }
        Ok(Self { tols, line_searcher, verbose, lbfgs_mem })
    }
}

impl Default for MinimizeOptions {
    fn default() -> Self {
        Self {
            tols: Tolerances { tol_grad: None, tol_cost: None, max_iter: Some(20) },
            line_searcher: LineSearcher::MoreThuente,
            verbose: false,
            lbfgs_mem: None,
        }
    }
}

/// Stopping rules. At least one must be set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerances {
    /// Stop once `‖∇c‖` drops below this.
    pub tol_grad: Option<f64>,
    /// Stop once the cost changes by less than this.
    pub tol_cost: Option<f64>,
    /// Iteration cap.
    pub max_iter: Option<usize>,
}

impl Tolerances {
    /// # Errors
    /// - [`OptError::NoTolerancesProvided`] when every rule is `None`.
    /// - [`OptError::InvalidTolGrad`] / [`OptError::InvalidTolCost`] for a
    ///   tolerance that is not finite and positive.
    /// - [`OptError::InvalidMaxIter`] for a cap of zero.
    pub fn new(
        tol_grad: Option<f64>, tol_cost: Option<f64>, max_iter: Option<usize>,
    ) -> OptResult<Self> {
        if (tol_grad, tol_cost, max_iter) == (None, None, None) {
            return Err(OptError::NoTolerancesProvided);
        }
        verify_tol_grad(tol_grad)?;
        verify_tol_cost(tol_cost)?;
        if max_iter == Some(0) {
            return Err(OptError::InvalidMaxIter {
                max_iter: 0,
                reason: "Iteration cap must be at least one.",
            });
        }
        Ok(Self { tol_grad, tol_cost, max_iter })
    }
}

/// What one L-BFGS run produced.
///
/// `converged` is `true` for any terminated status, including hitting the
/// iteration cap; the driver treats a capped round as normal.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimOutcome {
    pub theta_hat: Theta,
    pub value: f64,
    pub converged: bool,
    pub status: String,
    pub iterations: usize,
    /// `argmin` counters such as `cost_count` and `gradient_count`.
    pub fn_evals: FnEvalMap,
    pub grad_norm: Option<f64>,
}

impl OptimOutcome {
    /// # Errors
    /// A missing or non-finite best point, or a non-finite best cost.
    pub fn new(
        theta_hat: Option<Theta>, value: f64, termination: TerminationStatus, iterations: u64,
        fn_evals: FnEvalMap, grad: Option<Grad>,
    ) -> OptResult<Self> {
        let theta_hat = validate_theta_hat(theta_hat)?;
        validate_value(value)?;
        let (converged, status) = match termination {
            TerminationStatus::NotTerminated => (false, "Not terminated".to_string()),
            other => (true, format!("{other:?}")),
        };
        Ok(Self {
            theta_hat,
            value,
            converged,
            status,
            iterations: iterations as usize,
            fn_evals,
            grad_norm: grad.map(|g| g.l2_norm()),
        })
    }
}
