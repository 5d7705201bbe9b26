//! Error type of the minimizer.
//!
//! `argmin` boxes callback errors into its own `Error`. Converting back with
//! `From<argmin::core::Error>` first tries to recover an [`OptError`], so a
//! `StaleGradient` raised by the evaluator reaches the driver as itself and
//! not as a string.
use argmin::core::{ArgminError, Error};

pub type OptResult<T> = Result<T, OptError>;

#[derive(Debug, Clone, PartialEq)]
pub enum OptError {
    /// The objective has no analytic gradient; finite differences take over.
    GradientNotImplemented,
    GradientDimMismatch { expected: usize, found: usize },
    InvalidGradient { index: usize, value: f64, reason: &'static str },

    InvalidTolGrad { tol: f64, reason: &'static str },
    InvalidTolCost { tol: f64, reason: &'static str },
    InvalidMaxIter { max_iter: usize, reason: &'static str },
    NoTolerancesProvided,
    InvalidLineSearch { name: String, reason: &'static str },
    InvalidLBFGSMem { mem: usize, reason: &'static str },

    NonFiniteCost { value: f64 },

    /// `gradient` was called on an evaluator that has never been valued.
    GradientBeforeValue,
    /// `gradient` was called for a vector other than the cached one.
    StaleGradient { cached_tag: u64 },

    InvalidThetaHat { index: usize, value: f64, reason: &'static str },
    MissingThetaHat,

    /// Anything raised by `argmin` itself. `kind` names the `ArgminError`
    /// variant, or is `"external"` for foreign error types.
    Backend { kind: &'static str, text: String },

    /// Failure inside the objective that has no dedicated variant.
    ModelFailure { text: String },
}

impl std::error::Error for OptError {}

impl std::fmt::Display for OptError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        use OptError::*;
        match self {
            GradientNotImplemented => f.write_str("objective provides no analytic gradient"),
            GradientDimMismatch { expected, found } => {
                write!(f, "gradient has {found} entries, parameter vector has {expected}")
            }
            InvalidGradient { index, value, reason } => {
                write!(f, "gradient entry {index} is {value}: {reason}")
            }
            InvalidTolGrad { tol, reason } => write!(f, "gradient tolerance {tol}: {reason}"),
            InvalidTolCost { tol, reason } => write!(f, "cost tolerance {tol}: {reason}"),
            InvalidMaxIter { max_iter, reason } => write!(f, "iteration cap {max_iter}: {reason}"),
            NoTolerancesProvided => {
                f.write_str("no stopping rule: set a gradient tolerance, cost tolerance or cap")
            }
            InvalidLineSearch { name, reason } => write!(f, "line search '{name}': {reason}"),
            InvalidLBFGSMem { mem, reason } => write!(f, "L-BFGS history {mem}: {reason}"),
            NonFiniteCost { value } => write!(f, "objective returned {value}"),
            GradientBeforeValue => {
                f.write_str("gradient requested before the objective was evaluated")
            }
            StaleGradient { cached_tag } => write!(
                f,
                "gradient requested for a point other than cached evaluation #{cached_tag}"
            ),
            InvalidThetaHat { index, value, reason } => {
                write!(f, "best point entry {index} is {value}: {reason}")
            }
            MissingThetaHat => f.write_str("solver finished without a best point"),
            Backend { kind, text } => write!(f, "argmin ({kind}): {text}"),
            ModelFailure { text } => write!(f, "objective evaluation failed: {text}"),
        }
    }
}

impl From<Error> for OptError {
    fn from(err: Error) -> Self {
        let err = match err.downcast::<OptError>() {
            Ok(own) => return own,
            Err(err) => err,
        };
        let argmin_err = match err.downcast::<ArgminError>() {
            Ok(argmin_err) => argmin_err,
            Err(foreign) => return OptError::Backend { kind: "external", text: foreign.to_string() },
        };
        let (kind, text) = match argmin_err {
            ArgminError::InvalidParameter { text } => ("InvalidParameter", text),
            ArgminError::NotImplemented { text } => ("NotImplemented", text),
            ArgminError::NotInitialized { text } => ("NotInitialized", text),
            ArgminError::ConditionViolated { text } => ("ConditionViolated", text),
            ArgminError::CheckpointNotFound { text } => ("CheckpointNotFound", text),
            ArgminError::PotentialBug { text } => ("PotentialBug", text),
            ArgminError::ImpossibleError { text } => ("ImpossibleError", text),
            other => ("unknown", other.to_string()),
        };
        OptError::Backend { kind, text }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    // Purpose
    // -------
    // An evaluator error raised inside an argmin callback must come back out
    // unchanged.
    //
    // Given
    // -----
    // - `StaleGradient { cached_tag: 3 }` boxed into `argmin::core::Error`.
    //
    // Expect
    // ------
    // - The identical variant after conversion.
    fn own_errors_survive_the_argmin_box() {
        // Arrange
        let original = OptError::StaleGradient { cached_tag: 3 };
        let boxed: Error = original.clone().into();

        // Act
        let back = OptError::from(boxed);

        // Assert
        assert_eq!(back, original);
    }

    #[test]
    fn argmin_errors_keep_their_kind_and_text() {
        let boxed: Error =
            ArgminError::ConditionViolated { text: "search direction".to_string() }.into();
        assert_eq!(
            OptError::from(boxed),
            OptError::Backend { kind: "ConditionViolated", text: "search direction".to_string() }
        );
    }

    #[test]
    fn foreign_errors_are_tagged_external() {
        let boxed: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk gone").into();
        match OptError::from(boxed) {
            OptError::Backend { kind: "external", text } => assert!(text.contains("disk gone")),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
