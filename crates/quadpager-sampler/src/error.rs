//! Error types for the sampling layer.

use quadpager_lod::ParamError;

use crate::LayerState;

/// Errors reported synchronously by [`SamplingLayer`](crate::SamplingLayer) operations.
///
/// None of these leave the layer in an inconsistent state: a rejected call has no effect.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SamplerError {
    /// A setter was given an invalid value. The previous value is kept.
    #[error("invalid sampling parameter: {0}")]
    Config(#[from] ParamError),

    /// An operation was invoked outside the state it is valid in.
    #[error("{operation} is not valid while the layer is {state}")]
    Lifecycle {
        /// The rejected operation.
        operation: &'static str,
        /// State the layer was in.
        state: LayerState,
    },
}

/// Why a fetch produced no data. Recorded on the frame as `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    /// The source has no data for this tile or frame.
    #[error("tile not found")]
    NotFound,

    /// The source reported an error.
    #[error("source error: {0}")]
    Source(String),

    /// The request was cancelled before any work started.
    #[error("cancelled")]
    Cancelled,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_error_message() {
        let err = SamplerError::Lifecycle {
            operation: "eval_step",
            state: LayerState::Stopped,
        };
        assert_eq!(err.to_string(), "eval_step is not valid while the layer is stopped");
    }

    #[test]
    fn test_param_error_converts() {
        let err: SamplerError = ParamError::Zero { name: "max_tiles" }.into();
        assert!(matches!(err, SamplerError::Config(_)));
        assert!(err.to_string().contains("max_tiles"));
    }
}
