//! Error types for Beam

use thiserror::Error;

/// Main error type for Beam pipeline operations
#[derive(Error, Debug)]
pub enum BeamError {
    /// Bad or unsupported request (unknown display id, camera not found,
    /// unsupported size). Always fatal to the run, never retried.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Capture device hiccup (display gone, camera glitch). Retried with a
    /// bounded budget.
    #[error("Capture error: {0}")]
    Capture(String),

    /// Hardware encoder failure, possibly recoverable at a smaller size.
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Render stage failure.
    #[error("Render error: {0}")]
    Render(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BeamError {
    /// A configuration error must fail the run permanently, without retry.
    pub fn is_config(&self) -> bool {
        matches!(self, BeamError::Config(_))
    }

    /// A broken pipe means the peer closed the connection. It is an expected
    /// shutdown signal, not an error to report.
    pub fn is_broken_pipe(&self) -> bool {
        matches!(self, BeamError::Io(e) if e.kind() == std::io::ErrorKind::BrokenPipe)
    }
}

/// Result type alias for Beam operations
pub type BeamResult<T> = Result<T, BeamError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broken_pipe_is_detected() {
        let err = BeamError::Io(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "peer gone"));
        assert!(err.is_broken_pipe());
        assert!(!err.is_config());

        let err = BeamError::Io(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        assert!(!err.is_broken_pipe());
    }

    #[test]
    fn config_is_fatal() {
        assert!(BeamError::Config("bad display".into()).is_config());
        assert!(!BeamError::Encoder("transient".into()).is_config());
    }
}
