// Error type for the continuator library.
//
// Only structural misuse and I/O surface as `ContinuatorError`. A generation
// that cannot extend the seed is an expected result (see
// `generate::GenerationOutcome`), and real-time protocol anomalies are
// absorbed by the session loop as `session::SessionWarning`s.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContinuatorError {
    /// Training needs at least one (prefix, continuation) pair, i.e. two
    /// notes. Retrying with the same input will fail the same way.
    #[error("cannot learn from {len} note(s): at least two notes are needed")]
    InsufficientContext { len: usize },

    /// A configuration value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// The MIDI transport could not be opened or could not send.
    #[error("MIDI transport error: {0}")]
    Transport(String),

    /// A Standard MIDI File could not be parsed.
    #[error("MIDI file error: {0}")]
    MidiFile(#[from] midly::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Memory or configuration JSON could not be read or written.
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_context_message() {
        let err = ContinuatorError::InsufficientContext { len: 1 };
        assert_eq!(
            err.to_string(),
            "cannot learn from 1 note(s): at least two notes are needed"
        );
    }

    #[test]
    fn io_error_converts() {
        fn open_missing() -> Result<(), ContinuatorError> {
            std::fs::read("/definitely/not/here.json")?;
            Ok(())
        }
        assert!(matches!(open_missing(), Err(ContinuatorError::Io(_))));
    }
}
