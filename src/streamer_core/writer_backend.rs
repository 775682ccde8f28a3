use crate::streamer_core::output_writer::SignalRecord;
use async_trait::async_trait;

/// Failure appending to the signal journal. A failed append is logged by the
/// session and never interrupts the stream.
#[derive(Debug)]
pub enum WriterError {
    Io(std::io::Error),
    Serialization(serde_json::Error),
}

impl From<std::io::Error> for WriterError {
    fn from(err: std::io::Error) -> Self {
        WriterError::Io(err)
    }
}

impl From<serde_json::Error> for WriterError {
    fn from(err: serde_json::Error) -> Self {
        WriterError::Serialization(err)
    }
}

impl std::fmt::Display for WriterError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriterError::Io(e) => write!(f, "IO error: {}", e),
            WriterError::Serialization(e) => write!(f, "Serialization error: {}", e),
        }
    }
}

impl std::error::Error for WriterError {}

#[async_trait]
pub trait SignalWriter: Send {
    /// Append one classified signal
    async fn write(&mut self, record: &SignalRecord) -> Result<(), WriterError>;

    async fn flush(&mut self) -> Result<(), WriterError>;

    /// Get backend type for logging
    fn backend_type(&self) -> &'static str;
}
