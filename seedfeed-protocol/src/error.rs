#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("frame too short: expected {expected}, actual {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    #[error("invalid signature: expected {expected:?}, actual {actual:?}")]
    InvalidSignature {
        expected: &'static str,
        actual: [u8; 2],
    },

    #[error("invalid sequence: {0}")]
    InvalidSequence(String),

    #[error("invalid command: {0}")]
    InvalidCommand(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid info level: {0}")]
    InvalidInfoLevel(String),

    #[error("payload length mismatch: expected {expected}, actual {actual}")]
    PayloadLengthMismatch { expected: usize, actual: usize },

    #[error("miniseed error: {0}")]
    Miniseed(#[from] miniseed_rs::MseedError),

    /// ASCII record whose text fields are unusable.
    #[error("invalid text record: {0}")]
    InvalidRecord(String),

    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
