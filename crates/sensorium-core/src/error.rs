use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // Identification errors
    #[error("Unknown device kind code: {0:#05x}")]
    UnknownKindCode(u32),

    #[error("Invalid channel kind code: {0}")]
    InvalidChannelKind(i32),

    #[error("Axis index {index} out of range (max {max})")]
    AxisOutOfRange { index: usize, max: usize },

    #[error("Axis count {0} exceeds the three-axis limit")]
    AxisCountOutOfRange(usize),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
