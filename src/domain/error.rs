use thiserror::Error;

/// SerialHub unified error type
#[derive(Error, Debug)]
pub enum HubError {
    #[error("Invalid port spec: {message}")]
    Config { message: String },

    #[error("Port unavailable: {message}")]
    PortUnavailable { message: String },

    #[error("Bridge error: {message}")]
    Bridge { message: String },

    #[error("Bridge #{id} not found")]
    NotFound { id: u64 },

    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Network error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HubResult<T> = Result<T, HubError>;
