use thiserror::Error;

/// Failure reported by a host BLE primitive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("host error {code}: {message}")]
pub struct HostError {
    pub code: i32,
    pub message: String,
}

impl HostError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    #[error("bluetooth adapter unavailable")]
    Unavailable,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    #[error("connection timed out")]
    Timeout,
    #[error("connection rejected by device")]
    Rejected,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("printer service not found")]
    ServiceNotFound,
    #[error("write characteristic not found")]
    CharacteristicNotFound,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("write of chunk {0} failed")]
    WriteFailed(usize),
    #[error("a transfer is already in progress")]
    SessionBusy,
    #[error("transfer cancelled")]
    Cancelled,
}

/// Errors surfaced to the UI collaborator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error(transparent)]
    Adapter(#[from] AdapterError),
    #[error(transparent)]
    Connect(#[from] ConnectError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error(transparent)]
    Transfer(#[from] TransferError),
    #[error("no printer discovered")]
    NoCandidate,
    #[error("not connected to a printer")]
    NotConnected,
}
