use serde::ser::Serializer;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),
    #[error("json decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("a mode switch is already in flight")]
    SwitchInFlight,
    #[error("switching to REAL requires explicit confirmation")]
    ConfirmationRequired,
    #[error("rejected by backend: {0}")]
    WriteRejected(String),
    #[error("write timed out after {millis} ms")]
    WriteTimeout { millis: u64 },
    #[error("write connection failure: {0}")]
    WriteConnection(String),
    #[error("write response could not be decoded: {0}")]
    WriteDecode(String),
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
