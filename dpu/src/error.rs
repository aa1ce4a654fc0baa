// Copyright (c) 2022-2023 The MobileCoin Foundation

/// Secure buffer service errors
///
/// All variants are fatal to the service loop, recoverable request errors
/// are answered with a [Status][secure_ui_proto::Status] instead.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Request length does not match the command framing
    #[error("malformed request ({len} bytes)")]
    Framing { len: usize },

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// Transport closed by the remote
    #[error("transport closed")]
    Closed,

    /// A service instance already exists in this process
    #[error("secure buffer service already running")]
    AlreadyRunning,

    /// Response encoding failed
    #[error("encoding error: {0}")]
    Encoding(secure_ui_proto::Error),
}

impl From<secure_ui_proto::Error> for Error {
    fn from(e: secure_ui_proto::Error) -> Self {
        Error::Encoding(e)
    }
}
