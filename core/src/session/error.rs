// Copyright (c) 2022-2023 The MobileCoin Foundation

use super::ResponseCode;

/// [ConfirmationSession][super::ConfirmationSession] API errors
#[derive(Copy, Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum Error {
    /// A session is already running
    #[error("confirmation operation pending")]
    OperationPending,

    /// Input event rejected outside the interactive phase
    #[error("input event ignored")]
    Ignored,

    /// Runtime, channel or display failure
    #[error("system error")]
    SystemError,
}

impl From<Error> for ResponseCode {
    fn from(e: Error) -> Self {
        match e {
            Error::OperationPending => ResponseCode::OperationPending,
            Error::Ignored => ResponseCode::Ignored,
            Error::SystemError => ResponseCode::SystemError,
        }
    }
}
