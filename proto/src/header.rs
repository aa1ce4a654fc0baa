// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Request and response headers

use encdec::{DecodeOwned, Encode};

use crate::{Command, Error, Status, REQ_HEADER_LEN, RESP_BIT, RESP_HEADER_LEN};

/// Request header, carries the raw command identifier
///
/// Unknown identifiers are preserved so they can be echoed in the response.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct RequestHeader {
    pub cmd: u32,
}

impl RequestHeader {
    /// Create a request header for a known command
    pub const fn new(cmd: Command) -> Self {
        Self { cmd: cmd as u32 }
    }

    /// Resolve the command, `None` for unknown identifiers
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.cmd).ok()
    }
}

impl Encode for RequestHeader {
    type Error = Error;

    fn encode_len(&self) -> Result<usize, Error> {
        Ok(REQ_HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < REQ_HEADER_LEN {
            return Err(Error::InvalidLength);
        }

        buff[..4].copy_from_slice(&self.cmd.to_le_bytes());

        Ok(REQ_HEADER_LEN)
    }
}

impl DecodeOwned for RequestHeader {
    type Output = Self;

    type Error = Error;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Error> {
        if buff.len() < REQ_HEADER_LEN {
            return Err(Error::InvalidLength);
        }

        let cmd = u32::from_le_bytes([buff[0], buff[1], buff[2], buff[3]]);

        Ok((Self { cmd }, REQ_HEADER_LEN))
    }
}

/// Response header
///
/// `cmd` holds the request identifier, [RESP_BIT] is applied on encode
/// and required on decode.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct ResponseHeader {
    pub cmd: u32,
    pub status: Status,
}

impl ResponseHeader {
    /// Create a response header for the provided request identifier
    pub const fn new(cmd: u32, status: Status) -> Self {
        Self { cmd, status }
    }

    /// Resolve the command, `None` for unknown identifiers
    pub fn command(&self) -> Option<Command> {
        Command::try_from(self.cmd).ok()
    }
}

impl Encode for ResponseHeader {
    type Error = Error;

    fn encode_len(&self) -> Result<usize, Error> {
        Ok(RESP_HEADER_LEN)
    }

    fn encode(&self, buff: &mut [u8]) -> Result<usize, Error> {
        if buff.len() < RESP_HEADER_LEN {
            return Err(Error::InvalidLength);
        }

        buff[..4].copy_from_slice(&(self.cmd | RESP_BIT).to_le_bytes());
        buff[4..][..4].copy_from_slice(&(self.status as i32).to_le_bytes());

        Ok(RESP_HEADER_LEN)
    }
}

impl DecodeOwned for ResponseHeader {
    type Output = Self;

    type Error = Error;

    fn decode_owned(buff: &[u8]) -> Result<(Self::Output, usize), Error> {
        if buff.len() < RESP_HEADER_LEN {
            return Err(Error::InvalidLength);
        }

        let cmd = u32::from_le_bytes([buff[0], buff[1], buff[2], buff[3]]);
        if cmd & RESP_BIT == 0 {
            return Err(Error::NotAResponse);
        }

        let status = i32::from_le_bytes([buff[4], buff[5], buff[6], buff[7]]);
        let status = Status::try_from(status).map_err(|_| Error::InvalidEncoding)?;

        Ok((
            Self {
                cmd: cmd & !RESP_BIT,
                status,
            },
            RESP_HEADER_LEN,
        ))
    }
}
