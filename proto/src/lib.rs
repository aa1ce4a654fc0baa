// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Protocol definitions for the secure DPU buffer service
//!
//! The secure DPU service runs in the untrusted world and serves requests from the
//! trusted application driving the secure display. Each request is a single message
//! consisting of a fixed header followed by an optional fixed-size payload, where the
//! payload length is determined solely by the command.
//!
//! Encodings are equivalent to packed c structures with 32-bit field alignment,
//! all fields are little-endian.
//!
//! ## Request
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            COMMAND                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                      PAYLOAD (per command)                    /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! ## Response
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |R|                          COMMAND                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         STATUS (i32)                          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! /                      PAYLOAD (per command)                    /
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

#![no_std]

use num_enum::TryFromPrimitive;
use static_assertions::const_assert;
use strum::{Display, EnumIter, EnumString};

pub mod buffer;
pub mod header;
pub mod prelude;

/// Bit set on the command field of every response
pub const RESP_BIT: u32 = 1 << 31;

/// Request header length (command)
pub const REQ_HEADER_LEN: usize = 4;

/// Response header length (command and status)
pub const RESP_HEADER_LEN: usize = 8;

/// Largest request payload defined by any command
pub const MAX_REQ_PAYLOAD_LEN: usize = buffer::AllocateBufferReq::LEN;

/// Largest response defined by any command
pub const MAX_RESP_LEN: usize = RESP_HEADER_LEN + buffer::AllocateBufferResp::LEN;

const_assert!(MAX_REQ_PAYLOAD_LEN == 8);
const_assert!(MAX_RESP_LEN == 16);

/// Secure DPU command identifiers
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[repr(u32)]
pub enum Command {
    /// Switch the display pipeline to secure mode
    StartSecureDisplay = 1,

    /// Return the display pipeline to normal mode
    StopSecureDisplay = 2,

    /// Allocate a page-aligned secure framebuffer
    AllocateBuffer = 3,
}

impl Command {
    /// Fixed request payload length for the command
    pub const fn req_payload_len(&self) -> usize {
        match self {
            Command::StartSecureDisplay | Command::StopSecureDisplay => 0,
            Command::AllocateBuffer => buffer::AllocateBufferReq::LEN,
        }
    }

    /// Response command field for this command
    pub const fn resp_id(&self) -> u32 {
        *self as u32 | RESP_BIT
    }
}

/// Response status codes
#[derive(
    Copy, Clone, Debug, PartialEq, Eq, Display, EnumString, EnumIter, TryFromPrimitive,
)]
#[repr(i32)]
pub enum Status {
    Ok = 0,
    Fail = 1,
    Uninitialized = 2,
    ParameterError = 3,
    NoMemory = 4,
}

/// Protocol encoding errors
#[derive(Copy, Clone, Debug, PartialEq, Eq, Display)]
pub enum Error {
    /// Buffer too short for the encoded object
    InvalidLength,

    /// Field value cannot be decoded
    InvalidEncoding,

    /// Response bit missing from a response command field
    NotAResponse,
}

impl From<encdec::Error> for Error {
    fn from(e: encdec::Error) -> Self {
        match e {
            encdec::Error::Length => Error::InvalidLength,
            _ => Error::InvalidEncoding,
        }
    }
}
