// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure framebuffer allocation payloads

use encdec::{Decode, Encode};

use crate::Error;

/// Allocate a secure framebuffer of at least `buffer_len` bytes
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                          BUFFER_LEN                           |
/// |                         (8-byte u64)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
#[encdec(error = "Error")]
pub struct AllocateBufferReq {
    /// Requested buffer length in bytes
    pub buffer_len: u64,
}

impl AllocateBufferReq {
    /// Encoded payload length
    pub const LEN: usize = 8;

    pub fn new(buffer_len: u64) -> Self {
        Self { buffer_len }
    }
}

/// Allocation response payload, sent with a transferred memory handle
/// on success
///
/// ## Encoding:
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// |                         ALLOCATED_LEN                         |
/// |                         (8-byte u64)                          |
/// +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
/// ```
#[derive(Copy, Clone, PartialEq, Eq, Debug, Encode, Decode)]
#[encdec(error = "Error")]
pub struct AllocateBufferResp {
    /// Allocated (page-aligned) length, zero on failure
    pub buffer_len: u64,
}

impl AllocateBufferResp {
    /// Encoded payload length
    pub const LEN: usize = 8;

    pub fn new(buffer_len: u64) -> Self {
        Self { buffer_len }
    }
}
