//! Prelude to simplify downstream use of protocol objects
//!

pub use crate::{
    buffer::{AllocateBufferReq, AllocateBufferResp},
    header::{RequestHeader, ResponseHeader},
    Command, Status, REQ_HEADER_LEN, RESP_BIT, RESP_HEADER_LEN,
};
