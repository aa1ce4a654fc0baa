// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure DPU buffer service
//!
//! The [SecureBufferService] answers display control and framebuffer
//! allocation requests from the secure environment over a single trusted
//! [Transport] connection, allocating page-aligned regions of restricted
//! memory via a [SecureAllocator] and lending them to the requester.
//!
//! Requests are handled strictly in order, see [secure_ui_proto] for the
//! wire format. Malformed frames and transport failures are fatal and
//! terminate the service loop, invalid request parameters and allocation
//! failures are answered with an error [Status] and the loop continues.

use std::{
    convert::Infallible,
    sync::atomic::{AtomicBool, Ordering},
};

use encdec::{Decode, DecodeOwned, Encode};
use log::{debug, error, info, warn};
use static_assertions::const_assert;

use secure_ui_proto::{prelude::*, MAX_REQ_PAYLOAD_LEN, MAX_RESP_LEN};

mod allocator;
pub use allocator::{page_align, page_size, DmaHeapAllocator, SecureAllocator};

mod error;
pub use error::Error;

mod transport;
pub use transport::{TipcTransport, Transport};

/// Receive buffer length, larger than any valid request so oversized
/// frames are detected rather than truncated
const RECV_BUFF_LEN: usize = 64;

static RUNNING: AtomicBool = AtomicBool::new(false);

/// Secure DPU buffer service, at most one instance exists per process
pub struct SecureBufferService<T: Transport<Handle = A::Region>, A: SecureAllocator> {
    transport: T,
    allocator: A,
    page_size: u64,
    display_enabled: bool,
}

impl<T: Transport<Handle = A::Region>, A: SecureAllocator> SecureBufferService<T, A> {
    /// Create the service over an established transport connection
    ///
    /// Fails with [Error::AlreadyRunning] while another instance exists.
    pub fn new(transport: T, allocator: A, page_size: u64) -> Result<Self, Error> {
        if RUNNING
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(Error::AlreadyRunning);
        }

        info!("secure buffer service ready (page size: {page_size})");

        Ok(Self {
            transport,
            allocator,
            page_size,
            display_enabled: false,
        })
    }

    /// Whether the secure display has been started
    pub fn display_enabled(&self) -> bool {
        self.display_enabled
    }

    /// Serve requests until a fatal error occurs
    pub fn run(&mut self) -> Result<Infallible, Error> {
        let mut buff = [0u8; RECV_BUFF_LEN];

        loop {
            let n = self.transport.recv(&mut buff)?;

            self.handle_message(&buff[..n])?;
        }
    }

    /// Handle a single request frame, sending the response
    pub fn handle_message(&mut self, msg: &[u8]) -> Result<(), Error> {
        let (hdr, n) = RequestHeader::decode_owned(msg).map_err(|_| {
            error!("request too short ({} bytes)", msg.len());
            Error::Framing { len: msg.len() }
        })?;

        let payload = &msg[n..];
        let cmd = hdr.command();

        // Payload length is fixed by the command, unknown commands may carry
        // a payload of the maximum request size which is ignored
        let expected = cmd
            .map(|c| c.req_payload_len())
            .unwrap_or(MAX_REQ_PAYLOAD_LEN);
        if !payload.is_empty() && payload.len() != expected {
            error!(
                "request {:#x} payload length mismatch (expected {expected}, got {})",
                hdr.cmd,
                payload.len()
            );
            return Err(Error::Framing { len: msg.len() });
        }

        debug!("request {:#x} ({} payload bytes)", hdr.cmd, payload.len());

        match cmd {
            Some(Command::StartSecureDisplay) => {
                // Display switching is performed by the secure environment
                self.display_enabled = true;
                info!("secure display started");

                self.respond(hdr.cmd, Status::Ok, None, None)
            }
            Some(Command::StopSecureDisplay) => {
                self.display_enabled = false;
                info!("secure display stopped");

                self.respond(hdr.cmd, Status::Ok, None, None)
            }
            Some(Command::AllocateBuffer) => self.allocate(payload),
            None => {
                warn!("unhandled command {:#x}", hdr.cmd);

                self.respond(hdr.cmd, Status::ParameterError, None, None)
            }
        }
    }

    fn allocate(&mut self, payload: &[u8]) -> Result<(), Error> {
        let cmd = Command::AllocateBuffer as u32;
        let failed = AllocateBufferResp::new(0);

        if payload.len() != AllocateBufferReq::LEN {
            warn!("allocate request missing buffer length");
            return self.respond(cmd, Status::ParameterError, Some(failed), None);
        }

        let (req, _) = AllocateBufferReq::decode(payload)?;

        let len = match page_align(req.buffer_len, self.page_size) {
            Some(v) => v,
            None => {
                warn!("failed to page-align buffer length {}", req.buffer_len);
                return self.respond(cmd, Status::ParameterError, Some(failed), None);
            }
        };

        let region = match self.allocator.allocate(len) {
            Ok(r) => r,
            Err(e) => {
                error!("failed to allocate {len} byte secure framebuffer: {e}");
                return self.respond(cmd, Status::NoMemory, Some(failed), None);
            }
        };

        debug!("allocated {len} byte secure framebuffer");

        // Ownership of the region ends with the response
        self.respond(cmd, Status::Ok, Some(AllocateBufferResp::new(len)), Some(region))
    }

    fn respond(
        &mut self,
        cmd: u32,
        status: Status,
        payload: Option<AllocateBufferResp>,
        region: Option<A::Region>,
    ) -> Result<(), Error> {
        let mut buff = [0u8; MAX_RESP_LEN];

        let mut n = ResponseHeader::new(cmd, status).encode(&mut buff)?;
        if let Some(p) = payload {
            n += p.encode(&mut buff[n..])?;
        }

        debug!("response {:#x}: {status}", cmd);

        self.transport.send(&buff[..n], region)
    }
}

impl<T: Transport<Handle = A::Region>, A: SecureAllocator> Drop for SecureBufferService<T, A> {
    fn drop(&mut self) {
        RUNNING.store(false, Ordering::SeqCst);
    }
}

const_assert!(REQ_HEADER_LEN + MAX_REQ_PAYLOAD_LEN < RECV_BUFF_LEN);
