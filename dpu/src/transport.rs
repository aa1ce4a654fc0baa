// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Message transport to the secure environment

use std::{
    ffi::CString,
    fs::{File, OpenOptions},
    io::{self, Read},
    os::fd::{AsRawFd, OwnedFd},
    path::Path,
};

use log::{debug, trace};

use crate::Error;

/// Message oriented transport carrying requests and responses
pub trait Transport {
    /// Memory handle transferred alongside a response
    type Handle;

    /// Receive a single whole message into `buff`, returning its length
    fn recv(&mut self, buff: &mut [u8]) -> Result<usize, Error>;

    /// Send a response, transferring `handle` to the remote if provided
    fn send(&mut self, buff: &[u8], handle: Option<Self::Handle>) -> Result<(), Error>;
}

const TIPC_IOC_CONNECT: u32 = 0x4008_7280;
const TIPC_IOC_SEND_MSG: u32 = 0x4020_7281;

/// Lend (rather than share or transfer) memory to the secure environment
const TRUSTY_LEND: u32 = 1;

#[repr(C)]
struct TipcSendMsgReq {
    iov: u64,
    shm: u64,
    iov_cnt: u64,
    shm_cnt: u64,
}

#[repr(C)]
struct TrustyShm {
    fd: i32,
    transfer: u32,
}

/// Trusty IPC transport, one connection to a named secure service port
pub struct TipcTransport {
    dev: File,
}

impl TipcTransport {
    /// Open the IPC `device` and connect to `port`
    pub fn connect(device: &Path, port: &str) -> Result<Self, Error> {
        let dev = OpenOptions::new().read(true).write(true).open(device)?;

        let name = CString::new(port).map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;

        // SAFETY: `name` is a valid nul-terminated string for the duration of the call
        let rc = unsafe { libc::ioctl(dev.as_raw_fd(), TIPC_IOC_CONNECT as _, name.as_ptr()) };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        debug!("connected to {port} via {}", device.display());

        Ok(Self { dev })
    }
}

impl Transport for TipcTransport {
    type Handle = OwnedFd;

    fn recv(&mut self, buff: &mut [u8]) -> Result<usize, Error> {
        let n = self.dev.read(buff)?;

        // End of file, the remote has closed the connection
        if n == 0 {
            debug!("connection closed by remote");
            return Err(Error::Closed);
        }

        trace!("rx: {:02x?}", &buff[..n]);

        Ok(n)
    }

    fn send(&mut self, buff: &[u8], handle: Option<OwnedFd>) -> Result<(), Error> {
        trace!("tx: {buff:02x?}");

        let iov = libc::iovec {
            iov_base: buff.as_ptr() as *mut libc::c_void,
            iov_len: buff.len(),
        };

        let shm = handle.as_ref().map(|fd| TrustyShm {
            fd: fd.as_raw_fd(),
            transfer: TRUSTY_LEND,
        });

        let req = TipcSendMsgReq {
            iov: &iov as *const libc::iovec as u64,
            shm: shm
                .as_ref()
                .map(|s| s as *const TrustyShm as u64)
                .unwrap_or(0),
            iov_cnt: 1,
            shm_cnt: shm.is_some() as u64,
        };

        // SAFETY: `iov`, `shm` and `buff` outlive the call, `handle` is kept
        // open until the message is sent and closed on drop afterwards
        let rc = unsafe {
            libc::ioctl(
                self.dev.as_raw_fd(),
                TIPC_IOC_SEND_MSG as _,
                &req as *const TipcSendMsgReq,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error().into());
        }

        Ok(())
    }
}
