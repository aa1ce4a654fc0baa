#![allow(unused)]

use std::{
    collections::VecDeque,
    io,
    sync::{Arc, Mutex},
};

use encdec::{Decode, DecodeOwned, Encode};
use log::debug;

use secure_ui_dpu::{Error, SecureAllocator, Transport};
use secure_ui_proto::prelude::*;

pub const PAGE_SIZE: u64 = 4096;

pub fn init_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Region handle issued by [TestAllocator]
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TestRegion {
    pub id: usize,
    pub len: u64,
}

/// Response captured by [TestTransport]
#[derive(Clone, PartialEq, Debug)]
pub struct Sent {
    pub frame: Vec<u8>,
    pub region: Option<TestRegion>,
}

impl Sent {
    pub fn header(&self) -> ResponseHeader {
        ResponseHeader::decode_owned(&self.frame)
            .expect("invalid response header")
            .0
    }

    pub fn allocated_len(&self) -> Option<u64> {
        match self.frame.len() > RESP_HEADER_LEN {
            true => {
                let (r, _) = AllocateBufferResp::decode(&self.frame[RESP_HEADER_LEN..])
                    .expect("invalid allocate response");
                Some(r.buffer_len)
            }
            false => None,
        }
    }
}

/// Transport replaying queued requests and capturing responses
///
/// Reports [Error::Closed] once all requests are consumed.
#[derive(Clone, Default)]
pub struct TestTransport {
    requests: Arc<Mutex<VecDeque<Vec<u8>>>>,
    sent: Arc<Mutex<Vec<Sent>>>,
}

impl TestTransport {
    pub fn push(&self, frame: Vec<u8>) {
        self.requests.lock().unwrap().push_back(frame);
    }

    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    pub fn pending(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

impl Transport for TestTransport {
    type Handle = TestRegion;

    fn recv(&mut self, buff: &mut [u8]) -> Result<usize, Error> {
        let req = self
            .requests
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(Error::Closed)?;

        buff[..req.len()].copy_from_slice(&req);
        Ok(req.len())
    }

    fn send(&mut self, buff: &[u8], handle: Option<TestRegion>) -> Result<(), Error> {
        debug!("response: {buff:02x?} (region: {handle:?})");

        self.sent.lock().unwrap().push(Sent {
            frame: buff.to_vec(),
            region: handle,
        });

        Ok(())
    }
}

/// Allocator issuing sequential region handles
#[derive(Clone, Default)]
pub struct TestAllocator {
    pub fail: Arc<Mutex<bool>>,
    pub allocated: Arc<Mutex<Vec<u64>>>,
}

impl SecureAllocator for TestAllocator {
    type Region = TestRegion;

    fn allocate(&mut self, len: u64) -> io::Result<TestRegion> {
        if *self.fail.lock().unwrap() {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "test allocator"));
        }

        let mut a = self.allocated.lock().unwrap();
        a.push(len);

        Ok(TestRegion { id: a.len(), len })
    }
}

/// Encode a request frame for a known command
pub fn request(cmd: Command, buffer_len: Option<u64>) -> Vec<u8> {
    raw_request(cmd as u32, buffer_len.map(|l| l.to_le_bytes().to_vec()))
}

/// Encode a request frame with an arbitrary command and payload
pub fn raw_request(cmd: u32, payload: Option<Vec<u8>>) -> Vec<u8> {
    let mut b = [0u8; REQ_HEADER_LEN];
    RequestHeader { cmd }.encode(&mut b).unwrap();

    let mut v = b.to_vec();
    if let Some(p) = payload {
        v.extend_from_slice(&p);
    }
    v
}
