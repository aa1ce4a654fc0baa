// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Restricted memory allocation for secure framebuffers

use std::{
    fs::{File, OpenOptions},
    io,
    os::fd::{AsRawFd, FromRawFd, OwnedFd},
    path::Path,
};

use log::{debug, warn};

/// Allocator for regions of restricted (secure) memory
pub trait SecureAllocator {
    /// Allocated region handle, ownership passes to the caller
    type Region;

    /// Allocate a region of exactly `len` bytes
    fn allocate(&mut self, len: u64) -> io::Result<Self::Region>;
}

const DMA_HEAP_IOCTL_ALLOC: u32 = 0xc018_4800;

#[repr(C)]
#[derive(Default)]
struct DmaHeapAllocationData {
    len: u64,
    fd: u32,
    fd_flags: u32,
    heap_flags: u64,
}

/// dma-buf heap allocator, each region is an owned dma-buf file descriptor
pub struct DmaHeapAllocator {
    heap: File,
}

impl DmaHeapAllocator {
    /// Open the dma-buf heap device at `path`
    pub fn open(path: &Path) -> io::Result<Self> {
        let heap = OpenOptions::new().read(true).open(path)?;

        debug!("using dma heap {}", path.display());

        Ok(Self { heap })
    }
}

impl SecureAllocator for DmaHeapAllocator {
    type Region = OwnedFd;

    fn allocate(&mut self, len: u64) -> io::Result<OwnedFd> {
        let mut data = DmaHeapAllocationData {
            len,
            fd_flags: (libc::O_RDWR | libc::O_CLOEXEC) as u32,
            ..Default::default()
        };

        // SAFETY: `data` matches the kernel allocation layout and outlives the call
        let rc = unsafe {
            libc::ioctl(
                self.heap.as_raw_fd(),
                DMA_HEAP_IOCTL_ALLOC as _,
                &mut data as *mut DmaHeapAllocationData,
            )
        };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }

        // SAFETY: the kernel returned a freshly opened descriptor we now own
        Ok(unsafe { OwnedFd::from_raw_fd(data.fd as i32) })
    }
}

/// Fallback where the system page size is unavailable
const DEFAULT_PAGE_SIZE: u64 = 4096;

/// Fetch the system page size
pub fn page_size() -> u64 {
    // SAFETY: sysconf has no memory safety preconditions
    let n = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };

    match n > 0 {
        true => n as u64,
        false => {
            warn!("sysconf page size unavailable, using {DEFAULT_PAGE_SIZE}");
            DEFAULT_PAGE_SIZE
        }
    }
}

/// Round `len` up to a multiple of `page`, `None` on overflow
pub fn page_align(len: u64, page: u64) -> Option<u64> {
    if page == 0 {
        return None;
    }

    match len % page {
        0 => Some(len),
        rem => len.checked_add(page - rem),
    }
}
