// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure display broker
//!
//! The [SecureDisplayBroker] is the single authority over the secure display
//! path, serialising access between sessions. Hardware composer access and
//! secure memory allocation are external capabilities provided via the
//! [Composer] and [FramebufferAllocator] traits.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, Mutex, PoisonError,
};

use log::{debug, warn};

static OWNER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifies the holder of the secure display mode
#[derive(Copy, Clone, PartialEq, Eq, Debug, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a process-unique owner identifier
    pub fn next() -> Self {
        Self(OWNER_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Display region in pixels
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Composited layer showing the prompt
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub struct Layer {
    pub region: Region,
}

/// Secure memory region backing the prompt layer
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SecureFramebuffer {
    /// Opaque handle issued by the allocator
    pub handle: u64,
    /// Allocated length in bytes
    pub len: u64,
}

/// Secure display errors
#[derive(Clone, PartialEq, Eq, Debug, thiserror::Error)]
pub enum DisplayError {
    /// Secure mode held by another session
    #[error("secure display held by another session")]
    Busy,

    /// Caller does not hold the secure mode
    #[error("secure display not owned by caller")]
    NotOwner,

    /// Secure mode is not enabled
    #[error("secure display not enabled")]
    NotEnabled,

    /// Secure memory allocation failed
    #[error("framebuffer allocation failed")]
    NoMemory,

    /// Hardware composer failure
    #[error("composer error: {0}")]
    Composer(String),
}

/// Hardware composer capability
pub trait Composer: Send + Sync + 'static {
    /// Switch the display pipeline in or out of secure mode
    fn set_secure_mode(&self, enable: bool, region: &Region) -> Result<(), DisplayError>;

    /// Commit a composited frame
    fn submit_frame(&self, layer: &Layer, buffer: &SecureFramebuffer) -> Result<(), DisplayError>;
}

/// Restricted secure memory allocator capability
pub trait FramebufferAllocator: Send + Sync + 'static {
    fn allocate(&self, len: u64) -> Result<SecureFramebuffer, DisplayError>;

    /// Return a framebuffer to the allocator
    fn release(&self, buffer: SecureFramebuffer);
}

/// Secure display operations used by sessions
pub trait SecureDisplay: Send + Sync + 'static {
    /// Enable or disable secure mode for `owner`
    fn enable(&self, owner: OwnerId, on: bool, region: &Region) -> Result<(), DisplayError>;

    /// Allocate a framebuffer of at least `len` bytes
    fn allocate_framebuffer(&self, len: u64) -> Result<SecureFramebuffer, DisplayError>;

    /// Release a framebuffer obtained from [SecureDisplay::allocate_framebuffer]
    fn release_framebuffer(&self, buffer: SecureFramebuffer);

    /// Commit a frame, `owner` must hold the secure mode
    fn refresh(
        &self,
        owner: OwnerId,
        layer: &Layer,
        buffer: &SecureFramebuffer,
    ) -> Result<(), DisplayError>;
}

impl<T: SecureDisplay> SecureDisplay for Arc<T> {
    fn enable(&self, owner: OwnerId, on: bool, region: &Region) -> Result<(), DisplayError> {
        T::enable(self, owner, on, region)
    }

    fn allocate_framebuffer(&self, len: u64) -> Result<SecureFramebuffer, DisplayError> {
        T::allocate_framebuffer(self, len)
    }

    fn release_framebuffer(&self, buffer: SecureFramebuffer) {
        T::release_framebuffer(self, buffer)
    }

    fn refresh(
        &self,
        owner: OwnerId,
        layer: &Layer,
        buffer: &SecureFramebuffer,
    ) -> Result<(), DisplayError> {
        T::refresh(self, owner, layer, buffer)
    }
}

/// Broker granting exclusive secure display access to one owner at a time
pub struct SecureDisplayBroker<C: Composer, A: FramebufferAllocator> {
    composer: C,
    allocator: A,
    owner: Mutex<Option<OwnerId>>,
}

impl<C: Composer, A: FramebufferAllocator> SecureDisplayBroker<C, A> {
    /// Create a new broker over the provided composer and allocator
    pub fn new(composer: C, allocator: A) -> Self {
        Self {
            composer,
            allocator,
            owner: Mutex::new(None),
        }
    }

    /// Fetch the current secure mode holder
    pub fn owner(&self) -> Option<OwnerId> {
        *self.owner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn composer(&self) -> &C {
        &self.composer
    }

    pub fn allocator(&self) -> &A {
        &self.allocator
    }
}

impl<C: Composer, A: FramebufferAllocator> SecureDisplay for SecureDisplayBroker<C, A> {
    fn enable(&self, owner: OwnerId, on: bool, region: &Region) -> Result<(), DisplayError> {
        // Held across the composer call so enable / disable are serialised
        let mut current = self.owner.lock().unwrap_or_else(PoisonError::into_inner);

        match (*current, on) {
            (Some(o), true) if o == owner => Ok(()),
            (Some(o), true) => {
                warn!("secure display requested by {owner:?} while held by {o:?}");
                Err(DisplayError::Busy)
            }
            (None, true) => {
                self.composer.set_secure_mode(true, region)?;
                *current = Some(owner);

                debug!("secure display enabled for {owner:?}");
                Ok(())
            }
            (None, false) => Ok(()),
            (Some(o), false) if o == owner => {
                // Ownership is released even if the composer fails, the
                // session is ending either way
                *current = None;
                self.composer.set_secure_mode(false, region)?;

                debug!("secure display disabled for {owner:?}");
                Ok(())
            }
            (Some(_), false) => Err(DisplayError::NotOwner),
        }
    }

    fn allocate_framebuffer(&self, len: u64) -> Result<SecureFramebuffer, DisplayError> {
        self.allocator.allocate(len)
    }

    fn release_framebuffer(&self, buffer: SecureFramebuffer) {
        debug!("releasing framebuffer {:#x}", buffer.handle);
        self.allocator.release(buffer)
    }

    fn refresh(
        &self,
        owner: OwnerId,
        layer: &Layer,
        buffer: &SecureFramebuffer,
    ) -> Result<(), DisplayError> {
        match self.owner() {
            Some(o) if o == owner => self.composer.submit_frame(layer, buffer),
            Some(_) => Err(DisplayError::NotOwner),
            None => Err(DisplayError::NotEnabled),
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[derive(Default)]
    struct TestComposer {
        secure: Mutex<bool>,
        toggles: AtomicUsize,
        frames: AtomicUsize,
    }

    impl Composer for TestComposer {
        fn set_secure_mode(&self, enable: bool, _region: &Region) -> Result<(), DisplayError> {
            *self.secure.lock().unwrap() = enable;
            self.toggles.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn submit_frame(&self, _layer: &Layer, _buffer: &SecureFramebuffer) -> Result<(), DisplayError> {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct TestAllocator;

    impl FramebufferAllocator for TestAllocator {
        fn allocate(&self, len: u64) -> Result<SecureFramebuffer, DisplayError> {
            Ok(SecureFramebuffer { handle: 7, len })
        }

        fn release(&self, _buffer: SecureFramebuffer) {}
    }

    fn broker() -> SecureDisplayBroker<TestComposer, TestAllocator> {
        SecureDisplayBroker::new(TestComposer::default(), TestAllocator)
    }

    #[test]
    fn enable_is_idempotent() {
        let b = broker();
        let a = OwnerId::next();
        let r = Region::default();

        b.enable(a, true, &r).unwrap();
        b.enable(a, true, &r).unwrap();
        assert_eq!(b.composer().toggles.load(Ordering::SeqCst), 1);
        assert!(*b.composer().secure.lock().unwrap());

        b.enable(a, false, &r).unwrap();
        b.enable(a, false, &r).unwrap();
        assert_eq!(b.composer().toggles.load(Ordering::SeqCst), 2);
        assert!(!*b.composer().secure.lock().unwrap());
        assert_eq!(b.owner(), None);
    }

    #[test]
    fn exclusive_between_owners() {
        let b = broker();
        let (a, c) = (OwnerId::next(), OwnerId::next());
        let r = Region::default();

        b.enable(a, true, &r).unwrap();
        assert_eq!(b.enable(c, true, &r), Err(DisplayError::Busy));
        assert_eq!(b.enable(c, false, &r), Err(DisplayError::NotOwner));
        assert_eq!(b.owner(), Some(a));

        b.enable(a, false, &r).unwrap();
        b.enable(c, true, &r).unwrap();
        assert_eq!(b.owner(), Some(c));
    }

    #[test]
    fn refresh_requires_ownership() {
        let b = broker();
        let (a, c) = (OwnerId::next(), OwnerId::next());
        let r = Region::default();
        let layer = Layer { region: r };
        let fb = b.allocate_framebuffer(4096).unwrap();

        assert_eq!(b.refresh(a, &layer, &fb), Err(DisplayError::NotEnabled));

        b.enable(a, true, &r).unwrap();
        assert_eq!(b.refresh(c, &layer, &fb), Err(DisplayError::NotOwner));

        b.refresh(a, &layer, &fb).unwrap();
        assert_eq!(b.composer().frames.load(Ordering::SeqCst), 1);
    }
}
