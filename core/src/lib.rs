// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Trusted confirmation UI core
//!
//! This provides a [ConfirmationSession][session::ConfirmationSession] driving
//! a single user confirmation prompt rendered by a secure environment, and the
//! [SecureDisplayBroker][display::SecureDisplayBroker] arbitrating exclusive
//! access to the secure display path.
//!
//! The secure environment is reached via the [Connector][channel::Connector] /
//! [SecureChannel][channel::SecureChannel] traits, display hardware via the
//! [Composer][display::Composer] and
//! [FramebufferAllocator][display::FramebufferAllocator] traits, so platform
//! integrations remain outside of this crate.
//!
//! ## Operations
//!
//! 1. Issue [`start`][session::ConfirmationSession::start] with a
//!    [`ConfirmationRequest`][session::ConfirmationRequest] and a result
//!    callback. A listener task connects to the secure environment, enables
//!    the secure display and shows the prompt.
//! 2. Once [`Interactive`][session::ListenerState::Interactive], secure input
//!    events may be forwarded with
//!    [`deliver_input_event`][session::ConfirmationSession::deliver_input_event].
//! 3. The prompt resolves when the user confirms or cancels, or when
//!    [`abort`][session::ConfirmationSession::abort] is called, and the
//!    [`ConfirmationResult`][session::ConfirmationResult] is passed to the
//!    callback exactly once.
//!

pub mod channel;

pub mod display;

pub mod session;

pub use session::{ConfirmationSession, Error};
