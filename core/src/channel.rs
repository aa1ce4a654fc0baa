// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Secure channel abstraction
//!
//! The channel to the secure environment is an external capability, this
//! module defines the messages exchanged over it and the traits a transport
//! must implement.

use async_trait::async_trait;

use crate::session::{ConfirmationRequest, InputToken, ResponseCode};

/// Messages sent from the session to the secure environment
#[derive(Clone, PartialEq, Debug)]
pub enum SessionMessage {
    /// Display a prompt
    Prompt(ConfirmationRequest),

    /// Forward a secure input event
    DeliverInput(InputToken),

    /// Abort the active prompt
    Abort,
}

/// Events received from the secure environment
#[derive(Clone, PartialEq, Debug)]
pub enum PeerEvent {
    /// Prompt accepted (or rejected) for display
    PromptAck(ResponseCode),

    /// A new frame has been rendered into the framebuffer
    FrameReady,

    /// User confirmed, carries the formatted message and its signature
    Confirmed { message: Vec<u8>, signature: Vec<u8> },

    /// User cancelled
    Canceled,

    /// Acknowledgement for a delivered input event
    InputAck(ResponseCode),

    /// Secure environment aborted the prompt
    Aborted,
}

/// Secure channel errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Connection could not be established
    #[error("connect failed: {0}")]
    Connect(String),

    /// Remote closed the channel
    #[error("channel closed")]
    Closed,

    /// Underlying transport error
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}

/// Point-to-point channel to the secure environment, exclusively owned by
/// the session listener
#[async_trait]
pub trait SecureChannel: Send {
    /// Send a message to the secure environment
    async fn send(&mut self, msg: SessionMessage) -> Result<(), ChannelError>;

    /// Receive the next event from the secure environment
    ///
    /// This MUST be cancel safe, the listener waits on `recv` alongside
    /// control messages and drops the future when a control message arrives.
    async fn recv(&mut self) -> Result<PeerEvent, ChannelError>;

    /// Close the channel
    async fn close(&mut self);
}

/// Connector for opening [SecureChannel]s
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Channel: SecureChannel + 'static;

    /// Open a new channel to the secure environment
    async fn connect(&self) -> Result<Self::Channel, ChannelError>;
}
