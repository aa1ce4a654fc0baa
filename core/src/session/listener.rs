// Copyright (c) 2022-2023 The MobileCoin Foundation

//! Session listener task, owns the secure channel for the lifetime of a
//! single prompt.

use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedReceiver;

use super::{
    ConfirmationRequest, ConfirmationResult, Control, Error, Inner, ListenerState, ResponseCode,
    ResultCallback,
};
use crate::{
    channel::{ChannelError, Connector, PeerEvent, SecureChannel, SessionMessage},
    display::{Layer, SecureDisplay, SecureFramebuffer},
};

/// Next input for the listener at a checkpoint
enum Step {
    Control(Option<Control>),
    Peer(Result<PeerEvent, ChannelError>),
}

/// Resolves the session exactly once
///
/// Owned by the listener task, if the task is dropped before completing
/// (for example on runtime shutdown) the display is released and the
/// callback receives [ResponseCode::Aborted] or [ResponseCode::SystemError].
struct Completion<N: Connector, D: SecureDisplay> {
    inner: Arc<Inner<N, D>>,
    callback: Option<ResultCallback>,

    /// Secure display enabled by this session
    enabled: bool,

    /// Framebuffer allocated for this session
    framebuffer: Option<SecureFramebuffer>,
}

impl<N: Connector, D: SecureDisplay> Completion<N, D> {
    fn new(inner: Arc<Inner<N, D>>, callback: ResultCallback) -> Self {
        Self {
            inner,
            callback: Some(callback),
            enabled: false,
            framebuffer: None,
        }
    }

    /// Release the framebuffer and disable the secure display if held
    fn release(&mut self) {
        let inner = &self.inner;

        if let Some(fb) = self.framebuffer.take() {
            inner.display.release_framebuffer(fb);
        }

        if std::mem::take(&mut self.enabled) {
            if let Err(e) = inner.display.enable(inner.owner, false, &inner.config.region()) {
                warn!("failed to disable secure display: {e}");
            }
        }
    }

    /// Deliver the result and return to idle
    fn resolve(&mut self, result: ConfirmationResult) {
        let callback = match self.callback.take() {
            Some(c) => c,
            None => return,
        };

        self.inner.control().take();

        info!("confirmation session complete: {}", result.code);

        callback(result);

        self.inner.transition(ListenerState::None);
    }
}

impl<N: Connector, D: SecureDisplay> Drop for Completion<N, D> {
    fn drop(&mut self) {
        if self.callback.is_none() {
            return;
        }

        warn!("listener dropped in state {}", self.inner.phase().state);

        self.release();

        let code = match self.inner.phase().abort_called {
            true => ResponseCode::Aborted,
            false => ResponseCode::SystemError,
        };
        self.resolve(ConfirmationResult::from_code(code));
    }
}

impl<N: Connector, D: SecureDisplay> Inner<N, D> {
    /// Listener entry point, resolves the session through `callback`
    pub(super) async fn run(
        self: Arc<Self>,
        request: ConfirmationRequest,
        mut control: UnboundedReceiver<Control>,
        callback: ResultCallback,
    ) {
        let mut done = Completion::new(self.clone(), callback);

        let mut channel = match self.connector.connect().await {
            Ok(c) => c,
            Err(e) => {
                error!("failed to connect secure channel: {e}");

                control.close();
                done.resolve(ConfirmationResult::from_code(ResponseCode::SystemError));
                return;
            }
        };

        debug!("secure channel connected");

        let result = match self
            .setup(&mut channel, &mut control, &mut done, request)
            .await
        {
            Ok(fb) => {
                self.transition(ListenerState::SetupDone);
                self.transition(ListenerState::Interactive);

                let r = self.interact(&mut channel, &mut control, &fb).await;
                self.transition(ListenerState::Terminating);
                r
            }
            // Aborts always pass through terminating
            Err(r) if r.code == ResponseCode::Aborted => {
                self.transition(ListenerState::Terminating);
                r
            }
            // Setup failures return directly to idle
            Err(r) => r,
        };

        self.teardown(channel, control, &mut done).await;
        done.resolve(result);
    }

    /// Acquire the display, show the prompt and commit the prompt layer
    async fn setup(
        &self,
        channel: &mut N::Channel,
        control: &mut UnboundedReceiver<Control>,
        done: &mut Completion<N, D>,
        request: ConfirmationRequest,
    ) -> Result<SecureFramebuffer, ConfirmationResult> {
        let region = self.config.region();

        self.checkpoint()?;

        if let Err(e) = self.display.enable(self.owner, true, &region) {
            error!("failed to enable secure display: {e}");
            return Err(ConfirmationResult::from_code(ResponseCode::SystemError));
        }
        done.enabled = true;

        self.checkpoint()?;

        let len = match self.config.framebuffer_len() {
            Some(v) => v,
            None => {
                error!(
                    "framebuffer length overflow ({}x{}, {} bytes per pixel)",
                    self.config.width, self.config.height, self.config.bytes_per_pixel
                );
                return Err(ConfirmationResult::from_code(ResponseCode::SystemError));
            }
        };

        let fb = match self.display.allocate_framebuffer(len) {
            Ok(fb) => fb,
            Err(e) => {
                error!("failed to allocate framebuffer: {e}");
                return Err(ConfirmationResult::from_code(ResponseCode::SystemError));
            }
        };

        debug!("allocated framebuffer {:#x} ({} bytes)", fb.handle, fb.len);
        done.framebuffer = Some(fb.clone());

        self.checkpoint()?;

        if let Err(e) = channel.send(SessionMessage::Prompt(request)).await {
            error!("failed to send prompt: {e}");
            return Err(ConfirmationResult::from_code(ResponseCode::SystemError));
        }

        // Await prompt acknowledgement, the peer holds the prompt from here on
        loop {
            if self.phase().abort_called {
                self.abort_peer(channel).await;
                return Err(ConfirmationResult::from_code(ResponseCode::Aborted));
            }

            match self.next_step(channel, control).await {
                Step::Control(Some(Control::DeliverInput { reply, .. })) => {
                    let _ = reply.send(Err(Error::Ignored));
                }
                Step::Control(_) => {
                    self.abort_peer(channel).await;
                    return Err(ConfirmationResult::from_code(ResponseCode::Aborted));
                }
                Step::Peer(Ok(PeerEvent::PromptAck(ResponseCode::Ok))) => break,
                Step::Peer(Ok(PeerEvent::PromptAck(code))) => {
                    warn!("prompt rejected: {code}");
                    return Err(ConfirmationResult::from_code(code));
                }
                Step::Peer(Ok(PeerEvent::Aborted)) => {
                    return Err(ConfirmationResult::from_code(ResponseCode::Aborted));
                }
                Step::Peer(Ok(ev)) => {
                    error!("unexpected event awaiting prompt ack: {ev:?}");
                    return Err(ConfirmationResult::from_code(ResponseCode::SystemError));
                }
                Step::Peer(Err(e)) => {
                    error!("channel error awaiting prompt ack: {e}");
                    return Err(ConfirmationResult::from_code(ResponseCode::SystemError));
                }
            }
        }

        if self.phase().abort_called {
            self.abort_peer(channel).await;
            return Err(ConfirmationResult::from_code(ResponseCode::Aborted));
        }

        let layer = Layer { region };
        if let Err(e) = self.display.refresh(self.owner, &layer, &fb) {
            error!("failed to commit prompt layer: {e}");
            return Err(ConfirmationResult::from_code(ResponseCode::UIError));
        }

        Ok(fb)
    }

    /// Handle control messages and peer events until the prompt resolves
    async fn interact(
        &self,
        channel: &mut N::Channel,
        control: &mut UnboundedReceiver<Control>,
        fb: &SecureFramebuffer,
    ) -> ConfirmationResult {
        let layer = Layer {
            region: self.config.region(),
        };

        loop {
            if self.phase().abort_called {
                self.abort_peer(channel).await;
                return ConfirmationResult::from_code(ResponseCode::Aborted);
            }

            let ev = match self.next_step(channel, control).await {
                Step::Control(Some(Control::DeliverInput { token, reply })) => {
                    match channel.send(SessionMessage::DeliverInput(token)).await {
                        Ok(()) => {
                            self.phase.send_modify(|p| p.input_delivered = true);
                            let _ = reply.send(Ok(()));
                            continue;
                        }
                        Err(e) => {
                            error!("failed to forward input event: {e}");
                            let _ = reply.send(Err(Error::SystemError));
                            return ConfirmationResult::from_code(ResponseCode::SystemError);
                        }
                    }
                }
                Step::Control(_) => {
                    self.abort_peer(channel).await;
                    return ConfirmationResult::from_code(ResponseCode::Aborted);
                }
                Step::Peer(Ok(ev)) => ev,
                Step::Peer(Err(e)) => {
                    error!("secure channel error: {e}");
                    return ConfirmationResult::from_code(ResponseCode::SystemError);
                }
            };

            debug!("peer event: {ev:?}");

            match ev {
                PeerEvent::Confirmed { message, signature } => {
                    return ConfirmationResult::confirmed(message, signature)
                }
                PeerEvent::Canceled => return ConfirmationResult::from_code(ResponseCode::Canceled),
                PeerEvent::Aborted => return ConfirmationResult::from_code(ResponseCode::Aborted),
                PeerEvent::InputAck(code) if self.phase().input_delivered => {
                    debug!("input acknowledged: {code}");
                }
                PeerEvent::FrameReady => {
                    if let Err(e) = self.display.refresh(self.owner, &layer, fb) {
                        error!("failed to commit frame: {e}");
                        return ConfirmationResult::from_code(ResponseCode::SystemError);
                    }
                }
                ev => {
                    error!("unexpected peer event: {ev:?}");
                    return ConfirmationResult::from_code(ResponseCode::SystemError);
                }
            }
        }
    }

    /// Wait for the next control message or peer event, control first
    async fn next_step(
        &self,
        channel: &mut N::Channel,
        control: &mut UnboundedReceiver<Control>,
    ) -> Step {
        tokio::select! {
            biased;

            c = control.recv() => Step::Control(c),
            e = channel.recv() => Step::Peer(e),
        }
    }

    /// Bail out of setup if an abort has been requested
    fn checkpoint(&self) -> Result<(), ConfirmationResult> {
        match self.phase().abort_called {
            true => {
                debug!("abort observed during setup");
                Err(ConfirmationResult::from_code(ResponseCode::Aborted))
            }
            false => Ok(()),
        }
    }

    async fn abort_peer(&self, channel: &mut N::Channel) {
        debug!("forwarding abort to peer");

        if let Err(e) = channel.send(SessionMessage::Abort).await {
            warn!("failed to forward abort: {e}");
        }
    }

    /// Release the display and channel, rejecting any queued input events
    async fn teardown(
        &self,
        mut channel: N::Channel,
        mut control: UnboundedReceiver<Control>,
        done: &mut Completion<N, D>,
    ) {
        control.close();
        while let Ok(c) = control.try_recv() {
            if let Control::DeliverInput { reply, .. } = c {
                let _ = reply.send(Err(Error::Ignored));
            }
        }

        done.release();

        channel.close().await;
    }
}
