// Copyright (c) 2022-2023 The MobileCoin Foundation

//! The [ConfirmationSession] drives a single confirmation prompt end-to-end.
//!
//! A session is started with [ConfirmationSession::start], which spawns a
//! listener task that opens a [SecureChannel][crate::channel::SecureChannel],
//! acquires the secure display, shows the prompt and waits for the user's
//! decision. The result is delivered through the provided callback exactly
//! once per started session, whether the prompt completes, fails or is aborted.
//!
//! The session phase ([ListenerState] plus abort / input flags) is held in a
//! single [watch] cell, the public API communicates with the listener via a
//! per-session control channel. Every listener state change is additionally
//! published on a [broadcast] channel, see [ConfirmationSession::transitions].

use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, error, info, warn};
use tokio::{
    runtime::Handle,
    sync::{broadcast, mpsc, oneshot, watch},
};

use crate::{
    channel::Connector,
    display::{OwnerId, SecureDisplay},
};

mod config;
pub use config::SessionConfig;

mod error;
pub use error::Error;

mod listener;

mod request;
pub use request::{ConfirmationRequest, ConfirmationResult, InputToken, ResponseCode, UiOptions};

mod state;
pub use state::{ListenerState, Phase};

/// Listener transitions buffered per subscriber
const TRANSITION_QUEUE_LEN: usize = 16;

/// Callback receiving the session outcome
pub type ResultCallback = Box<dyn FnOnce(ConfirmationResult) + Send + 'static>;

/// Control messages from the public API to the listener
pub(crate) enum Control {
    /// Abort the running session
    Abort,

    /// Forward a secure input event to the peer
    DeliverInput {
        token: InputToken,
        reply: oneshot::Sender<Result<(), Error>>,
    },
}

/// Confirmation session, see [module level docs][self]
pub struct ConfirmationSession<N: Connector, D: SecureDisplay> {
    inner: Arc<Inner<N, D>>,
}

/// State shared between the session handle and listener task
pub(crate) struct Inner<N: Connector, D: SecureDisplay> {
    connector: N,
    display: D,
    config: SessionConfig,

    /// Secure display owner identity for this session instance
    owner: OwnerId,

    /// Session phase and change notification
    phase: watch::Sender<Phase>,

    /// Listener state change log
    transitions: broadcast::Sender<ListenerState>,

    /// Control sender for the running listener
    control: Mutex<Option<mpsc::UnboundedSender<Control>>>,
}

impl<N: Connector, D: SecureDisplay> Clone for ConfirmationSession<N, D> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<N: Connector, D: SecureDisplay> ConfirmationSession<N, D> {
    /// Create a new (idle) confirmation session
    pub fn new(connector: N, display: D, config: SessionConfig) -> Self {
        let (phase, _) = watch::channel(Phase::default());
        let (transitions, _) = broadcast::channel(TRANSITION_QUEUE_LEN);

        Self {
            inner: Arc::new(Inner {
                connector,
                display,
                config,
                owner: OwnerId::next(),
                phase,
                transitions,
                control: Mutex::new(None),
            }),
        }
    }

    /// Fetch the current listener state
    pub fn state(&self) -> ListenerState {
        self.inner.phase().state
    }

    /// Fetch the current session phase
    pub fn phase(&self) -> Phase {
        self.inner.phase()
    }

    /// Subscribe to phase changes
    pub fn subscribe(&self) -> watch::Receiver<Phase> {
        self.inner.phase.subscribe()
    }

    /// Subscribe to listener state transitions
    ///
    /// Unlike [ConfirmationSession::subscribe], which only exposes the latest
    /// phase, every state entered after subscribing is delivered in order.
    pub fn transitions(&self) -> broadcast::Receiver<ListenerState> {
        self.inner.transitions.subscribe()
    }

    /// Secure display owner identity used by this session
    pub fn owner(&self) -> OwnerId {
        self.inner.owner
    }

    /// Start a confirmation prompt
    ///
    /// Returns once the listener is scheduled, the outcome is delivered via
    /// `callback`. Fails with [Error::OperationPending] if a session is
    /// already running, in which case `callback` is never invoked.
    pub fn start<F>(&self, request: ConfirmationRequest, callback: F) -> Result<(), Error>
    where
        F: FnOnce(ConfirmationResult) + Send + 'static,
    {
        let rt = Handle::try_current().map_err(|_| {
            error!("no runtime available for session listener");
            Error::SystemError
        })?;

        // Claim the session, clearing flags from any prior session
        let mut started = false;
        self.inner.phase.send_if_modified(|p| {
            if p.state != ListenerState::None {
                return false;
            }

            *p = Phase {
                state: ListenerState::Starting,
                abort_called: false,
                input_delivered: false,
            };
            started = true;
            let _ = self.inner.transitions.send(ListenerState::Starting);

            true
        });

        if !started {
            debug!("start rejected, session in state {}", self.state());
            return Err(Error::OperationPending);
        }

        debug!("listener state None -> Starting");

        let (tx, rx) = mpsc::unbounded_channel();
        *self.inner.control() = Some(tx);

        rt.spawn(self.inner.clone().run(request, rx, Box::new(callback)));

        Ok(())
    }

    /// Deliver a secure input event to the running prompt
    ///
    /// Events are only accepted in the [ListenerState::Interactive] phase and
    /// are rejected with [Error::Ignored] otherwise.
    pub async fn deliver_input_event(&self, token: InputToken) -> Result<(), Error> {
        let state = self.state();
        if state != ListenerState::Interactive {
            debug!("input event ignored in state {state}");
            return Err(Error::Ignored);
        }

        let tx = self.inner.control().clone().ok_or(Error::Ignored)?;

        let (reply, resp) = oneshot::channel();
        tx.send(Control::DeliverInput { token, reply })
            .map_err(|_| Error::Ignored)?;

        // A dropped reply means the listener exited before handling the event
        resp.await.unwrap_or(Err(Error::Ignored))
    }

    /// Abort the running prompt
    ///
    /// Idempotent, returns immediately if no session is running. Otherwise
    /// waits until the listener reaches [ListenerState::Terminating] or
    /// [ListenerState::None], bounded by [SessionConfig::abort_timeout].
    pub async fn abort(&self) -> Result<(), Error> {
        let mut rx = self.inner.phase.subscribe();

        let (mut active, mut first) = (false, false);
        self.inner.phase.send_if_modified(|p| {
            if p.state == ListenerState::None {
                return false;
            }
            active = true;

            if p.abort_called {
                return false;
            }
            p.abort_called = true;
            first = true;

            true
        });

        if !active {
            return Ok(());
        }

        if first {
            info!("abort requested in state {}", self.state());

            // Wake the listener, a missing sender means it has not yet been
            // installed and the flag is observed at the next checkpoint
            if let Some(tx) = self.inner.control().as_ref() {
                let _ = tx.send(Control::Abort);
            }
        }

        let settled = rx.wait_for(|p| p.state.is_settled());

        let r = match self.inner.config.abort_timeout {
            Some(t) => tokio::time::timeout(t, settled).await.map_err(|_| {
                warn!("timeout waiting for listener to observe abort");
                Error::SystemError
            })?,
            None => settled.await,
        };

        r.map(|_| ()).map_err(|_| Error::SystemError)
    }

    /// Wait for the session to reach the provided state
    pub async fn wait_for_state(&self, state: ListenerState) {
        let mut rx = self.inner.phase.subscribe();
        let _ = rx.wait_for(|p| p.state == state).await;
    }
}

impl<N: Connector, D: SecureDisplay> Inner<N, D> {
    fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    fn control(&self) -> std::sync::MutexGuard<'_, Option<mpsc::UnboundedSender<Control>>> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the listener to the `next` state, notifying watchers
    fn transition(&self, next: ListenerState) {
        self.phase.send_modify(|p| {
            if !p.state.can_transition_to(next) {
                warn!("unexpected listener transition {} -> {}", p.state, next);
            }

            debug!("listener state {} -> {}", p.state, next);
            p.state = next;

            // Published before watchers are notified, no subscribers is not an error
            let _ = self.transitions.send(next);
        });
    }
}
