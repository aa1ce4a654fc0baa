#![allow(unused)]

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use async_trait::async_trait;
use log::debug;
use tokio::sync::{
    broadcast,
    mpsc::{self, UnboundedReceiver, UnboundedSender},
    oneshot,
};

use secure_ui_core::{
    channel::{ChannelError, Connector, PeerEvent, SecureChannel, SessionMessage},
    display::{
        Composer, DisplayError, FramebufferAllocator, Layer, Region, SecureDisplayBroker,
        SecureFramebuffer,
    },
    session::{
        ConfirmationRequest, ConfirmationResult, ConfirmationSession, ListenerState,
        ResponseCode, SessionConfig, UiOptions,
    },
};

/// Bound for all test waits
pub const TIMEOUT: Duration = Duration::from_secs(5);

pub type TestBroker = SecureDisplayBroker<TestComposer, TestAllocator>;

pub type TestSession = ConfirmationSession<TestConnector, Arc<TestBroker>>;

pub fn init_logging() {
    let _ = simplelog::SimpleLogger::init(log::LevelFilter::Debug, Default::default());
}

/// Held connection attempt, released by the paired sender
pub type ConnectGate = Arc<Mutex<Option<oneshot::Receiver<()>>>>;

/// Connector handing the remote end of each channel to the test
pub struct TestConnector {
    pub fail: AtomicBool,
    pub hang: AtomicBool,
    gate: ConnectGate,
    peers: UnboundedSender<TestPeer>,
}

impl TestConnector {
    pub fn new() -> (Self, UnboundedReceiver<TestPeer>) {
        let (peers, rx) = mpsc::unbounded_channel();
        let c = Self {
            fail: AtomicBool::new(false),
            hang: AtomicBool::new(false),
            gate: ConnectGate::default(),
            peers,
        };
        (c, rx)
    }

    /// Shared gate, connection attempts wait while a receiver is installed
    pub fn gate(&self) -> ConnectGate {
        self.gate.clone()
    }
}

#[async_trait]
impl Connector for TestConnector {
    type Channel = TestChannel;

    async fn connect(&self) -> Result<Self::Channel, ChannelError> {
        if self.hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }

        let gate = self.gate.lock().unwrap().take();
        if let Some(g) = gate {
            let _ = g.await;
        }

        if self.fail.load(Ordering::SeqCst) {
            return Err(ChannelError::Connect("test connector failure".to_string()));
        }

        let (msg_tx, msg_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        let _ = self.peers.send(TestPeer {
            rx: msg_rx,
            tx: evt_tx,
            closed: closed.clone(),
        });

        Ok(TestChannel {
            tx: msg_tx,
            rx: evt_rx,
            closed,
        })
    }
}

/// Session side of a test channel
pub struct TestChannel {
    tx: UnboundedSender<SessionMessage>,
    rx: UnboundedReceiver<PeerEvent>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl SecureChannel for TestChannel {
    async fn send(&mut self, msg: SessionMessage) -> Result<(), ChannelError> {
        debug!("session -> peer: {msg:?}");
        self.tx.send(msg).map_err(|_| ChannelError::Closed)
    }

    async fn recv(&mut self) -> Result<PeerEvent, ChannelError> {
        self.rx.recv().await.ok_or(ChannelError::Closed)
    }

    async fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Secure environment side of a test channel
pub struct TestPeer {
    rx: UnboundedReceiver<SessionMessage>,
    tx: UnboundedSender<PeerEvent>,
    closed: Arc<AtomicBool>,
}

impl TestPeer {
    /// Await the next message from the session
    pub async fn next(&mut self) -> Option<SessionMessage> {
        tokio::time::timeout(TIMEOUT, self.rx.recv())
            .await
            .expect("timeout waiting for session message")
    }

    pub fn send(&self, evt: PeerEvent) {
        debug!("peer -> session: {evt:?}");
        self.tx.send(evt).expect("session channel dropped");
    }

    /// Reject further messages from the session
    pub fn close_inbound(&mut self) {
        self.rx.close();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
pub struct TestComposer {
    pub secure: AtomicBool,
    pub toggles: AtomicUsize,
    pub frames: AtomicUsize,
    pub fail_submit: AtomicBool,
}

impl Composer for TestComposer {
    fn set_secure_mode(&self, enable: bool, _region: &Region) -> Result<(), DisplayError> {
        self.secure.store(enable, Ordering::SeqCst);
        self.toggles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn submit_frame(&self, _layer: &Layer, _buffer: &SecureFramebuffer) -> Result<(), DisplayError> {
        if self.fail_submit.load(Ordering::SeqCst) {
            return Err(DisplayError::Composer("test submit failure".to_string()));
        }

        self.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct TestAllocator {
    pub fail: AtomicBool,

    /// Framebuffers allocated and not yet released
    pub live: AtomicUsize,
}

impl FramebufferAllocator for TestAllocator {
    fn allocate(&self, len: u64) -> Result<SecureFramebuffer, DisplayError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DisplayError::NoMemory);
        }

        self.live.fetch_add(1, Ordering::SeqCst);
        Ok(SecureFramebuffer { handle: 0x1000, len })
    }

    fn release(&self, buffer: SecureFramebuffer) {
        assert_eq!(buffer.handle, 0x1000);
        self.live.fetch_sub(1, Ordering::SeqCst);
    }
}

pub fn broker() -> Arc<TestBroker> {
    Arc::new(SecureDisplayBroker::new(
        TestComposer::default(),
        TestAllocator::default(),
    ))
}

/// Session under test along with its peer and result receivers
pub struct Harness {
    pub session: TestSession,
    pub peers: UnboundedReceiver<TestPeer>,
    pub broker: Arc<TestBroker>,
    gate: ConnectGate,
    transitions: broadcast::Receiver<ListenerState>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_broker(broker())
    }

    pub fn with_broker(broker: Arc<TestBroker>) -> Self {
        Self::with_config(broker, SessionConfig::default())
    }

    pub fn with_config(broker: Arc<TestBroker>, config: SessionConfig) -> Self {
        init_logging();

        let (connector, peers) = TestConnector::new();
        let gate = connector.gate();
        let session = ConfirmationSession::new(connector, broker.clone(), config);
        let transitions = session.transitions();

        Self {
            session,
            peers,
            broker,
            gate,
            transitions,
        }
    }

    /// Hold the next connection attempt until the returned sender fires
    pub fn hold_connect(&self) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        *self.gate.lock().unwrap() = Some(rx);
        tx
    }

    /// Drain listener states entered since the last call, checking each
    /// step is a permitted transition
    pub fn transitions(&mut self) -> Vec<ListenerState> {
        let mut states = vec![];
        while let Ok(s) = self.transitions.try_recv() {
            states.push(s);
        }

        let mut prev = ListenerState::None;
        for s in &states {
            assert!(prev.can_transition_to(*s), "invalid transition {prev} -> {s}");
            prev = *s;
        }

        states
    }

    /// Await the channel opened by the session listener
    pub async fn peer(&mut self) -> TestPeer {
        tokio::time::timeout(TIMEOUT, self.peers.recv())
            .await
            .expect("timeout waiting for connection")
            .expect("connector dropped")
    }

    /// Start a prompt and drive it to the interactive phase
    pub async fn start_interactive(&mut self) -> (TestPeer, Results) {
        let results = Results::new();
        self.session
            .start(request(), results.callback())
            .expect("start failed");

        let mut peer = self.peer().await;
        match peer.next().await {
            Some(SessionMessage::Prompt(r)) => assert_eq!(r, request()),
            m => panic!("unexpected message: {m:?}"),
        }
        peer.send(PeerEvent::PromptAck(ResponseCode::Ok));

        self.wait_for_state(ListenerState::Interactive).await;

        (peer, results)
    }

    pub async fn wait_for_state(&self, state: ListenerState) {
        tokio::time::timeout(TIMEOUT, self.session.wait_for_state(state))
            .await
            .expect("timeout waiting for listener state");
    }
}

/// Captures results delivered to session callbacks
#[derive(Clone)]
pub struct Results {
    tx: UnboundedSender<ConfirmationResult>,
    rx: Arc<tokio::sync::Mutex<UnboundedReceiver<ConfirmationResult>>>,
    count: Arc<AtomicUsize>,
}

impl Results {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Arc::new(tokio::sync::Mutex::new(rx)),
            count: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn callback(&self) -> impl FnOnce(ConfirmationResult) + Send + 'static {
        let tx = self.tx.clone();
        let count = self.count.clone();

        move |r| {
            count.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(r);
        }
    }

    /// Await the next delivered result
    pub async fn next(&self) -> ConfirmationResult {
        let mut rx = self.rx.lock().await;
        tokio::time::timeout(TIMEOUT, rx.recv())
            .await
            .expect("timeout waiting for result")
            .expect("result channel closed")
    }

    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

pub fn request() -> ConfirmationRequest {
    ConfirmationRequest::new(
        "Transfer 10 units to Bob?",
        [0x01, 0x02, 0x03, 0x04],
        "en-US",
        UiOptions::ACCESSIBILITY_MAGNIFIED,
    )
}
