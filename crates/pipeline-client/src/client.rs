//! Execution sync client
//!
//! Drives a [`ConnectionMachine`] over a [`Transport`] and folds inbound
//! execution events into the shared graph store. Exactly one channel is
//! live at a time and at most one reconnect timer is pending.
//!
//! Every channel open bumps a generation counter; work belonging to an
//! older generation (a late open, a reader that outlived its channel) is
//! discarded when it reports back.
//!
//! All methods must be called from within a tokio runtime.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use pipeline_engine::{ExecutionEvent, PipelineDefinition, SharedGraphStore};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ClientConfig;
use crate::protocol::ClientMessage;
use crate::reconnect::{Command, ConnectionMachine, ConnectionState, ConnectionStatus, ReconnectPolicy};
use crate::transport::{TcpTransport, Transport, TransportChannel};

/// Client for the execution engine's event channel
#[derive(Clone)]
pub struct SyncClient {
    inner: Arc<Inner>,
}

struct Inner {
    endpoint: String,
    transport: Arc<dyn Transport>,
    store: SharedGraphStore,
    link: Mutex<Link>,
    status_tx: watch::Sender<ConnectionStatus>,
}

struct Link {
    machine: ConnectionMachine,
    generation: u64,
    outbound: Option<mpsc::UnboundedSender<String>>,
    opener: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl SyncClient {
    pub fn new(
        endpoint: impl Into<String>,
        transport: Arc<dyn Transport>,
        store: SharedGraphStore,
        policy: ReconnectPolicy,
    ) -> Self {
        let machine = ConnectionMachine::new(policy);
        let (status_tx, _) = watch::channel(machine.status());
        Self {
            inner: Arc::new(Inner {
                endpoint: endpoint.into(),
                transport,
                store,
                link: Mutex::new(Link {
                    machine,
                    generation: 0,
                    outbound: None,
                    opener: None,
                    reader: None,
                    timer: None,
                }),
                status_tx,
            }),
        }
    }

    /// Client over TCP using the configured endpoint and reconnect policy
    pub fn from_config(config: &ClientConfig, store: SharedGraphStore) -> Self {
        Self::new(
            config.endpoint.clone(),
            Arc::new(TcpTransport::new(config.request_timeout())),
            store,
            ReconnectPolicy::from(&config.reconnect),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.inner.endpoint
    }

    pub fn store(&self) -> &SharedGraphStore {
        &self.inner.store
    }

    pub fn status(&self) -> ConnectionStatus {
        self.inner.link.lock().machine.status()
    }

    pub fn state(&self) -> ConnectionState {
        self.status().state
    }

    /// Watch connection state changes
    pub fn subscribe(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Open the channel; no-op unless disconnected or in error
    pub fn connect(&self) {
        Inner::connect(&self.inner);
    }

    /// Close the channel and cancel any pending reconnect
    pub fn disconnect(&self) {
        let mut link = self.inner.link.lock();
        let mut commands = link.machine.disconnect();
        // Closing is synchronous here: the channel is dropped in place
        if commands.contains(&Command::Close) {
            Inner::execute(&self.inner, &mut link, std::mem::take(&mut commands));
            commands = link.machine.closed();
        }
        Inner::execute(&self.inner, &mut link, commands);
        log::info!("Disconnected from {}", self.inner.endpoint);
    }

    /// Drop the channel, reset the attempt counter and connect again
    pub fn reconnect(&self) {
        let mut link = self.inner.link.lock();
        let commands = link.machine.reconnect();
        Inner::execute(&self.inner, &mut link, commands);
    }

    /// Send a message if connected
    ///
    /// Returns `false`, after logging a warning, when the channel is not
    /// connected or the message could not be queued.
    pub fn send(&self, message: &ClientMessage) -> bool {
        let link = self.inner.link.lock();
        let outbound = match (&link.outbound, link.machine.state()) {
            (Some(outbound), ConnectionState::Connected) => outbound,
            (_, state) => {
                log::warn!("Not sending '{}': channel is {:?}", message.kind(), state);
                return false;
            }
        };
        let line = match message.encode() {
            Ok(line) => line,
            Err(e) => {
                log::warn!("Failed to encode '{}': {}", message.kind(), e);
                return false;
            }
        };
        if outbound.send(line).is_err() {
            log::warn!("Not sending '{}': channel already closed", message.kind());
            return false;
        }
        true
    }

    pub fn execute_pipeline(&self, pipeline: PipelineDefinition) -> bool {
        self.send(&ClientMessage::ExecutePipeline { pipeline })
    }

    pub fn stop_pipeline(&self, pipeline_id: impl Into<String>) -> bool {
        self.send(&ClientMessage::StopPipeline {
            pipeline_id: pipeline_id.into(),
        })
    }

    pub fn ping(&self) -> bool {
        self.send(&ClientMessage::Ping)
    }
}

impl Inner {
    fn connect(this: &Arc<Self>) {
        let mut link = this.link.lock();
        let commands = link.machine.connect();
        Self::execute(this, &mut link, commands);
    }

    fn execute(this: &Arc<Self>, link: &mut Link, commands: Vec<Command>) {
        for command in commands {
            match command {
                Command::Open => Self::open(this, link),
                Command::Close => {
                    link.generation += 1;
                    link.outbound = None;
                    if let Some(reader) = link.reader.take() {
                        reader.abort();
                    }
                    if let Some(opener) = link.opener.take() {
                        opener.abort();
                    }
                }
                Command::ScheduleReconnect(delay) => {
                    if let Some(timer) = link.timer.take() {
                        timer.abort();
                    }
                    let weak = Arc::downgrade(this);
                    link.timer = Some(tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        if let Some(inner) = weak.upgrade() {
                            Inner::connect(&inner);
                        }
                    }));
                }
                Command::CancelReconnect => {
                    if let Some(timer) = link.timer.take() {
                        timer.abort();
                    }
                }
            }
        }
        this.status_tx.send_replace(link.machine.status());
    }

    fn open(this: &Arc<Self>, link: &mut Link) {
        link.generation += 1;
        let generation = link.generation;
        let weak = Arc::downgrade(this);
        let transport = this.transport.clone();
        let endpoint = this.endpoint.clone();

        log::info!("Connecting to {}", endpoint);
        link.opener = Some(tokio::spawn(async move {
            let result = transport.open(&endpoint).await;
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut link = inner.link.lock();
            if link.generation != generation {
                log::debug!("Discarding stale channel open for {}", endpoint);
                return;
            }
            // Finished; dropping the handle must not abort this task
            link.opener = None;
            let commands = match result {
                Ok(channel) => {
                    log::info!("Connected to {}", endpoint);
                    Self::attach(&inner, &mut link, channel, generation);
                    link.machine.opened()
                }
                Err(e) => {
                    log::warn!("Connection to {} failed: {}", endpoint, e);
                    link.machine.closed()
                }
            };
            Self::execute(&inner, &mut link, commands);
        }));
    }

    fn attach(this: &Arc<Self>, link: &mut Link, channel: TransportChannel, generation: u64) {
        let TransportChannel {
            outbound,
            mut inbound,
        } = channel;
        link.outbound = Some(outbound);

        let weak: Weak<Self> = Arc::downgrade(this);
        let store = this.store.clone();
        link.reader = Some(tokio::spawn(async move {
            while let Some(line) = inbound.recv().await {
                dispatch(&store, &line);
            }

            let Some(inner) = weak.upgrade() else {
                return;
            };
            let mut link = inner.link.lock();
            if link.generation != generation {
                return;
            }
            log::warn!("Execution channel to {} closed", inner.endpoint);
            link.reader = None;
            link.outbound = None;
            let commands = link.machine.closed();
            Self::execute(&inner, &mut link, commands);
        }));
    }
}

/// Decode one inbound line and apply it to the store
///
/// Malformed and unknown messages are logged and dropped.
fn dispatch(store: &SharedGraphStore, line: &str) {
    let event = match ExecutionEvent::decode(line) {
        Ok(event) => event,
        Err(e) => {
            log::warn!("Dropping malformed execution event: {}", e);
            return;
        }
    };
    match &event {
        ExecutionEvent::Unknown { kind } => {
            log::warn!("Dropping execution event with unknown type '{}'", kind);
        }
        ExecutionEvent::Connected => {
            log::debug!("Execution engine acknowledged connection");
        }
        ExecutionEvent::PipelineError { node_id, error } => {
            log::warn!(
                "Pipeline failed at {}: {}",
                node_id.as_deref().unwrap_or("<pipeline>"),
                error
            );
            store.write().apply_execution_event(&event);
        }
        _ => {
            store.write().apply_execution_event(&event);
        }
    }
}
