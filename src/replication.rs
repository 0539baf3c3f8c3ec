//! Replication channel (spec §4.5): mirrors the local LOCAL-origin view to
//! a single remote peer, with heartbeats and lifecycle reporting.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::{self, Duration};
use tracing::{debug, error, instrument, warn};

use crate::arc_swap::ArcSwapOption;
use crate::config::RegistryConfig;
use crate::error::RegistryError;
use crate::instance::InstanceInfo;
use crate::interest::Interest;
use crate::notification::ChangeNotification;
use crate::registry::SourcedRegistry;
use crate::source::{Source, SourceFilter, SourceOrigin};

/// Opaque wire payload the core constructs and routes; the transport layer
/// owns the actual on-wire schema (spec §6).
#[derive(Clone, Debug, PartialEq)]
pub enum WireMessage {
    RegisterCopy(InstanceInfo),
    UpdateCopy(InstanceInfo),
    UnregisterCopy(Arc<str>),
    Heartbeat,
}

/// A single established connection to the peer. One `TransportConnection`
/// is used for the entire channel lifetime (spec §4.5).
#[async_trait]
pub trait TransportConnection: Send + Sync + 'static {
    async fn send(&self, message: WireMessage) -> Result<(), RegistryError>;
    async fn send_heartbeat(&self) -> Result<(), RegistryError>;
    fn close(&self);
}

/// Produces exactly one [`TransportConnection`] per call, mirroring the
/// spec's "lazy sequence yielding exactly one connection then completing."
#[async_trait]
pub trait TransportClient: Send + Sync + 'static {
    async fn connect(&self) -> Result<Arc<dyn TransportConnection>, RegistryError>;
}

/// Reason the channel transitioned to `Closed`.
#[derive(Clone, Debug, PartialEq)]
pub enum CloseReason {
    Explicit,
    TransportFailure(String),
    HeartbeatFailure(String),
}

/// Lifecycle events the channel reports externally (spec §6 "lifecycle
/// stream").
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelEvent {
    Connected,
    Closed(CloseReason),
}

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ChannelState {
    Idle = 0,
    Connected = 1,
    Closed = 2,
}

impl ChannelState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => ChannelState::Idle,
            1 => ChannelState::Connected,
            _ => ChannelState::Closed,
        }
    }
}

/// Outbound, client-side replication channel. `Idle → Connected → Closed`,
/// `Closed` terminal. Exactly one connection is established and memoized
/// for the channel's lifetime via a write-once cell (spec §9 "replay-once
/// single-value broadcast").
pub struct ReplicationChannel {
    client: Arc<dyn TransportClient>,
    connection: ArcSwapOption<dyn TransportConnection>,
    state: AtomicU8,
    events: mpsc::Sender<ChannelEvent>,
    peer_name: Arc<str>,
    send_timeout: Duration,
}

impl ReplicationChannel {
    /// Spawns the channel's subscribe/forward loop and heartbeat
    /// scheduler against `registry`, returning the channel handle and its
    /// lifecycle event stream.
    pub fn spawn(
        registry: Arc<SourcedRegistry>,
        client: Arc<dyn TransportClient>,
        peer_name: impl Into<Arc<str>>,
        config: &RegistryConfig,
    ) -> (Arc<Self>, mpsc::Receiver<ChannelEvent>) {
        let (events_tx, events_rx) = mpsc::channel(16);
        let channel = Arc::new(Self {
            client,
            connection: ArcSwapOption::from(None),
            state: AtomicU8::new(ChannelState::Idle as u8),
            events: events_tx,
            peer_name: peer_name.into(),
            send_timeout: config.replication_send_timeout(),
        });

        let heartbeat_interval = config.heartbeat_interval();
        let forward_handle = channel.clone();
        tokio::spawn(async move { forward_handle.run_forwarding(registry).await });

        let heartbeat_handle = channel.clone();
        tokio::spawn(async move { heartbeat_handle.run_heartbeat(heartbeat_interval).await });

        (channel, events_rx)
    }

    fn state(&self) -> ChannelState {
        ChannelState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn is_closed(&self) -> bool {
        self.state() == ChannelState::Closed
    }

    async fn connection(&self) -> Result<Arc<dyn TransportConnection>, RegistryError> {
        if let Some(existing) = self.connection.load_full() {
            return Ok(existing);
        }
        let established = self.client.connect().await?;
        self.connection.store(Some(established.clone()));
        if self
            .state
            .compare_exchange(
                ChannelState::Idle as u8,
                ChannelState::Connected as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
        {
            let _ = self.events.send(ChannelEvent::Connected).await;
        }
        Ok(established)
    }

    #[instrument(skip(self), fields(peer = %self.peer_name))]
    async fn close(&self, reason: CloseReason) {
        if self
            .state
            .swap(ChannelState::Closed as u8, Ordering::AcqRel)
            == ChannelState::Closed as u8
        {
            return;
        }
        if let Some(connection) = self.connection.load_full() {
            connection.close();
        }
        warn!(?reason, "replication channel closed");
        let _ = self.events.send(ChannelEvent::Closed(reason)).await;
    }

    async fn run_forwarding(self: Arc<Self>, registry: Arc<SourcedRegistry>) {
        // Every LOCAL-origin notification is mirrored out, regardless of
        // which local source produced it (spec §4.5) — not just the one
        // named after this channel's peer.
        let mut subscription = match registry.for_interest(
            Interest::Full,
            Some(SourceFilter::Origin(SourceOrigin::Local)),
        ) {
            Ok(subscription) => subscription,
            Err(error) => {
                self.close(CloseReason::TransportFailure(error.to_string())).await;
                return;
            }
        };

        loop {
            if self.is_closed() {
                return;
            }
            match subscription.recv().await {
                Some(Ok(ChangeNotification::BufferSentinel)) => continue,
                Some(Ok(notification)) => {
                    let message = match notification {
                        ChangeNotification::Add(info) => WireMessage::RegisterCopy(info),
                        ChangeNotification::Modify(info, _) => WireMessage::UpdateCopy(info),
                        ChangeNotification::Delete(info) => {
                            WireMessage::UnregisterCopy(Arc::from(info.id()))
                        }
                        ChangeNotification::BufferSentinel => unreachable!(),
                    };
                    if let Err(error) = self.forward(message).await {
                        self.close(CloseReason::TransportFailure(error.to_string())).await;
                        return;
                    }
                }
                Some(Err(error)) => {
                    debug!(%error, "replication subscription error, continuing");
                }
                None => {
                    self.close(CloseReason::TransportFailure(
                        "registry subscription ended".into(),
                    ))
                    .await;
                    return;
                }
            }
        }
    }

    /// A send that doesn't resolve within `send_timeout` is treated as a
    /// transport failure, converting a stalled send into a channel close
    /// (spec §5).
    async fn forward(&self, message: WireMessage) -> Result<(), RegistryError> {
        let connection = self.connection().await?;
        match time::timeout(self.send_timeout, connection.send(message)).await {
            Ok(result) => result,
            Err(_elapsed) => Err(RegistryError::TransportFailure {
                source: "replication send timed out".into(),
            }),
        }
    }

    async fn run_heartbeat(self: Arc<Self>, interval: Duration) {
        let mut ticker = time::interval(interval);
        loop {
            ticker.tick().await;
            if self.is_closed() {
                return;
            }
            let connection = match self.connection().await {
                Ok(connection) => connection,
                Err(error) => {
                    self.close(CloseReason::HeartbeatFailure(error.to_string())).await;
                    return;
                }
            };
            if let Err(error) = connection.send_heartbeat().await {
                error!(%error, "heartbeat failed");
                self.close(CloseReason::HeartbeatFailure(error.to_string())).await;
                return;
            }
        }
    }

    /// Explicit close, completing the lifecycle stream normally (spec
    /// §4.5 "Lifecycle completes normally on explicit close").
    pub async fn shutdown(&self) {
        self.close(CloseReason::Explicit).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::NoopMetricsProvider;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    struct FailingConnection {
        sends: AtomicUsize,
        fail_after: usize,
    }

    #[async_trait]
    impl TransportConnection for FailingConnection {
        async fn send(&self, _message: WireMessage) -> Result<(), RegistryError> {
            let count = self.sends.fetch_add(1, Ordering::SeqCst);
            if count >= self.fail_after {
                Err(RegistryError::TransportFailure {
                    source: "simulated send failure".into(),
                })
            } else {
                Ok(())
            }
        }

        async fn send_heartbeat(&self) -> Result<(), RegistryError> {
            Ok(())
        }

        fn close(&self) {}
    }

    struct OneShotClient {
        connection: Mutex<Option<Arc<dyn TransportConnection>>>,
    }

    #[async_trait]
    impl TransportClient for OneShotClient {
        async fn connect(&self) -> Result<Arc<dyn TransportConnection>, RegistryError> {
            Ok(self
                .connection
                .lock()
                .clone()
                .expect("connection configured for test"))
        }
    }

    struct RecordingConnection {
        sent: Mutex<Vec<WireMessage>>,
    }

    #[async_trait]
    impl TransportConnection for RecordingConnection {
        async fn send(&self, message: WireMessage) -> Result<(), RegistryError> {
            self.sent.lock().push(message);
            Ok(())
        }

        async fn send_heartbeat(&self) -> Result<(), RegistryError> {
            Ok(())
        }

        fn close(&self) {}
    }

    #[tokio::test]
    async fn s6_transport_failure_closes_channel() {
        let registry = SourcedRegistry::new(RegistryConfig::default(), Arc::new(NoopMetricsProvider));
        let connection: Arc<dyn TransportConnection> = Arc::new(FailingConnection {
            sends: AtomicUsize::new(0),
            fail_after: 0,
        });
        let client = Arc::new(OneShotClient {
            connection: Mutex::new(Some(connection)),
        });

        let (channel, mut events) =
            ReplicationChannel::spawn(registry.clone(), client, "peer", &RegistryConfig::default());

        registry
            .register(InstanceInfo::new("A", 1), Source::local("peer"))
            .unwrap();

        let mut saw_closed = false;
        while let Some(event) = events.recv().await {
            if let ChannelEvent::Closed(CloseReason::TransportFailure(_)) = event {
                saw_closed = true;
                break;
            }
        }
        assert!(saw_closed);
        assert!(channel.is_closed());
    }

    /// Every LOCAL-origin registration is forwarded, regardless of which
    /// local source name produced it — the channel's own peer name is only
    /// its identity for outbound messages, not a filter on inbound ones.
    #[tokio::test]
    async fn forwards_local_registration_under_a_different_source_name() {
        let registry = SourcedRegistry::new(RegistryConfig::default(), Arc::new(NoopMetricsProvider));
        let connection = Arc::new(RecordingConnection {
            sent: Mutex::new(Vec::new()),
        });
        let client = Arc::new(OneShotClient {
            connection: Mutex::new(Some(connection.clone() as Arc<dyn TransportConnection>)),
        });

        let (_channel, _events) =
            ReplicationChannel::spawn(registry.clone(), client, "peer", &RegistryConfig::default());

        registry
            .register(InstanceInfo::new("A", 1), Source::local("some-other-client"))
            .unwrap();

        let mut attempts = 0;
        loop {
            if connection
                .sent
                .lock()
                .iter()
                .any(|message| matches!(message, WireMessage::RegisterCopy(info) if info.id() == "A"))
            {
                break;
            }
            attempts += 1;
            assert!(attempts < 200, "registration was not forwarded in time");
            tokio::task::yield_now().await;
        }
    }
}
