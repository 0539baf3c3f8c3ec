//! Property 7: replication round-trip convergence. A `ReplicationChannel`
//! forwarding into a fake transport should, once drained, leave a second
//! registry with the same selected-view state as the source registry for
//! every id the channel carried.

mod support;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use beacon_registry_core::{
    InstanceInfo, Interest, RegistryConfig, RegistryError, ReplicationChannel, Source,
    SourcedRegistry, TransportClient, TransportConnection, WireMessage,
};
use support::NoopMetrics;

/// Forwards every wire message straight into a second, independent
/// registry, mimicking what a real transport's remote end would do after
/// deserializing the message off the wire.
struct LoopbackConnection {
    peer_name: Arc<str>,
    downstream: Arc<SourcedRegistry>,
}

#[async_trait]
impl TransportConnection for LoopbackConnection {
    async fn send(&self, message: WireMessage) -> Result<(), RegistryError> {
        let source = Source::replicated(self.peer_name.clone());
        match message {
            WireMessage::RegisterCopy(info) => {
                self.downstream.register(info, source).ok();
            }
            WireMessage::UpdateCopy(info) => {
                self.downstream.update(info, Vec::new(), source).ok();
            }
            WireMessage::UnregisterCopy(id) => {
                self.downstream
                    .unregister(InstanceInfo::new(id.as_ref(), 0), source)
                    .ok();
            }
            WireMessage::Heartbeat => {}
        }
        Ok(())
    }

    async fn send_heartbeat(&self) -> Result<(), RegistryError> {
        Ok(())
    }

    fn close(&self) {}
}

struct LoopbackClient {
    connection: Arc<LoopbackConnection>,
}

#[async_trait]
impl TransportClient for LoopbackClient {
    async fn connect(&self) -> Result<Arc<dyn TransportConnection>, RegistryError> {
        Ok(self.connection.clone())
    }
}

#[tokio::test]
async fn replication_channel_converges_downstream_registry() {
    let upstream = SourcedRegistry::new(RegistryConfig::default(), Arc::new(NoopMetrics));
    let downstream = SourcedRegistry::new(RegistryConfig::default(), Arc::new(NoopMetrics));

    let peer_name: Arc<str> = Arc::from("downstream-peer");
    let connection = Arc::new(LoopbackConnection {
        peer_name: peer_name.clone(),
        downstream: downstream.clone(),
    });
    let client = Arc::new(LoopbackClient { connection });

    let (_channel, _events) = ReplicationChannel::spawn(
        upstream.clone(),
        client,
        peer_name.clone(),
        &RegistryConfig::default(),
    );

    upstream
        .register(InstanceInfo::new("A", 1), Source::local(peer_name.clone()))
        .unwrap();
    upstream
        .register(InstanceInfo::new("B", 1), Source::local(peer_name.clone()))
        .unwrap();
    upstream
        .update(
            InstanceInfo::new("A", 2).with_attribute("zone", "us-east"),
            Vec::new(),
            Source::local(peer_name.clone()),
        )
        .unwrap();
    upstream
        .unregister(InstanceInfo::new("B", 1), Source::local(peer_name.clone()))
        .unwrap();

    let expected: HashSet<(String, u64)> = upstream
        .for_snapshot(&Interest::Full)
        .into_iter()
        .map(|info| (info.id().to_string(), info.version()))
        .collect();

    let mut attempts = 0;
    loop {
        let downstream_state: HashSet<(String, u64)> = downstream
            .for_snapshot(&Interest::Full)
            .into_iter()
            .map(|info| (info.id().to_string(), info.version()))
            .collect();
        if downstream_state == expected {
            break;
        }
        attempts += 1;
        assert!(attempts < 200, "replication did not converge in time");
        tokio::task::yield_now().await;
    }
}

/// A local registration whose source name differs from the channel's own
/// peer name must still be mirrored out: the channel forwards every
/// LOCAL-origin notification, not just ones named after itself.
#[tokio::test]
async fn replicates_local_source_with_a_different_name_than_the_peer() {
    let upstream = SourcedRegistry::new(RegistryConfig::default(), Arc::new(NoopMetrics));
    let downstream = SourcedRegistry::new(RegistryConfig::default(), Arc::new(NoopMetrics));

    let peer_name: Arc<str> = Arc::from("downstream-peer");
    let connection = Arc::new(LoopbackConnection {
        peer_name: peer_name.clone(),
        downstream: downstream.clone(),
    });
    let client = Arc::new(LoopbackClient { connection });

    let (_channel, _events) = ReplicationChannel::spawn(
        upstream.clone(),
        client,
        peer_name.clone(),
        &RegistryConfig::default(),
    );

    // Registered under an unrelated local client name, not the peer name.
    upstream
        .register(InstanceInfo::new("A", 1), Source::local("some-other-client"))
        .unwrap();

    let mut attempts = 0;
    loop {
        let seen = downstream
            .for_snapshot(&Interest::Full)
            .into_iter()
            .any(|info| info.id() == "A" && info.version() == 1);
        if seen {
            break;
        }
        attempts += 1;
        assert!(attempts < 200, "replication did not converge in time");
        tokio::task::yield_now().await;
    }
}
