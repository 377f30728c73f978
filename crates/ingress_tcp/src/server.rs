//! TCP line server accepting agent connections.
//!
//! Wire format, grounded on the original implementation's
//! `core/tcp_server.py`: each line is `NODE_NAME|<access-log line>`. A
//! connection's node identity is the most recent `NODE_NAME` prefix it has
//! sent; the registry is updated only when that name changes, matching the
//! original's `if conn.node_name != node_name` guard. Malformed or
//! unparseable lines are dropped silently.

use std::time::Duration;

use application::EngineHandle;
use domain::NodeName;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, instrument, warn};

use crate::parser::parse_line;
use crate::registry::NodeRegistry;

/// Accepts TCP connections on `host:port` and feeds parsed entries into
/// `engine`, updating `registry` as nodes identify themselves and disconnect.
/// Runs until the listener errors or the process is torn down; each
/// connection is handled on its own `tokio::task` and never blocks another.
/// A connection that sends nothing for `idle_timeout_secs` is dropped.
#[instrument(skip(engine, registry))]
pub async fn run(
    host: &str,
    port: u16,
    engine: EngineHandle,
    registry: NodeRegistry,
    idle_timeout_secs: u64,
) -> std::io::Result<()> {
    let listener = TcpListener::bind((host, port)).await?;
    info!(%host, port, "TCP ingress listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        let engine = engine.clone();
        let registry = registry.clone();
        tokio::spawn(async move {
            debug!(%peer, "agent connected");
            handle_connection(stream, engine, registry.clone(), idle_timeout_secs).await;
            debug!(%peer, "agent disconnected");
        });
    }
}

async fn handle_connection(stream: TcpStream, engine: EngineHandle, registry: NodeRegistry, idle_timeout_secs: u64) {
    let mut lines = BufReader::new(stream).lines();
    let mut current_node: Option<NodeName> = None;
    let idle_timeout = Duration::from_secs(idle_timeout_secs);

    loop {
        let line = match timeout(idle_timeout, lines.next_line()).await {
            Ok(Ok(Some(line))) => line,
            Ok(Ok(None)) => break,
            Ok(Err(e)) => {
                warn!(error = %e, "error reading from agent connection");
                break;
            },
            Err(_) => {
                debug!("agent connection idle, dropping");
                break;
            },
        };

        let Some((node_name, log_line)) = split_node_prefix(&line) else {
            continue;
        };

        let Ok(node) = NodeName::new(node_name) else {
            continue;
        };

        if current_node.as_ref() != Some(&node) {
            if let Some(old) = &current_node {
                registry.disconnect(old);
            }
            registry.connect(node.clone());
            current_node = Some(node.clone());
        }

        if let Some(entry) = parse_line(log_line) {
            engine.ingest(entry, node).await;
        }
    }

    if let Some(node) = current_node {
        registry.disconnect(&node);
    }
}

/// Split `NODE_NAME|rest` into its two parts. Lines without `|` are dropped,
/// matching the original's `if '|' in line` gate.
fn split_node_prefix(line: &str) -> Option<(&str, &str)> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    line.split_once('|')
}

#[cfg(test)]
mod tests {
    use super::*;
    use application::ports::{BanSinkPort, LimitDirectoryPort};
    use application::{DetectionConfig, DetectionEngine, EngineActor, NullNotifier, Tracker};
    use async_trait::async_trait;
    use domain::{BanRecord, Email, NewBanRecord, NodeName as DomainNodeName, SourceIp, UserLimitEntry};
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream as ClientStream;

    #[derive(Debug, Default)]
    struct NoLimitDirectory;

    #[async_trait]
    impl LimitDirectoryPort for NoLimitDirectory {
        async fn get(&self, _email: &Email) -> Option<UserLimitEntry> {
            None
        }

        async fn refresh(&self) -> Result<(), application::ApplicationError> {
            Ok(())
        }

        fn needs_reload(&self) -> bool {
            false
        }
    }

    #[derive(Debug, Default)]
    struct NullBanSink;

    #[async_trait]
    impl BanSinkPort for NullBanSink {
        async fn active_ban(
            &self,
            _email: &Email,
            _lookback_s: i64,
        ) -> Result<Option<BanRecord>, application::ApplicationError> {
            Ok(None)
        }

        async fn create(&self, _record: NewBanRecord) -> Result<BanRecord, application::ApplicationError> {
            unreachable!("idle-timeout test never triggers a ban")
        }

        async fn update(
            &self,
            _record_id: i64,
            _ip_count: u32,
            _ips: Vec<SourceIp>,
            _nodes: Vec<DomainNodeName>,
            _violation_duration_s: i64,
        ) -> Result<(), application::ApplicationError> {
            Ok(())
        }

        async fn list(&self, _hours: i64) -> Result<Vec<BanRecord>, application::ApplicationError> {
            Ok(Vec::new())
        }

        async fn clear(&self) -> Result<u64, application::ApplicationError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn idle_connection_is_dropped_after_the_configured_timeout() {
        use std::sync::Arc;

        let directory = Arc::new(NoLimitDirectory);
        let sink = Arc::new(NullBanSink);
        let engine = DetectionEngine::new(DetectionConfig::default(), directory.clone(), sink, Arc::new(NullNotifier));
        let handle = EngineActor::spawn(Tracker::new(2, 300), engine, directory, 16);
        let registry = NodeRegistry::default();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            handle_connection(stream, handle, registry, 1).await;
        });

        let mut client = ClientStream::connect(addr).await.unwrap();
        client.write_all(b"fra-01|hello\n").await.unwrap();

        tokio::time::timeout(std::time::Duration::from_secs(3), server)
            .await
            .expect("server task should finish once it times out the idle client")
            .unwrap();
    }

    #[test]
    fn splits_node_prefix_from_log_line() {
        let (node, rest) = split_node_prefix("fra-01|2026/07/26 10:00:00.000000 from ...").unwrap();
        assert_eq!(node, "fra-01");
        assert!(rest.starts_with("2026/07/26"));
    }

    #[test]
    fn rejects_line_without_separator() {
        assert!(split_node_prefix("no separator here").is_none());
    }

    #[test]
    fn rejects_blank_line() {
        assert!(split_node_prefix("").is_none());
        assert!(split_node_prefix("   ").is_none());
    }
}
