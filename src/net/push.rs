// Push event stream client
// Maintains the connection to the push transport and forwards decoded events
// to the sync engine

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};

use super::messages::PushEvent;
use crate::constants::{RECONNECT_ATTEMPTS, RECONNECT_DELAY};

/// Push connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Disconnected,
    Connecting,
    Connected,
}

/// Connects to the push transport, reads line-delimited JSON events, and
/// forwards them to the engine. Reconnects with a bounded retry cycle: at
/// most `RECONNECT_ATTEMPTS` attempts, `RECONNECT_DELAY` seconds apart. A
/// transport drop after a successful connection starts a fresh cycle.
pub struct PushClient {
    addr: String,
    events_tx: mpsc::Sender<PushEvent>,
    state: Arc<RwLock<ConnState>>,
}

impl PushClient {
    pub fn new(
        addr: String,
        events_tx: mpsc::Sender<PushEvent>,
        state: Arc<RwLock<ConnState>>,
    ) -> Self {
        PushClient {
            addr,
            events_tx,
            state,
        }
    }

    /// Run until the retry budget is exhausted without ever connecting, or
    /// the engine side of the event channel goes away.
    pub async fn run(&self) {
        loop {
            let stream = match self.connect_with_retry().await {
                Some(s) => s,
                None => {
                    warn!(addr = %self.addr, attempts = RECONNECT_ATTEMPTS,
                          "push connection retry budget exhausted, giving up");
                    return;
                }
            };

            // Returns on transport drop; falls through to a fresh retry cycle.
            if !self.read_events(stream).await {
                // Engine hung up; no point reconnecting.
                return;
            }
        }
    }

    async fn set_state(&self, state: ConnState) {
        *self.state.write().await = state;
    }

    /// One bounded retry cycle. `None` after the last attempt fails.
    async fn connect_with_retry(&self) -> Option<TcpStream> {
        for attempt in 1..=RECONNECT_ATTEMPTS {
            self.set_state(ConnState::Connecting).await;
            match TcpStream::connect(&self.addr).await {
                Ok(stream) => {
                    self.set_state(ConnState::Connected).await;
                    info!(addr = %self.addr, "push channel connected");
                    return Some(stream);
                }
                Err(e) => {
                    self.set_state(ConnState::Disconnected).await;
                    warn!(addr = %self.addr, attempt, error = %e, "push connect failed");
                    if attempt < RECONNECT_ATTEMPTS {
                        tokio::time::sleep(Duration::from_secs_f64(RECONNECT_DELAY)).await;
                    }
                }
            }
        }
        None
    }

    /// Read loop for one established connection. Returns true when the
    /// transport dropped (caller should reconnect), false when the engine
    /// side of the channel closed.
    async fn read_events(&self, stream: TcpStream) -> bool {
        let mut lines = BufReader::new(stream).lines();

        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if line.is_empty() {
                        continue;
                    }
                    let event: PushEvent = match serde_json::from_str(&line) {
                        Ok(e) => e,
                        Err(e) => {
                            // Malformed or unrecognized event: drop it, keep
                            // the connection.
                            debug!(error = %e, "dropping undecodable push event");
                            continue;
                        }
                    };
                    if self.events_tx.send(event).await.is_err() {
                        self.set_state(ConnState::Disconnected).await;
                        return false;
                    }
                }
                Ok(None) => {
                    info!(addr = %self.addr, "push channel EOF");
                    self.set_state(ConnState::Disconnected).await;
                    return true;
                }
                Err(e) => {
                    warn!(addr = %self.addr, error = %e, "push channel read error");
                    self.set_state(ConnState::Disconnected).await;
                    return true;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    async fn spawn_client(
        addr: String,
    ) -> (mpsc::Receiver<PushEvent>, Arc<RwLock<ConnState>>) {
        let (tx, rx) = mpsc::channel(16);
        let state = Arc::new(RwLock::new(ConnState::Disconnected));
        let client = PushClient::new(addr, tx, state.clone());
        tokio::spawn(async move { client.run().await });
        (rx, state)
    }

    #[tokio::test]
    async fn test_events_forwarded_in_arrival_order() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (mut rx, state) = spawn_client(addr).await;

        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(
            concat!(
                r#"{"type": "new_detection", "id": 1, "disease": "Blight", "severity": "High", "lat": 28.6, "lon": 77.2}"#,
                "\n",
                r#"{"garbage": true}"#,
                "\n",
                r#"{"type": "stress_update", "alerts": []}"#,
                "\n",
            )
            .as_bytes(),
        )
        .await
        .unwrap();

        let first = rx.recv().await.unwrap();
        assert!(matches!(first, PushEvent::NewDetection { .. }));

        // The undecodable line in between is dropped, not fatal.
        let second = rx.recv().await.unwrap();
        assert!(matches!(second, PushEvent::StressUpdate { .. }));

        assert_eq!(*state.read().await, ConnState::Connected);
    }

    #[tokio::test]
    async fn test_transport_drop_reenters_retry() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (mut rx, state) = spawn_client(addr).await;

        // First connection: deliver one event, then drop the transport.
        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(
            concat!(r#"{"type": "stress_update", "alerts": []}"#, "\n").as_bytes(),
        )
        .await
        .unwrap();
        assert!(rx.recv().await.is_some());
        drop(sock);

        // The client comes back on its own within the retry window.
        let (mut sock, _) = listener.accept().await.unwrap();
        sock.write_all(
            concat!(r#"{"type": "stress_update", "alerts": []}"#, "\n").as_bytes(),
        )
        .await
        .unwrap();
        assert!(rx.recv().await.is_some());
        assert_eq!(*state.read().await, ConnState::Connected);
    }

    #[tokio::test]
    async fn test_retry_budget_exhausted() {
        // Nothing listens here; all attempts fail and the client gives up.
        let (tx, _rx) = mpsc::channel(4);
        let state = Arc::new(RwLock::new(ConnState::Connecting));
        let client = PushClient::new("127.0.0.1:1".to_string(), tx, state.clone());

        client.run().await;
        assert_eq!(*state.read().await, ConnState::Disconnected);
    }
}
