//! WebSocket transport
//!
//! Executes [`TransportCommand`]s. Each `Open` spawns one reader task that
//! reports back through the session inbox channel, tagging every event with
//! the generation it was opened for. `Close` aborts the task; the session has
//! already moved on to a newer generation, so nothing more is reported.

use std::collections::HashMap;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::connection::TransportCommand;
use crate::error::TransportError;
use crate::session::{SessionEvent, TransportEvent};

/// Owns the socket tasks, keyed by generation
pub struct Transport {
    events: mpsc::UnboundedSender<SessionEvent>,
    sockets: HashMap<u64, JoinHandle<()>>,
}

impl Transport {
    pub fn new(events: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self {
            events,
            sockets: HashMap::new(),
        }
    }

    pub fn execute(&mut self, command: TransportCommand) {
        self.sockets.retain(|_, task| !task.is_finished());
        match command {
            TransportCommand::Open { generation, url } => {
                let events = self.events.clone();
                let task = tokio::spawn(async move {
                    if let Err(e) = run_socket(generation, &url, &events).await {
                        warn!(generation, error = %e, recovery = ?e.recovery(), "live socket failed");
                    }
                    let _ = events.send(SessionEvent::Transport(TransportEvent::Closed { generation }));
                });
                self.sockets.insert(generation, task);
            }
            TransportCommand::Close { generation } => {
                if let Some(task) = self.sockets.remove(&generation) {
                    task.abort();
                    debug!(generation, "live socket task aborted");
                }
            }
        }
    }

    /// Sockets whose task is still running
    pub fn open_sockets(&self) -> usize {
        self.sockets.values().filter(|t| !t.is_finished()).count()
    }

    pub fn shutdown(&mut self) {
        for (_, task) in self.sockets.drain() {
            task.abort();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn run_socket(
    generation: u64,
    url: &str,
    events: &mpsc::UnboundedSender<SessionEvent>,
) -> Result<(), TransportError> {
    let (mut stream, _) = connect_async(url)
        .await
        .map_err(|e| TransportError::Connect(e.to_string()))?;
    info!(generation, url, "live socket open");

    let send = |event: TransportEvent| events.send(SessionEvent::Transport(event)).is_ok();
    if !send(TransportEvent::Opened { generation }) {
        return Ok(());
    }

    while let Some(frame) = stream.next().await {
        let frame = frame.map_err(|e| TransportError::Closed(e.to_string()))?;
        match frame {
            Message::Text(text) => {
                if !send(TransportEvent::Message { generation, text }) {
                    break;
                }
            }
            Message::Close(reason) => {
                debug!(generation, ?reason, "live source closed the socket");
                break;
            }
            // Inbound only; binary frames are not part of the protocol
            _ => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn next(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> TransportEvent {
        match timeout(Duration::from_secs(5), rx.recv()).await {
            Ok(Some(SessionEvent::Transport(event))) => event,
            other => panic!("expected transport event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn relays_text_frames_then_reports_close() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            ws.send(Message::Text(r#"{"type":"heartbeat","clients":1}"#.to_string()))
                .await
                .unwrap();
            ws.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
            ws.close(None).await.unwrap();
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);
        transport.execute(TransportCommand::Open {
            generation: 4,
            url: format!("ws://{addr}/ws/brain"),
        });

        assert_eq!(next(&mut rx).await, TransportEvent::Opened { generation: 4 });
        assert_eq!(
            next(&mut rx).await,
            TransportEvent::Message {
                generation: 4,
                text: r#"{"type":"heartbeat","clients":1}"#.to_string()
            }
        );
        assert_eq!(next(&mut rx).await, TransportEvent::Closed { generation: 4 });
    }

    #[tokio::test]
    async fn refused_connection_reports_close_only() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);
        transport.execute(TransportCommand::Open {
            generation: 1,
            url: format!("ws://{addr}/"),
        });
        assert_eq!(next(&mut rx).await, TransportEvent::Closed { generation: 1 });
    }

    #[tokio::test]
    async fn close_aborts_the_socket_task() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            // Hold the socket open until the client goes away
            while ws.next().await.is_some() {}
        });

        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut transport = Transport::new(tx);
        transport.execute(TransportCommand::Open {
            generation: 2,
            url: format!("ws://{addr}/"),
        });
        assert_eq!(next(&mut rx).await, TransportEvent::Opened { generation: 2 });
        assert_eq!(transport.open_sockets(), 1);

        transport.execute(TransportCommand::Close { generation: 2 });
        assert_eq!(transport.open_sockets(), 0);
    }
}
