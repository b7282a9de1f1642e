//! Integration tests for collaboration sessions.
//!
//! These tests run an in-process STOMP-over-WebSocket broker and connect
//! real sessions to it, covering the handshake, edit fan-out, echo
//! suppression, reconnection and document switching.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use inkwell_core::buffer::{DocumentContent, SharedBuffer};
use inkwell_core::sync::{
    CollabConnection, Command, ConnectionStatus, EditMessage, EditProtocol, Frame,
    ReconnectPolicy, SessionConfig, SessionStatus,
};
use inkwell_core::CollabError;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

// ─── Test broker ─────────────────────────────────────────────────────────────

/// What the broker observed from clients
#[derive(Debug, Clone, PartialEq)]
enum BrokerEvent {
    Connected { login: String },
    Subscribed { destination: String },
    Sent { destination: String, body: String },
    Disconnected,
}

struct Broker {
    url: String,
    events: mpsc::UnboundedReceiver<BrokerEvent>,
    publish: broadcast::Sender<(String, String)>,
    /// Close every handshake with an abnormal code while set
    refuse: Arc<AtomicBool>,
}

impl Broker {
    async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (event_tx, events) = mpsc::unbounded_channel();
        let (publish, _) = broadcast::channel(64);
        let refuse = Arc::new(AtomicBool::new(false));

        let fanout = publish.clone();
        let refusing = refuse.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve(
                    stream,
                    event_tx.clone(),
                    fanout.clone(),
                    refusing.load(Ordering::SeqCst),
                ));
            }
        });

        Self {
            url: format!("ws://{}/ws", addr),
            events,
            publish,
            refuse,
        }
    }

    /// Deliver an edit from another collaborator
    fn publish_edit(&self, edit: &EditMessage) {
        let topic = edit.document_id.topic_address();
        let body = serde_json::to_string(edit).unwrap();
        self.publish.send((topic, body)).unwrap();
    }

    async fn next_event(&mut self) -> BrokerEvent {
        timeout(Duration::from_secs(5), self.events.recv())
            .await
            .expect("broker event within timeout")
            .expect("broker still running")
    }
}

async fn serve(
    stream: TcpStream,
    events: mpsc::UnboundedSender<BrokerEvent>,
    fanout: broadcast::Sender<(String, String)>,
    refuse: bool,
) {
    let Ok(ws) = tokio_tungstenite::accept_async(stream).await else {
        return;
    };
    let (mut write, mut read) = ws.split();
    let mut feed = fanout.subscribe();
    let mut topic: Option<String> = None;

    loop {
        tokio::select! {
            msg = read.next() => {
                let text = match msg {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(_)) => continue,
                    _ => break,
                };
                let Some(frame) = Frame::decode(&text).unwrap() else {
                    continue;
                };
                match frame.command {
                    Command::Connect if refuse => {
                        let close = CloseFrame {
                            code: CloseCode::Error,
                            reason: "handshake refused".into(),
                        };
                        let _ = write.send(Message::Close(Some(close))).await;
                        break;
                    }
                    Command::Connect => {
                        let login = frame.get_header("login").unwrap_or_default().to_string();
                        let _ = events.send(BrokerEvent::Connected { login });
                        let connected = Frame::new(Command::Connected).header("version", "1.2");
                        write.send(Message::Text(connected.encode())).await.unwrap();
                    }
                    Command::Subscribe => {
                        let destination = frame.get_header("destination").unwrap().to_string();
                        topic = Some(destination.clone());
                        let _ = events.send(BrokerEvent::Subscribed { destination });
                    }
                    Command::Send => {
                        let destination = frame.get_header("destination").unwrap().to_string();
                        // /app/document/{id}/edit fans out on /topic/document/{id}
                        let fan_topic = destination
                            .replace("/app/document/", "/topic/document/")
                            .trim_end_matches("/edit")
                            .to_string();
                        let _ = events.send(BrokerEvent::Sent {
                            destination,
                            body: frame.body.clone(),
                        });
                        let _ = fanout.send((fan_topic, frame.body));
                    }
                    Command::Disconnect => {
                        let _ = events.send(BrokerEvent::Disconnected);
                    }
                    _ => {}
                }
            }

            Ok((destination, body)) = feed.recv() => {
                if topic.as_deref() != Some(destination.as_str()) {
                    continue;
                }
                let message = Frame::new(Command::Message)
                    .header("destination", destination)
                    .header("subscription", "sub-0")
                    .header("message-id", "1")
                    .body(body);
                if write.send(Message::Text(message.encode())).await.is_err() {
                    break;
                }
            }
        }
    }
}

// ─── Helpers ─────────────────────────────────────────────────────────────────

fn session_config(broker: &Broker, document_id: &str) -> SessionConfig {
    SessionConfig::new(broker.url.clone(), document_id.into(), "alice".into())
        .with_handshake_timeout(Duration::from_secs(5))
}

async fn wait_for_status(
    rx: &mut watch::Receiver<SessionStatus>,
    done: impl FnMut(&SessionStatus) -> bool,
) -> SessionStatus {
    *timeout(Duration::from_secs(5), rx.wait_for(done))
        .await
        .expect("status within timeout")
        .expect("session alive")
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_edits_flow_and_echoes_are_suppressed() {
    let mut broker = Broker::start().await;
    let buffer = SharedBuffer::new(DocumentContent::new("Notes", ""));
    let (applied_tx, mut applied_rx) = mpsc::unbounded_channel();

    let mut protocol = EditProtocol::connect(
        session_config(&broker, "doc-1"),
        buffer.clone(),
        move |edit: &EditMessage| {
            let _ = applied_tx.send(edit.content.clone());
        },
    );
    let mut status = protocol.subscribe_status();
    wait_for_status(&mut status, |s| s.status == ConnectionStatus::Connected).await;

    assert_eq!(
        broker.next_event().await,
        BrokerEvent::Connected {
            login: "alice".into()
        }
    );
    assert_eq!(
        broker.next_event().await,
        BrokerEvent::Subscribed {
            destination: "/topic/document/doc-1".into()
        }
    );

    // Local edit goes to the command address and is echoed back
    buffer.set_content("hello");
    assert!(protocol.send_edit("hello"));
    match broker.next_event().await {
        BrokerEvent::Sent { destination, body } => {
            assert_eq!(destination, "/app/document/doc-1/edit");
            let edit: EditMessage = serde_json::from_str(&body).unwrap();
            assert_eq!(edit.origin_user_id.as_str(), "alice");
            assert_eq!(edit.content, "hello");
        }
        other => panic!("expected Sent, got {other:?}"),
    }

    // A collaborator's edit arrives after the echo on the same connection
    broker.publish_edit(&EditMessage::new("doc-1".into(), "bob".into(), "from bob"));
    let applied = timeout(Duration::from_secs(5), applied_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(applied, "from bob");
    assert_eq!(buffer.content(), "from bob");
    assert!(applied_rx.try_recv().is_err(), "echo must not be applied");

    protocol.disconnect().await;
    assert_eq!(protocol.connection_status(), ConnectionStatus::Disconnected);
    assert_eq!(protocol.error(), None);
    assert_eq!(broker.next_event().await, BrokerEvent::Disconnected);
}

#[tokio::test]
async fn test_abnormal_close_before_handshake_is_an_error() {
    let broker = Broker::start().await;
    broker.refuse.store(true, Ordering::SeqCst);

    let config = session_config(&broker, "doc-1").with_policy(ReconnectPolicy {
        delays: vec![Duration::from_secs(60)],
        max_retries: 5,
    });
    let mut protocol = EditProtocol::connect(config, SharedBuffer::default(), |_: &EditMessage| {});
    let mut status = protocol.subscribe_status();

    let detail = wait_for_status(&mut status, |s| s.status == ConnectionStatus::Error).await;

    assert_ne!(detail.status, ConnectionStatus::Disconnected);
    assert!(detail.reconnecting);
    assert!(protocol.is_reconnecting());
    assert!(matches!(protocol.error(), Some(CollabError::Transport(_))));
    assert!(!protocol.send_edit("dropped"));

    protocol.disconnect().await;
    assert_eq!(protocol.connection_status(), ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_manual_reconnect_after_retries_exhausted() {
    let broker = Broker::start().await;
    broker.refuse.store(true, Ordering::SeqCst);

    let config = session_config(&broker, "doc-1").with_policy(ReconnectPolicy {
        delays: vec![Duration::from_millis(10)],
        max_retries: 2,
    });
    let mut protocol = EditProtocol::connect(config, SharedBuffer::default(), |_: &EditMessage| {});
    let mut status = protocol.subscribe_status();

    let failed = wait_for_status(&mut status, |s| {
        s.status == ConnectionStatus::Error && !s.reconnecting
    })
    .await;
    assert_eq!(failed.retry_count, 2);

    // No further retry is scheduled on its own
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(protocol.connection_status(), ConnectionStatus::Error);
    assert!(!protocol.is_reconnecting());

    broker.refuse.store(false, Ordering::SeqCst);
    protocol.reconnect();

    let connected = wait_for_status(&mut status, |s| s.status == ConnectionStatus::Connected).await;
    assert_eq!(connected.retry_count, 0);
    assert_eq!(protocol.error(), None);

    protocol.disconnect().await;
}

#[tokio::test]
async fn test_switching_documents_tears_down_previous_session() {
    let mut broker = Broker::start().await;
    let buffer = SharedBuffer::default();
    let mut connection = CollabConnection::new(session_config(&broker, "doc-1"), buffer.clone());
    let (applied_tx, mut applied_rx) = mpsc::unbounded_channel();

    let first_tx = applied_tx.clone();
    let protocol = connection
        .open("doc-1".into(), move |edit: &EditMessage| {
            let _ = first_tx.send(("first", edit.content.clone()));
        })
        .await;
    let mut status = protocol.subscribe_status();
    wait_for_status(&mut status, |s| s.status == ConnectionStatus::Connected).await;
    broker.next_event().await;
    broker.next_event().await;

    let second_tx = applied_tx.clone();
    let protocol = connection
        .open("doc-2".into(), move |edit: &EditMessage| {
            let _ = second_tx.send(("second", edit.content.clone()));
        })
        .await;
    assert_eq!(protocol.document_id().as_str(), "doc-2");
    let mut status = protocol.subscribe_status();
    wait_for_status(&mut status, |s| s.status == ConnectionStatus::Connected).await;

    // The old session said goodbye before the new one subscribed
    assert_eq!(broker.next_event().await, BrokerEvent::Disconnected);
    assert!(matches!(broker.next_event().await, BrokerEvent::Connected { .. }));
    assert_eq!(
        broker.next_event().await,
        BrokerEvent::Subscribed {
            destination: "/topic/document/doc-2".into()
        }
    );

    broker.publish_edit(&EditMessage::new("doc-1".into(), "bob".into(), "stale"));
    broker.publish_edit(&EditMessage::new("doc-2".into(), "bob".into(), "fresh"));

    let (callback, content) = timeout(Duration::from_secs(5), applied_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(callback, "second");
    assert_eq!(content, "fresh");
    assert_eq!(buffer.content(), "fresh");

    connection.close().await;
    assert!(connection.current().is_none());
}

#[tokio::test]
async fn test_callback_swap_keeps_connection() {
    let mut broker = Broker::start().await;
    let (applied_tx, mut applied_rx) = mpsc::unbounded_channel();

    let old_tx = applied_tx.clone();
    let mut protocol = EditProtocol::connect(
        session_config(&broker, "doc-1"),
        SharedBuffer::default(),
        move |edit: &EditMessage| {
            let _ = old_tx.send(("old", edit.content.clone()));
        },
    );
    let mut status = protocol.subscribe_status();
    wait_for_status(&mut status, |s| s.status == ConnectionStatus::Connected).await;
    broker.next_event().await;
    broker.next_event().await;

    let new_tx = applied_tx.clone();
    protocol.on_remote_edit(move |edit: &EditMessage| {
        let _ = new_tx.send(("new", edit.content.clone()));
    });
    broker.publish_edit(&EditMessage::new("doc-1".into(), "bob".into(), "after swap"));

    let (callback, content) = timeout(Duration::from_secs(5), applied_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(callback, "new");
    assert_eq!(content, "after swap");
    assert_eq!(protocol.connection_status(), ConnectionStatus::Connected);

    protocol.disconnect().await;
}
