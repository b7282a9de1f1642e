//! Per-document collaboration session
//!
//! Maintains a long-lived WebSocket connection to the collaboration endpoint
//! for one document. The connection performs a STOMP handshake, subscribes
//! to the document topic, then forwards outbound edits and dispatches inbound
//! ones. Failures are retried on the [`ReconnectMachine`] ladder.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::backoff::{ReconnectMachine, ReconnectPolicy};
use super::edit::EditMessage;
use super::frame::{Command, Frame};
use super::ConnectionStatus;
use crate::error::CollabError;
use crate::ids::{DocumentId, UserId};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Callback receiving every edit delivered on the document topic
pub type MessageHandler = Box<dyn FnMut(EditMessage) + Send>;

/// Subscription id used for the single topic subscription
const SUBSCRIPTION_ID: &str = "sub-0";

/// Settings for one session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// WebSocket URL of the collaboration endpoint
    pub url: String,
    /// Document this session is bound to
    pub document_id: DocumentId,
    /// Acting user, sent as the STOMP login
    pub user_id: UserId,
    /// Backoff ladder and retry bound
    pub policy: ReconnectPolicy,
    /// Limit for transport open and handshake
    pub handshake_timeout: Duration,
}

impl SessionConfig {
    pub fn new(url: impl Into<String>, document_id: DocumentId, user_id: UserId) -> Self {
        Self {
            url: url.into(),
            document_id,
            user_id,
            policy: ReconnectPolicy::default(),
            handshake_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Same settings bound to another document
    pub fn for_document(&self, document_id: DocumentId) -> Self {
        Self {
            document_id,
            ..self.clone()
        }
    }
}

/// Status published by the session task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStatus {
    pub status: ConnectionStatus,
    /// Retries used since the last successful handshake
    pub retry_count: u32,
    /// A retry is scheduled
    pub reconnecting: bool,
}

impl SessionStatus {
    fn from_machine(machine: &ReconnectMachine) -> Self {
        Self {
            status: machine.status(),
            retry_count: machine.retry_count(),
            reconnecting: machine.is_reconnecting(),
        }
    }
}

/// Commands sent to the session task
#[derive(Debug)]
enum SessionCommand {
    /// Publish an already-serialized edit
    Send(String),
    /// Reset the retry counter and reconnect now
    Reconnect,
    /// Tear the session down
    Shutdown,
}

/// Handle to a running session
///
/// Dropping the handle tears the session down without waiting for the
/// transport to settle; call [`Session::disconnect`] to wait for it.
pub struct Session {
    document_id: DocumentId,
    command_tx: mpsc::UnboundedSender<SessionCommand>,
    status_rx: watch::Receiver<SessionStatus>,
    error_rx: watch::Receiver<Option<CollabError>>,
    handler: Arc<Mutex<MessageHandler>>,
    closing: Arc<AtomicBool>,
    task: Option<JoinHandle<()>>,
}

/// Open a session for one document
///
/// Must be called from within a tokio runtime. The handshake runs in the
/// background; watch [`Session::subscribe_status`] for progress.
pub fn connect<F>(config: SessionConfig, on_message: F) -> Session
where
    F: FnMut(EditMessage) + Send + 'static,
{
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let machine = ReconnectMachine::new(config.policy.clone());
    let (status_tx, status_rx) = watch::channel(SessionStatus::from_machine(&machine));
    let (error_tx, error_rx) = watch::channel(None);
    let handler: Arc<Mutex<MessageHandler>> = Arc::new(Mutex::new(Box::new(on_message)));
    let closing = Arc::new(AtomicBool::new(false));

    let document_id = config.document_id.clone();
    let task = SessionTask {
        config,
        machine,
        command_rx,
        status_tx,
        error_tx,
        handler: handler.clone(),
        closing: closing.clone(),
    };

    Session {
        document_id,
        command_tx,
        status_rx,
        error_rx,
        handler,
        closing,
        task: Some(tokio::spawn(task.run())),
    }
}

impl Session {
    pub fn document_id(&self) -> &DocumentId {
        &self.document_id
    }

    /// Current connection status
    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().status
    }

    /// Full status including retry bookkeeping
    pub fn status_detail(&self) -> SessionStatus {
        *self.status_rx.borrow()
    }

    /// Subscribe to status changes
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.status_rx.clone()
    }

    /// Last error reported by the session, cleared on a successful handshake
    pub fn error(&self) -> Option<CollabError> {
        self.error_rx.borrow().clone()
    }

    /// Send a serialized edit to the document's command address
    ///
    /// Silently dropped unless the session is connected; nothing is queued.
    /// Returns whether the edit was handed to the transport.
    pub fn send(&self, body: String) -> bool {
        if self.is_closing() || self.status() != ConnectionStatus::Connected {
            debug!(document_id = %self.document_id, "dropping edit, session not connected");
            return false;
        }
        self.command_tx.send(SessionCommand::Send(body)).is_ok()
    }

    /// Replace the message callback without touching the connection
    pub fn set_handler<F>(&self, on_message: F)
    where
        F: FnMut(EditMessage) + Send + 'static,
    {
        let mut guard = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        *guard = Box::new(on_message);
    }

    /// Reset the retry counter and reconnect immediately
    pub fn reconnect(&self) {
        if self.is_closing() {
            return;
        }
        let _ = self.command_tx.send(SessionCommand::Reconnect);
    }

    /// Tear the session down and wait for the transport to settle
    ///
    /// Idempotent: later calls return immediately.
    pub async fn disconnect(&mut self) {
        self.closing.store(true, Ordering::SeqCst);
        let Some(task) = self.task.take() else {
            return;
        };

        let _ = self.command_tx.send(SessionCommand::Shutdown);
        if let Err(e) = task.await {
            if e.is_panic() {
                warn!(document_id = %self.document_id, "session task panicked: {}", e);
            }
        }
        debug!(document_id = %self.document_id, "session disconnected");
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.task.is_some() {
            self.closing.store(true, Ordering::SeqCst);
            let _ = self.command_tx.send(SessionCommand::Shutdown);
        }
    }
}

/// How a connected period ended without an error
enum Exit {
    Shutdown,
    Reconnect,
}

/// What the backoff wait was interrupted by
enum Wake {
    Retry,
    Manual,
    Shutdown,
}

/// State owned by the background task
struct SessionTask {
    config: SessionConfig,
    machine: ReconnectMachine,
    command_rx: mpsc::UnboundedReceiver<SessionCommand>,
    status_tx: watch::Sender<SessionStatus>,
    error_tx: watch::Sender<Option<CollabError>>,
    handler: Arc<Mutex<MessageHandler>>,
    closing: Arc<AtomicBool>,
}

impl SessionTask {
    /// Main loop with reconnection
    async fn run(mut self) {
        let document_id = self.config.document_id.clone();

        loop {
            self.machine.begin_attempt();
            self.publish();

            let err = match self.connect_and_run().await {
                Ok(Exit::Shutdown) => break,
                Ok(Exit::Reconnect) => {
                    info!(document_id = %document_id, "manual reconnect");
                    self.machine.reset();
                    continue;
                }
                Err(err) => err,
            };

            // Errors from a session already tearing down are discarded
            if self.is_closing() {
                break;
            }

            let delay = self.machine.failed();
            match delay {
                Some(delay) => warn!(
                    document_id = %document_id,
                    attempt = self.machine.retry_count(),
                    delay_ms = delay.as_millis() as u64,
                    "session error, retrying: {}",
                    err
                ),
                None => warn!(
                    document_id = %document_id,
                    "session error, giving up after {} retries: {}",
                    self.config.policy.max_retries,
                    err
                ),
            }
            self.error_tx.send_replace(Some(err));
            self.publish();

            match self.wait_for_retry(delay).await {
                Wake::Retry => {}
                Wake::Manual => {
                    info!(document_id = %document_id, "manual reconnect");
                    self.machine.reset();
                    self.error_tx.send_replace(None);
                }
                Wake::Shutdown => break,
            }
        }

        self.machine.closed();
        self.publish();
    }

    /// Connect, handshake, subscribe, then pump messages until the
    /// connection ends
    async fn connect_and_run(&mut self) -> Result<Exit, CollabError> {
        let (mut write, mut read) = {
            let handshake = tokio::time::timeout(
                self.config.handshake_timeout,
                open_and_handshake(&self.config),
            );
            tokio::pin!(handshake);

            // Commands still have to be served while the handshake is pending
            loop {
                tokio::select! {
                    result = &mut handshake => {
                        break result.map_err(|_| {
                            CollabError::Transport(format!(
                                "timed out connecting to {}",
                                self.config.url
                            ))
                        })??;
                    }
                    cmd = self.command_rx.recv() => match cmd {
                        Some(SessionCommand::Send(_)) => {
                            debug!("dropping edit sent during handshake");
                        }
                        Some(SessionCommand::Reconnect) => return Ok(Exit::Reconnect),
                        Some(SessionCommand::Shutdown) | None => return Ok(Exit::Shutdown),
                    }
                }
            }
        };

        let topic = self.config.document_id.topic_address();
        let subscribe = Frame::subscribe(SUBSCRIPTION_ID, &topic);
        write
            .send(Message::Text(subscribe.encode()))
            .await
            .map_err(transport_error)?;

        self.machine.opened();
        self.error_tx.send_replace(None);
        self.publish();
        info!(document_id = %self.config.document_id, "connected, subscribed to {}", topic);

        let edit_address = self.config.document_id.edit_address();
        loop {
            tokio::select! {
                cmd = self.command_rx.recv() => match cmd {
                    Some(SessionCommand::Send(body)) => {
                        let frame = Frame::send_json(&edit_address, body);
                        write
                            .send(Message::Text(frame.encode()))
                            .await
                            .map_err(transport_error)?;
                    }
                    Some(SessionCommand::Reconnect) => {
                        close_gracefully(&mut write).await;
                        return Ok(Exit::Reconnect);
                    }
                    Some(SessionCommand::Shutdown) | None => {
                        close_gracefully(&mut write).await;
                        return Ok(Exit::Shutdown);
                    }
                },

                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => self.handle_text(&text)?,
                    Some(Ok(Message::Binary(data))) => {
                        let text = String::from_utf8(data).map_err(|_| {
                            CollabError::Protocol("binary frame is not valid UTF-8".into())
                        })?;
                        self.handle_text(&text)?;
                    }
                    Some(Ok(Message::Close(frame))) => {
                        return Err(CollabError::Transport(format!(
                            "connection closed by server ({})",
                            describe_close(frame.as_ref())
                        )));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(transport_error(e)),
                    None => {
                        return Err(CollabError::Transport("connection closed unexpectedly".into()));
                    }
                }
            }
        }
    }

    /// Handle one inbound text frame on a live connection
    fn handle_text(&self, text: &str) -> Result<(), CollabError> {
        let Some(frame) = Frame::decode(text)? else {
            return Ok(());
        };

        match frame.command {
            Command::Message => {
                let topic = self.config.document_id.topic_address();
                if frame.get_header("destination") != Some(topic.as_str()) {
                    debug!("ignoring message for foreign destination");
                    return Ok(());
                }
                match serde_json::from_str::<EditMessage>(&frame.body) {
                    Ok(edit) => self.dispatch(edit),
                    Err(e) => warn!(
                        document_id = %self.config.document_id,
                        "discarding undecodable edit message: {}",
                        e
                    ),
                }
                Ok(())
            }
            Command::Error => Err(CollabError::Protocol(format!(
                "server error: {}",
                frame.get_header("message").unwrap_or(frame.body.as_str())
            ))),
            other => {
                debug!("ignoring {} frame", other);
                Ok(())
            }
        }
    }

    /// Invoke the latest handler unless the session is tearing down
    fn dispatch(&self, edit: EditMessage) {
        if self.is_closing() {
            return;
        }
        let mut handler = self.handler.lock().unwrap_or_else(|e| e.into_inner());
        (handler)(edit);
    }

    /// Wait out the backoff delay, serving commands meanwhile
    async fn wait_for_retry(&mut self, delay: Option<Duration>) -> Wake {
        let sleep = tokio::time::sleep(delay.unwrap_or_default());
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                _ = &mut sleep, if delay.is_some() => return Wake::Retry,
                cmd = self.command_rx.recv() => match cmd {
                    Some(SessionCommand::Send(_)) => {
                        debug!("dropping edit while disconnected");
                    }
                    Some(SessionCommand::Reconnect) => return Wake::Manual,
                    Some(SessionCommand::Shutdown) | None => return Wake::Shutdown,
                }
            }
        }
    }

    fn publish(&self) {
        self.status_tx
            .send_replace(SessionStatus::from_machine(&self.machine));
    }

    fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst)
    }
}

/// Open the transport and complete the STOMP handshake
async fn open_and_handshake(config: &SessionConfig) -> Result<(WsWrite, WsRead), CollabError> {
    debug!("connecting to {}", config.url);
    let (ws_stream, _response) = connect_async(config.url.as_str()).await.map_err(|e| {
        CollabError::Transport(format!("failed to connect to {}: {}", config.url, e))
    })?;
    let (mut write, mut read) = ws_stream.split();

    let connect = Frame::connect(host_of(&config.url), config.user_id.as_str());
    write
        .send(Message::Text(connect.encode()))
        .await
        .map_err(transport_error)?;

    wait_for_connected(&mut read).await?;
    Ok((write, read))
}

/// Wait for the CONNECTED frame
async fn wait_for_connected(read: &mut WsRead) -> Result<(), CollabError> {
    loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => match Frame::decode(&text)? {
                Some(frame) if frame.command == Command::Connected => return Ok(()),
                Some(frame) if frame.command == Command::Error => {
                    return Err(CollabError::Protocol(format!(
                        "handshake rejected: {}",
                        frame.get_header("message").unwrap_or(frame.body.as_str())
                    )));
                }
                Some(frame) => {
                    return Err(CollabError::Protocol(format!(
                        "unexpected {} frame during handshake",
                        frame.command
                    )));
                }
                None => {}
            },
            Some(Ok(Message::Close(frame))) => {
                return Err(CollabError::Transport(format!(
                    "connection closed during handshake ({})",
                    describe_close(frame.as_ref())
                )));
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => return Err(transport_error(e)),
            None => {
                return Err(CollabError::Transport(
                    "connection closed during handshake".into(),
                ));
            }
        }
    }
}

/// Best-effort unsubscribe + DISCONNECT + close
async fn close_gracefully(write: &mut WsWrite) {
    let _ = write
        .send(Message::Text(Frame::unsubscribe(SUBSCRIPTION_ID).encode()))
        .await;
    let _ = write
        .send(Message::Text(Frame::disconnect().encode()))
        .await;
    write.close().await.ok();
}

fn transport_error(e: tokio_tungstenite::tungstenite::Error) -> CollabError {
    CollabError::Transport(e.to_string())
}

fn describe_close(frame: Option<&CloseFrame<'_>>) -> String {
    match frame {
        Some(frame) if frame.reason.is_empty() => format!("code {}", u16::from(frame.code)),
        Some(frame) => format!("code {}: {}", u16::from(frame.code), frame.reason),
        None => "no close frame".to_string(),
    }
}

/// Host part of a ws:// URL, used for the STOMP host header
fn host_of(url: &str) -> &str {
    let rest = url.split_once("://").map(|(_, r)| r).unwrap_or(url);
    let authority = rest.split(['/', '?']).next().unwrap_or(rest);
    let authority = authority.rsplit('@').next().unwrap_or(authority);
    match authority.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => authority,
    }
}
