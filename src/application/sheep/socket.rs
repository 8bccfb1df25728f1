//! Per-sheep message socket.
//!
//! A background task owns the TCP connection to the runner. Dispatch only
//! queues messages, so it never waits for the runner to bind its port.

use backoff::ExponentialBackoffBuilder;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::domain::errors::{ShepherdError, ShepherdResult};
use crate::infrastructure::messaging::message::TERMINAL_KINDS;
use crate::infrastructure::messaging::{Message, Messenger, ProtocolError};

/// Something the socket task observed on behalf of a sheep.
#[derive(Debug)]
pub enum SheepEvent {
    /// The runner answered a job
    Reply(Message),

    /// The runner sent something we could not accept
    ProtocolFailure(ProtocolError),

    /// An Input could not be written to the socket
    SendFailed { job_id: String, reason: String },

    /// The connection dropped with these jobs still unanswered
    Disconnected { unanswered: Vec<String> },
}

/// Event tagged with the sheep it came from.
#[derive(Debug)]
pub struct SheepNotification {
    pub sheep: String,
    pub event: SheepEvent,
}

/// Handle to the socket task of one started sheep.
#[derive(Debug)]
pub struct SheepSocket {
    outgoing: mpsc::UnboundedSender<Message>,
    task: JoinHandle<()>,
}

impl SheepSocket {
    /// Spawn the connection task for the runner listening on `127.0.0.1:port`
    pub fn spawn(
        sheep: String,
        port: u16,
        connect_retry: Duration,
        notifier: mpsc::Sender<SheepNotification>,
    ) -> Self {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_socket(sheep, port, connect_retry, outgoing_rx, notifier));
        Self { outgoing, task }
    }

    /// Queue a message for the runner
    pub fn send(&self, message: Message) -> ShepherdResult<()> {
        self.outgoing
            .send(message)
            .map_err(|_| ShepherdError::Protocol("Sheep socket task has stopped".to_string()))
    }

    /// Stop the connection task
    pub fn shutdown(self) {
        self.task.abort();
    }
}

impl Drop for SheepSocket {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn connect(port: u16, connect_retry: Duration) -> std::io::Result<TcpStream> {
    let policy = ExponentialBackoffBuilder::new()
        .with_initial_interval(connect_retry)
        .with_max_interval(connect_retry.max(Duration::from_secs(1)))
        .with_max_elapsed_time(None)
        .build();

    backoff::future::retry(policy, || async {
        TcpStream::connect(("127.0.0.1", port))
            .await
            .map_err(backoff::Error::transient)
    })
    .await
}

async fn notify(notifier: &mpsc::Sender<SheepNotification>, sheep: &str, event: SheepEvent) -> bool {
    notifier
        .send(SheepNotification {
            sheep: sheep.to_string(),
            event,
        })
        .await
        .is_ok()
}

async fn run_socket(
    sheep: String,
    port: u16,
    connect_retry: Duration,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    notifier: mpsc::Sender<SheepNotification>,
) {
    'reconnect: loop {
        // Nothing to do until the first message is queued.
        let Some(first) = outgoing.recv().await else {
            break;
        };
        let mut pending = Some(first);

        let stream = match connect(port, connect_retry).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(sheep = %sheep, port, error = %e, "Could not connect to runner");
                break;
            }
        };
        info!(sheep = %sheep, port, "Connected to runner");

        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();
        let mut unanswered: Vec<String> = Vec::new();

        loop {
            if let Some(message) = pending.take() {
                let job_id = message.job_id().to_string();
                if let Err(e) = Messenger::send(&mut writer, &message).await {
                    warn!(sheep = %sheep, job_id = %job_id, error = %e, "Failed to send message");
                    let failed = SheepEvent::SendFailed {
                        job_id,
                        reason: e.to_string(),
                    };
                    if !notify(&notifier, &sheep, failed).await {
                        break 'reconnect;
                    }
                    if !unanswered.is_empty() {
                        let event = SheepEvent::Disconnected { unanswered };
                        if !notify(&notifier, &sheep, event).await {
                            break 'reconnect;
                        }
                    }
                    continue 'reconnect;
                }
                debug!(sheep = %sheep, job_id = %job_id, "Input dispatched");
                unanswered.push(job_id);
            }

            tokio::select! {
                message = outgoing.recv() => match message {
                    Some(message) => pending = Some(message),
                    None => break 'reconnect,
                },
                reply = Messenger::recv(&mut lines, TERMINAL_KINDS) => {
                    let event = match reply {
                        Ok(message) => {
                            unanswered.retain(|id| id != message.job_id());
                            SheepEvent::Reply(message)
                        }
                        Err(ProtocolError::ConnectionClosed | ProtocolError::Io(_)) => {
                            info!(sheep = %sheep, unanswered = unanswered.len(), "Runner closed the connection");
                            let event = SheepEvent::Disconnected { unanswered };
                            if !notify(&notifier, &sheep, event).await {
                                break 'reconnect;
                            }
                            continue 'reconnect;
                        }
                        Err(e) => {
                            warn!(sheep = %sheep, error = %e, "Protocol error on runner socket");
                            if let Some(job_id) = e.job_id() {
                                unanswered.retain(|id| id != job_id);
                            }
                            SheepEvent::ProtocolFailure(e)
                        }
                    };
                    if !notify(&notifier, &sheep, event).await {
                        break 'reconnect;
                    }
                }
            }
        }
    }

    debug!(sheep = %sheep, "Socket task finished");
}
