//! Runner side of the Shepherd protocol.
//!
//! A runner listens on its sheep's port, receives `Input` messages, lets a
//! `JobProcessor` do the work, leaves a `done` or `error` marker in the data
//! root and answers with `Done` or `Error`.

pub mod error;
pub mod json_runner;

pub use error::RunnerError;
pub use json_runner::{JsonRunner, RunnerConfig};

use async_trait::async_trait;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::adapters::storage::FsObjectStore;
use crate::domain::models::{DONE_MARKER, ERROR_MARKER};
use crate::domain::ports::ObjectStore;
use crate::infrastructure::messaging::{Message, MessageKind, Messenger, ProtocolError};

/// Work performed by a runner for one job.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Process the job whose payload lives under `io_data_root/job_id`
    async fn process(&self, job_id: &str, io_data_root: &Path) -> Result<(), RunnerError>;
}

/// TCP front of a runner.
pub struct RunnerServer<P> {
    listener: TcpListener,
    processor: Arc<P>,
}

impl<P: JobProcessor + 'static> RunnerServer<P> {
    /// Bind the message socket
    pub async fn bind(addr: SocketAddr, processor: P) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            processor: Arc::new(processor),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept shepherd connections until the listener fails.
    pub async fn serve(self) -> std::io::Result<()> {
        info!(addr = %self.listener.local_addr()?, "Runner listening");
        loop {
            let (stream, peer) = self.listener.accept().await?;
            debug!(%peer, "Shepherd connected");
            let processor = self.processor.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, processor.as_ref()).await {
                    warn!(%peer, error = %e, "Connection ended with an error");
                }
            });
        }
    }
}

async fn handle_connection<P: JobProcessor + ?Sized>(
    stream: TcpStream,
    processor: &P,
) -> Result<(), ProtocolError> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let message = match Messenger::recv(&mut lines, &[MessageKind::Input]).await {
            Ok(message) => message,
            Err(ProtocolError::ConnectionClosed) => return Ok(()),
            Err(e) => match e.job_id() {
                Some(job_id) => {
                    warn!(job_id, error = %e, "Rejecting message");
                    let reply = Message::Error {
                        job_id: job_id.to_string(),
                        message: e.to_string(),
                    };
                    Messenger::send(&mut writer, &reply).await?;
                    continue;
                }
                None => return Err(e),
            },
        };

        let Message::Input { job_id, io_data_root } = message else {
            continue;
        };
        let reply = run_job(processor, &job_id, &io_data_root).await;
        Messenger::send(&mut writer, &reply).await?;
    }
}

/// Process one job and leave its marker next to the payload.
async fn run_job<P: JobProcessor + ?Sized>(processor: &P, job_id: &str, io_data_root: &Path) -> Message {
    let markers = FsObjectStore::new(io_data_root);
    let outcome = processor.process(job_id, io_data_root).await;

    let (marker, payload, reply) = match outcome {
        Ok(()) => (
            DONE_MARKER,
            Vec::new(),
            Message::Done {
                job_id: job_id.to_string(),
            },
        ),
        Err(e) => {
            warn!(job_id, error = %e, "Job failed");
            let message = e.to_string();
            (
                ERROR_MARKER,
                message.clone().into_bytes(),
                Message::Error {
                    job_id: job_id.to_string(),
                    message,
                },
            )
        }
    };

    if let Err(e) = markers.put_object(job_id, marker, payload).await {
        error!(job_id, marker, error = %e, "Failed to write marker");
        return Message::Error {
            job_id: job_id.to_string(),
            message: format!("Failed to write {marker} marker: {e}"),
        };
    }
    reply
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    struct FailingProcessor;

    #[async_trait]
    impl JobProcessor for FailingProcessor {
        async fn process(&self, _job_id: &str, _io_data_root: &Path) -> Result<(), RunnerError> {
            Err(RunnerError::InvalidInput("no".to_string()))
        }
    }

    #[tokio::test]
    async fn test_failed_job_leaves_error_marker() {
        let dir = TempDir::new().unwrap();
        let reply = run_job(&FailingProcessor, "job-1", dir.path()).await;

        match reply {
            Message::Error { job_id, message } => {
                assert_eq!(job_id, "job-1");
                assert!(message.contains("no"));
            }
            other => panic!("Expected Error reply, got {other:?}"),
        }
        let marker = std::fs::read_to_string(dir.path().join("job-1").join(ERROR_MARKER)).unwrap();
        assert!(marker.contains("Invalid input"));
    }

    #[tokio::test]
    async fn test_server_answers_input() {
        let dir = TempDir::new().unwrap();
        let inputs = dir.path().join("job-2").join("inputs");
        std::fs::create_dir_all(&inputs).unwrap();
        std::fs::write(inputs.join("input.json"), br#"{"key": [4]}"#).unwrap();

        let runner = JsonRunner::new(RunnerConfig::default(), json_runner::PREDICT_STREAM).unwrap();
        let server = RunnerServer::bind("127.0.0.1:0".parse().unwrap(), runner).await.unwrap();
        let addr = server.local_addr().unwrap();
        let handle = tokio::spawn(server.serve());

        let stream = TcpStream::connect(addr).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        let input = Message::Input {
            job_id: "job-2".to_string(),
            io_data_root: PathBuf::from(dir.path()),
        };
        Messenger::send(&mut writer, &input).await.unwrap();
        let reply = Messenger::recv(&mut lines, &[MessageKind::Done]).await.unwrap();

        assert_eq!(reply.job_id(), "job-2");
        assert!(dir.path().join("job-2").join(DONE_MARKER).exists());
        assert!(dir.path().join("job-2").join("outputs").join("output.json").exists());
        handle.abort();
    }
}
