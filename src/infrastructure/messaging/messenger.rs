use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt, Lines};
use tracing::trace;

use super::error::ProtocolError;
use super::message::{Message, MessageKind};

/// Send/receive primitives for the newline-delimited JSON protocol.
pub struct Messenger;

impl Messenger {
    /// Serialize a message into a single protocol line (including `\n`)
    pub fn encode(message: &Message) -> Result<String, ProtocolError> {
        let mut line = serde_json::to_string(message).map_err(|e| ProtocolError::Malformed {
            reason: e.to_string(),
            job_id: Some(message.job_id().to_string()),
        })?;
        line.push('\n');
        Ok(line)
    }

    /// Parse one protocol line, accepting only the `expected` kinds
    pub fn decode(line: &str, expected: &[MessageKind]) -> Result<Message, ProtocolError> {
        let value: serde_json::Value =
            serde_json::from_str(line).map_err(|e| ProtocolError::Malformed {
                reason: e.to_string(),
                job_id: None,
            })?;

        let job_id = value
            .get("job_id")
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);

        let message: Message =
            serde_json::from_value(value).map_err(|e| ProtocolError::Malformed {
                reason: e.to_string(),
                job_id,
            })?;

        if !expected.contains(&message.kind()) {
            return Err(ProtocolError::Unexpected {
                kind: message.kind(),
                expected: expected.to_vec(),
                job_id: message.job_id().to_string(),
            });
        }

        Ok(message)
    }

    /// Write a message and flush it
    pub async fn send<W>(writer: &mut W, message: &Message) -> Result<(), ProtocolError>
    where
        W: AsyncWrite + Unpin,
    {
        let line = Self::encode(message)?;
        trace!(kind = %message.kind(), job_id = %message.job_id(), "Sending message");
        writer.write_all(line.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Wait for the next message, skipping blank lines
    ///
    /// Cancel safe: a partially read line stays buffered in `lines`.
    pub async fn recv<R>(
        lines: &mut Lines<R>,
        expected: &[MessageKind],
    ) -> Result<Message, ProtocolError>
    where
        R: AsyncBufRead + Unpin,
    {
        loop {
            let Some(line) = lines.next_line().await? else {
                return Err(ProtocolError::ConnectionClosed);
            };
            if line.trim().is_empty() {
                continue;
            }
            return Self::decode(&line, expected);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::messaging::message::TERMINAL_KINDS;
    use std::path::PathBuf;
    use tokio::io::{AsyncBufReadExt, BufReader};

    #[tokio::test]
    async fn test_send_then_recv_over_duplex() {
        let (client, server) = tokio::io::duplex(1024);
        let (_, mut client_writer) = tokio::io::split(client);
        let (server_reader, _) = tokio::io::split(server);
        let mut lines = BufReader::new(server_reader).lines();

        let input = Message::Input {
            job_id: "job-1".to_string(),
            io_data_root: PathBuf::from("/data"),
        };
        Messenger::send(&mut client_writer, &input).await.unwrap();

        let received = Messenger::recv(&mut lines, &[MessageKind::Input]).await.unwrap();
        assert_eq!(received, input);
    }

    #[test]
    fn test_decode_unexpected_kind() {
        let err = Messenger::decode(
            r#"{"message_type": "input", "job_id": "job-1", "io_data_root": "/data"}"#,
            TERMINAL_KINDS,
        )
        .unwrap_err();

        assert!(matches!(err, ProtocolError::Unexpected { kind: MessageKind::Input, .. }));
        assert_eq!(err.job_id(), Some("job-1"));
    }

    #[test]
    fn test_decode_unknown_kind_keeps_job_id() {
        let err = Messenger::decode(
            r#"{"message_type": "progress", "job_id": "job-7"}"#,
            TERMINAL_KINDS,
        )
        .unwrap_err();

        assert!(matches!(err, ProtocolError::Malformed { .. }));
        assert_eq!(err.job_id(), Some("job-7"));
    }

    #[test]
    fn test_decode_garbage() {
        let err = Messenger::decode("not json", TERMINAL_KINDS).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed { job_id: None, .. }));
    }

    #[tokio::test]
    async fn test_recv_reports_closed_connection() {
        let reader = BufReader::new(&b"\n\n"[..]);
        let mut lines = reader.lines();
        let err = Messenger::recv(&mut lines, TERMINAL_KINDS).await.unwrap_err();
        assert!(matches!(err, ProtocolError::ConnectionClosed));
    }
}
