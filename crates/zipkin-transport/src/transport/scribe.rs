use super::Transport;
use crate::encoder::Payload;
use crate::error::ExportError;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::future::Future;
use tokio::sync::Mutex;

/// Scribe category Zipkin collectors listen on.
pub const DEFAULT_CATEGORY: &str = "zipkin";

/// Minimal surface of a Scribe client.
///
/// `send` only buffers; nothing reaches the server until `flush`.
pub trait ScribeClient: Send {
    /// Makes sure a connection is available, connecting if needed.
    fn open(&mut self) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Buffers one text-safe message for `category`.
    fn send(&mut self, category: &str, message: String);

    /// Delivers every buffered message.
    fn flush(&mut self) -> impl Future<Output = Result<(), ExportError>> + Send;
}

/// Sends each span as a base64 Scribe message.
///
/// The client sits behind an async mutex: connection state is shared by all
/// flush attempts, and overlapping sends run one after the other.
pub struct ScribeTransport<C> {
    client: Mutex<C>,
    category: String,
}

impl<C: ScribeClient> ScribeTransport<C> {
    pub fn new(client: C) -> Self {
        Self::with_category(client, DEFAULT_CATEGORY)
    }

    pub fn with_category(client: C, category: impl Into<String>) -> Self {
        Self {
            client: Mutex::new(client),
            category: category.into(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl<C: ScribeClient> Transport for ScribeTransport<C> {
    async fn send(&self, payload: Payload) -> Result<(), ExportError> {
        let messages = match payload {
            Payload::Messages(messages) => messages,
            Payload::Document { body, .. } => vec![body],
        };

        let mut client = self.client.lock().await;
        client.open().await?;
        for message in &messages {
            client.send(&self.category, BASE64.encode(message));
        }
        // one flush per batch, after every record is buffered
        client.flush().await
    }

    fn name(&self) -> &str {
        "scribe"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Open,
        Send(String, String),
        Flush,
    }

    #[derive(Clone, Default)]
    struct FakeClient {
        calls: Arc<parking_lot::Mutex<Vec<Call>>>,
        fail_open: bool,
        fail_flush: bool,
    }

    impl ScribeClient for FakeClient {
        async fn open(&mut self) -> Result<(), ExportError> {
            self.calls.lock().push(Call::Open);
            if self.fail_open {
                return Err(ExportError::Connect("connection refused".into()));
            }
            Ok(())
        }

        fn send(&mut self, category: &str, message: String) {
            self.calls.lock().push(Call::Send(category.to_owned(), message));
        }

        async fn flush(&mut self) -> Result<(), ExportError> {
            self.calls.lock().push(Call::Flush);
            if self.fail_flush {
                return Err(ExportError::Transport("broken pipe".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_base64_messages_then_single_flush() {
        let client = FakeClient::default();
        let transport = ScribeTransport::new(client.clone());

        transport
            .send(Payload::Messages(vec![b"span-1".to_vec(), b"span-2".to_vec()]))
            .await
            .unwrap();

        assert_eq!(
            *client.calls.lock(),
            vec![
                Call::Open,
                Call::Send("zipkin".into(), BASE64.encode(b"span-1")),
                Call::Send("zipkin".into(), BASE64.encode(b"span-2")),
                Call::Flush,
            ]
        );
    }

    #[tokio::test]
    async fn test_open_failure_sends_nothing() {
        let client = FakeClient {
            fail_open: true,
            ..FakeClient::default()
        };
        let transport = ScribeTransport::new(client.clone());

        let err = transport
            .send(Payload::Messages(vec![b"span".to_vec()]))
            .await
            .unwrap_err();

        assert!(matches!(err, ExportError::Connect(_)));
        assert_eq!(*client.calls.lock(), vec![Call::Open]);
    }

    #[tokio::test]
    async fn test_flush_failure_is_reported() {
        let client = FakeClient {
            fail_flush: true,
            ..FakeClient::default()
        };
        let transport = ScribeTransport::with_category(client, "traces");
        assert_eq!(transport.category(), "traces");

        let err = transport
            .send(Payload::Messages(vec![b"span".to_vec()]))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)));
    }

    #[tokio::test]
    async fn test_document_sent_as_one_message() {
        let client = FakeClient::default();
        let transport = ScribeTransport::new(client.clone());

        transport
            .send(Payload::Document {
                content_type: "application/json",
                body: b"[]".to_vec(),
            })
            .await
            .unwrap();

        let sends = client
            .calls
            .lock()
            .iter()
            .filter(|c| matches!(c, Call::Send(..)))
            .count();
        assert_eq!(sends, 1);
    }
}
