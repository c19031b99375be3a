//! Backend transports.
//!
//! A transport delivers one encoded [`Payload`] to one destination and
//! classifies the outcome. It never panics into the flush path: every failure
//! comes back as an [`ExportError`].

mod http;
mod scribe;
mod tcp_scribe;

pub use http::{HttpConfig, HttpTransport};
pub use scribe::{ScribeClient, ScribeTransport, DEFAULT_CATEGORY};
pub use tcp_scribe::{ReconnectPolicy, ScribeConfig, TcpScribeClient, DEFAULT_SCRIBE_PORT};

use crate::encoder::Payload;
use crate::error::ExportError;
use std::future::Future;
use std::pin::Pin;

/// Trait for sending encoded batches to a backend.
///
/// Uses native async fn in traits instead of `#[async_trait]`. For dynamic
/// dispatch use [`TransportBoxed`].
pub trait Transport: Send + Sync {
    /// Sends one payload.
    fn send(&self, payload: Payload) -> impl Future<Output = Result<(), ExportError>> + Send;

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

/// Object-safe version of [`Transport`] for dynamic dispatch.
pub trait TransportBoxed: Send + Sync {
    /// Sends one payload (boxed future for object safety).
    fn send_boxed(
        &self,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>>;

    /// Returns the transport name for debugging.
    fn name(&self) -> &str;
}

/// Blanket implementation: any Transport can be used as TransportBoxed
impl<T: Transport> TransportBoxed for T {
    fn send_boxed(
        &self,
        payload: Payload,
    ) -> Pin<Box<dyn Future<Output = Result<(), ExportError>> + Send + '_>> {
        Box::pin(self.send(payload))
    }

    fn name(&self) -> &str {
        Transport::name(self)
    }
}
