//! Span encoders.
//!
//! An [`Encoder`] is a pure function from an ordered batch to a [`Payload`].
//! The flush path only cares about the payload shape; which format produced
//! it is decided once, at construction.

mod json;
mod thrift;
mod v1;

pub use json::{JsonV1Encoder, JsonV2Encoder};
pub(crate) use self::thrift::wire_len;
pub use self::thrift::ThriftEncoder;
pub use v1::{V1Annotation, V1BinaryAnnotation, V1Span, V1Value};

use crate::error::EncodeError;
use crate::span::Span;

pub const CONTENT_TYPE_JSON: &str = "application/json";

/// The result of encoding one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// A single request body carrying the whole batch
    Document {
        content_type: &'static str,
        body: Vec<u8>,
    },
    /// One binary message per span, in batch order
    Messages(Vec<Vec<u8>>),
}

impl Payload {
    /// Short shape name used in error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            Payload::Document { .. } => "document",
            Payload::Messages(_) => "message-list",
        }
    }

    /// Total encoded size in bytes.
    pub fn byte_len(&self) -> usize {
        match self {
            Payload::Document { body, .. } => body.len(),
            Payload::Messages(messages) => messages.iter().map(Vec::len).sum(),
        }
    }
}

/// Turns a batch of records into a transmittable payload.
///
/// Implementations must not mutate their input and must fail the whole batch
/// rather than skip a record they cannot encode.
pub trait Encoder<T>: Send + Sync {
    fn encode(&self, spans: &[T]) -> Result<Payload, EncodeError>;

    /// Returns the encoder name for debugging.
    fn name(&self) -> &str;
}

impl<T, E: Encoder<T> + ?Sized> Encoder<T> for Box<E> {
    fn encode(&self, spans: &[T]) -> Result<Payload, EncodeError> {
        (**self).encode(spans)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Wire format selection for [`Span`] batches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Encoding {
    /// Legacy array of v1 spans with `annotations`/`binaryAnnotations`
    #[default]
    JsonV1,
    /// v2 spans with `kind` and a `tags` map
    JsonV2,
    /// One `zipkinCore.Span` Thrift struct per span
    Thrift,
}

impl Encoding {
    pub fn encoder(self) -> Box<dyn Encoder<Span>> {
        match self {
            Encoding::JsonV1 => Box::new(JsonV1Encoder),
            Encoding::JsonV2 => Box::new(JsonV2Encoder),
            Encoding::Thrift => Box::new(ThriftEncoder),
        }
    }
}

/// Rejects spans no Zipkin format can represent.
pub(crate) fn validate(index: usize, span: &Span) -> Result<(), EncodeError> {
    if span.trace_id == 0 {
        return Err(EncodeError::InvalidSpan {
            index,
            reason: "trace id is zero",
        });
    }
    if span.id == 0 {
        return Err(EncodeError::InvalidSpan {
            index,
            reason: "span id is zero",
        });
    }
    Ok(())
}
