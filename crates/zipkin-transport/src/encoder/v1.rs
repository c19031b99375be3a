//! Conversion of the v2 span model into the legacy v1 shape.
//!
//! Both the v1 JSON format and the Thrift format share this model: timing
//! becomes core annotations, tags become binary annotations and the remote
//! endpoint becomes an address annotation.

use crate::error::EncodeError;
use crate::span::{Endpoint, Span, SpanKind};

/// A v1 span, borrowed from the source [`Span`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1Span<'a> {
    pub trace_id_high: Option<u64>,
    pub trace_id: u64,
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: &'a str,
    pub timestamp: Option<u64>,
    pub duration: Option<u64>,
    pub annotations: Vec<V1Annotation<'a>>,
    pub binary_annotations: Vec<V1BinaryAnnotation<'a>>,
    pub debug: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1Annotation<'a> {
    pub timestamp: u64,
    pub value: &'a str,
    pub endpoint: Option<&'a Endpoint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct V1BinaryAnnotation<'a> {
    pub key: &'a str,
    pub value: V1Value<'a>,
    pub endpoint: Option<&'a Endpoint>,
}

/// Binary annotation values: string tags or address markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum V1Value<'a> {
    String(&'a str),
    Bool(bool),
}

fn core_annotations(kind: SpanKind) -> (&'static str, &'static str, &'static str) {
    // (begin, end, remote address key)
    match kind {
        SpanKind::Client => ("cs", "cr", "sa"),
        SpanKind::Server => ("sr", "ss", "ca"),
        SpanKind::Producer => ("ms", "ws", "ma"),
        SpanKind::Consumer => ("wr", "mr", "ma"),
    }
}

fn non_empty(endpoint: Option<&Endpoint>) -> Option<&Endpoint> {
    endpoint.filter(|e| !e.is_empty())
}

impl<'a> V1Span<'a> {
    /// Converts the span at `index` of a batch.
    ///
    /// Fails when the end annotation's timestamp cannot be represented.
    pub fn from_span(index: usize, span: &'a Span) -> Result<Self, EncodeError> {
        let local = non_empty(span.local_endpoint.as_ref());
        let remote = non_empty(span.remote_endpoint.as_ref());

        let mut annotations = Vec::with_capacity(span.annotations.len() + 2);
        let mut binary_annotations = Vec::with_capacity(span.tags.len() + 1);
        let mut timestamp = span.timestamp;
        let mut duration = span.duration;

        if let Some(kind) = span.kind {
            let (begin, end, address) = core_annotations(kind);
            if let Some(start) = span.timestamp {
                // consumers without a duration only record receipt
                let begin = if kind == SpanKind::Consumer && span.duration.is_none() {
                    end
                } else {
                    begin
                };
                annotations.push(V1Annotation {
                    timestamp: start,
                    value: begin,
                    endpoint: local,
                });
                if let Some(d) = span.duration {
                    let finish = start.checked_add(d).ok_or(EncodeError::InvalidSpan {
                        index,
                        reason: "timestamp + duration overflows",
                    })?;
                    annotations.push(V1Annotation {
                        timestamp: finish,
                        value: end,
                        endpoint: local,
                    });
                }
            }
            if let Some(remote) = remote {
                binary_annotations.push(V1BinaryAnnotation {
                    key: address,
                    value: V1Value::Bool(true),
                    endpoint: Some(remote),
                });
            }
            if kind == SpanKind::Server && span.shared {
                timestamp = None;
                duration = None;
            }
        }

        annotations.extend(span.annotations.iter().map(|a| V1Annotation {
            timestamp: a.timestamp,
            value: &a.value,
            endpoint: local,
        }));

        binary_annotations.extend(span.tags.iter().map(|(k, v)| V1BinaryAnnotation {
            key: k,
            value: V1Value::String(v),
            endpoint: local,
        }));

        // a local span would otherwise lose its service name
        if span.kind.is_none()
            && annotations.is_empty()
            && local.is_some()
            && binary_annotations.is_empty()
        {
            binary_annotations.push(V1BinaryAnnotation {
                key: "lc",
                value: V1Value::String(""),
                endpoint: local,
            });
        }

        Ok(Self {
            trace_id_high: span.trace_id_high(),
            trace_id: span.trace_id_low(),
            id: span.id,
            parent_id: span.parent_id,
            name: span.name.as_deref().unwrap_or(""),
            timestamp,
            duration,
            annotations,
            binary_annotations,
            debug: span.debug,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server_span() -> Span {
        Span::new(1, 2)
            .with_name("get")
            .with_kind(SpanKind::Server)
            .with_timing(1_000, 250)
            .with_local_endpoint(Endpoint::service("frontend"))
            .tag("http.url", "http://example.com")
            .tag("http.response_code", "200")
    }

    #[test]
    fn test_server_kind_becomes_sr_ss() {
        let span = server_span();
        let v1 = V1Span::from_span(0, &span).unwrap();

        let values: Vec<_> = v1.annotations.iter().map(|a| (a.value, a.timestamp)).collect();
        assert_eq!(values, vec![("sr", 1_000), ("ss", 1_250)]);
        assert_eq!(v1.binary_annotations.len(), 2);
        assert_eq!(v1.timestamp, Some(1_000));
        assert_eq!(v1.duration, Some(250));
        assert!(v1
            .annotations
            .iter()
            .all(|a| a.endpoint == span.local_endpoint.as_ref()));
    }

    #[test]
    fn test_remote_endpoint_becomes_address_annotation() {
        let span = Span::new(1, 2)
            .with_kind(SpanKind::Client)
            .with_timing(10, 5)
            .with_remote_endpoint(Endpoint::service("backend").with_port(8080));
        let v1 = V1Span::from_span(0, &span).unwrap();

        assert_eq!(v1.annotations[0].value, "cs");
        assert_eq!(v1.annotations[1].value, "cr");
        assert_eq!(v1.binary_annotations.len(), 1);
        assert_eq!(v1.binary_annotations[0].key, "sa");
        assert_eq!(v1.binary_annotations[0].value, V1Value::Bool(true));
    }

    #[test]
    fn test_shared_server_span_drops_timing() {
        let span = server_span().with_shared(true);
        let v1 = V1Span::from_span(0, &span).unwrap();
        assert_eq!(v1.timestamp, None);
        assert_eq!(v1.duration, None);
        assert_eq!(v1.annotations.len(), 2);
    }

    #[test]
    fn test_consumer_without_duration_records_receipt() {
        let span = Span::new(1, 2).with_kind(SpanKind::Consumer);
        let span = Span {
            timestamp: Some(77),
            ..span
        };
        let v1 = V1Span::from_span(0, &span).unwrap();
        assert_eq!(v1.annotations.len(), 1);
        assert_eq!(v1.annotations[0].value, "mr");
    }

    #[test]
    fn test_local_span_gets_lc_annotation() {
        let span = Span::new(1, 2)
            .with_name("compute")
            .with_local_endpoint(Endpoint::service("worker"));
        let v1 = V1Span::from_span(0, &span).unwrap();
        assert_eq!(v1.binary_annotations.len(), 1);
        assert_eq!(v1.binary_annotations[0].key, "lc");
    }

    #[test]
    fn test_unnamed_span_has_empty_name() {
        let span = Span::new(1, 2);
        assert_eq!(V1Span::from_span(0, &span).unwrap().name, "");
    }

    #[test]
    fn test_end_timestamp_overflow_is_rejected() {
        let span = Span::new(1, 2)
            .with_kind(SpanKind::Client)
            .with_timing(u64::MAX - 1, 5);
        assert_eq!(
            V1Span::from_span(3, &span),
            Err(EncodeError::InvalidSpan {
                index: 3,
                reason: "timestamp + duration overflows",
            })
        );

        // without a kind no end annotation is derived
        let local = Span::new(1, 2).with_timing(u64::MAX - 1, 5);
        assert!(V1Span::from_span(0, &local).is_ok());
    }
}
