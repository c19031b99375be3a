use super::v1::{V1Span, V1Value};
use super::{validate, Encoder, Payload, CONTENT_TYPE_JSON};
use crate::error::EncodeError;
use crate::span::{id_hex, Endpoint, Span};
use serde::Serialize;
use std::collections::BTreeMap;

/// Legacy Zipkin v1 JSON: an array of spans with `annotations` and
/// `binaryAnnotations`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonV1Encoder;

/// Zipkin v2 JSON: an array of spans with `kind` and a `tags` map.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonV2Encoder;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonEndpoint<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    service_name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv4: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipv6: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    port: Option<u16>,
}

impl<'a> From<&'a Endpoint> for JsonEndpoint<'a> {
    fn from(e: &'a Endpoint) -> Self {
        Self {
            service_name: e.service_name.as_deref(),
            ipv4: e.ipv4.map(|ip| ip.to_string()),
            ipv6: e.ipv6.map(|ip| ip.to_string()),
            port: e.port,
        }
    }
}

fn json_endpoint(endpoint: Option<&Endpoint>) -> Option<JsonEndpoint<'_>> {
    endpoint.filter(|e| !e.is_empty()).map(JsonEndpoint::from)
}

// ----- v1 -----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonV1Span<'a> {
    trace_id: String,
    name: &'a str,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u64>,
    annotations: Vec<JsonV1Annotation<'a>>,
    binary_annotations: Vec<JsonV1BinaryAnnotation<'a>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    debug: bool,
}

#[derive(Serialize)]
struct JsonV1Annotation<'a> {
    timestamp: u64,
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<JsonEndpoint<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum JsonV1Value<'a> {
    String(&'a str),
    Bool(bool),
}

#[derive(Serialize)]
struct JsonV1BinaryAnnotation<'a> {
    key: &'a str,
    value: JsonV1Value<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    endpoint: Option<JsonEndpoint<'a>>,
}

impl<'a> From<V1Span<'a>> for JsonV1Span<'a> {
    fn from(span: V1Span<'a>) -> Self {
        let trace_id = match span.trace_id_high {
            Some(high) => format!("{:016x}{:016x}", high, span.trace_id),
            None => id_hex(span.trace_id),
        };
        Self {
            trace_id,
            name: span.name,
            id: id_hex(span.id),
            parent_id: span.parent_id.map(id_hex),
            timestamp: span.timestamp,
            duration: span.duration,
            annotations: span
                .annotations
                .into_iter()
                .map(|a| JsonV1Annotation {
                    timestamp: a.timestamp,
                    value: a.value,
                    endpoint: json_endpoint(a.endpoint),
                })
                .collect(),
            binary_annotations: span
                .binary_annotations
                .into_iter()
                .map(|b| JsonV1BinaryAnnotation {
                    key: b.key,
                    value: match b.value {
                        V1Value::String(s) => JsonV1Value::String(s),
                        V1Value::Bool(v) => JsonV1Value::Bool(v),
                    },
                    endpoint: json_endpoint(b.endpoint),
                })
                .collect(),
            debug: span.debug,
        }
    }
}

impl Encoder<Span> for JsonV1Encoder {
    fn encode(&self, spans: &[Span]) -> Result<Payload, EncodeError> {
        let mut out = Vec::with_capacity(spans.len());
        for (index, span) in spans.iter().enumerate() {
            validate(index, span)?;
            out.push(JsonV1Span::from(V1Span::from_span(index, span)?));
        }
        Ok(Payload::Document {
            content_type: CONTENT_TYPE_JSON,
            body: serde_json::to_vec(&out)?,
        })
    }

    fn name(&self) -> &str {
        "json-v1"
    }
}

// ----- v2 -----

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct JsonV2Span<'a> {
    trace_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    parent_id: Option<String>,
    id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timestamp: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    local_endpoint: Option<JsonEndpoint<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote_endpoint: Option<JsonEndpoint<'a>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    annotations: Vec<JsonV2Annotation<'a>>,
    #[serde(skip_serializing_if = "no_tags")]
    tags: &'a BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    debug: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    shared: bool,
}

fn no_tags(tags: &&BTreeMap<String, String>) -> bool {
    tags.is_empty()
}

#[derive(Serialize)]
struct JsonV2Annotation<'a> {
    timestamp: u64,
    value: &'a str,
}

impl<'a> From<&'a Span> for JsonV2Span<'a> {
    fn from(span: &'a Span) -> Self {
        Self {
            trace_id: span.trace_id_hex(),
            parent_id: span.parent_id.map(id_hex),
            id: id_hex(span.id),
            kind: span.kind.map(|k| k.as_str()),
            name: span.name.as_deref(),
            timestamp: span.timestamp,
            duration: span.duration,
            local_endpoint: json_endpoint(span.local_endpoint.as_ref()),
            remote_endpoint: json_endpoint(span.remote_endpoint.as_ref()),
            annotations: span
                .annotations
                .iter()
                .map(|a| JsonV2Annotation {
                    timestamp: a.timestamp,
                    value: &a.value,
                })
                .collect(),
            tags: &span.tags,
            debug: span.debug,
            shared: span.shared,
        }
    }
}

impl Encoder<Span> for JsonV2Encoder {
    fn encode(&self, spans: &[Span]) -> Result<Payload, EncodeError> {
        let mut out = Vec::with_capacity(spans.len());
        for (index, span) in spans.iter().enumerate() {
            validate(index, span)?;
            out.push(JsonV2Span::from(span));
        }
        Ok(Payload::Document {
            content_type: CONTENT_TYPE_JSON,
            body: serde_json::to_vec(&out)?,
        })
    }

    fn name(&self) -> &str {
        "json-v2"
    }
}
