use std::collections::BTreeMap;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};

/// A completed Zipkin span.
///
/// Timestamps and durations are epoch microseconds, as on the Zipkin wire.
/// Names and service names are lower-cased on the way in so that every
/// encoder sees the same canonical form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    /// Trace identifier; values above `u64::MAX` are encoded as 128-bit ids
    pub trace_id: u128,
    /// Span identifier (must be non-zero to be encodable)
    pub id: u64,
    /// Parent span identifier (`None` for a root span)
    pub parent_id: Option<u64>,
    /// Operation name
    pub name: Option<String>,
    /// RPC role of the span
    pub kind: Option<SpanKind>,
    /// Start time, epoch microseconds
    pub timestamp: Option<u64>,
    /// Duration in microseconds
    pub duration: Option<u64>,
    /// The service that recorded the span
    pub local_endpoint: Option<Endpoint>,
    /// The peer of an RPC or messaging span
    pub remote_endpoint: Option<Endpoint>,
    /// Timed events, in recording order
    pub annotations: Vec<Annotation>,
    /// String tags, sorted by key for deterministic output
    pub tags: BTreeMap<String, String>,
    /// Force sampling on the collector side
    pub debug: bool,
    /// The server half of a span id shared with its client
    pub shared: bool,
}

/// Span kind according to the Zipkin v2 model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Client-side RPC span
    Client,
    /// Server-side RPC span
    Server,
    /// Producer span (messaging)
    Producer,
    /// Consumer span (messaging)
    Consumer,
}

impl SpanKind {
    /// Upper-case wire name used by the v2 JSON format.
    pub fn as_str(self) -> &'static str {
        match self {
            SpanKind::Client => "CLIENT",
            SpanKind::Server => "SERVER",
            SpanKind::Producer => "PRODUCER",
            SpanKind::Consumer => "CONSUMER",
        }
    }
}

/// Network context of a node in the service graph
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Endpoint {
    pub service_name: Option<String>,
    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub port: Option<u16>,
}

impl Endpoint {
    /// Creates an endpoint that only carries a service name.
    pub fn service(name: impl AsRef<str>) -> Self {
        Self {
            service_name: Some(name.as_ref().to_lowercase()),
            ..Self::default()
        }
    }

    pub fn with_ipv4(mut self, ipv4: Ipv4Addr) -> Self {
        self.ipv4 = Some(ipv4);
        self
    }

    pub fn with_ipv6(mut self, ipv6: Ipv6Addr) -> Self {
        self.ipv6 = Some(ipv6);
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// True when no field is set; such endpoints are omitted from output.
    pub fn is_empty(&self) -> bool {
        self.service_name.is_none()
            && self.ipv4.is_none()
            && self.ipv6.is_none()
            && self.port.is_none()
    }
}

/// A timestamped event on a span
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Epoch microseconds
    pub timestamp: u64,
    pub value: String,
}

impl Span {
    /// Creates a span with the given identity and nothing else recorded.
    pub fn new(trace_id: u128, id: u64) -> Self {
        Self {
            trace_id,
            id,
            parent_id: None,
            name: None,
            kind: None,
            timestamp: None,
            duration: None,
            local_endpoint: None,
            remote_endpoint: None,
            annotations: Vec::new(),
            tags: BTreeMap::new(),
            debug: false,
            shared: false,
        }
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(name.as_ref().to_lowercase());
        self
    }

    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = Some(kind);
        self
    }

    /// Sets start time and duration in one go.
    pub fn with_timing(mut self, timestamp: u64, duration: u64) -> Self {
        self.timestamp = Some(timestamp);
        self.duration = Some(duration);
        self
    }

    pub fn with_local_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.local_endpoint = Some(endpoint);
        self
    }

    pub fn with_remote_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.remote_endpoint = Some(endpoint);
        self
    }

    pub fn with_shared(mut self, shared: bool) -> Self {
        self.shared = shared;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Adds a tag, replacing any previous value for the key
    pub fn tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Records an annotation at the given time
    pub fn annotate(mut self, timestamp: u64, value: impl Into<String>) -> Self {
        self.annotations.push(Annotation {
            timestamp,
            value: value.into(),
        });
        self
    }

    /// 128-bit trace ids carry a non-zero high half.
    pub fn trace_id_high(&self) -> Option<u64> {
        let high = (self.trace_id >> 64) as u64;
        (high != 0).then_some(high)
    }

    /// Lower 64 bits of the trace id.
    pub fn trace_id_low(&self) -> u64 {
        self.trace_id as u64
    }

    /// Lower-hex trace id: 16 characters, or 32 for 128-bit ids.
    pub fn trace_id_hex(&self) -> String {
        match self.trace_id_high() {
            Some(high) => format!("{:016x}{:016x}", high, self.trace_id_low()),
            None => format!("{:016x}", self.trace_id_low()),
        }
    }
}

/// Lower-hex, zero-padded span id.
pub fn id_hex(id: u64) -> String {
    format!("{:016x}", id)
}

/// Current wall clock time in epoch microseconds.
pub fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_hex_widths() {
        let short = Span::new(0xab, 1);
        assert_eq!(short.trace_id_hex(), "00000000000000ab");
        assert_eq!(short.trace_id_high(), None);

        let long = Span::new((1u128 << 64) | 2, 1);
        assert_eq!(long.trace_id_hex(), "00000000000000010000000000000002");
        assert_eq!(long.trace_id_high(), Some(1));
        assert_eq!(long.trace_id_low(), 2);
    }

    #[test]
    fn test_names_are_lowercased() {
        let span = Span::new(1, 1)
            .with_name("GET")
            .with_local_endpoint(Endpoint::service("My-Service"));
        assert_eq!(span.name.as_deref(), Some("get"));
        assert_eq!(
            span.local_endpoint.unwrap().service_name.as_deref(),
            Some("my-service")
        );
    }

    #[test]
    fn test_tags_replace_previous_value() {
        let span = Span::new(1, 1).tag("k", "a").tag("k", "b");
        assert_eq!(span.tags.len(), 1);
        assert_eq!(span.tags["k"], "b");
    }
}
