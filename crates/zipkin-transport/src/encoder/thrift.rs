use super::v1::{V1Annotation, V1BinaryAnnotation, V1Span, V1Value};
use super::{validate, Encoder, Payload};
use crate::error::EncodeError;
use crate::span::{Endpoint, Span};
use thrift::protocol::{
    TBinaryOutputProtocol, TFieldIdentifier, TListIdentifier, TOutputProtocol, TStructIdentifier,
    TType,
};

// zipkinCore.AnnotationType
const ANNOTATION_TYPE_BOOL: i32 = 0;
const ANNOTATION_TYPE_STRING: i32 = 6;

/// Zipkin v1 Thrift: every span becomes one `TBinaryProtocol` encoded
/// `zipkinCore.Span` struct.
///
/// The result is a [`Payload::Messages`] list; text-only transports are
/// expected to wrap each message themselves.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThriftEncoder;

impl ThriftEncoder {
    /// Encodes a single span.
    pub fn encode_span(span: &Span) -> Result<Vec<u8>, EncodeError> {
        Self::encode_at(0, span)
    }

    fn encode_at(index: usize, span: &Span) -> Result<Vec<u8>, EncodeError> {
        let v1 = V1Span::from_span(index, span)?;
        let mut buf = Vec::new();
        {
            let mut o = TBinaryOutputProtocol::new(&mut buf, true);
            write_span(&mut o, &v1)?;
            o.flush()?;
        }
        Ok(buf)
    }
}

impl Encoder<Span> for ThriftEncoder {
    fn encode(&self, spans: &[Span]) -> Result<Payload, EncodeError> {
        let mut messages = Vec::with_capacity(spans.len());
        for (index, span) in spans.iter().enumerate() {
            validate(index, span)?;
            messages.push(Self::encode_at(index, span)?);
        }
        Ok(Payload::Messages(messages))
    }

    fn name(&self) -> &str {
        "thrift"
    }
}

/// Length prefix of a string, binary or list value.
pub(crate) fn wire_len(field: &'static str, len: usize) -> Result<i32, EncodeError> {
    i32::try_from(len).map_err(|_| EncodeError::TooLarge { field, len })
}

fn field_begin<O>(o: &mut O, name: &str, ty: TType, id: i16) -> thrift::Result<()>
where
    O: TOutputProtocol,
{
    o.write_field_begin(&TFieldIdentifier::new(name, ty, id))
}

fn write_i64_field<O>(o: &mut O, name: &str, id: i16, value: i64) -> thrift::Result<()>
where
    O: TOutputProtocol,
{
    field_begin(o, name, TType::I64, id)?;
    o.write_i64(value)?;
    o.write_field_end()
}

fn write_i32_field<O>(o: &mut O, name: &str, id: i16, value: i32) -> thrift::Result<()>
where
    O: TOutputProtocol,
{
    field_begin(o, name, TType::I32, id)?;
    o.write_i32(value)?;
    o.write_field_end()
}

fn write_string_field<O: TOutputProtocol>(
    o: &mut O,
    name: &'static str,
    id: i16,
    value: &str,
) -> Result<(), EncodeError> {
    wire_len(name, value.len())?;
    field_begin(o, name, TType::String, id)?;
    o.write_string(value)?;
    o.write_field_end()?;
    Ok(())
}

fn write_binary_field<O: TOutputProtocol>(
    o: &mut O,
    name: &'static str,
    id: i16,
    value: &[u8],
) -> Result<(), EncodeError> {
    wire_len(name, value.len())?;
    field_begin(o, name, TType::String, id)?;
    o.write_bytes(value)?;
    o.write_field_end()?;
    Ok(())
}

fn write_struct_list<O, E>(
    o: &mut O,
    name: &'static str,
    id: i16,
    items: &[E],
    mut write: impl FnMut(&mut O, &E) -> Result<(), EncodeError>,
) -> Result<(), EncodeError>
where
    O: TOutputProtocol,
{
    let size = wire_len(name, items.len())?;
    field_begin(o, name, TType::List, id)?;
    o.write_list_begin(&TListIdentifier::new(TType::Struct, size))?;
    for item in items {
        write(o, item)?;
    }
    o.write_list_end()?;
    o.write_field_end()?;
    Ok(())
}

fn write_endpoint<O: TOutputProtocol>(o: &mut O, endpoint: &Endpoint) -> Result<(), EncodeError> {
    o.write_struct_begin(&TStructIdentifier::new("Endpoint"))?;
    write_i32_field(o, "ipv4", 1, endpoint.ipv4.map_or(0, |ip| u32::from(ip) as i32))?;
    field_begin(o, "port", TType::I16, 2)?;
    o.write_i16(endpoint.port.unwrap_or(0) as i16)?;
    o.write_field_end()?;
    let service_name = endpoint.service_name.as_deref().unwrap_or("");
    write_string_field(o, "service_name", 3, service_name)?;
    if let Some(ipv6) = endpoint.ipv6 {
        write_binary_field(o, "ipv6", 4, &ipv6.octets())?;
    }
    o.write_field_stop()?;
    o.write_struct_end()?;
    Ok(())
}

fn write_host<O: TOutputProtocol>(
    o: &mut O,
    id: i16,
    endpoint: Option<&Endpoint>,
) -> Result<(), EncodeError> {
    if let Some(endpoint) = endpoint {
        field_begin(o, "host", TType::Struct, id)?;
        write_endpoint(o, endpoint)?;
        o.write_field_end()?;
    }
    Ok(())
}

fn write_annotation<O: TOutputProtocol>(
    o: &mut O,
    a: &V1Annotation<'_>,
) -> Result<(), EncodeError> {
    o.write_struct_begin(&TStructIdentifier::new("Annotation"))?;
    write_i64_field(o, "timestamp", 1, a.timestamp as i64)?;
    write_string_field(o, "value", 2, a.value)?;
    write_host(o, 3, a.endpoint)?;
    o.write_field_stop()?;
    o.write_struct_end()?;
    Ok(())
}

fn write_binary_annotation<O: TOutputProtocol>(
    o: &mut O,
    b: &V1BinaryAnnotation<'_>,
) -> Result<(), EncodeError> {
    o.write_struct_begin(&TStructIdentifier::new("BinaryAnnotation"))?;
    write_string_field(o, "key", 1, b.key)?;
    let annotation_type = match b.value {
        V1Value::String(s) => {
            write_binary_field(o, "value", 2, s.as_bytes())?;
            ANNOTATION_TYPE_STRING
        }
        V1Value::Bool(v) => {
            write_binary_field(o, "value", 2, &[u8::from(v)])?;
            ANNOTATION_TYPE_BOOL
        }
    };
    write_i32_field(o, "annotation_type", 3, annotation_type)?;
    write_host(o, 4, b.endpoint)?;
    o.write_field_stop()?;
    o.write_struct_end()?;
    Ok(())
}

fn write_span<O: TOutputProtocol>(o: &mut O, span: &V1Span<'_>) -> Result<(), EncodeError> {
    o.write_struct_begin(&TStructIdentifier::new("Span"))?;
    write_i64_field(o, "trace_id", 1, span.trace_id as i64)?;
    write_string_field(o, "name", 3, span.name)?;
    write_i64_field(o, "id", 4, span.id as i64)?;
    if let Some(parent_id) = span.parent_id {
        write_i64_field(o, "parent_id", 5, parent_id as i64)?;
    }
    write_struct_list(o, "annotations", 6, &span.annotations, write_annotation)?;
    write_struct_list(
        o,
        "binary_annotations",
        8,
        &span.binary_annotations,
        write_binary_annotation,
    )?;
    if span.debug {
        field_begin(o, "debug", TType::Bool, 9)?;
        o.write_bool(true)?;
        o.write_field_end()?;
    }
    if let Some(timestamp) = span.timestamp {
        write_i64_field(o, "timestamp", 10, timestamp as i64)?;
    }
    if let Some(duration) = span.duration {
        write_i64_field(o, "duration", 11, duration as i64)?;
    }
    if let Some(high) = span.trace_id_high {
        write_i64_field(o, "trace_id_high", 12, high as i64)?;
    }
    o.write_field_stop()?;
    o.write_struct_end()?;
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::SpanKind;
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn test_server_span_round_trips_through_reader() {
        let span = Span::new(0x0102, 0x0a0b)
            .with_parent(0x0c)
            .with_name("get")
            .with_kind(SpanKind::Server)
            .with_timing(1_000, 500)
            .with_local_endpoint(
                Endpoint::service("my-service")
                    .with_ipv4(Ipv4Addr::new(192, 168, 1, 2))
                    .with_ipv6(Ipv6Addr::LOCALHOST)
                    .with_port(8080),
            )
            .tag("http.url", "http://example.com")
            .tag("http.response_code", "200");

        let payload = ThriftEncoder.encode(&[span]).unwrap();
        let Payload::Messages(messages) = payload else {
            panic!("thrift encodes one message per span");
        };
        assert_eq!(messages.len(), 1);

        let decoded = decode::span(&messages[0]).unwrap();
        assert_eq!(decoded.trace_id, 0x0102);
        assert_eq!(decoded.trace_id_high, None);
        assert_eq!(decoded.id, 0x0a0b);
        assert_eq!(decoded.parent_id, Some(0x0c));
        assert_eq!(decoded.name, "get");
        assert_eq!(
            decoded.annotations,
            vec![(1_000, "sr".to_owned()), (1_500, "ss".to_owned())]
        );
        assert_eq!(decoded.binary_annotations.len(), 2);
        assert!(decoded
            .binary_annotations
            .iter()
            .all(|(_, _, ty)| *ty == ANNOTATION_TYPE_STRING));
        assert_eq!(decoded.timestamp, Some(1_000));
        assert_eq!(decoded.duration, Some(500));
    }

    #[test]
    fn test_address_annotation_is_bool_typed() {
        let span = Span::new(1, 2)
            .with_kind(SpanKind::Client)
            .with_remote_endpoint(Endpoint::service("db"));
        let bytes = ThriftEncoder::encode_span(&span).unwrap();
        let decoded = decode::span(&bytes).unwrap();
        assert_eq!(
            decoded.binary_annotations,
            vec![("sa".to_owned(), vec![1], ANNOTATION_TYPE_BOOL)]
        );
    }

    #[test]
    fn test_high_trace_id_written() {
        let span = Span::new((7u128 << 64) | 9, 1);
        let decoded = decode::span(&ThriftEncoder::encode_span(&span).unwrap()).unwrap();
        assert_eq!(decoded.trace_id, 9);
        assert_eq!(decoded.trace_id_high, Some(7));
    }

    #[test]
    fn test_messages_follow_batch_order() {
        let spans: Vec<_> = (1..=3).map(|i| Span::new(1, i)).collect();
        let Payload::Messages(messages) = ThriftEncoder.encode(&spans).unwrap() else {
            panic!("expected messages");
        };
        let ids: Vec<_> = messages
            .iter()
            .map(|m| decode::span(m).unwrap().id)
            .collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_unrepresentable_end_fails_the_batch() {
        let mut spans: Vec<_> = (1..=3).map(|i| Span::new(1, i)).collect();
        spans[2] = Span::new(1, 3)
            .with_kind(SpanKind::Client)
            .with_timing(u64::MAX, 1);
        let err = ThriftEncoder.encode(&spans).unwrap_err();
        assert_eq!(
            err,
            EncodeError::InvalidSpan {
                index: 2,
                reason: "timestamp + duration overflows",
            }
        );
    }
}
