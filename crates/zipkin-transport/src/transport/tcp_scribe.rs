//! Scribe client over a framed `TBinaryProtocol` TCP connection.
//!
//! Implements the single call Zipkin needs from the Scribe service:
//! `ResultCode Log(1: list<LogEntry> messages)`.

use super::scribe::ScribeClient;
use crate::encoder::wire_len;
use crate::error::{EncodeError, ExportError};
use std::time::Duration;
use thrift::protocol::{
    TBinaryInputProtocol, TBinaryOutputProtocol, TFieldIdentifier, TInputProtocol,
    TListIdentifier, TMessageIdentifier, TMessageType, TOutputProtocol, TStructIdentifier, TType,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

/// Port Zipkin's Scribe receiver listens on.
pub const DEFAULT_SCRIBE_PORT: u16 = 9410;

/// Replies larger than this are treated as a broken stream.
const MAX_REPLY_FRAME: usize = 16 * 1024 * 1024;

/// What to do once an established connection breaks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Reconnect on the next `open`
    #[default]
    Auto,
    /// Fail every later `open` with a connect error
    Never,
}

/// Configuration for [`TcpScribeClient`].
#[derive(Debug, Clone)]
pub struct ScribeConfig {
    pub host: String,
    /// Default: 9410
    pub port: u16,
    /// Default: 5s
    pub connect_timeout: Duration,
    /// Default: [`ReconnectPolicy::Auto`]
    pub reconnect: ReconnectPolicy,
}

impl ScribeConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SCRIBE_PORT,
            connect_timeout: Duration::from_secs(5),
            reconnect: ReconnectPolicy::Auto,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }
}

#[derive(Debug, PartialEq, Eq)]
enum ResultCode {
    Ok,
    TryLater,
}

/// A Scribe client holding one persistent connection.
pub struct TcpScribeClient {
    config: ScribeConfig,
    stream: Option<TcpStream>,
    pending: Vec<(String, String)>,
    seq_id: i32,
    connected_once: bool,
}

impl TcpScribeClient {
    pub fn new(config: ScribeConfig) -> Self {
        Self {
            config,
            stream: None,
            pending: Vec::new(),
            seq_id: 0,
            connected_once: false,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}

impl ScribeClient for TcpScribeClient {
    async fn open(&mut self) -> Result<(), ExportError> {
        if self.stream.is_some() {
            return Ok(());
        }
        if self.connected_once && self.config.reconnect == ReconnectPolicy::Never {
            return Err(ExportError::Connect(format!(
                "connection to {} lost and reconnect is disabled",
                self.addr()
            )));
        }

        let connect = TcpStream::connect((self.config.host.as_str(), self.config.port));
        let stream = tokio::time::timeout(self.config.connect_timeout, connect)
            .await
            .map_err(|_| ExportError::Connect(format!("connect to {} timed out", self.addr())))?
            .map_err(|e| ExportError::Connect(format!("{}: {}", self.addr(), e)))?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(addr = %self.addr(), error = %e, "failed to set TCP_NODELAY");
        }

        tracing::debug!(addr = %self.addr(), "scribe connection established");
        self.stream = Some(stream);
        self.connected_once = true;
        Ok(())
    }

    fn send(&mut self, category: &str, message: String) {
        self.pending.push((category.to_owned(), message));
    }

    async fn flush(&mut self) -> Result<(), ExportError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let entries = std::mem::take(&mut self.pending);
        self.seq_id = self.seq_id.wrapping_add(1);
        let frame = encode_log_call(&entries, self.seq_id)?;

        // taken out so a cancelled or failed exchange leaves no half-used stream
        let Some(mut stream) = self.stream.take() else {
            return Err(ExportError::Connect("scribe client is not open".to_owned()));
        };

        let reply = match exchange(&mut stream, &frame).await {
            Ok(reply) => reply,
            Err(e) => {
                tracing::debug!(addr = %self.addr(), error = %e, "scribe connection broken");
                return Err(ExportError::Transport(format!("{}: {}", self.addr(), e)));
            }
        };

        match parse_log_reply(&reply, self.seq_id) {
            Ok(ResultCode::Ok) => {
                self.stream = Some(stream);
                Ok(())
            }
            Ok(ResultCode::TryLater) => {
                self.stream = Some(stream);
                Err(ExportError::Transport("scribe server asked to try later".to_owned()))
            }
            Err(reason) => Err(ExportError::Transport(reason)),
        }
    }
}

fn encode_log_call(entries: &[(String, String)], seq_id: i32) -> Result<Vec<u8>, EncodeError> {
    let mut body = Vec::new();
    {
        let mut o = TBinaryOutputProtocol::new(&mut body, true);
        o.write_message_begin(&TMessageIdentifier::new("Log", TMessageType::Call, seq_id))?;
        o.write_struct_begin(&TStructIdentifier::new("Log_args"))?;
        o.write_field_begin(&TFieldIdentifier::new("messages", TType::List, 1))?;
        let size = wire_len("log entries", entries.len())?;
        o.write_list_begin(&TListIdentifier::new(TType::Struct, size))?;
        for (category, message) in entries {
            o.write_struct_begin(&TStructIdentifier::new("LogEntry"))?;
            for (name, id, value) in [("category", 1_i16, category), ("message", 2, message)] {
                wire_len(name, value.len())?;
                o.write_field_begin(&TFieldIdentifier::new(name, TType::String, id))?;
                o.write_string(value)?;
                o.write_field_end()?;
            }
            o.write_field_stop()?;
            o.write_struct_end()?;
        }
        o.write_list_end()?;
        o.write_field_end()?;
        o.write_field_stop()?;
        o.write_struct_end()?;
        o.write_message_end()?;
        o.flush()?;
    }

    let len = wire_len("scribe frame", body.len())?;
    let mut frame = Vec::with_capacity(body.len() + 4);
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

async fn exchange(stream: &mut TcpStream, frame: &[u8]) -> std::io::Result<Vec<u8>> {
    stream.write_all(frame).await?;
    stream.flush().await?;

    let len = stream.read_i32().await?;
    let len = usize::try_from(len)
        .ok()
        .filter(|len| *len <= MAX_REPLY_FRAME)
        .ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, format!("bad frame length {len}"))
        })?;
    let mut reply = vec![0u8; len];
    stream.read_exact(&mut reply).await?;
    Ok(reply)
}

fn malformed(e: thrift::Error) -> String {
    format!("malformed scribe reply: {e}")
}

fn parse_log_reply(reply: &[u8], expected_seq: i32) -> Result<ResultCode, String> {
    let mut i = TBinaryInputProtocol::new(reply, true);
    let header = i.read_message_begin().map_err(malformed)?;

    match header.message_type {
        TMessageType::Exception => {
            let e = thrift::Error::read_application_error_from_in_protocol(&mut i)
                .map_err(malformed)?;
            return Err(format!("scribe application exception: {}", e.message));
        }
        TMessageType::Reply if header.name == "Log" && header.sequence_number == expected_seq => {}
        kind => {
            return Err(format!(
                "unexpected scribe reply {:?} ({kind:?}, seq {})",
                header.name, header.sequence_number
            ));
        }
    }

    match read_result_code(&mut i).map_err(malformed)? {
        Some(0) => Ok(ResultCode::Ok),
        Some(1) => Ok(ResultCode::TryLater),
        Some(other) => Err(format!("unknown scribe result code {other}")),
        None => Err("scribe reply carried no result".to_owned()),
    }
}

/// Reads `Log_result`; unknown fields go through the depth-limited `skip`.
fn read_result_code<P: TInputProtocol>(i: &mut P) -> thrift::Result<Option<i32>> {
    let mut code = None;
    i.read_struct_begin()?;
    loop {
        let field = i.read_field_begin()?;
        match (field.field_type, field.id) {
            (TType::Stop, _) => break,
            (TType::I32, Some(0)) => code = Some(i.read_i32()?),
            (ty, _) => i.skip(ty)?,
        }
        i.read_field_end()?;
    }
    i.read_struct_end()?;
    i.read_message_end()?;
    Ok(code)
}
