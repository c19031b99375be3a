use super::Transport;
use crate::encoder::Payload;
use crate::error::{ConfigError, ExportError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use std::time::Duration;

/// Configuration for [`HttpTransport`].
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Collector URL, e.g. `http://localhost:9411/api/v2/spans`
    pub endpoint: String,
    /// Extra headers sent with every request; they override `Content-Type`
    pub headers: Vec<(String, String)>,
    /// Request timeout enforced by the HTTP client
    ///
    /// Default: 10s
    pub timeout: Duration,
}

impl HttpConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            headers: Vec::new(),
            timeout: Duration::from_secs(10),
        }
    }

    /// Adds one extra header.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Posts each payload as one request to a Zipkin HTTP collector.
///
/// Any status outside 2xx is a failure even though the request itself went
/// through.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: reqwest::Url,
    headers: HeaderMap,
}

impl HttpTransport {
    pub fn new(config: HttpConfig) -> Result<Self, ConfigError> {
        let endpoint =
            reqwest::Url::parse(&config.endpoint).map_err(|e| ConfigError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                reason: e.to_string(),
            })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(ConfigError::InvalidEndpoint {
                endpoint: config.endpoint,
                reason: "scheme must be http or https".to_owned(),
            });
        }
        if config.timeout.is_zero() {
            return Err(ConfigError::ZeroDuration { field: "timeout" });
        }

        let mut headers = HeaderMap::with_capacity(config.headers.len());
        for (name, value) in &config.headers {
            let invalid = || ConfigError::InvalidHeader { name: name.clone() };
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
            let value = HeaderValue::from_str(value).map_err(|_| invalid())?;
            headers.insert(name, value);
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            headers,
        })
    }

    pub fn endpoint(&self) -> &str {
        self.endpoint.as_str()
    }
}

impl Transport for HttpTransport {
    async fn send(&self, payload: Payload) -> Result<(), ExportError> {
        let (content_type, body) = match payload {
            Payload::Document { content_type, body } => (content_type, body),
            other => {
                return Err(ExportError::UnsupportedPayload {
                    transport: "http",
                    shape: other.shape(),
                })
            }
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, content_type)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExportError::Transport(format!("request to {} timed out", self.endpoint))
                } else {
                    ExportError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::debug!(
                status = status.as_u16(),
                endpoint = %self.endpoint,
                "collector rejected batch"
            );
            return Err(ExportError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_endpoint() {
        let err = HttpTransport::new(HttpConfig::new("not a url")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));

        let err = HttpTransport::new(HttpConfig::new("ftp://collector/spans")).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { .. }));
    }

    #[test]
    fn test_rejects_bad_header() {
        let config =
            HttpConfig::new("http://localhost:9411/api/v2/spans").with_header("bad header", "x");
        let err = HttpTransport::new(config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidHeader { name } if name == "bad header"));
    }

    #[tokio::test]
    async fn test_message_payload_unsupported() {
        let config = HttpConfig::new("http://localhost:9411/api/v2/spans");
        let transport = HttpTransport::new(config).unwrap();
        let err = transport
            .send(Payload::Messages(vec![vec![1, 2, 3]]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::UnsupportedPayload {
                transport: "http",
                shape: "message-list"
            }
        ));
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        // bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let config = HttpConfig::new(format!("http://127.0.0.1:{port}/api/v2/spans"));
        let transport = HttpTransport::new(config).unwrap();
        let err = transport
            .send(Payload::Document {
                content_type: "application/json",
                body: b"[]".to_vec(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Transport(_)));
    }
}
