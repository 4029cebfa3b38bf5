//! Outbound transports: one router, a closed set of protocols.

mod http;
mod mail;
mod sftp;
mod tcp;

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, instrument};
use url::Url;

use crate::config::Credential;

pub use mail::{parse_mailto, MailMessage};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("protocol {scheme} is not supported (endpoint {urn})")]
    ProtocolNotSupported { scheme: String, urn: String },

    #[error("invalid endpoint {urn}: {reason}")]
    InvalidEndpoint { urn: String, reason: String },

    #[error("http request rejected with status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("http transport failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("ssh transport failed: {0}")]
    Ssh(#[from] ssh2::Error),

    #[error("smtp transport failed: {0}")]
    Smtp(#[from] lettre::transport::smtp::Error),

    #[error("mail message could not be built: {0}")]
    MailMessage(#[from] lettre::error::Error),

    #[error("invalid mail address: {0}")]
    Address(#[from] lettre::address::AddressError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("transport timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport worker panicked: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// The supported endpoint schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Http,
    Https,
    Sftp,
    Mailto,
    Socket,
}

impl Protocol {
    /// Parse an endpoint URN and classify its scheme. Anything outside
    /// the closed set is rejected before a connection is attempted.
    pub fn for_urn(urn: &str) -> Result<(Self, Url), TransportError> {
        let url = Url::parse(urn).map_err(|e| TransportError::InvalidEndpoint {
            urn: urn.to_string(),
            reason: e.to_string(),
        })?;
        let protocol = match url.scheme() {
            "http" => Self::Http,
            "https" => Self::Https,
            "sftp" => Self::Sftp,
            "mailto" => Self::Mailto,
            "socket" => Self::Socket,
            other => {
                return Err(TransportError::ProtocolNotSupported {
                    scheme: other.to_string(),
                    urn: urn.to_string(),
                })
            }
        };
        Ok((protocol, url))
    }
}

/// Per-delivery knobs for the transports that need them.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// MIME type sent with http raw bodies and multipart parts.
    pub content_type: String,

    /// Extension used when the payload travels as a named file.
    pub file_extension: String,

    /// Send the payload as the raw request body; when false, http wraps
    /// it in a multipart form file instead.
    pub body_raw: bool,

    /// Use PUT instead of POST for http endpoints.
    pub put_data: bool,

    /// File stem for named uploads, normally the delivery task name.
    pub task_name: String,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            content_type: "application/json".to_string(),
            file_extension: "json".to_string(),
            body_raw: true,
            put_data: false,
            task_name: "payload".to_string(),
        }
    }
}

impl DispatchOptions {
    pub fn with_task_name(mut self, name: &str) -> Self {
        self.task_name = name.to_string();
        self
    }

    /// The file name used for multipart and sftp uploads.
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.task_name, self.file_extension)
    }
}

/// What the remote side said, for transports that say anything.
#[derive(Debug, Clone, Default)]
pub struct DispatchResponse {
    pub status: Option<u16>,
    pub body: Option<String>,
}

impl DispatchResponse {
    pub fn accepted(&self) -> bool {
        match self.status {
            Some(status) => (200..300).contains(&status),
            None => true,
        }
    }
}

/// SMTP relay settings and the defaults applied to sparse mailto URNs.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub default_from: String,
    pub default_reply_to: String,
    pub default_subject: String,
    pub default_body: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            default_from: "noreply@localhost".to_string(),
            default_reply_to: "noreply@localhost".to_string(),
            default_subject: "Event data".to_string(),
            default_body: "Event data attached.".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound for any single transport call.
    pub timeout: Duration,
    pub smtp: SmtpConfig,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            smtp: SmtpConfig::default(),
        }
    }
}

/// Dispatches a payload to an endpoint by URN scheme.
pub struct DispatchRouter {
    client: reqwest::Client,
    config: RouterConfig,
}

impl DispatchRouter {
    pub fn new(config: RouterConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_default();
        Self { client, config }
    }

    /// Deliver one payload. The call is bounded by the router timeout
    /// regardless of protocol.
    #[instrument(skip(self, payload, credential, options))]
    pub async fn send(
        &self,
        urn: &str,
        payload: &str,
        credential: Option<&Credential>,
        options: &DispatchOptions,
    ) -> Result<DispatchResponse, TransportError> {
        let (protocol, url) = Protocol::for_urn(urn)?;
        debug!(?protocol, "dispatching payload");

        let fut = async {
            match protocol {
                Protocol::Http | Protocol::Https => {
                    http::send(&self.client, &url, payload, credential, options).await
                }
                Protocol::Sftp => {
                    sftp::send(&url, payload, credential, options, self.config.timeout).await
                }
                Protocol::Mailto => {
                    mail::send(&url, payload, &self.config.smtp, options).await
                }
                Protocol::Socket => tcp::send(&url, payload).await,
            }
        };
        tokio::time::timeout(self.config.timeout, fut)
            .await
            .map_err(|_| TransportError::Timeout(self.config.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_schemes() {
        assert!(matches!(
            Protocol::for_urn("http://example.com/epcis").map(|(p, _)| p),
            Ok(Protocol::Http)
        ));
        assert!(matches!(
            Protocol::for_urn("https://example.com/epcis").map(|(p, _)| p),
            Ok(Protocol::Https)
        ));
        assert!(matches!(
            Protocol::for_urn("sftp://example.com/uploads").map(|(p, _)| p),
            Ok(Protocol::Sftp)
        ));
        assert!(matches!(
            Protocol::for_urn("mailto:ops@example.com").map(|(p, _)| p),
            Ok(Protocol::Mailto)
        ));
        assert!(matches!(
            Protocol::for_urn("socket://10.0.0.1:9000").map(|(p, _)| p),
            Ok(Protocol::Socket)
        ));
    }

    #[test]
    fn test_unknown_scheme_is_rejected() {
        let err = Protocol::for_urn("ftp://example.com/drop").unwrap_err();
        assert!(matches!(
            err,
            TransportError::ProtocolNotSupported { ref scheme, .. } if scheme == "ftp"
        ));
    }

    #[test]
    fn test_malformed_urn_is_rejected() {
        assert!(matches!(
            Protocol::for_urn("not a urn"),
            Err(TransportError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_file_name_combines_task_and_extension() {
        let options = DispatchOptions::default().with_task_name("output-abc123");
        assert_eq!(options.file_name(), "output-abc123.json");
    }
}
