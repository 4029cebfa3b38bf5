//! Raw socket delivery: connect, write the payload, close.

use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;
use url::Url;

use super::{DispatchResponse, TransportError};

pub(super) async fn send(url: &Url, payload: &str) -> Result<DispatchResponse, TransportError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidEndpoint {
            urn: url.to_string(),
            reason: "socket endpoint has no host".to_string(),
        })?;
    let port = url.port().ok_or_else(|| TransportError::InvalidEndpoint {
        urn: url.to_string(),
        reason: "socket endpoint has no port".to_string(),
    })?;

    let mut stream = TcpStream::connect((host, port)).await?;
    stream.write_all(payload.as_bytes()).await?;
    stream.shutdown().await?;
    debug!(host, port, bytes = payload.len(), "socket delivery complete");
    Ok(DispatchResponse::default())
}
