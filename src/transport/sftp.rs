//! SFTP delivery: upload the payload as a named file.

use std::io::Write;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use ssh2::Session;
use tracing::debug;
use url::Url;

use crate::config::Credential;

use super::{DispatchOptions, DispatchResponse, TransportError};

const DEFAULT_PORT: u16 = 22;

/// The ssh2 session is synchronous, so the whole transfer runs on the
/// blocking pool. The router timeout bounds the async side; the same
/// budget is applied to the connect and to every blocking libssh2 call
/// so an abandoned worker cannot hold its session open for long.
pub(super) async fn send(
    url: &Url,
    payload: &str,
    credential: Option<&Credential>,
    options: &DispatchOptions,
    timeout: Duration,
) -> Result<DispatchResponse, TransportError> {
    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidEndpoint {
            urn: url.to_string(),
            reason: "sftp endpoint has no host".to_string(),
        })?
        .to_string();
    let port = url.port().unwrap_or(DEFAULT_PORT);
    let credential = credential
        .ok_or_else(|| TransportError::InvalidEndpoint {
            urn: url.to_string(),
            reason: "sftp endpoint requires a credential".to_string(),
        })?
        .clone();

    let remote_path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        options.file_name()
    );
    let payload = payload.to_string();

    tokio::task::spawn_blocking(move || {
        upload(
            &host,
            port,
            &credential,
            &remote_path,
            payload.as_bytes(),
            timeout,
        )
    })
    .await??;

    Ok(DispatchResponse::default())
}

fn upload(
    host: &str,
    port: u16,
    credential: &Credential,
    remote_path: &str,
    payload: &[u8],
    timeout: Duration,
) -> Result<(), TransportError> {
    let addr = (host, port).to_socket_addrs()?.next().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::AddrNotAvailable,
            format!("could not resolve {host}:{port}"),
        )
    })?;
    let stream = TcpStream::connect_timeout(&addr, timeout)?;

    let mut session = Session::new()?;
    session.set_tcp_stream(stream);
    // Bounds every blocking libssh2 call (handshake, auth, writes).
    session.set_timeout(timeout.as_millis().min(u32::MAX as u128) as u32);
    session.handshake()?;

    match &credential.private_key {
        Some(key) => {
            session.userauth_pubkey_memory(&credential.username, None, key, None)?;
        }
        None => {
            session.userauth_password(&credential.username, &credential.secret)?;
        }
    }

    let sftp = session.sftp()?;
    let mut file = sftp.create(std::path::Path::new(remote_path))?;
    file.write_all(payload)?;
    debug!(path = remote_path, bytes = payload.len(), "sftp upload complete");
    Ok(())
}
