//! HTTP delivery: POST or PUT, raw body or multipart file upload.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder};
use tracing::debug;
use url::Url;

use crate::config::Credential;

use super::{DispatchOptions, DispatchResponse, TransportError};

pub(super) async fn send(
    client: &Client,
    url: &Url,
    payload: &str,
    credential: Option<&Credential>,
    options: &DispatchOptions,
) -> Result<DispatchResponse, TransportError> {
    let mut request = if options.put_data {
        client.put(url.clone())
    } else {
        client.post(url.clone())
    };

    request = apply_auth(request, credential);

    request = if options.body_raw {
        request
            .header(CONTENT_TYPE, options.content_type.as_str())
            .body(payload.to_string())
    } else {
        let part = Part::bytes(payload.as_bytes().to_vec())
            .file_name(options.file_name())
            .mime_str(&options.content_type)
            .map_err(TransportError::Http)?;
        request.multipart(Form::new().part("file", part))
    };

    let response = request.send().await?;
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    debug!(status = status.as_u16(), "http delivery response");

    if !status.is_success() {
        return Err(TransportError::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }
    Ok(DispatchResponse {
        status: Some(status.as_u16()),
        body: Some(body),
    })
}

/// Basic auth is the default. A credential kind containing "proxy" goes
/// out as a Proxy-Authorization header instead; a kind containing
/// "digest" is sent as Basic, matching long-standing behavior that
/// deployed receivers depend on.
fn apply_auth(request: RequestBuilder, credential: Option<&Credential>) -> RequestBuilder {
    let Some(credential) = credential else {
        return request;
    };
    let kind = credential.kind.to_ascii_lowercase();
    if kind.contains("proxy") {
        let token = BASE64.encode(format!("{}:{}", credential.username, credential.secret));
        request.header("Proxy-Authorization", format!("Basic {token}"))
    } else {
        request.basic_auth(&credential.username, Some(&credential.secret))
    }
}
