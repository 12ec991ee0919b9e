//! HTTP client utilities for calling the AI functions.

use std::collections::HashMap;

use futures::StreamExt;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, RequestBuilder};

use crate::client::{ByteStream, ClientError};
use crate::options::{SecretString, TransportOptions};

/// Build a configured HTTP client from transport options.
///
/// A proxy URL that does not parse is a [`ClientError::Config`].
pub fn build_http_client(transport_options: &TransportOptions) -> Result<Client, ClientError> {
    let mut builder = Client::builder();

    if let Some(timeout) = transport_options.timeout {
        builder = builder.timeout(timeout);
    }

    if let Some(timeout) = transport_options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }

    if let Some(proxy_url) = &transport_options.proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| ClientError::Config(format!("invalid proxy URL {proxy_url:?}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    Ok(builder.build()?)
}

/// Add extra headers to a request if specified in transport options.
pub fn add_extra_headers(
    mut request: RequestBuilder,
    extra_headers: &Option<HashMap<String, String>>,
) -> RequestBuilder {
    if let Some(headers) = extra_headers {
        for (key, value) in headers {
            request = request.header(key, value);
        }
    }
    request
}

/// Start a JSON POST carrying the bearer key.
pub fn authorized_post(
    client: &Client,
    url: &str,
    api_key: &SecretString,
    transport_options: &TransportOptions,
) -> RequestBuilder {
    let request = client
        .post(url)
        .header(AUTHORIZATION, format!("Bearer {}", api_key.expose_secret()))
        .header(CONTENT_TYPE, "application/json");

    add_extra_headers(request, &transport_options.extra_headers)
}

/// Extension trait turning a response body into a [`ByteStream`].
pub trait ResponseExt {
    /// Body chunks as they arrive; read failures become
    /// [`ClientError::StreamInterrupted`].
    fn byte_stream(self) -> ByteStream;
}

impl ResponseExt for reqwest::Response {
    fn byte_stream(self) -> ByteStream {
        self.bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::StreamInterrupted(e.to_string())))
            .boxed()
    }
}
