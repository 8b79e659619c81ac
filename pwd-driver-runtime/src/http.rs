use once_cell::sync::OnceCell;
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode, Url};
use serde_json::Value;

use crate::error::{DriverError, Result};

static HTTP_CLIENT: OnceCell<Client> = OnceCell::new();

/// Shared client. No request timeout is set; a hung remote hangs the caller.
pub fn http_client() -> Result<&'static Client> {
    HTTP_CLIENT.get_or_try_init(|| {
        Client::builder()
            .build()
            .map_err(|err| DriverError::transport(format!("Failed to build HTTP client: {err}")))
    })
}

pub fn build_url(base: &str, path: &str) -> Result<Url> {
    let base_url = Url::parse(base)
        .map_err(|err| DriverError::Configuration(format!("Invalid base URL: {err}")))?;
    base_url
        .join(path)
        .map_err(|err| DriverError::Configuration(format!("Invalid path '{path}': {err}")))
}

pub fn json_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers
}

/// Issue a single request and return the raw body of a 200 response.
///
/// Any other status is a transport failure carrying that status; there is
/// no retry.
pub async fn send(method: Method, url: Url, body: Option<Value>) -> Result<Vec<u8>> {
    let client = http_client()?;
    let mut request = client.request(method.clone(), url.clone());
    if let Some(body) = body {
        request = request.headers(json_headers()).json(&body);
    }

    let response = request.send().await.map_err(|err| {
        DriverError::transport(format!("{method} {url} failed: {err}"))
    })?;
    let status = response.status();
    let bytes = response.bytes().await.map_err(|err| DriverError::Transport {
        status: Some(status.as_u16()),
        message: format!("Failed to read response body: {err}"),
    })?;

    if status != StatusCode::OK {
        let text = String::from_utf8_lossy(&bytes);
        return Err(DriverError::Transport {
            status: Some(status.as_u16()),
            message: format!("{method} {url}: {}", text.trim()),
        });
    }

    Ok(bytes.to_vec())
}

pub async fn send_json(method: Method, url: Url, body: Option<Value>) -> Result<Value> {
    let bytes = send(method, url, body).await?;
    serde_json::from_slice(&bytes)
        .map_err(|err| DriverError::transport(format!("Invalid session API response JSON: {err}")))
}
