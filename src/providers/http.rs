use std::time::Duration;

use reqwest::header::HeaderMap;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::error::{ActionError, CiWatchError, ConnectivityError, PollError, Result};

/// Upper bound for a single backend call, so one hung request cannot stall a poller.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

const USER_AGENT: &str = concat!("ciwatch/", env!("CARGO_PKG_VERSION"));

pub fn build_client(headers: HeaderMap) -> Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(REQUEST_TIMEOUT)
        .default_headers(headers)
        .build()
        .map_err(|e| CiWatchError::Config(format!("Failed to create HTTP client: {e}")))
}

/// Transport failure or non-success status, classified later by the caller.
#[derive(Debug)]
pub enum HttpError {
    Network(reqwest::Error),
    Status(u16),
}

pub async fn send(request: RequestBuilder) -> std::result::Result<Response, HttpError> {
    let response = request.send().await.map_err(HttpError::Network)?;
    let status = response.status();
    if !status.is_success() {
        return Err(HttpError::Status(status.as_u16()));
    }
    Ok(response)
}

pub async fn fetch_json<T>(request: RequestBuilder) -> std::result::Result<T, PollError>
where
    T: DeserializeOwned,
{
    let body = send(request).await?.bytes().await?;
    Ok(serde_json::from_slice(&body)?)
}

/// Fires an action request. Acceptance by the backend is success.
pub async fn fire(request: RequestBuilder) -> std::result::Result<(), ActionError> {
    send(request).await?;
    Ok(())
}

pub async fn fetch_text(request: RequestBuilder) -> std::result::Result<String, ActionError> {
    Ok(send(request).await?.text().await?)
}

pub async fn probe(request: RequestBuilder) -> std::result::Result<(), ConnectivityError> {
    send(request).await?;
    Ok(())
}

impl From<HttpError> for PollError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Network(e) => PollError::Network(e),
            HttpError::Status(status) => PollError::Status { status },
        }
    }
}

impl From<HttpError> for ActionError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Network(e) => ActionError::Network(e),
            HttpError::Status(status) => ActionError::Rejected { status },
        }
    }
}

impl From<HttpError> for ConnectivityError {
    fn from(err: HttpError) -> Self {
        match err {
            HttpError::Network(e) => ConnectivityError::Network(e),
            HttpError::Status(status @ (401 | 403)) => ConnectivityError::Unauthorized { status },
            HttpError::Status(status) => ConnectivityError::Status { status },
        }
    }
}
