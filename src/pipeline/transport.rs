use anyhow::Result;
use http::HeaderValue;
use reqwest::Client;
use std::future::Future;
use tracing::debug;

use crate::pipeline::request::{OutgoingRequest, RequestMode};

static SEC_FETCH_MODE: &str = "sec-fetch-mode";

/// Dispatches a forwarded request. The relay never looks at the response.
pub trait Transport: Send + Sync {
    type Response: Send;

    fn dispatch(
        &self,
        request: OutgoingRequest,
    ) -> impl Future<Output = Result<Self::Response>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    type Response = reqwest::Response;

    async fn dispatch(&self, request: OutgoingRequest) -> Result<reqwest::Response> {
        let OutgoingRequest { method, url, mut headers, mode, body } = request;
        if mode == RequestMode::Cors {
            headers.insert(SEC_FETCH_MODE, HeaderValue::from_static("cors"));
        }
        debug!("{} {} ({:?})", method, url, mode);

        let response = self
            .client
            .request(method, url)
            .headers(headers)
            .body(body)
            .send()
            .await?;
        Ok(response)
    }
}
