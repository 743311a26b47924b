use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use std::{env, fs};
use tracing::{debug, info};

use crate::config::relay::{GenericValue, IssuerConfig};
use crate::issuer::{IssuedTokens, ResourceId, TokenIssuer};
use crate::resilience::retry::RetrySettings;
use crate::utils::constants::DEFAULT_HTTP_TIMEOUT_MS;

#[derive(Debug, Serialize)]
struct IssueRequest<'a> {
    ids: &'a [ResourceId],
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    #[serde(default)]
    tokens: HashMap<ResourceId, String>,
}

/// Issuer reached over HTTP: `POST {"ids": [...]}` -> `{"tokens": {"<id>": "<jwt>"}}`.
#[derive(Debug, Clone)]
pub struct HttpIssuer {
    url: String,
    headers: HashMap<String, GenericValue>,
    client: Client,
    retry: RetrySettings,
}

impl HttpIssuer {
    pub fn new(cfg: &IssuerConfig) -> Result<Self> {
        let timeout = Duration::from_millis(cfg.timeout_ms.unwrap_or(DEFAULT_HTTP_TIMEOUT_MS));
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            url: cfg.url.to_owned(),
            headers: cfg.headers.clone().unwrap_or_default(),
            client,
            retry: RetrySettings::from_config(cfg.retry.as_ref()),
        })
    }

    async fn request_tokens(&self, ids: &[ResourceId]) -> Result<IssuedTokens> {
        let mut request = self.client.post(&self.url).json(&IssueRequest { ids });
        for (key, v) in &self.headers {
            request = request.header(key, prepare_generic_value(v)?);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(anyhow!("issuer request failed: {}", response.status()));
        }
        let body: IssueResponse = response.json().await?;
        Ok(body.tokens)
    }
}

impl TokenIssuer for HttpIssuer {
    async fn get_tokens(&self, ids: HashSet<ResourceId>) -> Result<IssuedTokens> {
        let mut ids: Vec<ResourceId> = ids.into_iter().collect();
        ids.sort();
        debug!("requesting tokens for {:?}", ids);

        let mut tokens = self
            .retry
            .run_with_retry(|| self.request_tokens(&ids))
            .await?;

        // the issuer must not hand out tokens nobody asked for
        tokens.retain(|id, _| ids.binary_search(id).is_ok());
        info!("issuer granted {} of {} requested tokens", tokens.len(), ids.len());
        Ok(tokens)
    }
}

fn prepare_generic_value(value: &GenericValue) -> Result<String> {
    match value {
        GenericValue::Literal { value } => Ok(value.to_owned()),
        GenericValue::FromEnv { from_env } => {
            env::var(from_env).map_err(|err| anyhow!("env '{}': {}", from_env, err))
        }
        GenericValue::FromFile { path } => fs::read_to_string(path)
            .map_err(|err| anyhow!("file '{}': {}", path, err))
            .map(|res| res.trim().to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use httpmock::prelude::*;
    use serde_json::json;

    use super::*;
    use crate::config::settings::RetryConfig;

    fn issuer_config(url: String, attempts: u32) -> IssuerConfig {
        IssuerConfig {
            url,
            headers: Some(HashMap::from([(
                "authorization".to_string(),
                GenericValue::Literal { value: "Bearer issuer-secret".into() },
            )])),
            retry: Some(RetryConfig {
                attempts: Some(attempts),
                base_delay_ms: Some(1),
                max_delay_ms: Some(2),
            }),
            timeout_ms: Some(2000),
        }
    }

    fn ids(values: &[&str]) -> HashSet<ResourceId> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[tokio::test]
    async fn posts_sorted_ids_and_returns_granted_tokens() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/tokens")
                    .header("authorization", "Bearer issuer-secret")
                    .json_body(json!({"ids": ["evt1", "evt2", "evt3"]}));
                then.status(200).json_body(json!({
                    "tokens": {"evt1": "jwt-1", "evt3": "jwt-3", "other": "jwt-x"}
                }));
            })
            .await;

        let issuer = HttpIssuer::new(&issuer_config(server.url("/tokens"), 1)).unwrap();
        let tokens = issuer.get_tokens(ids(&["evt3", "evt1", "evt2"])).await.unwrap();

        mock.assert_async().await;
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens["evt1"], "jwt-1");
        assert_eq!(tokens["evt3"], "jwt-3");
        assert!(!tokens.contains_key("other"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error_after_retries() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/tokens");
                then.status(503).body("unavailable");
            })
            .await;

        let issuer = HttpIssuer::new(&issuer_config(server.url("/tokens"), 2)).unwrap();
        let res = issuer.get_tokens(ids(&["evt1"])).await;

        assert!(res.is_err());
        mock.assert_calls_async(2).await;
    }

    #[tokio::test]
    async fn missing_tokens_field_means_nothing_granted() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/tokens");
                then.status(200).json_body(json!({}));
            })
            .await;

        let issuer = HttpIssuer::new(&issuer_config(server.url("/tokens"), 1)).unwrap();
        let tokens = issuer.get_tokens(ids(&["evt1"])).await.unwrap();
        assert!(tokens.is_empty());
    }
}
