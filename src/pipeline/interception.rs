use anyhow::Result;
use http::header::AUTHORIZATION;
use http::HeaderValue;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::cache::token_cache::TokenCache;
use crate::coalescer::request_coalescer::RequestCoalescer;
use crate::config::proc_validator::check_relay_config;
use crate::config::relay::RelayConfig;
use crate::error::ConfigError;
use crate::issuer::TokenIssuer;
use crate::matcher::path_matcher::PathMatcher;
use crate::observability::metrics::get_metrics;
use crate::pipeline::request::{InterceptOutcome, OutgoingRequest, RequestMode};
use crate::pipeline::transport::Transport;
use crate::utils::constants::BEARER_PREFIX;

/// Per-request orchestration: origin check, path match, cache, coalescer.
pub struct InterceptionPipeline<I: TokenIssuer> {
    trusted_origins: HashSet<String>,
    matcher: PathMatcher,
    cache: TokenCache,
    coalescer: RequestCoalescer<I>,
    cross_origin: bool,
}

impl<I: TokenIssuer> InterceptionPipeline<I> {
    /// Fails on invalid relay settings before any request is handled.
    pub fn new(relay: &RelayConfig, issuer: Arc<I>) -> Result<Self, ConfigError> {
        check_relay_config(relay)?;
        Ok(Self {
            trusted_origins: relay.trusted_origins.iter().cloned().collect(),
            matcher: PathMatcher::new(relay.path_prefixes.iter().cloned())?,
            cache: TokenCache::new(relay.min_validity_seconds()),
            coalescer: RequestCoalescer::new(issuer, relay.batch_window()),
            cross_origin: relay.cross_origin,
        })
    }

    pub fn cache(&self) -> &TokenCache {
        &self.cache
    }

    pub fn is_trusted_origin(&self, origin: &str) -> bool {
        self.trusted_origins.contains(origin)
    }

    /// Decide what to forward. Never fails: a missing token only degrades
    /// the request to unauthenticated.
    pub async fn intercept(&self, request: OutgoingRequest) -> InterceptOutcome {
        let outcome = self.decide(request).await;
        get_metrics()
            .await
            .intercepted_requests
            .with_label_values(&[outcome.label()])
            .inc();
        outcome
    }

    /// Intercept, then dispatch whatever was decided.
    pub async fn handle<T: Transport>(&self, transport: &T, request: OutgoingRequest) -> Result<T::Response> {
        let outcome = self.intercept(request).await;
        transport.dispatch(outcome.into_request()).await
    }

    async fn decide(&self, request: OutgoingRequest) -> InterceptOutcome {
        if !self.is_trusted_origin(&request.origin()) {
            return InterceptOutcome::PassThrough(request);
        }
        let parsed = match self.matcher.match_path(request.url.path()) {
            Some(parsed) => parsed,
            None => return InterceptOutcome::PassThrough(request),
        };

        let id = parsed.resource_id();
        match self.resolve_token(id).await {
            Some(token) => match authorize(&request, &token, self.cross_origin) {
                Some(authorized) => InterceptOutcome::Authorized(authorized),
                None => {
                    warn!(id = %id, "token is not a valid header value");
                    InterceptOutcome::Unauthenticated(request)
                }
            },
            None => {
                debug!(id = %id, path = %request.url.path(), "no token, forwarding unauthenticated");
                InterceptOutcome::Unauthenticated(request)
            }
        }
    }

    /// Cache first, then the coalescer. A freshly issued token is cached
    /// before use and dropped if its expiry cannot be decoded.
    pub async fn resolve_token(&self, id: &str) -> Option<String> {
        if let Some(token) = self.cache.lookup(id).await {
            return Some(token.value);
        }

        let raw = self.coalescer.acquire(id).await?;
        match self.cache.insert(id, &raw).await {
            Ok(_) => Some(raw),
            Err(e) => {
                get_metrics().await.token_decode_failures.inc();
                warn!(id = %id, "rejecting issued token: {}", e);
                None
            }
        }
    }
}

fn authorize(request: &OutgoingRequest, token: &str, cross_origin: bool) -> Option<OutgoingRequest> {
    let value = HeaderValue::from_str(&format!("{}{}", BEARER_PREFIX, token)).ok()?;
    let mut authorized = request.clone();
    authorized.headers.insert(AUTHORIZATION, value);
    if cross_origin {
        authorized.mode = RequestMode::Cors;
    }
    Some(authorized)
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;

    use http::header::AUTHORIZATION;
    use reqwest::Url;

    use super::InterceptionPipeline;
    use crate::cache::token::tests::{jwt_with_payload, sample_jwt};
    use crate::coalescer::request_coalescer::tests::RecordingIssuer;
    use crate::config::relay::RelayConfig;
    use crate::error::ConfigError;
    use crate::helpers::time::now_i64;
    use crate::pipeline::request::{InterceptOutcome, OutgoingRequest, RequestMode};

    fn relay_config(cross_origin: bool) -> RelayConfig {
        RelayConfig {
            trusted_origins: vec!["https://cdn.example.com".into()],
            path_prefixes: vec!["/static/".into()],
            min_validity_seconds: Some(5),
            batch_window_ms: Some(10.0),
            cross_origin,
            debug: false,
        }
    }

    fn issuer_with(tokens: &[(&str, String)]) -> Arc<RecordingIssuer> {
        let tokens: HashMap<String, String> = tokens.iter().map(|(k, v)| (k.to_string(), v.clone())).collect();
        let deny: HashSet<String> = HashSet::from(["denied".to_string()]);
        Arc::new(RecordingIssuer { tokens, deny, ..Default::default() })
    }

    fn get(url: &str) -> OutgoingRequest {
        OutgoingRequest::get(Url::parse(url).unwrap())
    }

    fn bearer(outcome: &InterceptOutcome) -> Option<String> {
        outcome
            .request()
            .headers
            .get(AUTHORIZATION)
            .map(|v| v.to_str().unwrap().to_owned())
    }

    #[tokio::test]
    async fn untrusted_origin_passes_through() {
        let issuer = issuer_with(&[]);
        let pipeline = InterceptionPipeline::new(&relay_config(false), issuer.clone()).unwrap();

        let outcome = pipeline.intercept(get("https://evil.example.com/static/o/c/evt/x.mp4")).await;
        assert!(matches!(outcome, InterceptOutcome::PassThrough(_)));
        assert!(issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn unmatched_path_passes_through() {
        let issuer = issuer_with(&[]);
        let pipeline = InterceptionPipeline::new(&relay_config(false), issuer.clone()).unwrap();

        let outcome = pipeline.intercept(get("https://cdn.example.com/assets/app.js")).await;
        assert!(matches!(outcome, InterceptOutcome::PassThrough(_)));
        assert_eq!(bearer(&outcome), None);
        assert!(issuer.calls().is_empty());
    }

    #[tokio::test]
    async fn attaches_bearer_and_caches_token() {
        let jwt = sample_jwt(now_i64() + 3600);
        let issuer = issuer_with(&[("evt1", jwt.clone())]);
        let pipeline = InterceptionPipeline::new(&relay_config(false), issuer.clone()).unwrap();

        let first = pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/a.ts")).await;
        let second = pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/b.ts")).await;

        assert!(matches!(first, InterceptOutcome::Authorized(_)));
        assert_eq!(bearer(&first), Some(format!("Bearer {}", jwt)));
        assert_eq!(bearer(&second), Some(format!("Bearer {}", jwt)));
        assert_eq!(first.request().mode, RequestMode::SameOrigin);
        assert_eq!(issuer.calls().len(), 1, "second request must be served from cache");
    }

    #[tokio::test]
    async fn cross_origin_flag_sets_cors_mode() {
        let issuer = issuer_with(&[("evt1", sample_jwt(now_i64() + 3600))]);
        let pipeline = InterceptionPipeline::new(&relay_config(true), issuer).unwrap();

        let outcome = pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/a.ts")).await;
        assert_eq!(outcome.request().mode, RequestMode::Cors);
    }

    #[tokio::test]
    async fn denied_resource_is_forwarded_unauthenticated() {
        let issuer = issuer_with(&[]);
        let pipeline = InterceptionPipeline::new(&relay_config(true), issuer).unwrap();

        let outcome = pipeline.intercept(get("https://cdn.example.com/static/o/c/denied/a.ts")).await;
        assert!(matches!(outcome, InterceptOutcome::Unauthenticated(_)));
        assert_eq!(bearer(&outcome), None);
        assert_eq!(outcome.request().mode, RequestMode::SameOrigin);
    }

    #[tokio::test]
    async fn undecodable_token_is_neither_used_nor_cached() {
        let issuer = issuer_with(&[("evt1", jwt_with_payload(r#"{"sub":"evt1"}"#))]);
        let pipeline = InterceptionPipeline::new(&relay_config(false), issuer.clone()).unwrap();

        let outcome = pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/a.ts")).await;
        assert!(matches!(outcome, InterceptOutcome::Unauthenticated(_)));
        assert!(pipeline.cache().is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_requests_for_different_events_share_one_issuer_call() {
        let exp = now_i64() + 3600;
        let issuer = issuer_with(&[("evt1", sample_jwt(exp)), ("evt2", sample_jwt(exp + 1))]);
        let pipeline = InterceptionPipeline::new(&relay_config(false), issuer.clone()).unwrap();

        let (a, b, c) = tokio::join!(
            pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/a.ts")),
            pipeline.intercept(get("https://cdn.example.com/static/o/c/evt2/a.ts")),
            pipeline.intercept(get("https://cdn.example.com/static/o/c/denied/a.ts")),
        );
        assert!(matches!(a, InterceptOutcome::Authorized(_)));
        assert!(matches!(b, InterceptOutcome::Authorized(_)));
        assert!(matches!(c, InterceptOutcome::Unauthenticated(_)));
        assert_eq!(issuer.calls().len(), 1);
        assert_eq!(pipeline.cache().len().await, 2);
    }

    #[tokio::test]
    async fn expiring_token_is_refetched() {
        // inside the 5s margin, so never served from cache
        let issuer = issuer_with(&[("evt1", sample_jwt(now_i64() + 3))]);
        let pipeline = InterceptionPipeline::new(&relay_config(false), issuer.clone()).unwrap();

        pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/a.ts")).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        pipeline.intercept(get("https://cdn.example.com/static/o/c/evt1/b.ts")).await;
        assert_eq!(issuer.calls().len(), 2);
    }

    #[tokio::test]
    async fn invalid_relay_settings_fail_construction() {
        let mut relay = relay_config(false);
        relay.path_prefixes = vec!["/static".into()];
        relay.batch_window_ms = Some(f64::INFINITY);
        relay.min_validity_seconds = Some(-1);

        let err = InterceptionPipeline::new(&relay, issuer_with(&[])).err().unwrap();
        match err {
            ConfigError::Invalid(errors) => assert_eq!(errors.len(), 3, "{:?}", errors),
            other => panic!("unexpected error {other}"),
        }
    }

    #[tokio::test]
    async fn oversized_batch_window_fails_construction() {
        let mut relay = relay_config(false);
        relay.batch_window_ms = Some(1e23);

        match InterceptionPipeline::new(&relay, issuer_with(&[])) {
            Err(ConfigError::Invalid(errors)) => {
                assert_eq!(errors.len(), 1, "{:?}", errors);
                assert!(errors[0].contains("batch_window_ms"));
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("oversized window must be rejected"),
        }
        assert_eq!(relay.batch_window(), Duration::ZERO);
    }
}
