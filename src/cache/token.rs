use base64::Engine;
use serde_json::Value;
use tracing::debug;

use crate::error::TokenDecodeError;

/// A bearer credential together with the expiry decoded from its `exp` claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub exp_unix_ts: i64, // UNIX TIMESTAMP
}

impl Token {
    pub fn new(value: String, exp_unix_ts: i64) -> Self {
        Self { value, exp_unix_ts }
    }

    /// Decode the expiry claim of a JWT. The signature is not verified here,
    /// the downstream server does that.
    pub fn decode(value: &str) -> Result<Self, TokenDecodeError> {
        let exp = decode_jwt_expiration(value)?;
        debug!(expires_at = exp, "jwt parsed successfully");
        Ok(Self::new(value.to_owned(), exp))
    }

    /// Fresh iff `exp - min_validity > now`.
    pub fn is_fresh_at(&self, now: i64, min_validity_seconds: i64) -> bool {
        self.exp_unix_ts.saturating_sub(min_validity_seconds) > now
    }
}

fn decode_jwt_expiration(token_string: &str) -> Result<i64, TokenDecodeError> {
    let parts: Vec<&str> = token_string.split('.').collect();
    if parts.len() != 3 {
        return Err(TokenDecodeError::Format(parts.len()));
    }

    let payload = parts[1].trim_end_matches('=');
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|e| TokenDecodeError::Base64(e.to_string()))?;

    let claims: Value = serde_json::from_slice(&decoded)
        .map_err(|e| TokenDecodeError::Payload(e.to_string()))?;

    match claims.get("exp") {
        None | Some(Value::Null) => Err(TokenDecodeError::MissingExpiry),
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().and_then(floor_to_i64))
            .ok_or_else(|| TokenDecodeError::InvalidExpiry(n.to_string())),
        Some(other) => Err(TokenDecodeError::InvalidExpiry(other.to_string())),
    }
}

/// Floor a float claim, `None` when it does not fit an i64.
fn floor_to_i64(f: f64) -> Option<i64> {
    let floored = f.floor();
    // i64::MAX as f64 rounds up to 2^63
    (floored.is_finite() && floored >= i64::MIN as f64 && floored < i64::MAX as f64)
        .then_some(floored as i64)
}

#[cfg(test)]
pub(crate) mod tests {
    use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};

    use super::*;

    /// minimal unsigned JWT for tests: {"exp": exp}
    pub(crate) fn sample_jwt(exp: i64) -> String {
        jwt_with_payload(&format!(r#"{{"exp":{}}}"#, exp))
    }

    pub(crate) fn jwt_with_payload(payload: &str) -> String {
        let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        let payload = URL_SAFE_NO_PAD.encode(payload);
        format!("{}.{}.sig", header, payload)
    }

    #[test]
    fn decodes_numeric_expiry() {
        let token = Token::decode(&sample_jwt(1_900_000_000)).unwrap();
        assert_eq!(token.exp_unix_ts, 1_900_000_000);
    }

    #[test]
    fn fractional_expiry_is_floored() {
        let token = Token::decode(&jwt_with_payload(r#"{"exp":1700000000.9}"#)).unwrap();
        assert_eq!(token.exp_unix_ts, 1_700_000_000);
    }

    #[test]
    fn rejects_missing_and_invalid_expiry() {
        assert_eq!(
            Token::decode(&jwt_with_payload(r#"{"sub":"evt"}"#)),
            Err(TokenDecodeError::MissingExpiry)
        );
        assert!(matches!(
            Token::decode(&jwt_with_payload(r#"{"exp":"soon"}"#)),
            Err(TokenDecodeError::InvalidExpiry(_))
        ));
        assert_eq!(Token::decode("not-a-jwt"), Err(TokenDecodeError::Format(1)));
        assert!(matches!(Token::decode("a.!!!.c"), Err(TokenDecodeError::Base64(_))));
    }

    #[test]
    fn out_of_range_float_expiry_is_rejected() {
        assert!(matches!(
            Token::decode(&jwt_with_payload(r#"{"exp":-1e300}"#)),
            Err(TokenDecodeError::InvalidExpiry(_))
        ));
        assert!(matches!(
            Token::decode(&jwt_with_payload(r#"{"exp":1e19}"#)),
            Err(TokenDecodeError::InvalidExpiry(_))
        ));
    }

    #[test]
    fn freshness_respects_min_validity() {
        let token = Token::new("t".into(), 1_000);
        assert!(token.is_fresh_at(994, 5));
        assert!(!token.is_fresh_at(995, 5));
        assert!(!token.is_fresh_at(1_001, 0));
    }
}
