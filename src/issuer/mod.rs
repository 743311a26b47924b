//! Token issuer seam.
//!
//! The relay never signs anything itself: it asks an issuer for tokens and
//! the issuer decides which resources the caller may access, omitting the rest.

use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::future::Future;

pub mod http;

/// Identifier of a protected resource, compared by exact string equality.
pub type ResourceId = String;

/// Issued tokens keyed by resource id. Denied ids are simply absent.
pub type IssuedTokens = HashMap<ResourceId, String>;

pub trait TokenIssuer: Send + Sync + 'static {
    fn get_tokens(
        &self,
        ids: HashSet<ResourceId>,
    ) -> impl Future<Output = Result<IssuedTokens>> + Send;
}
