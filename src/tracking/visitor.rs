//! Durable per-browser visitor identifiers
//!
//! A visitor id is 128 random bits encoded as unpadded URL-safe base64.
//! It travels to the client in a long-lived cookie and comes back on every
//! request, linking the visits of one browser to a later order.

use base64::prelude::*;
use cookie::{time::Duration, Cookie, SameSite};
use std::fmt;

const VISITOR_ID_BYTES: usize = 16;

/// Opaque visitor token
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VisitorId(String);

impl VisitorId {
    /// Issue a fresh identifier from the thread-local CSPRNG
    pub fn generate() -> Self {
        let bytes: [u8; VISITOR_ID_BYTES] = rand::random();
        Self(BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Accept a previously issued identifier, rejecting anything malformed
    pub fn parse(value: &str) -> Option<Self> {
        let decoded = BASE64_URL_SAFE_NO_PAD.decode(value.as_bytes()).ok()?;
        if decoded.len() != VISITOR_ID_BYTES {
            return None;
        }
        Some(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VisitorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resolve the visitor behind a request.
///
/// Returns the incoming identifier unchanged when it is valid, otherwise a
/// new one. The flag is `true` when the identifier was just issued and the
/// caller has to hand it to the client.
pub fn resolve(incoming: Option<&str>) -> (VisitorId, bool) {
    match incoming.and_then(VisitorId::parse) {
        Some(id) => (id, false),
        None => (VisitorId::generate(), true),
    }
}

/// Cookie attributes for the visitor token
#[derive(Debug, Clone)]
pub struct VisitorCookie {
    pub name: String,
    pub max_age_days: i64,
    pub secure: bool,
}

impl VisitorCookie {
    /// Pull the visitor token out of a `Cookie` request header
    pub fn read(&self, cookie_header: &str) -> Option<String> {
        Cookie::split_parse(cookie_header)
            .filter_map(Result::ok)
            .find(|c| c.name() == self.name)
            .map(|c| c.value().to_string())
    }

    /// Build the `Set-Cookie` value persisting a visitor token
    pub fn build(&self, visitor: &VisitorId) -> Cookie<'static> {
        let mut cookie = Cookie::new(self.name.clone(), visitor.as_str().to_string());
        cookie.set_path("/");
        cookie.set_http_only(true);
        cookie.set_secure(self.secure);
        cookie.set_same_site(SameSite::Lax);
        cookie.set_max_age(Duration::days(self.max_age_days));
        cookie
    }
}
