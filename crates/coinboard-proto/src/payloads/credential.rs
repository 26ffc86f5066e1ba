//! CSRF-style credential presented in the CONNECT frame.
//!
//! Fetched from a companion HTTP endpoint as
//! `{"headerName": "...", "token": "..."}`, or recovered from a cookie when
//! the endpoint only sets one.

use serde::{Deserialize, Serialize};

use crate::errors::Result;

/// Default cookie carrying the token.
pub const DEFAULT_COOKIE_NAME: &str = "XSRF-TOKEN";

/// Default header the token is presented under.
pub const DEFAULT_HEADER_NAME: &str = "X-XSRF-TOKEN";

/// Header name / token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    /// Header the token must be sent under.
    pub header_name: String,
    /// Token value.
    pub token: String,
}

impl Credential {
    /// Credential with the given header name.
    pub fn new(header_name: impl Into<String>, token: impl Into<String>) -> Self {
        Self { header_name: header_name.into(), token: token.into() }
    }

    /// Parse the credential endpoint response.
    pub fn from_json(body: &str) -> Result<Self> {
        Ok(serde_json::from_str(body)?)
    }

    /// Extract the token from a `Cookie` or `Set-Cookie` header value.
    ///
    /// Returns `None` if the cookie is absent or empty.
    pub fn from_cookie_header(value: &str, cookie_name: &str, header_name: &str) -> Option<Self> {
        value
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == cookie_name)
            .map(|(_, token)| token.trim().trim_matches('"'))
            .filter(|token| !token.is_empty())
            .map(|token| Self::new(header_name, token))
    }
}
