use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

pub const DEFAULT_SCHEME: &str = "https";
pub const DEFAULT_HOST: &str = "localhost";

/// Absolute URL of the page request: scheme + host + path + query.
///
/// Built once per request on the server and shipped to the client verbatim, so both sides
/// decode the same search parameters from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalUrl(String);

impl CanonicalUrl {
    /// Reconstruct the URL from request data. Missing or malformed headers fall back to
    /// `https` and `fallback_host`; this never fails.
    pub fn from_parts(
        referer: Option<&str>,
        host: Option<&str>,
        path_and_query: &str,
        fallback_host: &str,
    ) -> Self {
        let scheme = referer.and_then(scheme_of).unwrap_or(DEFAULT_SCHEME);
        let host = host
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .unwrap_or(fallback_host);
        let target = if path_and_query.starts_with('/') {
            path_and_query.to_string()
        } else {
            format!("/{path_and_query}")
        };
        Self(format!("{}://{}{}", scheme.to_ascii_lowercase(), host, target))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Raw query string without the leading `?`, empty when there is none.
    pub fn query(&self) -> &str {
        match self.0.split_once('?') {
            Some((_, q)) => q.split('#').next().unwrap_or(""),
            None => "",
        }
    }

    /// Everything before the query string.
    pub fn without_query(&self) -> &str {
        let end = self.0.find(['?', '#']).unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Path component, `/` at minimum.
    pub fn path(&self) -> &str {
        let base = self.without_query();
        let after_scheme = base.find("://").map(|i| i + 3).unwrap_or(0);
        match base[after_scheme..].find('/') {
            Some(i) => &base[after_scheme + i..],
            None => "/",
        }
    }

    /// Same location with its query string replaced. An empty query drops the `?`.
    pub fn with_query(&self, query: &str) -> Self {
        if query.is_empty() {
            Self(self.without_query().to_string())
        } else {
            Self(format!("{}?{}", self.without_query(), query))
        }
    }

    pub fn parse(raw: &str) -> Result<Self, url::ParseError> {
        let parsed = Url::parse(raw)?;
        if parsed.cannot_be_a_base() {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase);
        }
        Ok(Self(raw.to_string()))
    }
}

impl fmt::Display for CanonicalUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CanonicalUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn scheme_of(referer: &str) -> Option<&str> {
    let (scheme, _) = referer.split_once("://")?;
    let mut chars = scheme.chars();
    let first = chars.next()?;
    if !first.is_ascii_alphabetic() {
        return None;
    }
    chars
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        .then_some(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_comes_from_referer() {
        let url = CanonicalUrl::from_parts(
            Some("http://shop.test/previous"),
            Some("shop.test"),
            "/?instant_search%5Bquery%5D=phone",
            DEFAULT_HOST,
        );
        assert_eq!(url.as_str(), "http://shop.test/?instant_search%5Bquery%5D=phone");
        assert_eq!(url.query(), "instant_search%5Bquery%5D=phone");
    }

    #[test]
    fn missing_headers_fall_back() {
        let url = CanonicalUrl::from_parts(None, None, "/", DEFAULT_HOST);
        assert_eq!(url.as_str(), "https://localhost/");
        let url = CanonicalUrl::from_parts(Some("not a url"), Some("  "), "search", "example.org");
        assert_eq!(url.as_str(), "https://example.org/search");
    }

    #[test]
    fn with_query_replaces_or_drops() {
        let url = CanonicalUrl::from_parts(None, Some("a.test"), "/p?x=1#frag", DEFAULT_HOST);
        assert_eq!(url.without_query(), "https://a.test/p");
        assert_eq!(url.path(), "/p");
        assert_eq!(url.with_query("y=2").as_str(), "https://a.test/p?y=2");
        assert_eq!(url.with_query("").as_str(), "https://a.test/p");
    }
}
