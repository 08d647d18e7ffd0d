#![forbid(unsafe_code)]

//! Pre-shared bearer tokens guarding the proxy API.

use axum::http::{HeaderMap, header};

/// Holds blake3 digests of the accepted tokens, never the tokens themselves.
#[derive(Clone, Debug)]
pub struct AccessGate {
    digests: Vec<[u8; 32]>,
}

impl AccessGate {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let digests = tokens
            .into_iter()
            .map(|token| token.as_ref().trim().to_string())
            .filter(|token| !token.is_empty())
            .map(|token| *blake3::hash(token.as_bytes()).as_bytes())
            .collect();
        Self { digests }
    }

    /// A gate without tokens admits nobody.
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(token) = extract_bearer(headers) else {
            return false;
        };
        let candidate = blake3::hash(token.as_bytes());
        // blake3::Hash equality is constant time
        self.digests
            .iter()
            .any(|digest| candidate == blake3::Hash::from(*digest))
    }
}

/// `Authorization: Bearer <token>`, scheme matched case-insensitively.
pub fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let mut parts = value.split_whitespace();
    let scheme = parts.next()?;
    let token = parts.next()?;
    if parts.next().is_some() || !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn extract_bearer_parses_scheme_case_insensitively() {
        assert_eq!(extract_bearer(&headers_with("Bearer abc")), Some("abc"));
        assert_eq!(extract_bearer(&headers_with("bearer   abc")), Some("abc"));
        assert_eq!(extract_bearer(&headers_with("Basic abc")), None);
        assert_eq!(extract_bearer(&headers_with("Bearer")), None);
        assert_eq!(extract_bearer(&headers_with("Bearer a b")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }

    #[test]
    fn gate_accepts_only_configured_tokens() {
        let gate = AccessGate::new(["alpha", " beta ", ""]);
        assert!(gate.is_authorized(&headers_with("Bearer alpha")));
        assert!(gate.is_authorized(&headers_with("Bearer beta")));
        assert!(!gate.is_authorized(&headers_with("Bearer gamma")));
        assert!(!gate.is_authorized(&HeaderMap::new()));
    }

    #[test]
    fn empty_gate_rejects_everything() {
        let gate = AccessGate::new(Vec::<String>::new());
        assert!(!gate.is_authorized(&headers_with("Bearer ")));
        assert!(!gate.is_authorized(&headers_with("Bearer anything")));
    }
}
