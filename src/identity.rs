//! Caller identifier extraction from proxy headers.
//!
//! Candidates are opaque strings: no IP-format validation is done. The only
//! filter is an injection guard that refuses values containing quote or
//! semicolon characters. A refused candidate is treated as missing and the
//! next source is tried.

use serde::{Deserialize, Serialize};
use tracing::warn;

/// Identifier used when no usable source is present.
pub const UNKNOWN_IDENTIFIER: &str = "unknown";

/// Header carrying the proxy chain, client first.
pub const FORWARDED_FOR: &str = "x-forwarded-for";
/// Header carrying the single client address set by the edge proxy.
pub const REAL_IP: &str = "x-real-ip";
/// Header carrying the bearer token of authenticated callers.
pub const AUTHORIZATION: &str = "authorization";

/// Characters that disqualify a candidate identifier.
const FORBIDDEN_CHARS: [char; 3] = ['\'', '"', ';'];

/// Bearer token characters kept in a user identifier.
const TOKEN_PREFIX_LEN: usize = 16;

/// Longest identifier written to logs.
const LOG_TRUNCATE_LEN: usize = 50;

/// The headers relevant to identifying a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHeaders {
    /// `X-Forwarded-For`
    #[serde(default)]
    pub forwarded_for: Option<String>,
    /// `X-Real-IP`
    #[serde(default)]
    pub real_ip: Option<String>,
    /// `Authorization`
    #[serde(default)]
    pub authorization: Option<String>,
}

impl ProxyHeaders {
    /// Collect the relevant headers from name/value pairs.
    ///
    /// Header names are matched case-insensitively. When a header repeats,
    /// the first occurrence wins.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut headers = Self::default();
        for (name, value) in pairs {
            let slot = match name.as_ref().to_ascii_lowercase().as_str() {
                FORWARDED_FOR => &mut headers.forwarded_for,
                REAL_IP => &mut headers.real_ip,
                AUTHORIZATION => &mut headers.authorization,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into());
            }
        }
        headers
    }

    /// The caller's network identifier.
    ///
    /// Takes the first hop of `X-Forwarded-For`, then `X-Real-IP`, then
    /// falls back to [`UNKNOWN_IDENTIFIER`].
    pub fn network_identifier(&self) -> String {
        let forwarded = self
            .forwarded_for
            .as_deref()
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .and_then(|candidate| accept(FORWARDED_FOR, candidate));

        forwarded
            .or_else(|| {
                self.real_ip
                    .as_deref()
                    .and_then(|candidate| accept(REAL_IP, candidate))
            })
            .unwrap_or(UNKNOWN_IDENTIFIER)
            .to_string()
    }

    /// The caller's rate limit identifier.
    ///
    /// Authenticated callers are identified as `user:<token prefix>` so that
    /// full tokens never land in the store; everyone else by network address.
    pub fn client_identifier(&self) -> String {
        self.bearer_token()
            .map(|token| {
                let prefix: String = token.chars().take(TOKEN_PREFIX_LEN).collect();
                format!("user:{}", prefix)
            })
            .unwrap_or_else(|| self.network_identifier())
    }

    fn bearer_token(&self) -> Option<&str> {
        let token = self.authorization.as_deref()?.strip_prefix("Bearer ")?;
        accept(AUTHORIZATION, token)
    }
}

/// Whether `candidate` is free of injection characters.
pub fn is_safe_identifier(candidate: &str) -> bool {
    !candidate.contains(FORBIDDEN_CHARS)
}

/// Shorten an identifier for log output.
pub fn truncate_for_log(identifier: &str) -> &str {
    match identifier.char_indices().nth(LOG_TRUNCATE_LEN) {
        Some((idx, _)) => &identifier[..idx],
        None => identifier,
    }
}

fn accept<'a>(source: &'static str, candidate: &'a str) -> Option<&'a str> {
    if candidate.is_empty() {
        return None;
    }
    if !is_safe_identifier(candidate) {
        warn!(
            source = source,
            candidate = %truncate_for_log(candidate),
            "Rejected identifier containing forbidden characters"
        );
        return None;
    }
    Some(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn forwarded(value: &str) -> ProxyHeaders {
        ProxyHeaders {
            forwarded_for: Some(value.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_first_forwarded_hop() {
        let headers = forwarded("1.2.3.4, 5.6.6.7");
        assert_eq!(headers.network_identifier(), "1.2.3.4");
    }

    #[test]
    fn test_forwarded_hop_is_trimmed() {
        let headers = forwarded("  10.0.0.1  ,10.0.0.2");
        assert_eq!(headers.network_identifier(), "10.0.0.1");
    }

    #[test]
    fn test_no_headers_is_unknown() {
        assert_eq!(ProxyHeaders::default().network_identifier(), UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_real_ip_used_verbatim() {
        let headers = ProxyHeaders {
            real_ip: Some(" 172.16.0.9".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.network_identifier(), " 172.16.0.9");
    }

    #[test]
    fn test_injection_falls_through_to_unknown() {
        let headers = forwarded("1.2.3.4'; DROP TABLE--");
        assert_eq!(headers.network_identifier(), UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_injection_falls_through_to_real_ip() {
        let headers = ProxyHeaders {
            forwarded_for: Some("1.2.3.4'; DROP TABLE--".to_string()),
            real_ip: Some("8.8.8.8".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.network_identifier(), "8.8.8.8");
    }

    #[test]
    fn test_injection_in_real_ip_rejected() {
        let headers = ProxyHeaders {
            real_ip: Some("8.8.8.8\"".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.network_identifier(), UNKNOWN_IDENTIFIER);
    }

    #[test]
    fn test_malformed_address_is_opaque() {
        let headers = forwarded("1.2.3");
        assert_eq!(headers.network_identifier(), "1.2.3");
    }

    #[test]
    fn test_empty_forwarded_hop_falls_through() {
        let headers = ProxyHeaders {
            forwarded_for: Some(" , 1.1.1.1".to_string()),
            real_ip: Some("2.2.2.2".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.network_identifier(), "2.2.2.2");
    }

    #[test]
    fn test_from_pairs_case_insensitive() {
        let headers = ProxyHeaders::from_pairs([
            ("X-Forwarded-For", "3.3.3.3"),
            ("x-forwarded-for", "4.4.4.4"),
            ("Content-Type", "application/json"),
            ("X-Real-IP", "5.5.5.5"),
        ]);
        assert_eq!(headers.forwarded_for.as_deref(), Some("3.3.3.3"));
        assert_eq!(headers.real_ip.as_deref(), Some("5.5.5.5"));
        assert_eq!(headers.authorization, None);
    }

    #[test]
    fn test_bearer_token_identifier() {
        let headers = ProxyHeaders {
            forwarded_for: Some("1.2.3.4".to_string()),
            authorization: Some("Bearer test_token_12345".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.client_identifier(), "user:test_token_12345");
    }

    #[test]
    fn test_bearer_token_truncated() {
        let headers = ProxyHeaders {
            authorization: Some("Bearer abcdefghijklmnopqrstuvwxyz".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.client_identifier(), "user:abcdefghijklmnop");
    }

    #[test]
    fn test_non_bearer_auth_uses_address() {
        let headers = ProxyHeaders {
            forwarded_for: Some("1.2.3.4".to_string()),
            authorization: Some("Basic dXNlcjpwYXNz".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.client_identifier(), "1.2.3.4");
    }

    #[test]
    fn test_unsafe_bearer_token_uses_address() {
        let headers = ProxyHeaders {
            real_ip: Some("9.9.9.9".to_string()),
            authorization: Some("Bearer abc';--".to_string()),
            ..Default::default()
        };
        assert_eq!(headers.client_identifier(), "9.9.9.9");
    }

    #[test]
    fn test_truncate_for_log() {
        let long = "a".repeat(80);
        assert_eq!(truncate_for_log(&long).len(), 50);
        assert_eq!(truncate_for_log("short"), "short");
    }
}
