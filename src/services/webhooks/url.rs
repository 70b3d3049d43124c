//! Destination URL validation.
//!
//! Merchant-supplied webhook URLs are fetched from inside the service
//! network, so anything resolving to loopback, private ranges, link-local,
//! or cloud metadata endpoints is rejected at enqueue time.

use std::net::IpAddr;

use reqwest::Url;

/// Hosts rejected outright.
const DENY_LIST: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "0.0.0.0",
    "::1",
    "169.254.169.254",
    "metadata.google.internal",
    "metadata.goog",
];

/// Suffixes that mark internal name spaces.
const DENIED_SUFFIXES: &[&str] = &[".internal", ".local"];

/// Result type for URL validation.
pub type Result<T> = std::result::Result<T, UrlError>;

/// Why a destination URL was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlError {
    #[error("URL does not parse: {0}")]
    Unparseable(String),

    #[error("URL scheme not permitted: {0}")]
    Scheme(String),

    #[error("URL host not permitted: {0}")]
    Host(String),
}

/// Validate a webhook destination URL.
///
/// `allow_http` admits plain http in development only.
pub fn validate_webhook_url(raw: &str, allow_http: bool) -> Result<()> {
    let url = Url::parse(raw).map_err(|e| UrlError::Unparseable(format!("{raw}: {e}")))?;

    match url.scheme() {
        "https" => {}
        "http" if allow_http => {}
        other => return Err(UrlError::Scheme(other.to_string())),
    }

    let host = url
        .host_str()
        .ok_or_else(|| UrlError::Host("missing host".to_string()))?
        .to_ascii_lowercase();
    let host = host.trim_matches(|c| c == '[' || c == ']');

    if DENY_LIST.contains(&host) {
        return Err(UrlError::Host(host.to_string()));
    }

    if DENIED_SUFFIXES.iter().any(|suffix| host.ends_with(suffix)) {
        return Err(UrlError::Host(host.to_string()));
    }

    if let Ok(ip) = host.parse::<IpAddr>() {
        if is_private_address(ip) {
            return Err(UrlError::Host(host.to_string()));
        }
    }

    Ok(())
}

/// Private, loopback, link-local, and unique-local address space.
fn is_private_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, _, _] = v4.octets();
            v4.is_loopback()
                || v4.is_unspecified()
                || a == 10
                || (a == 172 && (16..=31).contains(&b))
                || (a == 192 && b == 168)
                || (a == 169 && b == 254)
        }
        IpAddr::V6(v6) => {
            let segments = v6.segments();
            v6.is_loopback()
                || v6.is_unspecified()
                // fc00::/7 unique local
                || (segments[0] & 0xfe00) == 0xfc00
                // fe80::/10 link local
                || (segments[0] & 0xffc0) == 0xfe80
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_public_https() {
        assert!(validate_webhook_url("https://merchant.example.com/hooks", false).is_ok());
        assert!(validate_webhook_url("https://8.8.8.8/hooks", false).is_ok());
    }

    #[test]
    fn test_http_only_in_development() {
        assert!(validate_webhook_url("http://merchant.example.com/hooks", true).is_ok());
        assert_eq!(
            validate_webhook_url("http://merchant.example.com/hooks", false),
            Err(UrlError::Scheme("http".to_string()))
        );
    }

    #[test]
    fn test_rejects_other_schemes() {
        assert!(matches!(
            validate_webhook_url("ftp://example.com/x", true),
            Err(UrlError::Scheme(_))
        ));
        assert!(matches!(
            validate_webhook_url("file:///etc/passwd", true),
            Err(UrlError::Unparseable(_)) | Err(UrlError::Scheme(_)) | Err(UrlError::Host(_))
        ));
    }

    #[test]
    fn test_rejects_deny_list_hosts() {
        for url in [
            "https://localhost/hooks",
            "https://127.0.0.1/hooks",
            "https://0.0.0.0/hooks",
            "https://[::1]/hooks",
            "https://169.254.169.254/latest/meta-data/",
            "https://metadata.google.internal/computeMetadata/",
        ] {
            assert!(
                matches!(validate_webhook_url(url, true), Err(UrlError::Host(_))),
                "expected rejection: {url}"
            );
        }
    }

    #[test]
    fn test_rejects_private_ipv4_ranges() {
        for url in [
            "https://10.0.0.5/hooks",
            "https://172.16.0.1/hooks",
            "https://172.31.255.255/hooks",
            "https://192.168.1.1/hooks",
            "https://169.254.0.1/hooks",
        ] {
            assert!(
                matches!(validate_webhook_url(url, true), Err(UrlError::Host(_))),
                "expected rejection: {url}"
            );
        }
        // Adjacent public space stays allowed.
        assert!(validate_webhook_url("https://172.32.0.1/hooks", true).is_ok());
        assert!(validate_webhook_url("https://11.0.0.1/hooks", true).is_ok());
    }

    #[test]
    fn test_rejects_private_ipv6_ranges() {
        for url in [
            "https://[fc00::1]/hooks",
            "https://[fd12:3456::1]/hooks",
            "https://[fe80::1]/hooks",
        ] {
            assert!(
                matches!(validate_webhook_url(url, true), Err(UrlError::Host(_))),
                "expected rejection: {url}"
            );
        }
    }

    #[test]
    fn test_rejects_internal_suffixes() {
        assert!(matches!(
            validate_webhook_url("https://service.internal/hooks", true),
            Err(UrlError::Host(_))
        ));
        assert!(matches!(
            validate_webhook_url("https://printer.local/hooks", true),
            Err(UrlError::Host(_))
        ));
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(matches!(
            validate_webhook_url("not a url", true),
            Err(UrlError::Unparseable(_))
        ));
    }
}
