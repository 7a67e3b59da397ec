//! URL validation: SSRF prevention for network tools.
//!
//! URLs must parse, use http(s), and point at a public host. If an endpoint
//! allow-list is configured the URL must also match one of its prefixes.

use ferrule_core::error::ToolError;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use url::{Host, Url};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UrlValidationError {
    #[error("Invalid URL '{url}': {reason}")]
    Invalid { url: String, reason: String },

    #[error("Unsupported URL scheme '{scheme}' (only http and https are allowed)")]
    UnsupportedScheme { scheme: String },

    #[error("URL '{url}' has no host")]
    MissingHost { url: String },

    #[error("Request to private or internal host '{host}' blocked")]
    PrivateHost { host: String },

    #[error("URL '{url}' is not in the allowed endpoints ({configured} configured)")]
    NotInAllowlist { url: String, configured: usize },
}

impl From<UrlValidationError> for ToolError {
    fn from(e: UrlValidationError) -> Self {
        ToolError::UrlNotAllowed(e.to_string())
    }
}

/// Validate a URL for outbound requests.
pub fn validate_url(raw: &str, allowed_endpoints: &[String]) -> Result<Url, UrlValidationError> {
    let trimmed = raw.trim();
    let url = Url::parse(trimmed).map_err(|e| UrlValidationError::Invalid {
        url: trimmed.into(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => {}
        other => {
            return Err(UrlValidationError::UnsupportedScheme {
                scheme: other.into(),
            });
        }
    }

    let blocked = match url.host() {
        None => {
            return Err(UrlValidationError::MissingHost {
                url: trimmed.into(),
            });
        }
        Some(Host::Domain(domain)) => is_internal_domain(domain),
        Some(Host::Ipv4(ip)) => is_blocked_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_blocked_ip(IpAddr::V6(ip)),
    };
    if blocked {
        return Err(UrlValidationError::PrivateHost {
            host: url.host_str().unwrap_or_default().into(),
        });
    }

    if !allowed_endpoints.is_empty()
        && !allowed_endpoints
            .iter()
            .any(|e| e == "*" || url.as_str().starts_with(e.as_str()) || trimmed.starts_with(e.as_str()))
    {
        return Err(UrlValidationError::NotInAllowlist {
            url: trimmed.into(),
            configured: allowed_endpoints.len(),
        });
    }

    Ok(url)
}

fn is_internal_domain(domain: &str) -> bool {
    let d = domain.trim_end_matches('.').to_lowercase();
    d == "localhost"
        || d.ends_with(".localhost")
        || d == "localhost.localdomain"
        || d.ends_with(".local")
        || d.ends_with(".internal")
}

/// Whether an address is loopback, private, link-local or otherwise not public.
pub fn is_blocked_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_blocked_v4(v4),
        IpAddr::V6(v6) => is_blocked_v6(v6),
    }
}

fn is_blocked_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_unspecified()
        || ip.is_broadcast()
        // carrier-grade NAT, 100.64.0.0/10
        || (a == 100 && (64..128).contains(&b))
}

fn is_blocked_v6(ip: Ipv6Addr) -> bool {
    if let Some(v4) = ip.to_ipv4_mapped() {
        return is_blocked_v4(v4);
    }
    let first = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        // unique local, fc00::/7
        || (first & 0xfe00) == 0xfc00
        // link-local, fe80::/10
        || (first & 0xffc0) == 0xfe80
}
