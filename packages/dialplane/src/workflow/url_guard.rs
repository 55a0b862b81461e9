//! Outbound URL validation for webhook-type actions.
//!
//! Config strings are interpolated from call payloads, so a destination URL
//! is attacker-influenced by construction. Webhook actions only talk to
//! public HTTPS endpoints: no plain http, no localhost, no link-local, no
//! RFC1918 targets.

use std::net::IpAddr;

use thiserror::Error;
use url::{Host, Url};

#[derive(Error, Debug, PartialEq, Eq, Clone)]
pub enum UrlGuardError {
    #[error("not a valid url")]
    Invalid,
    #[error("scheme {0:?} is not allowed, only https")]
    Scheme(String),
    #[error("host is not allowed")]
    ForbiddenHost,
}

pub fn validate_webhook_url(raw: &str) -> Result<Url, UrlGuardError> {
    let url = Url::parse(raw).map_err(|_| UrlGuardError::Invalid)?;

    if url.scheme() != "https" {
        return Err(UrlGuardError::Scheme(url.scheme().to_string()));
    }

    match url.host() {
        None => Err(UrlGuardError::ForbiddenHost),
        Some(Host::Domain(domain)) => {
            let lowered = domain.to_ascii_lowercase();
            if lowered == "localhost" || lowered.ends_with(".localhost") {
                return Err(UrlGuardError::ForbiddenHost);
            }
            Ok(url)
        }
        Some(Host::Ipv4(ip)) => {
            if is_forbidden_ip(IpAddr::V4(ip)) {
                Err(UrlGuardError::ForbiddenHost)
            } else {
                Ok(url)
            }
        }
        Some(Host::Ipv6(ip)) => {
            if is_forbidden_ip(IpAddr::V6(ip)) {
                Err(UrlGuardError::ForbiddenHost)
            } else {
                Ok(url)
            }
        }
    }
}

fn is_forbidden_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_unspecified()
        }
        IpAddr::V6(v6) => v6.is_loopback() || v6.is_unspecified(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_public_https() {
        validate_webhook_url("https://hooks.example.com/x?y=1").unwrap();
        validate_webhook_url("https://93.184.216.34/path").unwrap();
    }

    #[test]
    fn rejects_plain_http() {
        assert_eq!(
            validate_webhook_url("http://hooks.example.com/x"),
            Err(UrlGuardError::Scheme("http".into()))
        );
    }

    #[test]
    fn rejects_local_and_private_targets() {
        for bad in [
            "https://localhost/x",
            "https://internal.localhost/x",
            "https://127.0.0.1/x",
            "https://10.1.2.3/x",
            "https://172.16.0.9/x",
            "https://192.168.1.1/x",
            "https://169.254.169.254/latest/meta-data",
            "https://[::1]/x",
        ] {
            assert_eq!(
                validate_webhook_url(bad),
                Err(UrlGuardError::ForbiddenHost),
                "{} was allowed",
                bad
            );
        }
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(validate_webhook_url("not a url"), Err(UrlGuardError::Invalid));
        assert_eq!(
            validate_webhook_url("ftp://example.com/f"),
            Err(UrlGuardError::Scheme("ftp".into()))
        );
    }
}
