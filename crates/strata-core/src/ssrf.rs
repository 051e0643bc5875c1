//! URL safety checks.
//!
//! Every fetch starts here. The engine talks to arbitrary caller-supplied
//! URLs, so requests that could reach internal infrastructure are rejected
//! before any network activity: non-HTTP schemes, loopback, private and
//! link-local addresses, and ports outside the expected web set.

use std::net::IpAddr;

use url::{Host, Url};

use crate::{Error, ErrorKind, Result};

/// Ports a fetch is allowed to target, besides the scheme defaults.
const ALLOWED_PORTS: &[u16] = &[80, 443, 8080, 8443];

/// Hostnames that always resolve locally.
const LOCAL_HOSTNAMES: &[&str] = &["localhost", "localhost.localdomain"];

/// Parses and checks a caller-supplied URL.
///
/// Returns the parsed [`Url`] on success so the caller never parses twice.
///
/// # Errors
///
/// Returns [`ErrorKind::UrlUnsafe`] for non-`http(s)` schemes, private or
/// loopback hosts, and disallowed ports.
pub fn check_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw)?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(Error::new(
                ErrorKind::UrlUnsafe,
                format!("scheme {scheme:?} is not fetchable"),
            ));
        }
    }

    let Some(host) = url.host() else {
        return Err(Error::new(ErrorKind::UrlUnsafe, "URL has no host"));
    };

    match host {
        Host::Domain(domain) => {
            let domain = domain.to_ascii_lowercase();
            if LOCAL_HOSTNAMES.contains(&domain.as_str())
                || domain.ends_with(".localhost")
                || domain.ends_with(".local")
                || domain.ends_with(".internal")
            {
                return Err(Error::new(
                    ErrorKind::UrlUnsafe,
                    format!("host {domain:?} resolves locally"),
                ));
            }
        }
        Host::Ipv4(addr) => check_ip(IpAddr::V4(addr))?,
        Host::Ipv6(addr) => check_ip(IpAddr::V6(addr))?,
    }

    if let Some(port) = url.port()
        && !ALLOWED_PORTS.contains(&port)
    {
        return Err(Error::new(
            ErrorKind::UrlUnsafe,
            format!("port {port} is not fetchable"),
        ));
    }

    Ok(url)
}

fn check_ip(addr: IpAddr) -> Result<()> {
    let unsafe_reason = match addr {
        IpAddr::V4(v4) => {
            if v4.is_loopback() {
                Some("loopback")
            } else if v4.is_private() {
                Some("private")
            } else if v4.is_link_local() {
                Some("link-local")
            } else if v4.is_unspecified() {
                Some("unspecified")
            } else if v4.is_broadcast() {
                Some("broadcast")
            } else {
                None
            }
        }
        IpAddr::V6(v6) => {
            if v6.is_loopback() {
                Some("loopback")
            } else if v6.is_unspecified() {
                Some("unspecified")
            } else if (v6.segments()[0] & 0xfe00) == 0xfc00 {
                Some("unique-local")
            } else if (v6.segments()[0] & 0xffc0) == 0xfe80 {
                Some("link-local")
            } else {
                None
            }
        }
    };

    match unsafe_reason {
        Some(reason) => Err(Error::new(
            ErrorKind::UrlUnsafe,
            format!("address {addr} is {reason}"),
        )),
        None => Ok(()),
    }
}

/// Extracts the registrable host of a URL for per-domain bookkeeping.
///
/// Falls back to the raw host string; the engine keys its maps by hostname,
/// not by registrable suffix, so `shop.example.com` and `example.com` learn
/// independently.
#[must_use]
pub fn domain_of(url: &Url) -> String {
    url.host_str().unwrap_or_default().to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_public_https() {
        assert!(check_url("https://example.com/article").is_ok());
        assert!(check_url("http://example.com:8080/feed").is_ok());
    }

    #[test]
    fn rejects_non_http_schemes() {
        for url in ["ftp://example.com/", "file:///etc/passwd", "gopher://x/"] {
            let error = check_url(url).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::UrlUnsafe);
        }
    }

    #[test]
    fn rejects_local_hosts() {
        for url in [
            "http://localhost/admin",
            "http://127.0.0.1/",
            "http://10.0.0.8/",
            "http://192.168.1.1/",
            "http://169.254.169.254/latest/meta-data/",
            "http://[::1]/",
            "http://metadata.internal/",
        ] {
            let error = check_url(url).unwrap_err();
            assert_eq!(error.kind(), ErrorKind::UrlUnsafe, "url: {url}");
        }
    }

    #[test]
    fn rejects_odd_ports() {
        let error = check_url("http://example.com:22/").unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UrlUnsafe);
    }

    #[test]
    fn domain_is_lowercased_host() {
        let url = check_url("https://Shop.Example.COM/items").unwrap();
        assert_eq!(domain_of(&url), "shop.example.com");
    }
}
