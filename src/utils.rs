//! Address helpers: base URL resolution and redirect trust checks

use anyhow::{anyhow, Result};
use std::net::{IpAddr, Ipv6Addr};
use url::{Host, Url};

/// Candidate base URLs for a user-supplied host.
///
/// A host with an explicit scheme yields exactly that URL. A bare host or
/// `host:port` yields `http://` first, then `https://`.
pub fn candidate_base_urls(host: &str) -> Result<Vec<Url>> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() {
        return Err(anyhow!("modem host is empty"));
    }

    if host.contains("://") {
        let url = Url::parse(&format!("{}/", host))?;
        return Ok(vec![url]);
    }

    let mut urls = Vec::with_capacity(2);
    for scheme in ["http", "https"] {
        urls.push(Url::parse(&format!("{}://{}/", scheme, host))?);
    }
    Ok(urls)
}

/// Join a modem-relative path (`/cmSignalData.htm`) onto a base URL
pub fn join_path(base: &Url, path: &str) -> Result<Url> {
    Ok(base.join(path.trim_start_matches('/'))?)
}

/// Host portion of a URL for messages, falling back to the full URL
pub fn host_label(url: &Url) -> String {
    match (url.host_str(), url.port()) {
        (Some(h), Some(p)) => format!("{}:{}", h, p),
        (Some(h), None) => h.to_string(),
        _ => url.to_string(),
    }
}

/// RFC1918, loopback, link-local and IPv6 unique-local addresses
pub fn is_private_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() || v4.is_loopback() || v4.is_link_local(),
        IpAddr::V6(v6) => {
            v6.is_loopback() || is_unique_local(&v6) || is_unicast_link_local(&v6)
        }
    }
}

fn is_unique_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xfe00) == 0xfc00
}

fn is_unicast_link_local(ip: &Ipv6Addr) -> bool {
    (ip.segments()[0] & 0xffc0) == 0xfe80
}

/// Whether the URL's host is on the local network
pub fn is_private_host(url: &Url) -> bool {
    match url.host() {
        Some(Host::Ipv4(ip)) => is_private_ip(IpAddr::V4(ip)),
        Some(Host::Ipv6(ip)) => is_private_ip(IpAddr::V6(ip)),
        Some(Host::Domain(name)) => name.eq_ignore_ascii_case("localhost"),
        None => false,
    }
}

/// A redirect may be followed when it stays on the same host, or when both
/// ends are private-network addresses.
pub fn is_trusted_redirect(origin: &Url, target: &Url) -> bool {
    let same_host = match (origin.host_str(), target.host_str()) {
        (Some(a), Some(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    };
    same_host || (is_private_host(origin) && is_private_host(target))
}
