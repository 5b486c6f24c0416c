//! Outbound URL validation for receipt pages.
//!
//! Only http(s) URLs whose host resolves exclusively to public addresses
//! may be fetched. QR codes are user input, so a crafted code must not be
//! able to reach loopback, private networks or cloud metadata endpoints.

use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, ToSocketAddrs};

use reqwest::Url;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UrlRejection {
    #[error("malformed URL")]
    Malformed,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("URL has no host")]
    MissingHost,

    #[error("host does not resolve: {0}")]
    Unresolvable(String),

    #[error("address not allowed: {0}")]
    BlockedAddress(IpAddr),
}

/// Hostname lookup, swappable in tests.
pub trait Resolver: Send + Sync {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>>;
}

/// Resolves through the operating system.
pub struct SystemResolver;

impl Resolver for SystemResolver {
    fn resolve(&self, host: &str, port: u16) -> io::Result<Vec<IpAddr>> {
        Ok((host, port).to_socket_addrs()?.map(|a| a.ip()).collect())
    }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
    let [a, b, ..] = ip.octets();
    let this_network = a == 0;
    let shared = a == 100 && (64..128).contains(&b);
    !(this_network
        || ip.is_loopback()
        || ip.is_private()
        || ip.is_link_local()
        || ip.is_broadcast()
        || ip.is_documentation()
        || shared)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
    if ip.is_loopback() || ip.is_unspecified() {
        return false;
    }
    // ::ffff:a.b.c.d and the deprecated ::a.b.c.d both carry an IPv4 target.
    if let Some(v4) = ip.to_ipv4() {
        return is_public_v4(v4);
    }
    let segments = ip.segments();
    // NAT64 well-known prefix 64:ff9b::/96.
    if segments[..6] == [0x64, 0xff9b, 0, 0, 0, 0] {
        let [.., hi, lo] = segments;
        return is_public_v4(Ipv4Addr::from(((hi as u32) << 16) | lo as u32));
    }
    let unique_local = segments[0] & 0xfe00 == 0xfc00;
    let link_local = segments[0] & 0xffc0 == 0xfe80;
    !(unique_local || link_local)
}

pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_public_v4(v4),
        IpAddr::V6(v6) => is_public_v6(v6),
    }
}

/// A URL that passed the guard, with the addresses it was checked against.
/// Connections must go to `addrs` only, never to a fresh lookup of the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedUrl {
    pub url: Url,
    pub addrs: Vec<SocketAddr>,
}

impl ValidatedUrl {
    /// Hostname to pin, or `None` for IP literals.
    pub fn pinned_host(&self) -> Option<&str> {
        self.url.domain()
    }
}

/// Check that `raw` may be fetched. Every resolved address must be public.
pub fn validate_url(raw: &str, resolver: &dyn Resolver) -> Result<ValidatedUrl, UrlRejection> {
    let url = Url::parse(raw.trim()).map_err(|_| UrlRejection::Malformed)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlRejection::UnsupportedScheme(url.scheme().to_string()));
    }

    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or(UrlRejection::MissingHost)?;
    let bare = host.trim_start_matches('[').trim_end_matches(']');

    let port = url.port_or_known_default().unwrap_or(443);
    let addresses = match bare.parse::<IpAddr>() {
        Ok(ip) => vec![ip],
        Err(_) => resolver
            .resolve(bare, port)
            .map_err(|_| UrlRejection::Unresolvable(bare.to_string()))?,
    };

    if addresses.is_empty() {
        return Err(UrlRejection::Unresolvable(bare.to_string()));
    }

    if let Some(blocked) = addresses.iter().copied().find(|ip| !is_public(*ip)) {
        tracing::warn!(url = %raw, ip = %blocked, "Blocked receipt URL pointing at a non-public address");
        return Err(UrlRejection::BlockedAddress(blocked));
    }

    let addrs = addresses.into_iter().map(|ip| SocketAddr::new(ip, port)).collect();
    Ok(ValidatedUrl { url, addrs })
}
