//! Caller address resolution
//!
//! Combines the connection's remote address with the `X-Forwarded-For`
//! header. The header is untrusted and passed through verbatim; nothing
//! here validates or resolves it.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, SocketAddr};

/// How the caller's origin is reported
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OriginPolicy {
    /// `{"ip": ..., "forwarded_for": ...}` with no further interpretation
    #[default]
    Structured,
    /// A single string: the forwarded value alone for loopback peers,
    /// otherwise `"<forwarded-for>, <remote-ip>"`
    Merged,
}

/// Resolved caller address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Origin {
    Structured {
        ip: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        forwarded_for: Option<String>,
    },
    Merged(String),
}

impl Origin {
    /// Connection-level IP for the structured form
    pub fn ip(&self) -> Option<&str> {
        match self {
            Origin::Structured { ip, .. } => Some(ip),
            Origin::Merged(_) => None,
        }
    }
}

impl OriginPolicy {
    /// Resolves an origin from `remote_addr` (`ip:port`) and the raw
    /// `X-Forwarded-For` value (empty when absent)
    ///
    /// ```
    /// use httpdump::{Origin, OriginPolicy};
    ///
    /// let origin = OriginPolicy::Structured.resolve("10.0.0.5:54321", "");
    /// assert_eq!(origin, Origin::Structured { ip: "10.0.0.5".into(), forwarded_for: None });
    ///
    /// let merged = OriginPolicy::Merged.resolve("10.0.0.5:54321", "203.0.113.7");
    /// assert_eq!(merged, Origin::Merged("203.0.113.7, 10.0.0.5".into()));
    /// ```
    pub fn resolve(self, remote_addr: &str, forwarded_for: &str) -> Origin {
        let ip = remote_ip(remote_addr);
        let forwarded = Some(forwarded_for).filter(|f| !f.is_empty() && *f != ip);

        match self {
            OriginPolicy::Structured => Origin::Structured {
                forwarded_for: forwarded.map(str::to_owned),
                ip,
            },
            OriginPolicy::Merged => match forwarded {
                Some(forwarded) if is_loopback(&ip) => Origin::Merged(forwarded.to_owned()),
                Some(forwarded) => Origin::Merged(format!("{forwarded}, {ip}")),
                None => Origin::Merged(ip),
            },
        }
    }
}

/// IP portion of `ip:port`, empty when the address cannot be split
fn remote_ip(remote_addr: &str) -> String {
    match remote_addr.parse::<SocketAddr>() {
        Ok(addr) => addr.ip().to_string(),
        Err(_) => String::new(),
    }
}

fn is_loopback(ip: &str) -> bool {
    ip.parse::<IpAddr>().is_ok_and(|ip| ip.is_loopback())
}
