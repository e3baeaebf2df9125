//! URL validation for SSRF protection.

use std::collections::HashSet;
use std::net::IpAddr;

use crate::error::{SecurityError, SecurityResult};

const DEFAULT_BLOCKED_HOSTS: &[&str] = &[
    "localhost",
    "127.0.0.1",
    "::1",
    "[::1]",
    "0.0.0.0",
    "metadata.google.internal",
    "metadata.gke.internal",
    "instance-data",
];

const DEFAULT_BLOCKED_CIDRS: &[&str] = &[
    "10.0.0.0/8",
    "172.16.0.0/12",
    "192.168.0.0/16",
    "169.254.0.0/16", // Link-local / cloud metadata
    "127.0.0.0/8",    // Loopback
    "::1/128",        // IPv6 loopback
    "fc00::/7",       // IPv6 private
    "fe80::/10",      // IPv6 link-local
];

/// URL validator for SSRF protection.
///
/// Validates URLs before fetching to prevent:
/// - Access to internal services (localhost, 127.0.0.1)
/// - Access to private IP ranges (10.x, 172.16.x, 192.168.x)
/// - Access to cloud metadata services (169.254.x)
/// - Non-HTTP(S) schemes (file://, ftp://)
#[derive(Debug, Clone)]
pub struct UrlValidator {
    allowed_schemes: HashSet<String>,
    blocked_hosts: HashSet<String>,
    blocked_cidrs: Vec<ipnet::IpNet>,
    /// Hosts that bypass all other checks
    allowed_hosts: HashSet<String>,
}

impl Default for UrlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl UrlValidator {
    /// Create a new URL validator with default security rules.
    pub fn new() -> Self {
        Self {
            allowed_schemes: ["http", "https"].into_iter().map(String::from).collect(),
            blocked_hosts: DEFAULT_BLOCKED_HOSTS
                .iter()
                .map(|h| h.to_string())
                .collect(),
            blocked_cidrs: DEFAULT_BLOCKED_CIDRS
                .iter()
                .filter_map(|c| c.parse().ok())
                .collect(),
            allowed_hosts: HashSet::new(),
        }
    }

    /// Add an allowed host (bypasses validation).
    pub fn allow_host(mut self, host: impl Into<String>) -> Self {
        self.allowed_hosts.insert(host.into());
        self
    }

    /// Block an additional host.
    pub fn block_host(mut self, host: impl Into<String>) -> Self {
        self.blocked_hosts.insert(host.into());
        self
    }

    /// Validate a URL without resolving DNS.
    pub fn validate(&self, url: &str) -> SecurityResult<()> {
        let parsed = url::Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        if self.blocked_hosts.contains(host) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if let Ok(ip) = bare.parse::<IpAddr>() {
            self.check_ip(ip)?;
        }

        Ok(())
    }

    /// Validate a URL and resolve DNS to check the actual IP.
    ///
    /// This catches DNS rebinding where a public hostname resolves
    /// to an internal IP.
    pub async fn validate_with_dns(&self, url: &str) -> SecurityResult<()> {
        self.validate(url)?;

        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        // Literal IPs were already checked
        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<IpAddr>().is_ok() {
            return Ok(());
        }

        let port = parsed.port_or_known_default().unwrap_or(80);
        let addrs = tokio::net::lookup_host(format!("{}:{}", host, port))
            .await
            .map_err(|e| SecurityError::DnsResolution(e.to_string()))?;

        for addr in addrs {
            self.check_ip(addr.ip()).map_err(|_| {
                SecurityError::BlockedCidr(format!(
                    "DNS for {} resolved to blocked IP {}",
                    host,
                    addr.ip()
                ))
            })?;
        }

        Ok(())
    }

    fn check_ip(&self, ip: IpAddr) -> SecurityResult<()> {
        if self.blocked_cidrs.iter().any(|cidr| cidr.contains(&ip)) {
            return Err(SecurityError::BlockedCidr(ip.to_string()));
        }
        Ok(())
    }
}
