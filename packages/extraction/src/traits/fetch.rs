//! Static-fetch collaborator and URL validation for SSRF protection.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;

use crate::error::{FetchError, FetchResult, SecurityError, SecurityResult};

/// Response from a static fetch.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    pub status: u16,
    pub body: String,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Static-fetch collaborator: raw HTTP GET of a search URL.
#[async_trait]
pub trait StaticFetcher: Send + Sync {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> FetchResult<FetchResponse>;
}

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
            blocked_hosts: [
                "localhost",
                "127.0.0.1",
                "::1",
                "[::1]",
                "0.0.0.0",
                "metadata.google.internal",
                "instance-data",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            blocked_cidrs: vec![
                "10.0.0.0/8".parse().unwrap(),
                "172.16.0.0/12".parse().unwrap(),
                "192.168.0.0/16".parse().unwrap(),
                "169.254.0.0/16".parse().unwrap(), // Link-local / cloud metadata
                "127.0.0.0/8".parse().unwrap(),    // Loopback
                "::1/128".parse().unwrap(),        // IPv6 loopback
                "fc00::/7".parse().unwrap(),       // IPv6 private
                "fe80::/10".parse().unwrap(),      // IPv6 link-local
            ],
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

    /// Validate a URL for safety.
    pub fn validate(&self, url: &str) -> SecurityResult<()> {
        let parsed = url::Url::parse(url)?;

        if !self.allowed_schemes.contains(parsed.scheme()) {
            return Err(SecurityError::DisallowedScheme(parsed.scheme().to_string()));
        }

        let host = parsed.host_str().ok_or(SecurityError::NoHost)?;

        // Allowed hosts bypass the remaining checks
        if self.allowed_hosts.contains(host) {
            return Ok(());
        }

        if self.blocked_hosts.contains(host) {
            return Err(SecurityError::BlockedHost(host.to_string()));
        }

        if let Ok(ip) = host.parse::<IpAddr>() {
            for cidr in &self.blocked_cidrs {
                if cidr.contains(&ip) {
                    return Err(SecurityError::BlockedCidr(ip.to_string()));
                }
            }
        }

        Ok(())
    }
}

/// A fetcher that validates URLs before fetching.
pub struct ValidatedFetcher<F: StaticFetcher> {
    inner: F,
    validator: UrlValidator,
}

impl<F: StaticFetcher> ValidatedFetcher<F> {
    pub fn new(fetcher: F) -> Self {
        Self {
            inner: fetcher,
            validator: UrlValidator::new(),
        }
    }

    pub fn with_validator(fetcher: F, validator: UrlValidator) -> Self {
        Self {
            inner: fetcher,
            validator,
        }
    }
}

#[async_trait]
impl<F: StaticFetcher> StaticFetcher for ValidatedFetcher<F> {
    async fn get(&self, url: &str, headers: &HashMap<String, String>) -> FetchResult<FetchResponse> {
        self.validator.validate(url).map_err(FetchError::Security)?;
        self.inner.get(url, headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blocks_localhost() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://localhost/").is_err());
        assert!(validator.validate("http://127.0.0.1/").is_err());
    }

    #[test]
    fn blocks_private_ips_and_metadata() {
        let validator = UrlValidator::new();
        assert!(validator.validate("http://10.0.0.1/").is_err());
        assert!(validator.validate("http://192.168.1.1/").is_err());
        assert!(validator.validate("http://169.254.169.254/").is_err());
    }

    #[test]
    fn blocks_non_http_schemes() {
        let validator = UrlValidator::new();
        assert!(validator.validate("file:///etc/passwd").is_err());
        assert!(validator.validate("ftp://example.com/").is_err());
    }

    #[test]
    fn allows_public_urls() {
        let validator = UrlValidator::new();
        assert!(validator.validate("https://freshmart.example/search?q=milk").is_ok());
    }

    #[test]
    fn allowed_hosts_bypass() {
        let validator = UrlValidator::new().allow_host("localhost");
        assert!(validator.validate("http://localhost/").is_ok());
    }
}
