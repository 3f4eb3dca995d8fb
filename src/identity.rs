//! Instance identity resolution.

use crate::config::IdentityConfig;
use async_trait::async_trait;
use std::ffi::OsString;
use std::io;
use tracing::warn;

/// Supplies the identity string embedded in a result's source.
///
/// Resolution must not fail a call; implementations degrade to a fallback.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self) -> String;
}

/// Host name lookup used by [`HostnameResolver`].
pub type HostnameLookup = fn() -> io::Result<OsString>;

/// Resolves the identity from the host name.
#[derive(Debug, Clone)]
pub struct HostnameResolver {
    lookup: HostnameLookup,
    fallback: String,
}

impl HostnameResolver {
    pub fn new(fallback: impl Into<String>) -> Self {
        Self::with_lookup(hostname::get, fallback)
    }

    /// Resolve through `lookup` instead of the system host name.
    pub fn with_lookup(lookup: HostnameLookup, fallback: impl Into<String>) -> Self {
        Self {
            lookup,
            fallback: fallback.into(),
        }
    }
}

#[async_trait]
impl IdentityResolver for HostnameResolver {
    async fn resolve(&self) -> String {
        match (self.lookup)() {
            Ok(name) if !name.is_empty() => name.to_string_lossy().to_string(),
            Ok(_) => {
                warn!(fallback = %self.fallback, "Empty hostname, using fallback identity");
                self.fallback.clone()
            }
            Err(e) => {
                warn!(error = %e, fallback = %self.fallback, "Hostname lookup failed, using fallback identity");
                self.fallback.clone()
            }
        }
    }
}

/// A fixed identity.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub String);

#[async_trait]
impl IdentityResolver for StaticIdentity {
    async fn resolve(&self) -> String {
        self.0.clone()
    }
}

/// Build the resolver described by the configuration.
pub fn from_config(config: &IdentityConfig) -> Box<dyn IdentityResolver> {
    match &config.fixed {
        Some(identity) => Box::new(StaticIdentity(identity.clone())),
        None => Box::new(HostnameResolver::new(config.fallback.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_identity() {
        let resolver = StaticIdentity("pod-3".to_string());
        assert_eq!(resolver.resolve().await, "pod-3");
    }

    #[tokio::test]
    async fn test_hostname_never_empty() {
        let resolver = HostnameResolver::new("fallback-host");
        assert!(!resolver.resolve().await.is_empty());
    }

    #[tokio::test]
    async fn test_lookup_error_uses_fallback() {
        let resolver = HostnameResolver::with_lookup(
            || Err(io::Error::new(io::ErrorKind::Other, "no hostname")),
            "fallback-host",
        );
        assert_eq!(resolver.resolve().await, "fallback-host");
    }

    #[tokio::test]
    async fn test_empty_hostname_uses_fallback() {
        let resolver = HostnameResolver::with_lookup(|| Ok(OsString::new()), "fallback-host");
        assert_eq!(resolver.resolve().await, "fallback-host");
    }

    #[tokio::test]
    async fn test_lookup_result_used() {
        let resolver = HostnameResolver::with_lookup(|| Ok(OsString::from("node-9")), "unused");
        assert_eq!(resolver.resolve().await, "node-9");
    }

    #[tokio::test]
    async fn test_from_config_prefers_override() {
        let config = IdentityConfig {
            fixed: Some("edge-1".to_string()),
            fallback: "unused".to_string(),
        };
        assert_eq!(from_config(&config).resolve().await, "edge-1");
    }
}
