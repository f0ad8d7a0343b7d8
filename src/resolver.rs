//! Hostname resolution.
//!
//! Resolution yields every address a host denotes, across both families, so
//! the guard can classify the full answer set rather than the first record.

use crate::error::GuardError;
use crate::url_validator::TargetHost;
use async_trait::async_trait;
use hickory_resolver::config::LookupIpStrategy;
use hickory_resolver::TokioResolver;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResolvedAddress {
    pub ip: IpAddr,
    pub family: AddressFamily,
}

impl From<IpAddr> for ResolvedAddress {
    fn from(ip: IpAddr) -> Self {
        let family = match ip {
            IpAddr::V4(_) => AddressFamily::V4,
            IpAddr::V6(_) => AddressFamily::V6,
        };
        Self { ip, family }
    }
}

#[async_trait]
pub trait Resolver: Send + Sync {
    /// Every address `host` resolves to. An empty answer is not an error here;
    /// [`resolve_host`] turns it into one.
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, GuardError>;
}

/// System DNS (resolv.conf) resolver querying A and AAAA records.
#[derive(Clone)]
pub struct SystemResolver {
    inner: TokioResolver,
}

impl SystemResolver {
    pub fn new() -> Result<Self, GuardError> {
        let mut builder = TokioResolver::builder_tokio()
            .map_err(|e| GuardError::Config(format!("failed to load DNS configuration: {e}")))?;
        builder.options_mut().ip_strategy = LookupIpStrategy::Ipv4AndIpv6;

        Ok(Self {
            inner: builder.build(),
        })
    }
}

#[async_trait]
impl Resolver for SystemResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, GuardError> {
        let response =
            self.inner
                .lookup_ip(host)
                .await
                .map_err(|e| GuardError::DnsResolutionFailure {
                    host: host.to_string(),
                    message: e.to_string(),
                })?;

        Ok(response.iter().collect())
    }
}

/// Fixed host table. Counts lookups so callers can assert on DNS traffic.
#[derive(Debug, Default)]
pub struct StaticResolver {
    records: HashMap<String, Vec<IpAddr>>,
    lookups: AtomicUsize,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, host: &str, addresses: &[IpAddr]) -> Self {
        self.records
            .insert(host.to_ascii_lowercase(), addresses.to_vec());
        self
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Resolver for StaticResolver {
    async fn lookup(&self, host: &str) -> Result<Vec<IpAddr>, GuardError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.records
            .get(&host.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| GuardError::DnsResolutionFailure {
                host: host.to_string(),
                message: "no such host".into(),
            })
    }
}

/// Resolves a target host to its full, deduplicated address set.
///
/// IP literals resolve to themselves without a lookup.
#[instrument(level = "debug", skip(resolver), err)]
pub async fn resolve_host(
    resolver: &dyn Resolver,
    host: &TargetHost,
    timeout: Duration,
) -> Result<Vec<ResolvedAddress>, GuardError> {
    let domain = match host {
        TargetHost::Ip(ip) => return Ok(vec![ResolvedAddress::from(*ip)]),
        TargetHost::Domain(domain) => domain,
    };

    let addresses = tokio::time::timeout(timeout, resolver.lookup(domain))
        .await
        .map_err(|_| GuardError::DnsResolutionFailure {
            host: domain.clone(),
            message: format!("lookup timed out after {timeout:?}"),
        })??;

    let mut resolved: Vec<ResolvedAddress> = Vec::with_capacity(addresses.len());
    for ip in addresses {
        let address = ResolvedAddress::from(ip);
        if !resolved.contains(&address) {
            resolved.push(address);
        }
    }

    if resolved.is_empty() {
        return Err(GuardError::DnsResolutionFailure {
            host: domain.clone(),
            message: "no addresses found".into(),
        });
    }

    debug!(host = %domain, count = resolved.len(), "Resolved host");
    Ok(resolved)
}
