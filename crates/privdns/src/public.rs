//! Public (recursive) resolution used when no private answer applies.

use crate::error::{Error, Result};
use crate::name;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::IpAddr;

/// Answer from a public resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublicLookup {
    /// The name exists; may be empty when it has no address records
    Addresses(Vec<IpAddr>),
    /// The name does not exist
    NxDomain,
}

/// A recursive resolver reachable from the private resolver.
pub trait PublicResolver: Send + Sync {
    /// Resolve a normalized name to its public addresses.
    fn lookup(&self, name: &str) -> Result<PublicLookup>;

    /// Short description for logs and diagnostics.
    fn describe(&self) -> String;
}

/// In-memory public resolver backed by a fixed table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    entries: BTreeMap<String, Vec<IpAddr>>,
}

impl StaticResolver {
    /// Create an empty table (every lookup is NXDOMAIN).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, builder style.
    pub fn with(mut self, host: &str, address: IpAddr) -> Self {
        self.insert(host, address);
        self
    }

    /// Add an address for a host.
    pub fn insert(&mut self, host: &str, address: IpAddr) {
        let addresses = self.entries.entry(name::normalize(host)).or_default();
        if !addresses.contains(&address) {
            addresses.push(address);
        }
    }

    /// Parse a hosts-file style table (`address name [name...]`, `#` comments).
    pub fn parse_hosts(content: &str) -> Result<Self> {
        let mut resolver = Self::new();

        for (idx, raw) in content.lines().enumerate() {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }

            let mut fields = line.split_whitespace();
            let address: IpAddr = fields
                .next()
                .unwrap_or_default()
                .parse()
                .map_err(|e| Error::HostsParse {
                    line: idx + 1,
                    message: format!("bad address: {e}"),
                })?;

            let mut any = false;
            for host in fields {
                resolver.insert(host, address);
                any = true;
            }
            if !any {
                return Err(Error::HostsParse {
                    line: idx + 1,
                    message: "missing host name".to_string(),
                });
            }
        }

        Ok(resolver)
    }

    /// Number of names in the table.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PublicResolver for StaticResolver {
    fn lookup(&self, name: &str) -> Result<PublicLookup> {
        Ok(match self.entries.get(name) {
            Some(addresses) => PublicLookup::Addresses(addresses.clone()),
            None => PublicLookup::NxDomain,
        })
    }

    fn describe(&self) -> String {
        format!("static table ({} names)", self.entries.len())
    }
}

/// DNS-over-HTTPS resolver using the JSON API (`application/dns-json`).
pub struct DohResolver {
    agent: ureq::Agent,
    endpoint: String,
}

/// Default DNS-over-HTTPS endpoint.
pub const DEFAULT_DOH_ENDPOINT: &str = "https://cloudflare-dns.com/dns-query";

const RCODE_NXDOMAIN: u32 = 3;
const TYPE_A: u16 = 1;
const TYPE_AAAA: u16 = 28;

impl DohResolver {
    /// Create a resolver for the given endpoint URL.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            agent: ureq::Agent::new_with_defaults(),
            endpoint: endpoint.into(),
        }
    }

    /// Get the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn query(&self, name: &str, record_type: &str) -> Result<DohResponse> {
        self.agent
            .get(&self.endpoint)
            .query("name", name)
            .query("type", record_type)
            .header("Accept", "application/dns-json")
            .call()
            .and_then(|mut response| response.body_mut().read_json::<DohResponse>())
            .map_err(|e| Error::Upstream {
                upstream: self.endpoint.clone(),
                message: e.to_string(),
            })
    }
}

impl Default for DohResolver {
    fn default() -> Self {
        Self::new(DEFAULT_DOH_ENDPOINT)
    }
}

impl PublicResolver for DohResolver {
    fn lookup(&self, name: &str) -> Result<PublicLookup> {
        let mut addresses = Vec::new();
        let mut nxdomain = true;

        for record_type in ["A", "AAAA"] {
            let response = self.query(name, record_type)?;
            if response.status != RCODE_NXDOMAIN {
                nxdomain = false;
            }
            addresses.extend(response.addresses());
        }

        if nxdomain && addresses.is_empty() {
            Ok(PublicLookup::NxDomain)
        } else {
            Ok(PublicLookup::Addresses(addresses))
        }
    }

    fn describe(&self) -> String {
        format!("DNS-over-HTTPS {}", self.endpoint)
    }
}

// =============================================================================
// DNS JSON API response types
// =============================================================================

#[derive(Debug, Deserialize)]
struct DohResponse {
    #[serde(rename = "Status")]
    status: u32,
    #[serde(rename = "Answer", default)]
    answer: Vec<DohAnswer>,
}

#[derive(Debug, Deserialize)]
struct DohAnswer {
    #[serde(rename = "type")]
    record_type: u16,
    data: String,
}

impl DohResponse {
    fn addresses(&self) -> impl Iterator<Item = IpAddr> + '_ {
        self.answer
            .iter()
            .filter(|a| a.record_type == TYPE_A || a.record_type == TYPE_AAAA)
            .filter_map(|a| a.data.parse().ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_lookup() {
        let resolver = StaticResolver::new().with("Example.COM", "93.184.216.34".parse().unwrap());

        assert_eq!(
            resolver.lookup("example.com").unwrap(),
            PublicLookup::Addresses(vec!["93.184.216.34".parse().unwrap()])
        );
        assert_eq!(resolver.lookup("missing.example").unwrap(), PublicLookup::NxDomain);
    }

    #[test]
    fn test_parse_hosts() {
        let hosts = "\
# public answers
52.1.2.3   kv1.vault.azure.net kv1-alias.vault.azure.net
2001:db8::1 v6.example.com   # trailing comment

";
        let resolver = StaticResolver::parse_hosts(hosts).unwrap();
        assert_eq!(resolver.len(), 3);
        assert!(matches!(
            resolver.lookup("v6.example.com").unwrap(),
            PublicLookup::Addresses(a) if a.len() == 1
        ));
    }

    #[test]
    fn test_parse_hosts_rejects_bad_lines() {
        let err = StaticResolver::parse_hosts("not-an-ip host").unwrap_err();
        assert!(matches!(err, Error::HostsParse { line: 1, .. }));

        let err = StaticResolver::parse_hosts("10.0.0.1").unwrap_err();
        assert!(matches!(err, Error::HostsParse { line: 1, .. }));
    }

    #[test]
    fn test_doh_response_addresses() {
        let json = r#"{
            "Status": 0,
            "Answer": [
                {"name": "x.example.", "type": 5, "TTL": 60, "data": "y.example."},
                {"name": "y.example.", "type": 1, "TTL": 60, "data": "203.0.113.7"}
            ]
        }"#;
        let response: DohResponse = serde_json::from_str(json).unwrap();
        let addrs: Vec<IpAddr> = response.addresses().collect();
        assert_eq!(addrs, vec!["203.0.113.7".parse::<IpAddr>().unwrap()]);
    }
}
