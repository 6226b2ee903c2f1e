//! Network-scoped resolver.
//!
//! Each query walks a small state machine:
//!
//! ```text
//! Received ──(owning zone linked to our network, record present)──▶ PrivateAnswer
//!     │
//!     └──(no zone / not linked / no record)──▶ Recurse ──▶ PublicAnswer | NxDomain
//! ```
//!
//! A [`Resolver`] holds only immutable configuration. Its answer is a pure
//! function of the zone state it reads at query time and the query name.

use crate::error::{Error, Result};
use crate::name;
use crate::public::{PublicLookup, PublicResolver};
use crate::zone::{ZoneId, ZoneView};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

/// States a query passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Received,
    PrivateAnswer,
    Recurse,
    PublicAnswer,
    NxDomain,
}

impl fmt::Display for QueryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryState::Received => "received",
            QueryState::PrivateAnswer => "private-answer",
            QueryState::Recurse => "recurse",
            QueryState::PublicAnswer => "public-answer",
            QueryState::NxDomain => "nxdomain",
        };
        write!(f, "{s}")
    }
}

/// Terminal answer of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Registered private address from a linked zone
    Private { zone: ZoneId, address: IpAddr },
    /// Addresses returned by recursion
    Public { addresses: Vec<IpAddr> },
    /// Name does not exist publicly
    NxDomain,
}

impl Answer {
    /// Whether the answer came from a private zone.
    pub fn is_private(&self) -> bool {
        matches!(self, Self::Private { .. })
    }

    /// All addresses in the answer.
    pub fn addresses(&self) -> Vec<IpAddr> {
        match self {
            Self::Private { address, .. } => vec![*address],
            Self::Public { addresses } => addresses.clone(),
            Self::NxDomain => Vec::new(),
        }
    }
}

/// Why a query was not answered privately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecurseReason {
    /// No private zone owns the name
    NoZone,
    /// A zone owns the name but our network is not linked to it
    NotLinked(ZoneId),
    /// Linked zone has no record for the name
    NoRecord(ZoneId),
}

/// Full outcome of one query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Normalized query name
    pub name: String,
    pub answer: Answer,
    /// States visited, starting with `Received`
    pub path: Vec<QueryState>,
    /// Set when the query was recursed
    pub recurse_reason: Option<RecurseReason>,
    /// Upstream used for recursion
    pub upstream: Option<String>,
}

/// Conditional forwarder: names under `suffix` recurse through `upstream`.
#[derive(Clone)]
pub struct Forwarder {
    suffix: String,
    upstream: Arc<dyn PublicResolver>,
}

impl Forwarder {
    pub fn new(suffix: &str, upstream: Arc<dyn PublicResolver>) -> Self {
        Self {
            suffix: name::normalize(suffix),
            upstream,
        }
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }
}

/// Resolver bound to one network scope.
#[derive(Clone)]
pub struct Resolver {
    network: String,
    zones: Arc<dyn ZoneView>,
    default_upstream: Arc<dyn PublicResolver>,
    forwarders: Vec<Forwarder>,
}

impl Resolver {
    /// Create a resolver for `network` reading `zones` and recursing to `upstream`.
    pub fn new(
        network: impl Into<String>,
        zones: Arc<dyn ZoneView>,
        upstream: Arc<dyn PublicResolver>,
    ) -> Self {
        Self {
            network: network.into(),
            zones,
            default_upstream: upstream,
            forwarders: Vec::new(),
        }
    }

    /// Add a conditional forwarder, builder style.
    pub fn with_forwarder(mut self, forwarder: Forwarder) -> Self {
        self.forwarders.push(forwarder);
        self
    }

    /// Network scope this resolver is bound to.
    pub fn network(&self) -> &str {
        &self.network
    }

    /// Pick the upstream for a name: longest matching forwarder suffix, else default.
    fn upstream_for(&self, query: &str) -> &Arc<dyn PublicResolver> {
        self.forwarders
            .iter()
            .filter(|f| name::strip_suffix(query, &f.suffix).is_some())
            .max_by_key(|f| f.suffix.len())
            .map_or(&self.default_upstream, |f| &f.upstream)
    }

    /// Resolve a name.
    pub fn resolve(&self, query: &str) -> Result<Resolution> {
        let normalized = name::normalize(query);
        if !name::is_valid(&normalized) {
            return Err(Error::InvalidName {
                name: query.to_string(),
            });
        }

        let mut path = vec![QueryState::Received];

        let reason = match self.zones.find_owner(&normalized, &self.network) {
            Some(found) if found.linked => match found.record {
                Some(record) => {
                    path.push(QueryState::PrivateAnswer);
                    log::debug!(
                        "{normalized} answered privately from {} for network {}",
                        found.zone,
                        self.network
                    );
                    return Ok(Resolution {
                        name: normalized,
                        answer: Answer::Private {
                            zone: found.zone,
                            address: record.address,
                        },
                        path,
                        recurse_reason: None,
                        upstream: None,
                    });
                }
                None => RecurseReason::NoRecord(found.zone),
            },
            Some(found) => RecurseReason::NotLinked(found.zone),
            None => RecurseReason::NoZone,
        };

        path.push(QueryState::Recurse);
        let upstream = self.upstream_for(&normalized);
        log::debug!(
            "{normalized} recursing via {} ({reason:?})",
            upstream.describe()
        );

        let answer = match upstream.lookup(&normalized)? {
            PublicLookup::Addresses(addresses) => {
                path.push(QueryState::PublicAnswer);
                Answer::Public { addresses }
            }
            PublicLookup::NxDomain => {
                path.push(QueryState::NxDomain);
                Answer::NxDomain
            }
        };

        Ok(Resolution {
            name: normalized,
            answer,
            path,
            recurse_reason: Some(reason),
            upstream: Some(upstream.describe()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::public::StaticResolver;
    use crate::zone::ZoneStore;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn setup() -> (Arc<ZoneStore>, Arc<StaticResolver>, ZoneId) {
        let store = Arc::new(ZoneStore::new());
        let zone = ZoneId::new("ScopeA", "zone1.internal");
        store.ensure_zone(&zone, None);
        store.link(&zone, "ScopeA").unwrap();
        store
            .upsert_record(&zone, "endpoint1", ip("10.0.0.4"))
            .unwrap();

        let public = Arc::new(
            StaticResolver::new().with("endpoint1.zone1.internal", ip("52.0.0.1")),
        );
        (store, public, zone)
    }

    #[test]
    fn test_linked_scope_gets_private_answer() {
        let (store, public, zone) = setup();
        let resolver = Resolver::new("ScopeA", store, public);

        let res = resolver.resolve("Endpoint1.zone1.internal.").unwrap();
        assert_eq!(
            res.answer,
            Answer::Private {
                zone,
                address: ip("10.0.0.4")
            }
        );
        assert_eq!(res.path, vec![QueryState::Received, QueryState::PrivateAnswer]);
    }

    #[test]
    fn test_unlinked_scope_falls_through_to_public() {
        let (store, public, zone) = setup();
        let resolver = Resolver::new("ScopeB", store, public);

        let res = resolver.resolve("endpoint1.zone1.internal").unwrap();
        assert_eq!(
            res.answer,
            Answer::Public {
                addresses: vec![ip("52.0.0.1")]
            }
        );
        assert_eq!(res.recurse_reason, Some(RecurseReason::NotLinked(zone)));
        assert_eq!(
            res.path,
            vec![
                QueryState::Received,
                QueryState::Recurse,
                QueryState::PublicAnswer
            ]
        );
    }

    #[test]
    fn test_unknown_name_is_nxdomain() {
        let (store, public, _) = setup();
        let resolver = Resolver::new("ScopeA", store, public);

        let res = resolver.resolve("nothing.example").unwrap();
        assert_eq!(res.answer, Answer::NxDomain);
        assert_eq!(res.recurse_reason, Some(RecurseReason::NoZone));
    }

    #[test]
    fn test_linked_zone_without_record_recurses() {
        let (store, public, zone) = setup();
        let resolver = Resolver::new("ScopeA", store, public);

        let res = resolver.resolve("other.zone1.internal").unwrap();
        assert_eq!(res.answer, Answer::NxDomain);
        assert_eq!(res.recurse_reason, Some(RecurseReason::NoRecord(zone)));
    }

    #[test]
    fn test_unlinked_narrower_zone_does_not_shadow_linked_zone() {
        let (store, public, _) = setup();
        let broad = ZoneId::new("ScopeA", "internal");
        store.ensure_zone(&broad, None);
        store.link(&broad, "ScopeA").unwrap();
        store.upsert_record(&broad, "db.zone2", ip("10.9.9.9")).unwrap();
        let narrow = ZoneId::new("ScopeX", "zone2.internal");
        store.ensure_zone(&narrow, None);

        let resolver = Resolver::new("ScopeA", store, public);
        let res = resolver.resolve("db.zone2.internal").unwrap();
        assert_eq!(
            res.answer,
            Answer::Private {
                zone: broad,
                address: ip("10.9.9.9")
            }
        );
        assert_eq!(res.recurse_reason, None);
    }

    #[test]
    fn test_answers_follow_zone_state() {
        let (store, public, zone) = setup();
        let resolver = Resolver::new("ScopeB", store.clone(), public);

        assert!(!resolver.resolve("endpoint1.zone1.internal").unwrap().answer.is_private());
        store.link(&zone, "ScopeB").unwrap();
        assert!(resolver.resolve("endpoint1.zone1.internal").unwrap().answer.is_private());
    }

    #[test]
    fn test_conditional_forwarder_longest_match() {
        let (store, default_upstream, _) = setup();
        let corp = Arc::new(StaticResolver::new().with("app.corp.example", ip("192.168.1.10")));
        let deep = Arc::new(StaticResolver::new().with("db.eu.corp.example", ip("192.168.2.20")));

        let resolver = Resolver::new("ScopeA", store, default_upstream)
            .with_forwarder(Forwarder::new("corp.example", corp))
            .with_forwarder(Forwarder::new("eu.corp.example", deep));

        let res = resolver.resolve("app.corp.example").unwrap();
        assert_eq!(res.answer.addresses(), vec![ip("192.168.1.10")]);

        let res = resolver.resolve("db.eu.corp.example").unwrap();
        assert_eq!(res.answer.addresses(), vec![ip("192.168.2.20")]);
    }

    #[test]
    fn test_invalid_name_rejected() {
        let (store, public, _) = setup();
        let resolver = Resolver::new("ScopeA", store, public);
        assert!(matches!(
            resolver.resolve("bad..name"),
            Err(Error::InvalidName { .. })
        ));
    }
}
