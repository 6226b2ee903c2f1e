//! # privdns
//!
//! Private name resolution for clients inside a private network.
//!
//! Service endpoints register address records into private zones; zones
//! are linked to network scopes; a [`Resolver`] bound to one network scope
//! answers from the zones linked to it and recurses publicly otherwise.
//!
//! ## Example
//!
//! ```
//! use privdns::{Answer, Resolver, StaticResolver, ZoneId, ZoneStore};
//! use std::sync::Arc;
//!
//! let zones = Arc::new(ZoneStore::new());
//! let zone = ZoneId::new("ScopeA", "zone1.internal");
//! zones.ensure_zone(&zone, None);
//! zones.link(&zone, "ScopeA").unwrap();
//! zones.upsert_record(&zone, "endpoint1", "10.0.0.4".parse().unwrap()).unwrap();
//!
//! let resolver = Resolver::new("ScopeA", zones, Arc::new(StaticResolver::new()));
//! let res = resolver.resolve("endpoint1.zone1.internal").unwrap();
//! assert!(matches!(res.answer, Answer::Private { .. }));
//! ```

pub mod error;
pub mod name;
pub mod public;
pub mod resolver;
pub mod zone;

pub use error::{Error, Result};
pub use public::{DEFAULT_DOH_ENDPOINT, DohResolver, PublicLookup, PublicResolver, StaticResolver};
pub use resolver::{Answer, Forwarder, QueryState, RecurseReason, Resolution, Resolver};
pub use zone::{PrivateZone, Record, UpsertOutcome, ZoneId, ZoneMatch, ZoneStore, ZoneView};
