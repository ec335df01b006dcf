//! HPD Federator - federated healthcare provider directory client
//!
//! Searches several HPD (Healthcare Provider Directory) instances at once:
//! - DSML search requests wrapped in SOAP, per-directory auth and timeouts
//! - Response normalization across vendor spellings
//! - Multi-phase weaving of providers, organizations, memberships, services, credentials
//! - Fair round-robin merge of results across directories

pub mod attributes;
pub mod classifier;
pub mod config;
pub mod criteria;
pub mod dn;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod merge;
pub mod query;
pub mod response;
pub mod server;
pub mod transport;
pub mod types;

pub use attributes::{AttributeBag, RawRecord};
pub use config::{AuthMode, ClientConfig, DirectoryEndpoint, EnvelopeTransform, RewriteRule, TlsMaterial};
pub use criteria::{DnSelector, MatchMode, SearchCriteria, SearchScope, ServiceMatch, ServiceProfile};
pub use engine::{OrchestrationEngine, SharedEngine};
pub use error::{EntryError, HpdError, ResultCode};
pub use merge::RoundRobinMerger;
pub use transport::{DirectoryTransport, HttpTransport, MockTransport};
pub use types::*;

#[cfg(test)]
mod tests;
