//! relgate-domain: path access resolution over a cached catalog graph
//!
//! Access rules name a path and a set of allowed groups, categories or
//! products. Categories belong to groups and products belong to
//! categories; that graph is cached locally and kept current by a stream
//! of relationship changes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │                relgate-domain                │
//! ├──────────────────────────────────────────────┤
//! │  model/    - Users, rules, change events     │
//! │  cache/    - Relationship cache             │
//! │  ingest/   - Change stream consumer         │
//! │  resolver/ - Rules, warm-up, access checks  │
//! └──────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod ingest;
pub mod model;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use cache::{CacheConfig, RelationshipCache};
pub use error::{DomainError, DomainResult};
pub use ingest::{ChangeIngestor, IngestorHandle};
pub use model::{AccessEntry, RelationKind, RelationshipChange, RuleType, User};
pub use resolver::{AccessService, GraphFetcher, ResolverConfig, StaticGraphFetcher};
