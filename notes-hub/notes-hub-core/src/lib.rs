//! Permission resolution for hierarchical notes.
//!
//! Pages form a forest of trees owned by users. Access to a page is resolved
//! by folding the permission records attached along its ancestry, root first,
//! honouring the inherit and deny control bits of each record.

pub mod access;
pub mod config;
pub mod error;
pub mod events;
pub mod page;
pub mod permission;
pub mod principal;
pub mod resolver;
pub mod service;
pub mod storage;
pub mod subtree;

pub use access::AccessBitmask;
pub use config::ResolverConfig;
pub use error::{AccessError, Entity, Result, StoreError, StoreResult};
pub use events::{Change, Event, EventBus};
pub use page::{Page, PageSummary, PageTree, PathOrder};
pub use permission::{Grantee, PermissionRecord, PermissionStore, TokenPermissionRecord};
pub use principal::{PageId, Principal, TokenId, UserId};
pub use resolver::Resolver;
pub use service::AccessControl;
pub use storage::memory::{MemoryStore, Snapshot};
