use crate::access::AccessBitmask;
use crate::principal::{PageId, Principal};
use std::fmt;
use thiserror::Error;

/// Kind of stored entity a lookup was about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Page,
    Permission,
    TokenPermission,
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Entity::Page => "page",
            Entity::Permission => "permission",
            Entity::TokenPermission => "token permission",
        })
    }
}

/// Errors reported by page tree and permission store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} {id} not found")]
    NotFound { entity: Entity, id: u64 },
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

impl StoreError {
    pub fn not_found(entity: Entity, id: u64) -> Self {
        StoreError::NotFound { entity, id }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Errors returned by resolution, traversal and permission mutations.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    #[error("page {0} not found")]
    PageNotFound(PageId),

    #[error("{entity} record {id} not found")]
    PermissionNotFound { entity: Entity, id: u64 },

    #[error("storage failure while {context}")]
    Storage {
        context: String,
        #[source]
        source: StoreError,
    },

    #[error("access denied: {principal} lacks {} on page {page}", .required.capability_names())]
    AccessDenied {
        principal: Principal,
        page: PageId,
        required: AccessBitmask,
    },

    #[error("page {page} appears twice in its own ancestry")]
    CycleDetected { page: PageId },

    #[error("ancestry of page {page} is deeper than {max_depth} levels")]
    PathTooDeep { page: PageId, max_depth: usize },

    #[error("subtree under page {root} has more than {limit} pages")]
    SubtreeTooLarge { root: PageId, limit: usize },

    #[error("invalid move: {0}")]
    InvalidMove(&'static str),
}

pub type Result<T> = std::result::Result<T, AccessError>;

impl AccessError {
    /// Classify a backend error. Missing pages and records keep their own
    /// variants, everything else is wrapped with `context`.
    pub fn from_store(err: StoreError, context: impl FnOnce() -> String) -> Self {
        match err {
            StoreError::NotFound {
                entity: Entity::Page,
                id,
            } => AccessError::PageNotFound(PageId(id)),
            StoreError::NotFound { entity, id } => AccessError::PermissionNotFound { entity, id },
            StoreError::InvalidArgument(msg) => AccessError::InvalidArgument(msg),
            source => AccessError::Storage {
                context: context(),
                source,
            },
        }
    }

    pub fn is_access_denied(&self) -> bool {
        matches!(self, AccessError::AccessDenied { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_classified() {
        let err = AccessError::from_store(StoreError::not_found(Entity::Page, 9), || {
            unreachable!("context is only built for backend failures")
        });
        assert!(matches!(err, AccessError::PageNotFound(PageId(9))));

        let err = AccessError::from_store(StoreError::not_found(Entity::Permission, 3), String::new);
        assert!(matches!(
            err,
            AccessError::PermissionNotFound {
                entity: Entity::Permission,
                id: 3
            }
        ));

        let err = AccessError::from_store(
            StoreError::Backend(anyhow::anyhow!("connection reset")),
            || "loading page 4".to_string(),
        );
        assert_eq!(err.to_string(), "storage failure while loading page 4");
        let source = std::error::Error::source(&err).map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("connection reset"));
    }

    #[test]
    fn access_denied_names_capabilities() {
        let err = AccessError::AccessDenied {
            principal: Principal::user(5),
            page: PageId(12),
            required: AccessBitmask::DELETE | AccessBitmask::WRITE,
        };
        assert_eq!(
            err.to_string(),
            "access denied: user 5 lacks Write, Delete on page 12"
        );
        assert!(err.is_access_denied());
    }
}
