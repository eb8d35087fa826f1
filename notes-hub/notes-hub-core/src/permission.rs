use crate::access::AccessBitmask;
use crate::error::{StoreError, StoreResult};
use crate::principal::{PageId, TokenId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Grant or denial bound to one `(page, user)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionRecord {
    pub id: u64,
    pub page_id: PageId,
    pub user_id: UserId,
    pub access: AccessBitmask,
}

/// Grant or denial bound to one `(page, token)` pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPermissionRecord {
    pub id: u64,
    pub page_id: PageId,
    pub token_id: TokenId,
    pub access: AccessBitmask,
}

/// Who a stored record is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grantee {
    User(UserId),
    Token(TokenId),
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Grantee::User(user) => write!(f, "user {}", user),
            Grantee::Token(token) => write!(f, "token {}", token),
        }
    }
}

/// Storage for permission records. Each `(page, principal)` pair holds at
/// most one record; upserts replace the access mask and keep the id.
#[async_trait]
pub trait PermissionStore: Send + Sync {
    /// Fails with `StoreError::NotFound` when the pair has no record.
    async fn get_permission(&self, page: PageId, user: UserId) -> StoreResult<PermissionRecord>;
    async fn get_permission_by_id(&self, id: u64) -> StoreResult<PermissionRecord>;
    async fn list_permissions(&self, page: PageId) -> StoreResult<Vec<PermissionRecord>>;
    async fn upsert_permission(
        &self,
        page: PageId,
        user: UserId,
        access: AccessBitmask,
    ) -> StoreResult<PermissionRecord>;
    async fn remove_permission(&self, id: u64) -> StoreResult<PermissionRecord>;

    async fn get_token_permission(
        &self,
        page: PageId,
        token: TokenId,
    ) -> StoreResult<TokenPermissionRecord>;
    async fn get_token_permission_by_id(&self, id: u64) -> StoreResult<TokenPermissionRecord>;
    async fn list_token_permissions(&self, page: PageId)
        -> StoreResult<Vec<TokenPermissionRecord>>;
    async fn upsert_token_permission(
        &self,
        page: PageId,
        token: TokenId,
        access: AccessBitmask,
    ) -> StoreResult<TokenPermissionRecord>;
    async fn remove_token_permission(&self, id: u64) -> StoreResult<TokenPermissionRecord>;
}

/// Turn the "no record" outcome into `None`.
pub(crate) fn found<T>(result: StoreResult<T>) -> StoreResult<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(err) if err.is_not_found() => Ok(None),
        Err(err) => Err(err),
    }
}

/// Input checks shared by every upsert implementation.
pub fn validate_grant(page: PageId, principal: u64, access: AccessBitmask) -> StoreResult<()> {
    if page.is_root() {
        return Err(StoreError::InvalidArgument("page id not provided"));
    }
    if principal == 0 {
        return Err(StoreError::InvalidArgument("principal id not provided"));
    }
    if access.is_empty() {
        return Err(StoreError::InvalidArgument("access not provided"));
    }
    Ok(())
}
