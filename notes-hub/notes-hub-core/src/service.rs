use crate::access::AccessBitmask;
use crate::config::ResolverConfig;
use crate::error::{AccessError, Result};
use crate::events::{Change, EventBus};
use crate::page::{validate_move, Page, PageTree};
use crate::permission::{Grantee, PermissionRecord, PermissionStore, TokenPermissionRecord};
use crate::principal::{PageId, Principal, TokenId, UserId};
use crate::resolver::Resolver;
use std::sync::Arc;
use tracing::info;

/// Entry point for callers: resolution, subtree checks and permission
/// mutations over one pair of injected backends.
#[derive(Clone)]
pub struct AccessControl {
    resolver: Resolver,
    events: EventBus,
}

impl AccessControl {
    pub fn new(
        pages: Arc<dyn PageTree>,
        permissions: Arc<dyn PermissionStore>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            resolver: Resolver::new(pages, permissions, config),
            events: EventBus::new(),
        }
    }

    pub fn resolver(&self) -> &Resolver {
        &self.resolver
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub async fn effective_access(&self, principal: Principal, page: PageId) -> Result<AccessBitmask> {
        self.resolver.resolve_effective_access(principal, page).await
    }

    /// Fail with `AccessDenied` unless `principal` holds all of `required` on `page`.
    pub async fn check(
        &self,
        principal: Principal,
        page: PageId,
        required: AccessBitmask,
    ) -> Result<AccessBitmask> {
        let access = self.effective_access(principal, page).await?;
        if access.has_access(required) {
            Ok(access)
        } else {
            Err(AccessError::AccessDenied {
                principal,
                page,
                required,
            })
        }
    }

    /// Create or replace the record for `(page, user)`.
    pub async fn grant(
        &self,
        page: PageId,
        user: UserId,
        access: AccessBitmask,
    ) -> Result<PermissionRecord> {
        let record = self
            .resolver
            .permissions()
            .upsert_permission(page, user, access)
            .await
            .map_err(|e| {
                AccessError::from_store(e, || format!("granting user {} on page {}", user, page))
            })?;
        info!(record = record.id, %page, %user, access = access.bits(), "permission granted");
        self.events.send(Change::Granted {
            record: record.id,
            page,
            grantee: Grantee::User(user),
            access,
        });
        Ok(record)
    }

    pub async fn grant_token(
        &self,
        page: PageId,
        token: TokenId,
        access: AccessBitmask,
    ) -> Result<TokenPermissionRecord> {
        let record = self
            .resolver
            .permissions()
            .upsert_token_permission(page, token, access)
            .await
            .map_err(|e| {
                AccessError::from_store(e, || format!("granting token {} on page {}", token, page))
            })?;
        info!(record = record.id, %page, %token, access = access.bits(), "token permission granted");
        self.events.send(Change::Granted {
            record: record.id,
            page,
            grantee: Grantee::Token(token),
            access,
        });
        Ok(record)
    }

    /// Delete a user record by id.
    pub async fn revoke(&self, record: u64) -> Result<PermissionRecord> {
        let removed = self
            .resolver
            .permissions()
            .remove_permission(record)
            .await
            .map_err(|e| AccessError::from_store(e, || format!("revoking permission {}", record)))?;
        info!(record, page = %removed.page_id, user = %removed.user_id, "permission revoked");
        self.events.send(Change::Revoked {
            record,
            page: removed.page_id,
            grantee: Grantee::User(removed.user_id),
        });
        Ok(removed)
    }

    pub async fn revoke_token(&self, record: u64) -> Result<TokenPermissionRecord> {
        let removed = self
            .resolver
            .permissions()
            .remove_token_permission(record)
            .await
            .map_err(|e| {
                AccessError::from_store(e, || format!("revoking token permission {}", record))
            })?;
        info!(record, page = %removed.page_id, token = %removed.token_id, "token permission revoked");
        self.events.send(Change::Revoked {
            record,
            page: removed.page_id,
            grantee: Grantee::Token(removed.token_id),
        });
        Ok(removed)
    }

    pub async fn permission(&self, record: u64) -> Result<PermissionRecord> {
        self.resolver
            .permissions()
            .get_permission_by_id(record)
            .await
            .map_err(|e| AccessError::from_store(e, || format!("loading permission {}", record)))
    }

    pub async fn token_permission(&self, record: u64) -> Result<TokenPermissionRecord> {
        self.resolver
            .permissions()
            .get_token_permission_by_id(record)
            .await
            .map_err(|e| {
                AccessError::from_store(e, || format!("loading token permission {}", record))
            })
    }

    /// Revoke a user record on behalf of `actor`, who needs MODERATE on the
    /// record's page.
    pub async fn revoke_as(&self, actor: Principal, record: u64) -> Result<PermissionRecord> {
        let target = self.permission(record).await?;
        self.check(actor, target.page_id, AccessBitmask::MODERATE).await?;
        self.revoke(record).await
    }

    pub async fn revoke_token_as(
        &self,
        actor: Principal,
        record: u64,
    ) -> Result<TokenPermissionRecord> {
        let target = self.token_permission(record).await?;
        self.check(actor, target.page_id, AccessBitmask::MODERATE).await?;
        self.revoke_token(record).await
    }

    pub async fn permissions(&self, page: PageId) -> Result<Vec<PermissionRecord>> {
        self.resolver
            .permissions()
            .list_permissions(page)
            .await
            .map_err(|e| AccessError::from_store(e, || format!("listing permissions of page {}", page)))
    }

    pub async fn token_permissions(&self, page: PageId) -> Result<Vec<TokenPermissionRecord>> {
        self.resolver
            .permissions()
            .list_token_permissions(page)
            .await
            .map_err(|e| {
                AccessError::from_store(e, || format!("listing token permissions of page {}", page))
            })
    }

    pub async fn verify_subtree(
        &self,
        user: UserId,
        root: PageId,
        required: AccessBitmask,
    ) -> Result<()> {
        self.resolver.verify_child_permission(user, root, required).await
    }

    pub async fn enumerate_subtree(&self, root: PageId) -> Result<Vec<Page>> {
        self.resolver.enumerate_subtree(root).await
    }

    pub async fn validate_move(&self, page: PageId, new_parent: PageId) -> Result<()> {
        validate_move(
            self.resolver.pages(),
            page,
            new_parent,
            self.resolver.config().max_path_depth,
        )
        .await
    }
}
