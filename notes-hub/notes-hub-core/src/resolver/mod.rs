//! Effective access resolution.
//!
//! Resolution walks the ancestry of the target page root first and folds in
//! the records found at each level. Users and tokens share the fold and only
//! differ in which records are gathered per level.

use crate::access::AccessBitmask;
use crate::config::ResolverConfig;
use crate::error::{AccessError, Result, StoreResult};
use crate::page::{page_path, Page, PageTree, PathOrder};
use crate::permission::{found, PermissionStore};
use crate::principal::{PageId, Principal, TokenId, UserId};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, warn};

/// Records that apply to one principal at a single page, in fold order.
#[async_trait]
trait CandidateSource: Send + Sync {
    async fn candidates(&self, page: PageId) -> StoreResult<Vec<AccessBitmask>>;
}

/// A real account also picks up the authenticated tier. When the account's
/// own record is a deny it is folded after the tier grant so it wins.
struct UserCandidates<'a> {
    store: &'a dyn PermissionStore,
    user: UserId,
}

#[async_trait]
impl<'a> CandidateSource for UserCandidates<'a> {
    async fn candidates(&self, page: PageId) -> StoreResult<Vec<AccessBitmask>> {
        let own = found(self.store.get_permission(page, self.user).await)?;
        let tier = if self.user.is_pseudo() {
            None
        } else {
            found(self.store.get_permission(page, UserId::AUTHENTICATED).await)?
        };
        let mut slots = [own.map(|r| r.access), tier.map(|r| r.access)];
        if slots[0].is_some_and(AccessBitmask::is_deny) {
            slots.swap(0, 1);
        }
        Ok(slots.into_iter().flatten().collect())
    }
}

struct TokenCandidates<'a> {
    store: &'a dyn PermissionStore,
    token: TokenId,
}

#[async_trait]
impl<'a> CandidateSource for TokenCandidates<'a> {
    async fn candidates(&self, page: PageId) -> StoreResult<Vec<AccessBitmask>> {
        let own = found(self.store.get_token_permission(page, self.token).await)?;
        Ok(own.map(|r| r.access).into_iter().collect())
    }
}

/// Resolves what a principal may do on a page. Stateless between calls, so
/// one instance can serve any number of concurrent resolutions.
#[derive(Clone)]
pub struct Resolver {
    pages: Arc<dyn PageTree>,
    permissions: Arc<dyn PermissionStore>,
    config: ResolverConfig,
}

impl Resolver {
    pub fn new(
        pages: Arc<dyn PageTree>,
        permissions: Arc<dyn PermissionStore>,
        config: ResolverConfig,
    ) -> Self {
        Self {
            pages,
            permissions,
            config,
        }
    }

    pub fn pages(&self) -> &dyn PageTree {
        self.pages.as_ref()
    }

    pub fn permissions(&self) -> &dyn PermissionStore {
        self.permissions.as_ref()
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Compute the effective access of `principal` on `page`.
    ///
    /// The owner of a page always gets [`AccessBitmask::FULL`]; tokens never
    /// take that shortcut. The result never carries control bits.
    pub async fn resolve_effective_access(
        &self,
        principal: Principal,
        page: PageId,
    ) -> Result<AccessBitmask> {
        if page.is_root() {
            return Err(AccessError::InvalidArgument("page id not provided"));
        }
        if principal.raw_id() == 0 {
            return Err(AccessError::InvalidArgument("principal id not provided"));
        }

        let access = match principal {
            Principal::User(user) => {
                let target = self.load_page(page).await?;
                if target.owner_id == user {
                    debug!(%principal, %page, "owner of page");
                    return Ok(AccessBitmask::FULL);
                }
                let source = UserCandidates {
                    store: self.permissions.as_ref(),
                    user,
                };
                self.fold(principal, page, &source).await?
            }
            Principal::Token { id, .. } => {
                let source = TokenCandidates {
                    store: self.permissions.as_ref(),
                    token: id,
                };
                self.fold(principal, page, &source).await?
            }
        };
        debug!(%principal, %page, access = access.bits(), "resolved access");
        Ok(access)
    }

    pub(crate) async fn load_page(&self, page: PageId) -> Result<Page> {
        self.pages
            .get_page(page)
            .await
            .map_err(|e| AccessError::from_store(e, || format!("loading page {}", page)))
    }

    async fn fold(
        &self,
        principal: Principal,
        page: PageId,
        source: &dyn CandidateSource,
    ) -> Result<AccessBitmask> {
        let path = page_path(
            self.pages.as_ref(),
            page,
            PathOrder::RootFirst,
            self.config.max_path_depth,
        )
        .await?;

        let mut access = AccessBitmask::empty();
        for node in &path {
            let records = source.candidates(node.id).await.map_err(|e| {
                warn!(%principal, page = %node.id, error = %e, "permission lookup failed");
                AccessError::from_store(e, || {
                    format!("loading permissions of {} on page {}", principal, node.id)
                })
            })?;
            for record in records {
                // records above the target only count when they propagate
                if !record.is_inherited() && node.id != page {
                    continue;
                }
                if record.is_deny() {
                    access.remove(record.without_control());
                } else {
                    access.insert(record.without_control());
                }
            }
        }
        Ok(access.without_control())
    }
}
