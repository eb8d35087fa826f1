//! Breadth-first walks below a page, used to authorize and plan cascading
//! operations such as recursive deletes.

use crate::access::AccessBitmask;
use crate::error::{AccessError, Result};
use crate::page::Page;
use crate::principal::{PageId, Principal, UserId};
use crate::resolver::Resolver;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

impl Resolver {
    /// Require `required` on `root` and on every page below it.
    ///
    /// The owner of `root` passes without a walk. Otherwise the first page
    /// that falls short aborts the check with `AccessDenied`.
    pub async fn verify_child_permission(
        &self,
        user: UserId,
        root: PageId,
        required: AccessBitmask,
    ) -> Result<()> {
        if root.is_root() {
            return Err(AccessError::InvalidArgument("page id not provided"));
        }
        if user.0 == 0 {
            return Err(AccessError::InvalidArgument("principal id not provided"));
        }
        let page = self.load_page(root).await?;
        if page.owner_id == user {
            return Ok(());
        }

        let principal = Principal::User(user);
        let checked = self
            .walk(root, |id| async move {
                let access = self.resolve_effective_access(principal, id).await?;
                if access.has_access(required) {
                    Ok(())
                } else {
                    debug!(%principal, page = %id, "subtree check failed");
                    Err(AccessError::AccessDenied {
                        principal,
                        page: id,
                        required,
                    })
                }
            })
            .await?
            .len();
        debug!(%principal, %root, pages = checked, "subtree check passed");
        Ok(())
    }

    /// Every page from `root` down, root first, in breadth-first order.
    pub async fn enumerate_subtree(&self, root: PageId) -> Result<Vec<Page>> {
        if root.is_root() {
            return Err(AccessError::InvalidArgument("page id not provided"));
        }
        self.walk(root, |id| async move { self.load_page(id).await })
            .await
    }

    /// Visit `root` and its descendants level by level, calling `visit` on
    /// each page before its children are listed. Stops at the first error.
    async fn walk<T, F, Fut>(&self, root: PageId, mut visit: F) -> Result<Vec<T>>
    where
        F: FnMut(PageId) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let limit = self.config().max_subtree_pages;
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut frontier = VecDeque::from([root]);
        while let Some(id) = frontier.pop_front() {
            if !seen.insert(id) {
                return Err(AccessError::CycleDetected { page: id });
            }
            if seen.len() > limit {
                return Err(AccessError::SubtreeTooLarge { root, limit });
            }
            out.push(visit(id).await?);
            let children = self.pages().get_children(id).await.map_err(|e| {
                AccessError::from_store(e, || format!("listing children of page {}", id))
            })?;
            frontier.extend(children.into_iter().map(|c| c.id));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolverConfig;
    use crate::page::PageTree;
    use crate::permission::PermissionStore;
    use crate::storage::memory::MemoryStore;
    use std::sync::Arc;

    const OWNER: UserId = UserId(100);

    /// root
    /// ├── a
    /// │   └── a1
    /// └── b
    async fn tree() -> (Arc<MemoryStore>, [PageId; 4]) {
        let store = Arc::new(MemoryStore::new());
        let root = store.create_page(PageId::ROOT, OWNER, "root", "").unwrap();
        let a = store.create_page(root, OWNER, "a", "").unwrap();
        let b = store.create_page(root, OWNER, "b", "").unwrap();
        let a1 = store.create_page(a, OWNER, "a1", "").unwrap();
        (store, [root, a, b, a1])
    }

    fn resolver(store: &Arc<MemoryStore>, config: ResolverConfig) -> Resolver {
        Resolver::new(store.clone(), store.clone(), config)
    }

    #[tokio::test]
    async fn enumerates_breadth_first() {
        let (store, [root, a, b, a1]) = tree().await;
        let pages = resolver(&store, ResolverConfig::default())
            .enumerate_subtree(root)
            .await
            .unwrap();
        let ids: Vec<_> = pages.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![root, a, b, a1]);

        let pages = resolver(&store, ResolverConfig::default())
            .enumerate_subtree(a)
            .await
            .unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].name, "a");
    }

    #[tokio::test]
    async fn owner_skips_the_walk() {
        let (store, [root, ..]) = tree().await;
        let resolver = resolver(&store, ResolverConfig::default());
        resolver
            .verify_child_permission(OWNER, root, AccessBitmask::DELETE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn inherited_grant_covers_subtree() {
        let (store, [root, ..]) = tree().await;
        store
            .upsert_permission(root, UserId(200), AccessBitmask::FULL | AccessBitmask::INHERIT)
            .await
            .unwrap();
        let resolver = resolver(&store, ResolverConfig::default());
        resolver
            .verify_child_permission(UserId(200), root, AccessBitmask::DELETE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn one_denied_page_fails_everything() {
        let (store, [root, _, _, a1]) = tree().await;
        store
            .upsert_permission(root, UserId(200), AccessBitmask::FULL | AccessBitmask::INHERIT)
            .await
            .unwrap();
        store
            .upsert_permission(a1, UserId(200), AccessBitmask::DENY | AccessBitmask::DELETE)
            .await
            .unwrap();
        let resolver = resolver(&store, ResolverConfig::default());

        let err = resolver
            .verify_child_permission(UserId(200), root, AccessBitmask::DELETE)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            AccessError::AccessDenied { page, .. } if page == a1
        ));
        // write is still granted everywhere
        resolver
            .verify_child_permission(UserId(200), root, AccessBitmask::WRITE)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn missing_root_is_not_found() {
        let (store, _) = tree().await;
        let resolver = resolver(&store, ResolverConfig::default());
        assert!(matches!(
            resolver
                .verify_child_permission(UserId(200), PageId(99), AccessBitmask::READ)
                .await,
            Err(AccessError::PageNotFound(PageId(99)))
        ));
        assert!(matches!(
            resolver.enumerate_subtree(PageId(99)).await,
            Err(AccessError::PageNotFound(PageId(99)))
        ));
        assert!(matches!(
            resolver.enumerate_subtree(PageId::ROOT).await,
            Err(AccessError::InvalidArgument(_))
        ));
    }

    #[tokio::test]
    async fn walk_is_bounded() {
        let (store, [root, ..]) = tree().await;
        let config = ResolverConfig {
            max_subtree_pages: 3,
            ..ResolverConfig::default()
        };
        assert!(matches!(
            resolver(&store, config).enumerate_subtree(root).await,
            Err(AccessError::SubtreeTooLarge { limit: 3, .. })
        ));
    }

    #[tokio::test]
    async fn walk_stops_on_cycles() {
        let (store, [root, _, _, a1]) = tree().await;
        let mut top = store.get_page(root).await.unwrap();
        top.parent_id = a1;
        store.update_page(top).unwrap();
        assert!(matches!(
            resolver(&store, ResolverConfig::default())
                .enumerate_subtree(root)
                .await,
            Err(AccessError::CycleDetected { .. })
        ));
    }
}
