//! Page tree collaborator and ancestry walks.

use crate::error::{AccessError, Result, StoreResult};
use crate::principal::{PageId, UserId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A note in an owner's tree. `parent_id` is [`PageId::ROOT`] for top level pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub id: PageId,
    #[serde(default)]
    pub parent_id: PageId,
    pub owner_id: UserId,
    pub name: String,
    /// Markdown source.
    #[serde(default)]
    pub content: String,
}

/// Page listing entry without content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageSummary {
    pub id: PageId,
    pub name: String,
    pub owner_id: UserId,
}

impl From<&Page> for PageSummary {
    fn from(page: &Page) -> Self {
        Self {
            id: page.id,
            name: page.name.clone(),
            owner_id: page.owner_id,
        }
    }
}

/// Read access to the stored page forest.
#[async_trait]
pub trait PageTree: Send + Sync {
    /// Fails with `StoreError::NotFound` when the page does not exist.
    async fn get_page(&self, id: PageId) -> StoreResult<Page>;

    /// Direct children only.
    async fn get_children(&self, id: PageId) -> StoreResult<Vec<PageSummary>>;

    /// Top level pages of an owner's library.
    async fn get_root_pages(&self, owner: UserId) -> StoreResult<Vec<PageSummary>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrder {
    RootFirst,
    LeafFirst,
}

/// Materialize the chain from `page` up to, but excluding, the virtual root.
///
/// The walk follows `parent_id` links one `get_page` call at a time. It stops
/// with `CycleDetected` if a page repeats and with `PathTooDeep` once more than
/// `max_depth` pages have been collected.
pub async fn page_path(
    tree: &dyn PageTree,
    page: PageId,
    order: PathOrder,
    max_depth: usize,
) -> Result<Vec<Page>> {
    if page.is_root() {
        return Err(AccessError::InvalidArgument("page id not provided"));
    }
    let mut path = Vec::new();
    let mut seen = HashSet::new();
    let mut next = page;
    while !next.is_root() {
        if !seen.insert(next) {
            return Err(AccessError::CycleDetected { page: next });
        }
        if path.len() >= max_depth {
            return Err(AccessError::PathTooDeep { page, max_depth });
        }
        let current = tree
            .get_page(next)
            .await
            .map_err(|e| AccessError::from_store(e, || format!("building path of page {}", page)))?;
        next = current.parent_id;
        path.push(current);
    }
    if order == PathOrder::RootFirst {
        path.reverse();
    }
    Ok(path)
}

/// Check that re-parenting `page` under `new_parent` keeps the forest sound.
///
/// Pages stay inside their owner's library and a page can never end up under
/// itself. Moving to [`PageId::ROOT`] is always allowed.
pub async fn validate_move(
    tree: &dyn PageTree,
    page: PageId,
    new_parent: PageId,
    max_depth: usize,
) -> Result<()> {
    if page.is_root() {
        return Err(AccessError::InvalidArgument("page id not provided"));
    }
    if page == new_parent {
        return Err(AccessError::InvalidMove("a page cannot be moved into itself"));
    }
    let moving = tree
        .get_page(page)
        .await
        .map_err(|e| AccessError::from_store(e, || format!("loading page {}", page)))?;
    if new_parent.is_root() {
        return Ok(());
    }
    let parent_path = page_path(tree, new_parent, PathOrder::LeafFirst, max_depth).await?;
    // leaf first, so the new parent itself is at the front
    if parent_path
        .first()
        .is_some_and(|parent| parent.owner_id != moving.owner_id)
    {
        return Err(AccessError::InvalidMove(
            "pages cannot be moved out of their owner's library",
        ));
    }
    if parent_path.iter().any(|ancestor| ancestor.id == page) {
        return Err(AccessError::InvalidMove(
            "a page cannot be moved under one of its descendants",
        ));
    }
    Ok(())
}
