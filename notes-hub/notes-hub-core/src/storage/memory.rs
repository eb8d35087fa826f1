use crate::access::AccessBitmask;
use crate::error::{Entity, StoreError, StoreResult};
use crate::page::{Page, PageSummary, PageTree};
use crate::permission::{validate_grant, PermissionRecord, PermissionStore, TokenPermissionRecord};
use crate::principal::{PageId, TokenId, UserId};
use anyhow::Context;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::Path;
use tracing::info;

/// Serialized form of a [`MemoryStore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub permissions: Vec<PermissionRecord>,
    #[serde(default)]
    pub token_permissions: Vec<TokenPermissionRecord>,
}

#[derive(Default)]
struct State {
    pages: BTreeMap<PageId, Page>,
    permissions: BTreeMap<u64, PermissionRecord>,
    by_user: HashMap<(PageId, UserId), u64>,
    token_permissions: BTreeMap<u64, TokenPermissionRecord>,
    by_token: HashMap<(PageId, TokenId), u64>,
    last_page: u64,
    last_permission: u64,
    last_token_permission: u64,
}

/// Hand out the id after `last`. Ids are never reused, so a store whose
/// highest id is `u64::MAX` cannot allocate any more.
fn allocate(last: &mut u64) -> StoreResult<u64> {
    let id = last
        .checked_add(1)
        .ok_or(StoreError::InvalidArgument("id space exhausted"))?;
    *last = id;
    Ok(id)
}

impl State {
    /// Records must pass the same checks as an upsert and point at a stored page.
    fn check_record(
        &self,
        id: u64,
        page: PageId,
        principal: u64,
        access: AccessBitmask,
    ) -> StoreResult<()> {
        if id == 0 {
            return Err(StoreError::InvalidArgument("record id 0 is reserved"));
        }
        validate_grant(page, principal, access)?;
        if !self.pages.contains_key(&page) {
            return Err(StoreError::InvalidArgument("record references a missing page"));
        }
        Ok(())
    }

    fn insert_permission(&mut self, record: PermissionRecord) -> StoreResult<()> {
        self.check_record(record.id, record.page_id, record.user_id.0, record.access)?;
        let key = (record.page_id, record.user_id);
        if self.by_user.contains_key(&key) || self.permissions.contains_key(&record.id) {
            return Err(StoreError::InvalidArgument("duplicate permission record"));
        }
        self.by_user.insert(key, record.id);
        self.permissions.insert(record.id, record);
        self.last_permission = self.last_permission.max(record.id);
        Ok(())
    }

    fn insert_token_permission(&mut self, record: TokenPermissionRecord) -> StoreResult<()> {
        self.check_record(record.id, record.page_id, record.token_id.0, record.access)?;
        let key = (record.page_id, record.token_id);
        if self.by_token.contains_key(&key) || self.token_permissions.contains_key(&record.id) {
            return Err(StoreError::InvalidArgument("duplicate token permission record"));
        }
        self.by_token.insert(key, record.id);
        self.token_permissions.insert(record.id, record);
        self.last_token_permission = self.last_token_permission.max(record.id);
        Ok(())
    }

    fn children(&self, parent: PageId) -> impl Iterator<Item = &Page> {
        self.pages.values().filter(move |p| p.parent_id == parent)
    }
}

/// In-process backend for both collaborator traits.
///
/// Ids are handed out sequentially starting at 1. The lock is never held
/// across an await point.
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(State::default()),
        }
    }

    /// Rebuild a store, rejecting duplicate ids, duplicate `(page, principal)`
    /// pairs and records an upsert would refuse.
    pub fn from_snapshot(snapshot: Snapshot) -> StoreResult<Self> {
        let store = Self::new();
        {
            let mut state = store.state.write();
            for page in snapshot.pages {
                if page.id.is_root() {
                    return Err(StoreError::InvalidArgument("page id 0 is reserved"));
                }
                state.last_page = state.last_page.max(page.id.0);
                if state.pages.insert(page.id, page).is_some() {
                    return Err(StoreError::InvalidArgument("duplicate page id"));
                }
            }
            for record in snapshot.permissions {
                state.insert_permission(record)?;
            }
            for record in snapshot.token_permissions {
                state.insert_token_permission(record)?;
            }
        }
        Ok(store)
    }

    pub fn snapshot(&self) -> Snapshot {
        let state = self.state.read();
        Snapshot {
            pages: state.pages.values().cloned().collect(),
            permissions: state.permissions.values().copied().collect(),
            token_permissions: state.token_permissions.values().copied().collect(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading snapshot {}", path.display()))?;
        let snapshot: Snapshot = serde_json::from_str(&data)
            .with_context(|| format!("parsing snapshot {}", path.display()))?;
        Ok(Self::from_snapshot(snapshot)?)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let data = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, data).with_context(|| format!("writing snapshot {}", path.display()))?;
        Ok(())
    }

    /// Create a page under `parent`, or at the top of `owner`'s library when
    /// `parent` is [`PageId::ROOT`].
    pub fn create_page(
        &self,
        parent: PageId,
        owner: UserId,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> StoreResult<PageId> {
        if owner.0 == 0 {
            return Err(StoreError::InvalidArgument("owner id not provided"));
        }
        let mut state = self.state.write();
        if !parent.is_root() && !state.pages.contains_key(&parent) {
            return Err(StoreError::not_found(Entity::Page, parent.0));
        }
        let id = PageId(allocate(&mut state.last_page)?);
        state.pages.insert(
            id,
            Page {
                id,
                parent_id: parent,
                owner_id: owner,
                name: name.into(),
                content: content.into(),
            },
        );
        Ok(id)
    }

    /// Replace a stored page as is. Moves should be checked with
    /// [`crate::page::validate_move`] first.
    pub fn update_page(&self, page: Page) -> StoreResult<()> {
        let mut state = self.state.write();
        match state.pages.get_mut(&page.id) {
            Some(slot) => {
                *slot = page;
                Ok(())
            }
            None => Err(StoreError::not_found(Entity::Page, page.id.0)),
        }
    }

    /// Delete a page, its descendants and every record attached to them.
    /// Returns the removed ids, `page` first.
    pub fn remove_page(&self, page: PageId) -> StoreResult<Vec<PageId>> {
        let mut state = self.state.write();
        if !state.pages.contains_key(&page) {
            return Err(StoreError::not_found(Entity::Page, page.0));
        }

        let mut removed = Vec::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([page]);
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            removed.push(id);
            queue.extend(state.children(id).map(|p| p.id));
        }

        let state = &mut *state;
        for id in &removed {
            state.pages.remove(id);
        }
        let gone: HashSet<PageId> = removed.iter().copied().collect();
        state.permissions.retain(|_, r| !gone.contains(&r.page_id));
        state.by_user.retain(|(p, _), _| !gone.contains(p));
        state.token_permissions.retain(|_, r| !gone.contains(&r.page_id));
        state.by_token.retain(|(p, _), _| !gone.contains(p));

        info!(page = %page, pages = removed.len(), "removed page subtree");
        Ok(removed)
    }

    pub fn page_count(&self) -> usize {
        self.state.read().pages.len()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PageTree for MemoryStore {
    async fn get_page(&self, id: PageId) -> StoreResult<Page> {
        self.state
            .read()
            .pages
            .get(&id)
            .cloned()
            .ok_or_else(|| StoreError::not_found(Entity::Page, id.0))
    }

    async fn get_children(&self, id: PageId) -> StoreResult<Vec<PageSummary>> {
        let state = self.state.read();
        if !id.is_root() && !state.pages.contains_key(&id) {
            return Err(StoreError::not_found(Entity::Page, id.0));
        }
        Ok(state.children(id).map(PageSummary::from).collect())
    }

    async fn get_root_pages(&self, owner: UserId) -> StoreResult<Vec<PageSummary>> {
        Ok(self
            .state
            .read()
            .children(PageId::ROOT)
            .filter(|p| p.owner_id == owner)
            .map(PageSummary::from)
            .collect())
    }
}

#[async_trait]
impl PermissionStore for MemoryStore {
    async fn get_permission(&self, page: PageId, user: UserId) -> StoreResult<PermissionRecord> {
        let state = self.state.read();
        state
            .by_user
            .get(&(page, user))
            .and_then(|id| state.permissions.get(id))
            .copied()
            .ok_or_else(|| StoreError::not_found(Entity::Permission, 0))
    }

    async fn get_permission_by_id(&self, id: u64) -> StoreResult<PermissionRecord> {
        self.state
            .read()
            .permissions
            .get(&id)
            .copied()
            .ok_or_else(|| StoreError::not_found(Entity::Permission, id))
    }

    async fn list_permissions(&self, page: PageId) -> StoreResult<Vec<PermissionRecord>> {
        Ok(self
            .state
            .read()
            .permissions
            .values()
            .filter(|r| r.page_id == page)
            .copied()
            .collect())
    }

    async fn upsert_permission(
        &self,
        page: PageId,
        user: UserId,
        access: AccessBitmask,
    ) -> StoreResult<PermissionRecord> {
        validate_grant(page, user.0, access)?;
        let mut state = self.state.write();
        if !state.pages.contains_key(&page) {
            return Err(StoreError::not_found(Entity::Page, page.0));
        }
        if let Some(id) = state.by_user.get(&(page, user)).copied() {
            if let Some(record) = state.permissions.get_mut(&id) {
                record.access = access;
                return Ok(*record);
            }
        }
        let record = PermissionRecord {
            id: allocate(&mut state.last_permission)?,
            page_id: page,
            user_id: user,
            access,
        };
        state.insert_permission(record)?;
        Ok(record)
    }

    async fn remove_permission(&self, id: u64) -> StoreResult<PermissionRecord> {
        let mut state = self.state.write();
        let record = state
            .permissions
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(Entity::Permission, id))?;
        state.by_user.remove(&(record.page_id, record.user_id));
        Ok(record)
    }

    async fn get_token_permission(
        &self,
        page: PageId,
        token: TokenId,
    ) -> StoreResult<TokenPermissionRecord> {
        let state = self.state.read();
        state
            .by_token
            .get(&(page, token))
            .and_then(|id| state.token_permissions.get(id))
            .copied()
            .ok_or_else(|| StoreError::not_found(Entity::TokenPermission, 0))
    }

    async fn get_token_permission_by_id(&self, id: u64) -> StoreResult<TokenPermissionRecord> {
        self.state
            .read()
            .token_permissions
            .get(&id)
            .copied()
            .ok_or_else(|| StoreError::not_found(Entity::TokenPermission, id))
    }

    async fn list_token_permissions(
        &self,
        page: PageId,
    ) -> StoreResult<Vec<TokenPermissionRecord>> {
        Ok(self
            .state
            .read()
            .token_permissions
            .values()
            .filter(|r| r.page_id == page)
            .copied()
            .collect())
    }

    async fn upsert_token_permission(
        &self,
        page: PageId,
        token: TokenId,
        access: AccessBitmask,
    ) -> StoreResult<TokenPermissionRecord> {
        validate_grant(page, token.0, access)?;
        let mut state = self.state.write();
        if !state.pages.contains_key(&page) {
            return Err(StoreError::not_found(Entity::Page, page.0));
        }
        if let Some(id) = state.by_token.get(&(page, token)).copied() {
            if let Some(record) = state.token_permissions.get_mut(&id) {
                record.access = access;
                return Ok(*record);
            }
        }
        let record = TokenPermissionRecord {
            id: allocate(&mut state.last_token_permission)?,
            page_id: page,
            token_id: token,
            access,
        };
        state.insert_token_permission(record)?;
        Ok(record)
    }

    async fn remove_token_permission(&self, id: u64) -> StoreResult<TokenPermissionRecord> {
        let mut state = self.state.write();
        let record = state
            .token_permissions
            .remove(&id)
            .ok_or_else(|| StoreError::not_found(Entity::TokenPermission, id))?;
        state.by_token.remove(&(record.page_id, record.token_id));
        Ok(record)
    }
}
