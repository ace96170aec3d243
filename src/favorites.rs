//! Favorited dockets of one user.
//!
//! Local edits are applied optimistically and then confirmed by the data
//! service; confirmed changes also arrive through the change subscription.
//! Both paths go through [`FavoriteSet::apply`], which is insert-if-absent /
//! delete-if-present, so the local set converges no matter in which order
//! the optimistic edit and the feed event land.

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::AbortHandle;

use crate::error::{DocketError, Result};
use crate::query::{Predicate, TableQuery};
use crate::remote::{ChangeEvent, ChangeKind, DataService, decode_rows};
use crate::types::{FAVORITES, Favorite};

/// A change to the favorite set, by docket government id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FavoriteChange {
    Added(String),
    Removed(String),
}

impl FavoriteChange {
    fn inverse(&self) -> Self {
        match self {
            FavoriteChange::Added(govid) => FavoriteChange::Removed(govid.clone()),
            FavoriteChange::Removed(govid) => FavoriteChange::Added(govid.clone()),
        }
    }

    fn from_event(event: &ChangeEvent) -> Option<Self> {
        let govid = event.row.get("docket_govid")?.as_str()?.to_string();
        Some(match event.kind {
            ChangeKind::Insert => FavoriteChange::Added(govid),
            ChangeKind::Delete => FavoriteChange::Removed(govid),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FavoriteSet {
    govids: BTreeSet<String>,
}

impl FavoriteSet {
    /// Apply a change. Returns true if the set changed.
    pub fn apply(&mut self, change: &FavoriteChange) -> bool {
        match change {
            FavoriteChange::Added(govid) => self.govids.insert(govid.clone()),
            FavoriteChange::Removed(govid) => self.govids.remove(govid),
        }
    }

    pub fn contains(&self, govid: &str) -> bool {
        self.govids.contains(govid)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.govids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.govids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.govids.is_empty()
    }
}

impl FromIterator<String> for FavoriteSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            govids: iter.into_iter().collect(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FavoriteOutcome {
    Added,
    AlreadyFavorited,
    Removed,
    NotFavorited,
}

impl std::fmt::Display for FavoriteOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FavoriteOutcome::Added => "added to favorites",
            FavoriteOutcome::AlreadyFavorited => "already favorited",
            FavoriteOutcome::Removed => "removed from favorites",
            FavoriteOutcome::NotFavorited => "not a favorite",
        };
        write!(f, "{text}")
    }
}

struct Shared<S> {
    service: S,
    user_id: String,
    set: Mutex<FavoriteSet>,
    view: watch::Sender<FavoriteSet>,
}

impl<S> Shared<S> {
    fn apply(&self, change: &FavoriteChange) {
        let mut set = self.set.lock();
        if set.apply(change) {
            self.view.send_replace(set.clone());
        }
    }
}

/// One user's favorites. Clones share the same set.
pub struct Favorites<S> {
    shared: Arc<Shared<S>>,
}

impl<S> Clone for Favorites<S> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

/// Running change feed merge. Dropping it stops the merge.
#[derive(Debug)]
pub struct FavoriteSync {
    handle: AbortHandle,
    ended: watch::Receiver<bool>,
}

impl FavoriteSync {
    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Wait for the change feed to end on its own.
    pub async fn closed(&mut self) -> DocketError {
        while !*self.ended.borrow_and_update() {
            if self.ended.changed().await.is_err() {
                break;
            }
        }
        DocketError::SubscriptionClosed(FAVORITES.to_string())
    }
}

impl Drop for FavoriteSync {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl<S: DataService> Favorites<S> {
    pub fn new(service: S, user_id: &str) -> Self {
        let (view, _) = watch::channel(FavoriteSet::default());
        Self {
            shared: Arc::new(Shared {
                service,
                user_id: user_id.to_string(),
                set: Mutex::new(FavoriteSet::default()),
                view,
            }),
        }
    }

    pub fn user_id(&self) -> &str {
        &self.shared.user_id
    }

    pub fn snapshot(&self) -> FavoriteSet {
        self.shared.set.lock().clone()
    }

    pub fn contains(&self, govid: &str) -> bool {
        self.shared.set.lock().contains(govid)
    }

    pub fn subscribe(&self) -> watch::Receiver<FavoriteSet> {
        self.shared.view.subscribe()
    }

    fn user_query(&self) -> TableQuery {
        TableQuery::new(FAVORITES).eq("user_id", &*self.shared.user_id)
    }

    /// Replace the local set with the user's stored favorites.
    pub async fn load(&self) -> Result<FavoriteSet> {
        let rows = self.shared.service.select(&self.user_query()).await?;
        let favorites: Vec<Favorite> = decode_rows(FAVORITES, rows)?;
        let set: FavoriteSet = favorites.into_iter().map(|f| f.docket_govid).collect();

        *self.shared.set.lock() = set.clone();
        self.shared.view.send_replace(set.clone());
        Ok(set)
    }

    /// Favorite a docket. A pair that already exists is reported, not failed.
    pub async fn add(&self, govid: &str) -> Result<FavoriteOutcome> {
        let govid = govid.trim();
        if govid.is_empty() {
            return Err(DocketError::InvalidInput("empty docket id".to_string()));
        }
        if self.contains(govid) {
            return Ok(FavoriteOutcome::AlreadyFavorited);
        }

        let change = FavoriteChange::Added(govid.to_string());
        self.shared.apply(&change);

        let row = serde_json::to_value(Favorite {
            user_id: self.shared.user_id.clone(),
            docket_govid: govid.to_string(),
        })?;
        match self.shared.service.insert(FAVORITES, row).await {
            Ok(_) => Ok(FavoriteOutcome::Added),
            Err(err) if err.is_unique_violation() => {
                tracing::debug!("{} already favorited {}", self.shared.user_id, govid);
                Ok(FavoriteOutcome::AlreadyFavorited)
            }
            Err(err) => {
                tracing::warn!("favoriting {} failed, rolling back: {}", govid, err);
                self.shared.apply(&change.inverse());
                Err(err)
            }
        }
    }

    /// Unfavorite a docket.
    pub async fn remove(&self, govid: &str) -> Result<FavoriteOutcome> {
        let govid = govid.trim();
        let was_present = self.contains(govid);
        let change = FavoriteChange::Removed(govid.to_string());
        self.shared.apply(&change);

        let query = self.user_query().eq("docket_govid", govid);
        match self.shared.service.delete(&query).await {
            Ok(0) => Ok(FavoriteOutcome::NotFavorited),
            Ok(_) => Ok(FavoriteOutcome::Removed),
            Err(err) => {
                tracing::warn!("unfavoriting {} failed, rolling back: {}", govid, err);
                if was_present {
                    self.shared.apply(&change.inverse());
                }
                Err(err)
            }
        }
    }

    /// Merge the user's change feed into the local set until the returned
    /// guard is dropped.
    pub async fn sync(&self) -> Result<FavoriteSync> {
        let filter = Predicate::Eq {
            column: "user_id".to_string(),
            value: self.shared.user_id.clone(),
        };
        let mut stream = self.shared.service.subscribe(FAVORITES, filter).await?;
        let shared = Arc::downgrade(&self.shared);
        let (ended_tx, ended) = watch::channel(false);

        let handle = tokio::spawn(async move {
            while let Some(event) = stream.recv().await {
                let Some(shared) = shared.upgrade() else {
                    return;
                };
                match FavoriteChange::from_event(&event) {
                    Some(change) => shared.apply(&change),
                    None => tracing::warn!("ignoring favorites event without docket_govid"),
                }
            }
            tracing::warn!("favorites change feed ended");
            ended_tx.send_replace(true);
        });

        Ok(FavoriteSync {
            handle: handle.abort_handle(),
            ended,
        })
    }
}
