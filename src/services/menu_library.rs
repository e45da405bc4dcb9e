use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::db::KeyValueStore;
use crate::error::Result;
use crate::models::{MenuCategory, MenuLibrary, MenuState, MENU_LIBRARY_VERSION};
use crate::services::sheets::SheetsApi;
use crate::utils::normalize_text;

pub const MENU_LIBRARY_KEY: &str = "menu-diario-library-v1";

/// Merges `incoming` into `existing`, keyed by normalized text. First-seen casing wins.
/// Returns the merged list and the items that were not seen before.
pub fn merge_unique(existing: &[String], incoming: &[String]) -> (Vec<String>, Vec<String>) {
    let mut seen = HashSet::new();
    let mut merged = Vec::with_capacity(existing.len() + incoming.len());
    for value in existing {
        let key = normalize_text(value);
        if !key.is_empty() && seen.insert(key) {
            merged.push(value.trim().to_string());
        }
    }

    let mut added = Vec::new();
    for value in incoming {
        let trimmed = value.trim();
        let key = normalize_text(trimmed);
        if !key.is_empty() && seen.insert(key) {
            merged.push(trimmed.to_string());
            added.push(trimmed.to_string());
        }
    }
    (merged, added)
}

/// Autocomplete suggestions previously typed into the editor, per course.
pub struct MenuLibraryStore {
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<Arc<MenuLibrary>>,
    bootstrapped: AtomicBool,
}

impl MenuLibraryStore {
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let initial = load_initial(store.as_ref());
        let (state, _) = watch::channel(Arc::new(initial));
        MenuLibraryStore {
            store,
            state,
            bootstrapped: AtomicBool::new(false),
        }
    }

    pub fn library(&self) -> Arc<MenuLibrary> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<MenuLibrary>> {
        self.state.subscribe()
    }

    /// Adds items locally and returns the ones that were genuinely new.
    pub fn add_items(&self, category: MenuCategory, items: &[String]) -> Result<Vec<String>> {
        let cleaned = items
            .iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>();
        if cleaned.is_empty() {
            return Ok(Vec::new());
        }

        let current = self.library();
        let (merged, added) = merge_unique(current.list(category), &cleaned);
        if added.is_empty() {
            return Ok(added);
        }

        let mut next = (*current).clone();
        *next.list_mut(category) = merged;
        self.commit(next)?;
        debug!(category = category.as_str(), count = added.len(), "Suggestions added");
        Ok(added)
    }

    /// Like `add_items`, then pushes only the new items to the remote sheet.
    pub async fn add_items_synced(
        &self,
        api: &dyn SheetsApi,
        category: MenuCategory,
        items: &[String],
    ) -> Result<Vec<String>> {
        let added = self.add_items(category, items)?;
        if !added.is_empty() {
            if let Err(err) = api.append_suggestions(category, &added).await {
                warn!(category = category.as_str(), error = %err, "Suggestion sync failed");
            }
        }
        Ok(added)
    }

    /// Seeds the library from every weekday's lists. Runs once per store.
    pub fn bootstrap_from_state(&self, state: &MenuState) -> Result<bool> {
        if self.bootstrapped.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        for category in MenuCategory::ALL {
            let items = state
                .days
                .iter()
                .flat_map(|day| day.list(category).iter().cloned())
                .collect::<Vec<_>>();
            self.add_items(category, &items)?;
        }
        Ok(true)
    }

    /// Merges remote suggestions into the local library. Failures are logged and reported as `false`.
    pub async fn load_from_sheets(&self, api: &dyn SheetsApi) -> bool {
        let remote = match api.read_suggestions().await {
            Ok(remote) => remote,
            Err(err) => {
                warn!(error = %err, "Suggestion read failed");
                return false;
            }
        };

        for category in MenuCategory::ALL {
            if let Err(err) = self.add_items(category, remote.list(category)) {
                warn!(category = category.as_str(), error = %err, "Could not store remote suggestions");
                return false;
            }
        }
        true
    }

    /// Substring match on the normalized form, skipping entries already in `existing`.
    pub fn suggestions(&self, category: MenuCategory, query: &str, existing: &[String]) -> Vec<String> {
        let needle = normalize_text(query);
        let taken = existing
            .iter()
            .map(|s| normalize_text(s))
            .collect::<HashSet<_>>();

        self.library()
            .list(category)
            .iter()
            .filter(|candidate| {
                let normalized = normalize_text(candidate);
                if normalized.is_empty() || taken.contains(&normalized) {
                    return false;
                }
                needle.is_empty() || normalized.contains(&needle)
            })
            .cloned()
            .collect()
    }

    fn commit(&self, next: MenuLibrary) -> Result<()> {
        let raw = serde_json::to_string(&next)?;
        self.store.set(MENU_LIBRARY_KEY, &raw)?;
        self.state.send_replace(Arc::new(next));
        Ok(())
    }
}

fn load_initial(store: &dyn KeyValueStore) -> MenuLibrary {
    let raw = match store.get(MENU_LIBRARY_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => return MenuLibrary::empty(),
        Err(err) => {
            warn!(error = %err, "Could not read suggestion library");
            return MenuLibrary::empty();
        }
    };

    match serde_json::from_str::<MenuLibrary>(&raw) {
        Ok(library) if library.version == MENU_LIBRARY_VERSION => library,
        Ok(_) => {
            debug!("Stored library has a different version, discarding");
            MenuLibrary::empty()
        }
        Err(err) => {
            warn!(error = %err, "Stored library is malformed, discarding");
            MenuLibrary::empty()
        }
    }
}
