use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};

use serde::Serialize;

/// Id of the single context-menu entry the extension installs.
pub const SHORTEN_MENU_ID: &str = "yourls";

/// Browser contexts a menu entry is shown in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MenuContext {
    All,
    Page,
    Selection,
    Link,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MenuItem {
    pub id: String,
    pub title: String,
    pub contexts: Vec<MenuContext>,
}

impl MenuItem {
    /// The "Shorten URL" entry, shown everywhere.
    pub fn shorten() -> Self {
        Self {
            id: SHORTEN_MENU_ID.to_string(),
            title: "Shorten URL".to_string(),
            contexts: vec![MenuContext::All],
        }
    }
}

/// What a call to [`MenuRegistry::register`] changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    Created,
    Updated,
    Unchanged,
}

/// Context-menu entries keyed by id.
///
/// Registration happens once at startup, but registering an id again is
/// safe: an identical item is a no-op and a changed item replaces the old
/// one, so restarts never pile up duplicate entries.
#[derive(Debug, Default)]
pub struct MenuRegistry {
    items: Mutex<BTreeMap<String, MenuItem>>,
}

impl MenuRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, item: MenuItem) -> Registration {
        let mut items = self.items.lock().unwrap_or_else(PoisonError::into_inner);
        let outcome = match items.get(&item.id) {
            None => Registration::Created,
            Some(existing) if *existing == item => return Registration::Unchanged,
            Some(_) => Registration::Updated,
        };
        tracing::debug!(id = %item.id, ?outcome, "context menu entry registered");
        items.insert(item.id.clone(), item);
        outcome
    }

    pub fn get(&self, id: &str) -> Option<MenuItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    /// Registered entries ordered by id.
    pub fn items(&self) -> Vec<MenuItem> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}
