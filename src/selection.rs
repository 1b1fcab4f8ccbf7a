use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::models::{EventCategory, SortBy};
use crate::query::Filter;

/// Per-user selection state. Only `saved`, `registered` and `categories` are
/// persisted; the search query and sort mode reset on every launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    pub saved: BTreeSet<String>,
    pub registered: BTreeSet<String>,
    pub categories: BTreeSet<EventCategory>,
    pub search_query: String,
    pub sort_by: SortBy,
}

impl Selection {
    pub fn is_saved(&self, id: &str) -> bool {
        self.saved.contains(id)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registered.contains(id)
    }

    pub fn toggle_category(&mut self, category: EventCategory) -> bool {
        if self.categories.remove(&category) {
            false
        } else {
            self.categories.insert(category);
            true
        }
    }

    pub fn forget(&mut self, id: &str) {
        self.saved.remove(id);
        self.registered.remove(id);
    }

    /// Prunes ids that do not name an event in `known`. Returns how many went.
    pub fn retain_known(&mut self, known: &HashSet<&str>) -> usize {
        let before = self.saved.len() + self.registered.len();
        self.saved.retain(|id| known.contains(id.as_str()));
        self.registered.retain(|id| known.contains(id.as_str()));
        before - self.saved.len() - self.registered.len()
    }

    pub fn filter(&self) -> Filter {
        Filter {
            categories: self.categories.clone(),
            search_query: self.search_query.clone(),
            sort_by: self.sort_by,
        }
    }

    pub fn snapshot(&self) -> SelectionSnapshot {
        SelectionSnapshot {
            saved_event_ids: self.saved.clone(),
            registered_event_ids: self.registered.clone(),
            selected_categories: self.categories.clone(),
        }
    }

    pub fn from_snapshot(snapshot: SelectionSnapshot) -> Self {
        Self {
            saved: snapshot.saved_event_ids,
            registered: snapshot.registered_event_ids,
            categories: snapshot.selected_categories,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionSnapshot {
    pub saved_event_ids: BTreeSet<String>,
    pub registered_event_ids: BTreeSet<String>,
    pub selected_categories: BTreeSet<EventCategory>,
}
