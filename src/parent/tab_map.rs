//! The tab-identity map.
//!
//! Untrusted code never sees a [`TabHandle`]; it sees small sequential
//! integers. The map assigns an id lazily on first reference and keeps only
//! a weak association, so an entry is never the reason a closed tab's
//! resources stay alive. Reverse lookup deliberately scans the *currently
//! open* tabs; the id of a closed tab resolves to not-found even though
//! the id itself is never reused.

// ============================================================================
// Imports
// ============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use crate::identifiers::TabId;

use super::host::{TabHandle, WeakTabHandle};

// ============================================================================
// TabMap
// ============================================================================

/// Weak side table from tab identity to exposed [`TabId`].
#[derive(Default)]
pub struct TabMap {
    entries: Mutex<Vec<(TabId, WeakTabHandle)>>,
    next: AtomicU32,
}

impl TabMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            next: AtomicU32::new(0),
        }
    }

    /// Returns the id for `tab`, assigning the next sequential one on first
    /// reference.
    pub fn id_for(&self, tab: &TabHandle) -> TabId {
        let mut entries = self.entries.lock();

        // Dead entries are pruned on the way through; ids stay burned.
        entries.retain(|(_, weak)| weak.is_alive());

        if let Some((id, _)) = entries.iter().find(|(_, weak)| weak.matches(tab)) {
            return *id;
        }

        let id = TabId::new(self.next.fetch_add(1, Ordering::Relaxed));
        entries.push((id, tab.downgrade()));
        trace!(%id, url = tab.url(), "tab id assigned");
        id
    }

    /// Finds the open tab carrying `id`, scanning `current` back to front.
    ///
    /// Tabs with no assigned id get one during the scan, matching the lazy
    /// assignment of [`TabMap::id_for`]. Returns `None` for ids whose tab
    /// is no longer open.
    pub fn tab_for(&self, id: TabId, current: &[TabHandle]) -> Option<TabHandle> {
        current
            .iter()
            .rev()
            .find(|tab| self.id_for(tab) == id)
            .cloned()
    }

    /// Number of live associations.
    #[must_use]
    pub fn len(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|(_, weak)| weak.is_alive());
        entries.len()
    }

    /// Whether no live associations remain.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_is_stable_per_tab() {
        let map = TabMap::new();
        let tab = TabHandle::new("https://a.example", "A");
        assert_eq!(map.id_for(&tab), map.id_for(&tab));
        assert_eq!(map.id_for(&tab), map.id_for(&tab.clone()));
    }

    #[test]
    fn test_distinct_tabs_get_distinct_ids() {
        let map = TabMap::new();
        let a = TabHandle::new("https://a.example", "A");
        let b = TabHandle::new("https://a.example", "A");
        assert_ne!(map.id_for(&a), map.id_for(&b));
    }

    #[test]
    fn test_ids_are_sequential() {
        let map = TabMap::new();
        let a = TabHandle::new("https://a.example", "A");
        let b = TabHandle::new("https://b.example", "B");
        assert_eq!(map.id_for(&a), TabId::new(0));
        assert_eq!(map.id_for(&b), TabId::new(1));
    }

    #[test]
    fn test_reverse_lookup_over_current_tabs() {
        let map = TabMap::new();
        let a = TabHandle::new("https://a.example", "A");
        let b = TabHandle::new("https://b.example", "B");
        let id_b = map.id_for(&b);

        let current = vec![a.clone(), b.clone()];
        let found = map.tab_for(id_b, &current).expect("open tab");
        assert!(found.same_tab(&b));
    }

    #[test]
    fn test_closed_tab_resolves_to_not_found() {
        let map = TabMap::new();
        let a = TabHandle::new("https://a.example", "A");
        let b = TabHandle::new("https://b.example", "B");
        let id_b = map.id_for(&b);
        drop(b);

        // `b` is gone from the current tabs; its id no longer resolves.
        assert!(map.tab_for(id_b, &[a]).is_none());
    }

    #[test]
    fn test_map_does_not_keep_tabs_alive() {
        let map = TabMap::new();
        let tab = TabHandle::new("https://a.example", "A");
        map.id_for(&tab);
        assert_eq!(map.len(), 1);

        drop(tab);
        assert!(map.is_empty());
    }

    #[test]
    fn test_ids_never_reused_after_close() {
        let map = TabMap::new();
        let a = TabHandle::new("https://a.example", "A");
        let id_a = map.id_for(&a);
        drop(a);

        let b = TabHandle::new("https://b.example", "B");
        assert_ne!(map.id_for(&b), id_a);
    }

    #[test]
    fn test_lazy_assignment_during_reverse_scan() {
        let map = TabMap::new();
        let a = TabHandle::new("https://a.example", "A");
        let b = TabHandle::new("https://b.example", "B");

        // Nothing assigned yet; the scan itself assigns back to front.
        assert!(map.tab_for(TabId::new(99), &[a.clone(), b.clone()]).is_none());
        assert_eq!(map.id_for(&b), TabId::new(0));
        assert_eq!(map.id_for(&a), TabId::new(1));
    }
}
