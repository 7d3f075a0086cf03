//! Ordering map and focus for open sessions
//!
//! Every transition leaves ranks as exactly `0..n-1`.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TabOrderItem {
    pub tab_key: String,
    /// 0-based rank
    pub order: usize,
    /// Label shown in the tab strip
    pub name: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TabOrder {
    items: Vec<TabOrderItem>,
    active: Option<String>,
}

impl TabOrder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild from a persisted record, repairing gaps and duplicate keys.
    pub fn from_items(items: Vec<TabOrderItem>) -> Self {
        let mut order = TabOrder {
            items: Vec::new(),
            active: None,
        };
        let mut sorted = items;
        sorted.sort_by_key(|t| t.order);
        for item in sorted {
            if !order.contains(&item.tab_key) {
                order.items.push(item);
            }
        }
        order.renumber();
        order
    }

    /// Items sorted by rank.
    pub fn items(&self) -> &[TabOrderItem] {
        &self.items
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.items.iter().any(|t| t.tab_key == key)
    }

    pub fn rank(&self, key: &str) -> Option<usize> {
        self.items.iter().find(|t| t.tab_key == key).map(|t| t.order)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|t| t.tab_key.as_str())
    }

    /// Track `key` at the end if new and focus it. Returns `true` if inserted.
    pub fn open(&mut self, key: &str, name: &str) -> bool {
        let inserted = if self.contains(key) {
            false
        } else {
            self.items.push(TabOrderItem {
                tab_key: key.to_string(),
                order: self.items.len(),
                name: name.to_string(),
            });
            true
        };
        self.active = Some(key.to_string());
        inserted
    }

    /// Focus an already tracked key.
    pub fn focus(&mut self, key: &str) -> bool {
        if self.contains(key) {
            self.active = Some(key.to_string());
            true
        } else {
            false
        }
    }

    /// Remove `key`. When it was active, focus moves to the tab now at its
    /// old rank, else the one before it, else nothing.
    pub fn close(&mut self, key: &str) -> bool {
        let Some(rank) = self.rank(key) else {
            return false;
        };
        self.items.retain(|t| t.tab_key != key);
        self.renumber();

        if self.active.as_deref() == Some(key) {
            let next = self
                .items
                .get(rank)
                .or_else(|| rank.checked_sub(1).and_then(|r| self.items.get(r)));
            self.active = next.map(|t| t.tab_key.clone());
        }
        true
    }

    /// Keep only `key` (nothing if untracked). Returns the closed keys.
    pub fn close_others(&mut self, key: &str) -> Vec<String> {
        let closed: Vec<String> = self
            .keys()
            .filter(|k| *k != key)
            .map(String::from)
            .collect();
        self.items.retain(|t| t.tab_key == key);
        self.renumber();
        self.active = self.contains(key).then(|| key.to_string());
        closed
    }

    /// Returns the closed keys.
    pub fn close_all(&mut self) -> Vec<String> {
        let closed: Vec<String> = self.keys().map(String::from).collect();
        self.items.clear();
        self.active = None;
        closed
    }

    /// Move `key` to rank `to` (clamped), shifting the others.
    pub fn reorder(&mut self, key: &str, to: usize) -> bool {
        let Some(from) = self.rank(key) else {
            return false;
        };
        let item = self.items.remove(from);
        let to = to.min(self.items.len());
        self.items.insert(to, item);
        self.renumber();
        true
    }

    /// Key `step` positions away from the active tab, wrapping around.
    pub fn neighbour(&self, step: isize) -> Option<&str> {
        if self.items.is_empty() {
            return None;
        }
        let len = self.items.len() as isize;
        let current = self.active.as_deref().and_then(|k| self.rank(k)).unwrap_or(0) as isize;
        let idx = (current + step).rem_euclid(len) as usize;
        Some(self.items[idx].tab_key.as_str())
    }

    /// Items are kept in rank order; ranks follow positions.
    fn renumber(&mut self) {
        for (idx, item) in self.items.iter_mut().enumerate() {
            item.order = idx;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dense(order: &TabOrder) -> bool {
        order
            .items()
            .iter()
            .enumerate()
            .all(|(idx, t)| t.order == idx)
    }

    fn opened(keys: &[&str]) -> TabOrder {
        let mut order = TabOrder::new();
        for k in keys {
            order.open(k, k);
        }
        order
    }

    #[test]
    fn test_open_is_idempotent() {
        let mut order = opened(&["a", "b"]);
        assert!(!order.open("a", "a"));
        assert_eq!(order.len(), 2);
        assert_eq!(order.active(), Some("a"));
        assert_eq!(order.rank("b"), Some(1));
    }

    #[test]
    fn test_close_active_moves_focus_to_same_rank() {
        let mut order = opened(&["a", "b", "c"]);
        order.focus("b");
        order.close("b");
        assert_eq!(order.active(), Some("c"));
        assert!(dense(&order));
    }

    #[test]
    fn test_close_last_active_falls_back_to_previous() {
        let mut order = opened(&["a", "b", "c"]);
        order.close("c");
        assert_eq!(order.active(), Some("b"));
    }

    #[test]
    fn test_close_inactive_keeps_focus() {
        let mut order = opened(&["a", "b", "c"]);
        order.close("a");
        assert_eq!(order.active(), Some("c"));
        assert_eq!(order.rank("c"), Some(1));
    }

    #[test]
    fn test_close_only_tab() {
        let mut order = opened(&["a"]);
        order.close("a");
        assert_eq!(order.active(), None);
        assert!(order.is_empty());
    }

    #[test]
    fn test_close_others() {
        let mut order = opened(&["a", "b", "c"]);
        let closed = order.close_others("b");
        assert_eq!(closed, vec!["a".to_string(), "c".to_string()]);
        assert_eq!(order.active(), Some("b"));
        assert_eq!(order.rank("b"), Some(0));

        let closed = order.close_others("zzz");
        assert_eq!(closed, vec!["b".to_string()]);
        assert!(order.is_empty());
        assert_eq!(order.active(), None);
    }

    #[test]
    fn test_reorder_and_neighbour() {
        let mut order = opened(&["a", "b", "c"]);
        order.reorder("c", 0);
        let keys: Vec<_> = order.keys().collect();
        assert_eq!(keys, vec!["c", "a", "b"]);
        assert!(dense(&order));
        assert_eq!(order.neighbour(1), Some("a"));
        assert_eq!(order.neighbour(-1), Some("b"));

        order.reorder("c", 99);
        assert_eq!(order.rank("c"), Some(2));
    }

    #[test]
    fn test_ranks_dense_after_mixed_operations() {
        let mut order = TabOrder::new();
        let ops = ["o:a", "o:b", "o:c", "c:b", "o:d", "r:a:5", "o:b", "c:a", "c:x", "r:d:0", "o:e", "c:e"];
        for op in ops {
            let parts: Vec<&str> = op.split(':').collect();
            match parts[0] {
                "o" => {
                    order.open(parts[1], parts[1]);
                }
                "c" => {
                    order.close(parts[1]);
                }
                _ => {
                    order.reorder(parts[1], parts[2].parse().unwrap());
                }
            }
            assert!(dense(&order), "ranks not dense after {op}");
            let mut keys: Vec<_> = order.keys().collect();
            keys.sort();
            keys.dedup();
            assert_eq!(keys.len(), order.len());
        }
    }

    #[test]
    fn test_from_items_repairs_record() {
        let order = TabOrder::from_items(vec![
            TabOrderItem { tab_key: "b".into(), order: 7, name: "b".into() },
            TabOrderItem { tab_key: "a".into(), order: 2, name: "a".into() },
            TabOrderItem { tab_key: "a".into(), order: 9, name: "a".into() },
        ]);
        let keys: Vec<_> = order.keys().collect();
        assert_eq!(keys, vec!["a", "b"]);
        assert!(dense(&order));
    }
}
