//! Board specifications currently in effect.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

use super::spec::BoardSpec;

/// Map of board id to specification, swappable as a whole.
///
/// Readers take a cheap `Arc` snapshot of the map, so a concurrent
/// [`replace_all`](Self::replace_all) never blocks a board build for longer
/// than a pointer swap.
#[derive(Debug, Default)]
pub struct BoardRegistry {
    specs: RwLock<Arc<BTreeMap<String, Arc<BoardSpec>>>>,
}

impl BoardRegistry {
    pub fn new(specs: BTreeMap<String, BoardSpec>) -> Self {
        let registry = Self::default();
        registry.replace_all(specs);
        registry
    }

    /// Swap in a new set of boards (e.g. after a config reload).
    pub fn replace_all(&self, specs: BTreeMap<String, BoardSpec>) {
        let specs: BTreeMap<String, Arc<BoardSpec>> = specs
            .into_iter()
            .map(|(id, spec)| (id, Arc::new(spec)))
            .collect();
        info!(boards = specs.len(), "board specifications loaded");

        let mut guard = self.specs.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Arc::new(specs);
    }

    fn current(&self) -> Arc<BTreeMap<String, Arc<BoardSpec>>> {
        self.specs
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Look up one board.
    pub fn get(&self, board_id: &str) -> Option<Arc<BoardSpec>> {
        self.current().get(board_id).cloned()
    }

    /// Configured board ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        self.current().keys().cloned().collect()
    }

    /// Configured boards with their display titles, sorted by id.
    pub fn titles(&self) -> Vec<(String, String)> {
        self.current()
            .iter()
            .map(|(id, spec)| {
                let title = spec
                    .title
                    .clone()
                    .filter(|t| !t.is_empty())
                    .unwrap_or_else(|| id.clone());
                (id.clone(), title)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.current().len()
    }

    pub fn is_empty(&self) -> bool {
        self.current().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(title: Option<&str>) -> BoardSpec {
        BoardSpec {
            title: title.map(String::from),
            ..BoardSpec::default()
        }
    }

    #[test]
    fn replace_all_swaps_everything() {
        let registry = BoardRegistry::new(BTreeMap::from([
            ("a".to_string(), spec(Some("A"))),
            ("b".to_string(), spec(None)),
        ]));
        assert_eq!(registry.ids(), vec!["a", "b"]);

        registry.replace_all(BTreeMap::from([("c".to_string(), spec(Some("C")))]));
        assert_eq!(registry.ids(), vec!["c"]);
        assert!(registry.get("a").is_none());
        assert_eq!(registry.get("c").unwrap().title.as_deref(), Some("C"));
    }

    #[test]
    fn titles_fall_back_to_id() {
        let registry = BoardRegistry::new(BTreeMap::from([
            ("vz".to_string(), spec(Some("Vorzimmer"))),
            ("kg".to_string(), spec(Some(""))),
        ]));
        assert_eq!(
            registry.titles(),
            vec![
                ("kg".to_string(), "kg".to_string()),
                ("vz".to_string(), "Vorzimmer".to_string())
            ]
        );
    }

    #[test]
    fn empty_registry() {
        let registry = BoardRegistry::default();
        assert!(registry.is_empty());
        assert!(registry.get("anything").is_none());
    }
}
