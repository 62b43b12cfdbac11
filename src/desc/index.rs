use std::collections::HashMap;

use parking_lot::Mutex;

/// Interns (op type, op name) pairs into numeric indices for the
/// descriptor.
///
/// Shared between the decode thread, which interns, and the upload side,
/// which resolves. Each index is resolved at most once.
pub struct OpIndexTable {
    inner: Mutex<Inner>,
}

struct Inner {
    next: u32,
    entries: HashMap<u32, (String, String)>,
}

impl Default for OpIndexTable {
    fn default() -> Self {
        Self::new()
    }
}

impl OpIndexTable {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    fn starting_at(next: u32) -> Self {
        Self {
            inner: Mutex::new(Inner {
                next,
                entries: HashMap::new(),
            }),
        }
    }

    /// Store the pair and return its index. Returns 0 once the counter is
    /// exhausted.
    pub fn intern(&self, op_type: &str, op_name: &str) -> u32 {
        let mut inner = self.inner.lock();
        let index = inner.next;
        if index == 0 {
            return 0;
        }
        inner.next = index.wrapping_add(1);
        inner
            .entries
            .insert(index, (op_type.to_string(), op_name.to_string()));
        index
    }

    /// Take the (op type, op name) pair for `index`, removing it.
    pub fn resolve(&self, index: u32) -> Option<(String, String)> {
        self.inner.lock().entries.remove(&index)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_default_table_matches_new() {
        let table = OpIndexTable::default();
        assert!(table.is_empty());
        assert_eq!(table.intern("Add", "add1"), 1);
    }

    #[test]
    fn test_indices_start_at_one() {
        let table = OpIndexTable::new();
        assert_eq!(table.intern("Conv2D", "conv1"), 1);
        assert_eq!(table.intern("Conv2D", "conv1"), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_resolve_consumes() {
        let table = OpIndexTable::new();
        let idx = table.intern("MatMul", "fc");
        assert_eq!(
            table.resolve(idx),
            Some(("MatMul".to_string(), "fc".to_string()))
        );
        assert_eq!(table.resolve(idx), None);
        assert!(table.is_empty());
    }

    #[test]
    fn test_exhausted_counter_returns_zero() {
        let table = OpIndexTable::starting_at(u32::MAX);
        assert_eq!(table.intern("a", "b"), u32::MAX);
        assert_eq!(table.intern("a", "b"), 0);
        assert_eq!(table.intern("a", "b"), 0);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_concurrent_interning_is_unique() {
        let table = Arc::new(OpIndexTable::new());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let table = Arc::clone(&table);
                std::thread::spawn(move || {
                    (0..250)
                        .map(|i| table.intern("T", &i.to_string()))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        let mut all: Vec<u32> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), 1000);
        assert_eq!(table.len(), 1000);
    }
}
