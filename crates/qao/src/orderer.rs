//! The ordered set that keeps attached objects sorted by
//! `(-priority, stableToken)`, guaranteeing a total, stable order even
//! among objects that share a priority.

use std::collections::BTreeMap;

/// `(-priority, stableToken)`. Negating the priority means the natural
/// ascending order of the tuple visits highest-priority objects first;
/// the token breaks ties in insertion order.
pub(crate) type OrderKey = (i64, u64);

pub(crate) fn order_key(priority: i32, token: u64) -> OrderKey {
    (-(priority as i64), token)
}

/// A `BTreeMap`-backed ordered set from [`OrderKey`] to arena index.
#[derive(Default)]
pub(crate) struct Orderer {
    by_key: BTreeMap<OrderKey, u32>,
}

impl Orderer {
    pub fn insert(&mut self, key: OrderKey, index: u32) {
        self.by_key.insert(key, index);
    }

    pub fn remove(&mut self, key: OrderKey) {
        self.by_key.remove(&key);
    }

    pub fn contains_at(&self, key: OrderKey, index: u32) -> bool {
        self.by_key.get(&key) == Some(&index)
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    /// A point-in-time snapshot of `(key, index)` pairs in priority order.
    /// Iterating a snapshot rather than the live map is what lets the
    /// scheduler tolerate self-detach and mid-pass attach/reprioritize.
    pub fn snapshot(&self) -> Vec<(OrderKey, u32)> {
        self.by_key.iter().map(|(k, v)| (*k, *v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_priority_sorts_first() {
        let mut o = Orderer::default();
        o.insert(order_key(10, 0), 100);
        o.insert(order_key(80, 1), 101);
        o.insert(order_key(70, 2), 102);
        let snap = o.snapshot();
        let indices: Vec<u32> = snap.into_iter().map(|(_, i)| i).collect();
        assert_eq!(indices, vec![101, 102, 100]);
    }

    #[test]
    fn ties_break_by_token_order() {
        let mut o = Orderer::default();
        o.insert(order_key(5, 2), 2);
        o.insert(order_key(5, 1), 1);
        o.insert(order_key(5, 0), 0);
        let indices: Vec<u32> = o.snapshot().into_iter().map(|(_, i)| i).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }
}
