// Resource ledger — a multiset of `(ResourceKind, amount)` pairs.
//
// Used three ways by `ConstructionState`: the pending pool (delivered, not
// yet credited), the collected pool (credited to the current stage), and
// the consumed pool (credited to stages that have since been left). Moving
// amounts between ledgers is the only way resources change hands, so
// `pending + collected + consumed` always equals everything ever delivered.
//
// Zero entries are never stored. Backed by a `BTreeMap` so iteration order
// (and therefore event order and serialized output) is deterministic.

use crate::types::ResourceKind;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLedger {
    amounts: BTreeMap<ResourceKind, u32>,
}

impl ResourceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `amount` of `kind`. Returns `false` and changes nothing if the
    /// count would overflow.
    pub fn add(&mut self, kind: &ResourceKind, amount: u32) -> bool {
        if amount == 0 {
            return true;
        }
        let Some(sum) = self.get(kind).checked_add(amount) else {
            return false;
        };
        self.amounts.insert(kind.clone(), sum);
        true
    }

    pub fn get(&self, kind: &ResourceKind) -> u32 {
        self.amounts.get(kind).copied().unwrap_or(0)
    }

    /// Remove up to `max` of `kind`. Returns the amount actually removed.
    pub fn take(&mut self, kind: &ResourceKind, max: u32) -> u32 {
        let Some(slot) = self.amounts.get_mut(kind) else {
            return 0;
        };
        let taken = (*slot).min(max);
        *slot -= taken;
        if *slot == 0 {
            self.amounts.remove(kind);
        }
        taken
    }

    pub fn total(&self) -> u64 {
        self.amounts.values().map(|&v| u64::from(v)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.amounts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ResourceKind, u32)> {
        self.amounts.iter().map(|(k, &v)| (k, v))
    }

    /// Move everything from `other` into `self`, leaving `other` empty.
    /// Amounts that would overflow stay behind in `other`.
    pub fn absorb(&mut self, other: &mut ResourceLedger) {
        for (kind, amount) in std::mem::take(&mut other.amounts) {
            if !self.add(&kind, amount) {
                other.amounts.insert(kind, amount);
            }
        }
    }

    pub fn clear(&mut self) {
        self.amounts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood() -> ResourceKind {
        ResourceKind::from("Wood")
    }

    #[test]
    fn add_and_get() {
        let mut ledger = ResourceLedger::new();
        ledger.add(&wood(), 4);
        ledger.add(&wood(), 6);
        assert_eq!(ledger.get(&wood()), 10);
        assert_eq!(ledger.get(&ResourceKind::from("Stone")), 0);
        assert_eq!(ledger.total(), 10);
    }

    #[test]
    fn zero_is_not_stored() {
        let mut ledger = ResourceLedger::new();
        ledger.add(&wood(), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn overflowing_add_is_refused() {
        let mut ledger = ResourceLedger::new();
        assert!(ledger.add(&wood(), u32::MAX - 1));
        assert!(!ledger.add(&wood(), 2));
        assert_eq!(ledger.get(&wood()), u32::MAX - 1);
        assert!(ledger.add(&wood(), 1));
        assert_eq!(ledger.get(&wood()), u32::MAX);
    }

    #[test]
    fn take_is_bounded_and_prunes() {
        let mut ledger = ResourceLedger::new();
        ledger.add(&wood(), 3);
        assert_eq!(ledger.take(&wood(), 5), 3);
        assert!(ledger.is_empty());
        assert_eq!(ledger.take(&wood(), 5), 0);
    }

    #[test]
    fn absorb_moves_everything() {
        let mut a = ResourceLedger::new();
        let mut b = ResourceLedger::new();
        a.add(&wood(), 2);
        b.add(&wood(), 3);
        b.add(&ResourceKind::from("Stone"), 1);
        a.absorb(&mut b);
        assert!(b.is_empty());
        assert_eq!(a.get(&wood()), 5);
        assert_eq!(a.total(), 6);
    }

    #[test]
    fn iteration_is_sorted() {
        let mut ledger = ResourceLedger::new();
        ledger.add(&ResourceKind::from("Wood"), 1);
        ledger.add(&ResourceKind::from("Glass"), 1);
        ledger.add(&ResourceKind::from("Stone"), 1);
        let kinds: Vec<&str> = ledger.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(kinds, vec!["Glass", "Stone", "Wood"]);
    }
}
