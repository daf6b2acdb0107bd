//! Creation/destruction accounting for toolkit objects
//!
//! Every toolkit object records itself here when created and when torn
//! down. The counters are per thread, which matches the single dispatch
//! thread the toolkit runs on and keeps parallel tests apart.

use std::cell::RefCell;
use std::collections::BTreeMap;

thread_local! {
    static LEDGER: RefCell<BTreeMap<&'static str, Counts>> = RefCell::new(BTreeMap::new());
}

/// Counters for one kind of object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub created: u64,
    pub destroyed: u64,
}

impl Counts {
    /// Objects created and not yet destroyed
    pub fn live(&self) -> u64 {
        self.created.saturating_sub(self.destroyed)
    }
}

/// A snapshot of the counters on the current thread
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Ledger(BTreeMap<&'static str, Counts>);

impl Ledger {
    /// Counters for `kind`, zero if it was never seen
    pub fn get(&self, kind: &str) -> Counts {
        self.0.get(kind).copied().unwrap_or_default()
    }

    /// Whether every created object was destroyed exactly once
    pub fn is_balanced(&self) -> bool {
        self.0.values().all(|c| c.created == c.destroyed)
    }

    /// Activity that happened after `earlier` was taken
    pub fn since(&self, earlier: &Ledger) -> Ledger {
        let counts = self
            .0
            .iter()
            .map(|(kind, now)| {
                let before = earlier.get(kind);
                (
                    *kind,
                    Counts {
                        created: now.created - before.created,
                        destroyed: now.destroyed - before.destroyed,
                    },
                )
            })
            .collect();
        Ledger(counts)
    }

    /// Kinds that have live objects, with their live count
    pub fn live(&self) -> Vec<(&'static str, u64)> {
        self.0
            .iter()
            .filter(|(_, c)| c.live() > 0)
            .map(|(kind, c)| (*kind, c.live()))
            .collect()
    }
}

/// Take a snapshot of the current thread's counters
pub fn snapshot() -> Ledger {
    LEDGER.with(|ledger| Ledger(ledger.borrow().clone()))
}

pub(crate) fn record_create(kind: &'static str) {
    LEDGER.with(|ledger| ledger.borrow_mut().entry(kind).or_default().created += 1);
}

pub(crate) fn record_destroy(kind: &'static str) {
    LEDGER.with(|ledger| ledger.borrow_mut().entry(kind).or_default().destroyed += 1);
}
