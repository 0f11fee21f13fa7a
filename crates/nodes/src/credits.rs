//! Usage-cost metering for one node invocation.
//!
//! A [`CreditMeter`] is a cheap cloneable handle; every clone points at the
//! same counter and every mutation goes through one mutex, so concurrent tool
//! calls never tear an update. Actions do not touch the meter directly: they
//! charge a [`CreditScope`], whose pending adjustment lands on the meter in a
//! single step on [`CreditScope::commit`] or vanishes if the scope is dropped.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::debug;

/// Shared per-invocation credit counter. `None` means "unset".
#[derive(Debug, Clone, Default)]
pub struct CreditMeter {
    state: Arc<Mutex<Option<u64>>>,
}

impl CreditMeter {
    /// Meter initialised to the node's declared static cost.
    pub fn new(initial: u64) -> Self {
        Self {
            state: Arc::new(Mutex::new(Some(initial))),
        }
    }

    /// Meter with no value yet.
    pub fn unset() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<u64>> {
        // A panic while holding the lock cannot leave a half-written integer.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add `amount`; an unset meter counts as 0.
    pub fn charge(&self, amount: u64) {
        let mut state = self.lock();
        let next = state.unwrap_or(0).saturating_add(amount);
        *state = Some(next);
        debug!(amount, total = next, "credits charged");
    }

    /// Subtract `amount`, never going below 0.
    pub fn refund(&self, amount: u64) {
        let mut state = self.lock();
        let next = state.unwrap_or(0).saturating_sub(amount);
        *state = Some(next);
        debug!(amount, total = next, "credits refunded");
    }

    /// Overwrite the current value.
    pub fn set(&self, amount: u64) {
        *self.lock() = Some(amount);
        debug!(total = amount, "credits set");
    }

    /// Force the meter to 0; used whenever the invocation has nothing billable.
    pub fn reset(&self) {
        *self.lock() = Some(0);
        debug!("credits reset");
    }

    pub fn read(&self) -> Option<u64> {
        *self.lock()
    }

    /// Open a nested adjustment against this meter.
    pub fn scope(&self) -> CreditScope {
        CreditScope {
            meter: self.clone(),
            pending: Mutex::new(None),
        }
    }

    fn apply(&self, adjustment: Adjustment) -> u64 {
        let mut state = self.lock();
        let next = match adjustment {
            Adjustment::Add(amount) => state.unwrap_or(0).saturating_add(amount),
            Adjustment::Set(amount) => amount,
        };
        *state = Some(next);
        next
    }
}

/// Adjustment accumulated by a scope but not yet applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adjustment {
    /// Add to whatever the meter holds at commit time.
    Add(u64),
    /// Replace the meter's value at commit time.
    Set(u64),
}

/// Pending credit adjustment for one action run or one tool call.
#[derive(Debug)]
pub struct CreditScope {
    meter: CreditMeter,
    pending: Mutex<Option<Adjustment>>,
}

impl CreditScope {
    fn lock(&self) -> MutexGuard<'_, Option<Adjustment>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Accumulate a variable charge, e.g. proportional to retrieved tokens.
    pub fn charge(&self, amount: u64) {
        let mut pending = self.lock();
        *pending = Some(match *pending {
            None => Adjustment::Add(amount),
            Some(Adjustment::Add(n)) => Adjustment::Add(n.saturating_add(amount)),
            Some(Adjustment::Set(n)) => Adjustment::Set(n.saturating_add(amount)),
        });
    }

    /// Replace the meter's value at commit; later charges add on top of it.
    pub fn set(&self, amount: u64) {
        *self.lock() = Some(Adjustment::Set(amount));
    }

    pub fn pending(&self) -> Option<Adjustment> {
        *self.lock()
    }

    /// Apply the pending adjustment atomically and return the meter's value.
    pub fn commit(&self) -> Option<u64> {
        let pending = self.lock().take();
        match pending {
            Some(adjustment) => {
                let total = self.meter.apply(adjustment);
                debug!(?adjustment, total, "credit scope committed");
                Some(total)
            }
            None => self.meter.read(),
        }
    }

    /// Drop the pending adjustment without touching the meter.
    pub fn discard(&self) {
        if let Some(adjustment) = self.lock().take() {
            debug!(?adjustment, "credit scope discarded");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_at_declared_cost() {
        assert_eq!(CreditMeter::new(5).read(), Some(5));
        assert_eq!(CreditMeter::unset().read(), None);
    }

    #[test]
    fn charge_refund_set_reset() {
        let meter = CreditMeter::new(2);
        meter.charge(10);
        assert_eq!(meter.read(), Some(12));
        meter.refund(20);
        assert_eq!(meter.read(), Some(0));
        meter.set(7);
        assert_eq!(meter.read(), Some(7));
        meter.reset();
        assert_eq!(meter.read(), Some(0));
    }

    #[test]
    fn clones_share_one_counter() {
        let meter = CreditMeter::new(0);
        let other = meter.clone();
        other.charge(3);
        assert_eq!(meter.read(), Some(3));
    }

    #[test]
    fn scope_lands_only_on_commit() {
        let meter = CreditMeter::new(1);
        let scope = meter.scope();
        scope.charge(4);
        scope.charge(5);
        assert_eq!(meter.read(), Some(1));
        assert_eq!(scope.commit(), Some(10));
        assert_eq!(meter.read(), Some(10));
    }

    #[test]
    fn dropped_scope_leaves_no_charge() {
        let meter = CreditMeter::new(1);
        {
            let scope = meter.scope();
            scope.charge(100);
        }
        let scope = meter.scope();
        scope.charge(50);
        scope.discard();
        assert_eq!(meter.read(), Some(1));
    }

    #[test]
    fn scope_set_then_charge() {
        let meter = CreditMeter::new(30);
        let scope = meter.scope();
        scope.set(4);
        scope.charge(2);
        assert_eq!(scope.pending(), Some(Adjustment::Set(6)));
        assert_eq!(scope.commit(), Some(6));
    }

    #[test]
    fn concurrent_commits_are_not_lost() {
        let meter = CreditMeter::new(0);
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let meter = meter.clone();
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        let scope = meter.scope();
                        scope.charge(1);
                        scope.commit();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(meter.read(), Some(8000));
    }
}
