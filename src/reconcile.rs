//! overdue reconciliation sweep
//!
//! A pass takes `now` explicitly and is driven by an outside timer. Each loan
//! is reconciled and stored on its own, so one bad record never blocks the
//! rest, and a [`SweepGuard`] keeps two passes from overlapping.

use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{LedgerError, Result};
use crate::events::Event;
use crate::ledger::{LedgerPlan, LoanLedger};
use crate::state::LoanRecord;
use crate::store::LedgerStore;
use crate::types::{LoanId, LoanStatus};

/// plans for every loan that needs an update as of `now`
pub fn reconcile_all(records: &[LoanRecord], now: DateTime<Utc>) -> Vec<LedgerPlan> {
    records
        .iter()
        .filter_map(|r| LoanLedger::new(r).reconcile(now))
        .collect()
}

/// run-in-progress flag for the sweep
#[derive(Debug, Default)]
pub struct SweepGuard {
    running: AtomicBool,
}

impl SweepGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// claim the sweep; `None` if another pass holds it
    pub fn try_begin(&self) -> Option<SweepPermit<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SweepPermit { guard: self })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// releases the sweep on drop
#[derive(Debug)]
pub struct SweepPermit<'a> {
    guard: &'a SweepGuard,
}

impl Drop for SweepPermit<'_> {
    fn drop(&mut self) {
        self.guard.running.store(false, Ordering::Release);
    }
}

/// loan status change observed during a pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub loan_id: LoanId,
    pub old_status: LoanStatus,
    pub new_status: LoanStatus,
}

/// loan that could not be reconciled
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepFailure {
    pub loan_id: LoanId,
    pub error: String,
}

/// outcome of one sweep pass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub ran_at: DateTime<Utc>,
    /// another pass was in progress, nothing was done
    pub skipped: bool,
    pub loans_scanned: usize,
    pub loans_updated: usize,
    pub installments_flagged: usize,
    pub status_changes: Vec<StatusChange>,
    pub failures: Vec<SweepFailure>,
    #[serde(skip)]
    pub events: Vec<Event>,
}

impl SweepReport {
    fn new(ran_at: DateTime<Utc>) -> Self {
        Self {
            ran_at,
            skipped: false,
            loans_scanned: 0,
            loans_updated: 0,
            installments_flagged: 0,
            status_changes: Vec::new(),
            failures: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// drives sweep passes against a store
#[derive(Debug, Default)]
pub struct Reconciler {
    guard: SweepGuard,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_running()
    }

    /// run a pass at the provider's current time
    pub fn run_with_time<S: LedgerStore + ?Sized>(&self, store: &S, time: &SafeTimeProvider) -> SweepReport {
        self.run(store, time.now())
    }

    /// run a pass as of `now`
    pub fn run<S: LedgerStore + ?Sized>(&self, store: &S, now: DateTime<Utc>) -> SweepReport {
        let mut report = SweepReport::new(now);

        let Some(_permit) = self.guard.try_begin() else {
            warn!("reconciliation sweep already running, skipping");
            report.skipped = true;
            return report;
        };

        let loan_ids = match store.loan_ids() {
            Ok(ids) => ids,
            Err(e) => {
                warn!(error = %e, "reconciliation sweep could not list loans");
                report.failures.push(SweepFailure {
                    loan_id: LoanId::nil(),
                    error: e.to_string(),
                });
                return report;
            }
        };

        for loan_id in loan_ids {
            report.loans_scanned += 1;
            match reconcile_one(store, loan_id, now) {
                Ok(Some(applied)) => {
                    report.loans_updated += 1;
                    report.installments_flagged += applied.plan.update.len();
                    if applied.old_status != applied.loan_status() {
                        report.status_changes.push(StatusChange {
                            loan_id,
                            old_status: applied.old_status,
                            new_status: applied.loan_status(),
                        });
                    }
                    report.events.extend(applied.plan.events);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(%loan_id, error = %e, "failed to reconcile loan, continuing");
                    report.failures.push(SweepFailure {
                        loan_id,
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            scanned = report.loans_scanned,
            updated = report.loans_updated,
            flagged = report.installments_flagged,
            failed = report.failures.len(),
            "reconciliation sweep finished"
        );

        report
    }
}

struct Applied {
    old_status: LoanStatus,
    plan: LedgerPlan,
}

impl Applied {
    fn loan_status(&self) -> LoanStatus {
        self.plan.loan.status
    }
}

/// reconcile and store one loan, reloading once if a writer got there first
fn reconcile_one<S: LedgerStore + ?Sized>(store: &S, loan_id: LoanId, now: DateTime<Utc>) -> Result<Option<Applied>> {
    let mut reloaded = false;
    loop {
        let record = store.loan(loan_id)?;
        let Some(plan) = LoanLedger::new(&record).reconcile(now) else {
            return Ok(None);
        };

        match store.apply(&plan) {
            Ok(_) => {
                return Ok(Some(Applied {
                    old_status: record.loan.status,
                    plan,
                }))
            }
            Err(LedgerError::ConcurrentModification { .. }) if !reloaded => reloaded = true,
            Err(e) => return Err(e),
        }
    }
}
