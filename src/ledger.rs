//! loan ledger
//!
//! Keeps `remaining_amount == loan_amount - total_paid` and
//! `total_paid == sum(paid installment amounts)` across payments, amendments
//! and overdue reconciliation. Nothing here touches storage: every operation
//! returns a [`LedgerPlan`] describing the mutations, which the caller applies
//! as one unit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::schedule;
use crate::state::{paid_total, Client, Installment, Loan, LoanRecord};
use crate::status;
use crate::types::{Frequency, InstallmentId, InstallmentStatus, LoanStatus};

/// aggregate loan status from its balance and installments
///
/// A non-positive remaining balance means `Completed` even when overdue flags
/// predating completion are still present.
pub fn derive_status(loan: &Loan, installments: &[Installment]) -> LoanStatus {
    if loan.remaining_amount <= Money::ZERO {
        LoanStatus::Completed
    } else if installments
        .iter()
        .any(|i| i.status == InstallmentStatus::Overdue)
    {
        LoanStatus::Overdue
    } else {
        LoanStatus::InProgress
    }
}

/// requested change to loan terms
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amendment {
    pub new_amount: Option<Money>,
    pub new_start_date: Option<DateTime<Utc>>,
}

impl Amendment {
    pub fn amount(amount: Money) -> Self {
        Self {
            new_amount: Some(amount),
            new_start_date: None,
        }
    }

    pub fn start_date(date: DateTime<Utc>) -> Self {
        Self {
            new_amount: None,
            new_start_date: Some(date),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.new_amount.is_none() && self.new_start_date.is_none()
    }
}

/// mutations produced by a ledger operation, applied atomically by the store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerPlan {
    /// loan state after the operation
    pub loan: Loan,
    /// version the stored loan must still have; `None` inserts a new loan
    pub expected_version: Option<u64>,
    /// client to insert alongside a new loan
    pub client: Option<Client>,
    /// stored client to overwrite in the same write as the loan
    pub client_update: Option<Client>,
    /// existing installments with changed fields
    pub update: Vec<Installment>,
    /// installments to remove
    pub delete: Vec<InstallmentId>,
    /// installments to add
    pub insert: Vec<Installment>,
    pub events: Vec<Event>,
}

impl LedgerPlan {
    fn for_loan(loan: Loan, expected_version: Option<u64>) -> Self {
        Self {
            loan,
            expected_version,
            client: None,
            client_update: None,
            update: Vec::new(),
            delete: Vec::new(),
            insert: Vec::new(),
            events: Vec::new(),
        }
    }

    /// whether applying the plan would change nothing
    pub fn is_noop(&self) -> bool {
        self.update.is_empty()
            && self.delete.is_empty()
            && self.insert.is_empty()
            && self.client.is_none()
            && self.client_update.is_none()
            && self.events.is_empty()
    }

    /// apply to an in-memory record, returning the resulting record
    ///
    /// The loan version is left to the store; this only replays the data
    /// changes.
    pub fn apply_to(&self, record: &LoanRecord) -> LoanRecord {
        let mut installments: Vec<Installment> = record
            .installments
            .iter()
            .filter(|i| !self.delete.contains(&i.id))
            .map(|i| {
                self.update
                    .iter()
                    .find(|u| u.id == i.id)
                    .cloned()
                    .unwrap_or_else(|| i.clone())
            })
            .collect();
        installments.extend(self.insert.iter().cloned());
        installments.sort_by_key(|i| i.installment_no);

        LoanRecord {
            loan: self.loan.clone(),
            installments,
        }
    }
}

/// ledger view over one loan and its installments
pub struct LoanLedger<'a> {
    record: &'a LoanRecord,
}

impl<'a> LoanLedger<'a> {
    pub fn new(record: &'a LoanRecord) -> Self {
        Self { record }
    }

    /// plan a new client with a scheduled loan
    pub fn originate(
        client: Client,
        loan_amount: Money,
        loan_start_date: DateTime<Utc>,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> Result<LedgerPlan> {
        validate_client(&client)?;
        let scheduled = schedule::generate(loan_amount, loan_start_date, frequency)?;

        let mut loan = Loan::new(client.id, loan_amount, loan_start_date, frequency, now);
        let installments: Vec<Installment> = scheduled
            .into_iter()
            .map(|s| Installment::from_scheduled(&loan, s))
            .collect();

        let mut events = EventStore::new();
        events.emit(Event::LoanOriginated {
            loan_id: loan.id,
            client_id: client.id,
            amount: loan_amount,
            frequency,
            timestamp: now,
        });
        emit_schedule(&mut events, &loan, &installments, now);
        settle(&mut loan, &installments, "schedule generated", now, &mut events);

        info!(
            loan_id = %loan.id,
            client_id = %client.id,
            amount = %loan_amount,
            %frequency,
            "loan originated"
        );

        let mut plan = LedgerPlan::for_loan(loan, None);
        plan.client = Some(client);
        plan.insert = installments;
        plan.events = events.take_events();
        Ok(plan)
    }

    /// verify that the loan balance agrees with its installments
    pub fn check_invariants(&self) -> Result<()> {
        let loan = &self.record.loan;
        let paid = paid_total(&self.record.installments);
        if paid != loan.total_paid {
            return Err(LedgerError::ConcurrentModification {
                loan_id: loan.id,
                message: format!(
                    "total paid {} disagrees with paid installments {}",
                    loan.total_paid, paid
                ),
            });
        }
        if !loan.balance_is_consistent() {
            return Err(LedgerError::ConcurrentModification {
                loan_id: loan.id,
                message: format!(
                    "remaining {} disagrees with amount {} less paid {}",
                    loan.remaining_amount, loan.loan_amount, loan.total_paid
                ),
            });
        }
        Ok(())
    }

    /// plan payment of one installment
    pub fn record_payment(&self, installment_id: InstallmentId, now: DateTime<Utc>) -> Result<LedgerPlan> {
        let loan = &self.record.loan;
        let mut installment = self
            .record
            .installments
            .iter()
            .find(|i| i.id == installment_id && i.loan_id == loan.id)
            .cloned()
            .ok_or(LedgerError::InstallmentNotFound { id: installment_id })?;

        self.check_invariants()?;

        let was_overdue = installment.status == InstallmentStatus::Overdue;
        status::mark_paid(&mut installment, now)?;

        let mut updated = loan.clone();
        updated.total_paid += installment.amount;

        let after: Vec<Installment> = self
            .record
            .installments
            .iter()
            .map(|i| if i.id == installment.id { installment.clone() } else { i.clone() })
            .collect();

        let mut events = EventStore::new();
        let reason = format!("installment {} paid", installment.installment_no);
        settle(&mut updated, &after, &reason, now, &mut events);

        let mut front = EventStore::new();
        front.emit(Event::PaymentRecorded {
            loan_id: loan.id,
            installment_id,
            installment_no: installment.installment_no,
            amount: installment.amount,
            total_paid: updated.total_paid,
            remaining_amount: updated.remaining_amount,
            was_overdue,
            timestamp: now,
        });
        front.extend(events.take_events());

        info!(
            loan_id = %loan.id,
            installment_no = installment.installment_no,
            amount = %installment.amount,
            remaining = %updated.remaining_amount,
            "payment recorded"
        );

        let mut plan = LedgerPlan::for_loan(updated, Some(loan.version));
        plan.update.push(installment);
        plan.events = front.take_events();
        Ok(plan)
    }

    /// plan a change of principal and/or start date
    ///
    /// Paid installments are kept as they are. Every unpaid installment is
    /// replaced by a fresh schedule over the loan's own frequency, numbered
    /// after the highest retained installment so numbers stay unique.
    pub fn amend(&self, amendment: &Amendment, now: DateTime<Utc>) -> Result<LedgerPlan> {
        if amendment.is_empty() {
            return Err(LedgerError::validation("amendment changes nothing"));
        }
        if let Some(amount) = amendment.new_amount {
            if !amount.is_positive() {
                return Err(LedgerError::validation(format!(
                    "loan amount must be positive, got {}",
                    amount
                )));
            }
        }
        self.check_invariants()?;

        let loan = &self.record.loan;
        let new_amount = amendment.new_amount.unwrap_or(loan.loan_amount);
        let new_start = amendment.new_start_date.unwrap_or(loan.loan_start_date);

        // unpaid Overdue rows are replaced too, not only Pending ones; only
        // Paid installments survive an amendment
        let (retained, discarded): (Vec<&Installment>, Vec<&Installment>) =
            self.record.installments.iter().partition(|i| i.is_paid());
        let offset = retained.iter().map(|i| i.installment_no).max().unwrap_or(0);

        let mut updated = loan.clone();
        updated.loan_amount = new_amount;
        updated.loan_start_date = new_start;
        updated.installment_amount = schedule::installment_amount(new_amount, updated.tenure);

        let fresh: Vec<Installment> = schedule::generate(new_amount, new_start, updated.frequency)?
            .into_iter()
            .map(|mut s| {
                s.installment_no += offset;
                Installment::from_scheduled(&updated, s)
            })
            .collect();

        let after: Vec<Installment> = retained
            .iter()
            .map(|i| (*i).clone())
            .chain(fresh.iter().cloned())
            .collect();

        let mut events = EventStore::new();
        events.emit(Event::LoanAmended {
            loan_id: loan.id,
            old_amount: loan.loan_amount,
            new_amount,
            old_start_date: loan.loan_start_date,
            new_start_date: new_start,
            installments_replaced: discarded.len(),
            installments_retained: retained.len(),
            timestamp: now,
        });
        emit_schedule(&mut events, &updated, &fresh, now);
        settle(&mut updated, &after, "loan amended", now, &mut events);

        info!(
            loan_id = %loan.id,
            old_amount = %loan.loan_amount,
            %new_amount,
            replaced = discarded.len(),
            retained = retained.len(),
            "loan amended"
        );

        let mut plan = LedgerPlan::for_loan(updated, Some(loan.version));
        plan.delete = discarded.iter().map(|i| i.id).collect();
        plan.insert = fresh;
        plan.events = events.take_events();
        Ok(plan)
    }

    /// plan overdue flags and status refresh as of `now`
    ///
    /// Returns `None` when the loan is already up to date, so repeated passes
    /// at the same instant change nothing.
    pub fn reconcile(&self, now: DateTime<Utc>) -> Option<LedgerPlan> {
        let loan = &self.record.loan;
        let mut events = EventStore::new();
        let mut flagged = Vec::new();

        let after: Vec<Installment> = self
            .record
            .installments
            .iter()
            .map(|i| {
                let mut item = i.clone();
                if status::mark_overdue_if_due(&mut item, now) {
                    events.emit(Event::InstallmentOverdue {
                        loan_id: loan.id,
                        installment_id: item.id,
                        installment_no: item.installment_no,
                        due_date: item.due_date,
                        timestamp: now,
                    });
                    flagged.push(item.clone());
                }
                item
            })
            .collect();

        let mut updated = loan.clone();
        let reason = if flagged.is_empty() {
            "reconciled".to_string()
        } else {
            format!("{} installment(s) past due", flagged.len())
        };
        settle(&mut updated, &after, &reason, now, &mut events);

        if flagged.is_empty() && updated.status == loan.status && updated.remaining_amount == loan.remaining_amount {
            return None;
        }

        debug!(loan_id = %loan.id, flagged = flagged.len(), status = %updated.status, "loan reconciled");

        let mut plan = LedgerPlan::for_loan(updated, Some(loan.version));
        plan.update = flagged;
        plan.events = events.take_events();
        Some(plan)
    }
}

fn validate_client(client: &Client) -> Result<()> {
    if client.name.trim().is_empty() {
        return Err(LedgerError::validation("client name is required"));
    }
    if client.email.trim().is_empty() {
        return Err(LedgerError::validation("client email is required"));
    }
    Ok(())
}

fn emit_schedule(events: &mut EventStore, loan: &Loan, installments: &[Installment], now: DateTime<Utc>) {
    if let Some(first) = installments.iter().map(|i| i.due_date).min() {
        events.emit(Event::ScheduleGenerated {
            loan_id: loan.id,
            installments: installments.len() as u32,
            installment_amount: loan.installment_amount,
            first_due: first,
            timestamp: now,
        });
    }
}

/// recompute balance and status, emitting events for any status change
fn settle(
    loan: &mut Loan,
    installments: &[Installment],
    reason: &str,
    now: DateTime<Utc>,
    events: &mut EventStore,
) {
    loan.recompute_remaining();
    let new_status = derive_status(loan, installments);
    if new_status == loan.status {
        return;
    }

    let old_status = loan.status;
    loan.status = new_status;
    loan.updated_at = now;

    events.emit(Event::LoanStatusChanged {
        loan_id: loan.id,
        old_status,
        new_status,
        reason: reason.to_string(),
        timestamp: now,
    });
    if new_status == LoanStatus::Completed {
        events.emit(Event::LoanCompleted {
            loan_id: loan.id,
            total_paid: loan.total_paid,
            timestamp: now,
        });
    }
}
