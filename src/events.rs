use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::types::{ClientId, Frequency, InstallmentId, LoanId, LoanStatus};

/// all events that can be emitted by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    // lifecycle events
    LoanOriginated {
        loan_id: LoanId,
        client_id: ClientId,
        amount: Money,
        frequency: Frequency,
        timestamp: DateTime<Utc>,
    },
    ScheduleGenerated {
        loan_id: LoanId,
        installments: u32,
        installment_amount: Money,
        first_due: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },
    LoanCompleted {
        loan_id: LoanId,
        total_paid: Money,
        timestamp: DateTime<Utc>,
    },
    ClientRemoved {
        client_id: ClientId,
        loans_removed: usize,
        installments_removed: usize,
        timestamp: DateTime<Utc>,
    },

    // payment events
    PaymentRecorded {
        loan_id: LoanId,
        installment_id: InstallmentId,
        installment_no: u32,
        amount: Money,
        total_paid: Money,
        remaining_amount: Money,
        was_overdue: bool,
        timestamp: DateTime<Utc>,
    },
    InstallmentOverdue {
        loan_id: LoanId,
        installment_id: InstallmentId,
        installment_no: u32,
        due_date: DateTime<Utc>,
        timestamp: DateTime<Utc>,
    },

    // amendment events
    LoanAmended {
        loan_id: LoanId,
        old_amount: Money,
        new_amount: Money,
        old_start_date: DateTime<Utc>,
        new_start_date: DateTime<Utc>,
        installments_replaced: usize,
        installments_retained: usize,
        timestamp: DateTime<Utc>,
    },

    // status change events
    LoanStatusChanged {
        loan_id: LoanId,
        old_status: LoanStatus,
        new_status: LoanStatus,
        reason: String,
        timestamp: DateTime<Utc>,
    },
}

/// event store for collecting events during operations
#[derive(Debug, Default)]
pub struct EventStore {
    events: Vec<Event>,
}

impl EventStore {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    pub fn extend(&mut self, events: impl IntoIterator<Item = Event>) {
        self.events.extend(events);
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
