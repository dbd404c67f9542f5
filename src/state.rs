use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::decimal::Money;
use crate::schedule::{self, ScheduledInstallment};
use crate::types::{
    ClientId, ClientStatus, Frequency, InstallmentId, InstallmentStatus, LoanId, LoanStatus,
    StaffId,
};

/// borrower record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub assigned_staff: StaffId,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
}

impl Client {
    pub fn new(
        name: String,
        email: String,
        phone: String,
        assigned_staff: StaffId,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            phone,
            assigned_staff,
            status: ClientStatus::Active,
            created_at,
        }
    }
}

/// loan state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Loan {
    pub id: LoanId,
    pub client_id: ClientId,

    // terms
    pub loan_amount: Money,
    pub loan_start_date: DateTime<Utc>,
    pub frequency: Frequency,
    /// installment count, fixed by the frequency
    pub tenure: u32,
    /// per-installment amount (stored as `monthlyInstallment` upstream)
    pub installment_amount: Money,

    // ledger
    pub total_paid: Money,
    pub remaining_amount: Money,
    pub status: LoanStatus,

    /// bumped by the store on every applied change
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// new loan awaiting its schedule
    pub fn new(
        client_id: ClientId,
        loan_amount: Money,
        loan_start_date: DateTime<Utc>,
        frequency: Frequency,
        now: DateTime<Utc>,
    ) -> Self {
        let tenure = frequency.tenure();
        Self {
            id: Uuid::new_v4(),
            client_id,
            loan_amount,
            loan_start_date,
            frequency,
            tenure,
            installment_amount: schedule::installment_amount(loan_amount, tenure),
            total_paid: Money::ZERO,
            remaining_amount: loan_amount,
            status: LoanStatus::PendingApproval,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// recompute `remaining_amount` from principal and payments
    pub fn recompute_remaining(&mut self) {
        self.remaining_amount = self.loan_amount - self.total_paid;
    }

    /// whether the ledger fields agree with each other
    pub fn balance_is_consistent(&self) -> bool {
        self.remaining_amount == self.loan_amount - self.total_paid
    }

    pub fn is_completed(&self) -> bool {
        self.status == LoanStatus::Completed
    }
}

/// one scheduled repayment of a loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub id: InstallmentId,
    pub loan_id: LoanId,
    pub client_id: ClientId,
    pub installment_no: u32,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
    pub paid_at: Option<DateTime<Utc>>,
}

impl Installment {
    /// attach a generated schedule row to a loan
    pub fn from_scheduled(loan: &Loan, scheduled: ScheduledInstallment) -> Self {
        Self {
            id: Uuid::new_v4(),
            loan_id: loan.id,
            client_id: loan.client_id,
            installment_no: scheduled.installment_no,
            amount: scheduled.amount,
            due_date: scheduled.due_date,
            status: scheduled.status,
            paid_at: None,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.status == InstallmentStatus::Paid
    }

    /// still pending and past its due date
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        self.status == InstallmentStatus::Pending && now > self.due_date
    }
}

/// sum of paid installment amounts
pub fn paid_total(installments: &[Installment]) -> Money {
    installments
        .iter()
        .filter(|i| i.is_paid())
        .map(|i| i.amount)
        .sum()
}

/// a loan with its installments, as loaded from the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanRecord {
    pub loan: Loan,
    pub installments: Vec<Installment>,
}

impl LoanRecord {
    /// installments ordered by due date
    pub fn sorted_by_due_date(&self) -> Vec<&Installment> {
        let mut items: Vec<&Installment> = self.installments.iter().collect();
        items.sort_by_key(|i| (i.due_date, i.installment_no));
        items
    }

    /// first unpaid installment in due-date order
    pub fn next_due(&self) -> Option<&Installment> {
        self.sorted_by_due_date()
            .into_iter()
            .find(|i| i.status.is_outstanding())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    }

    fn record() -> LoanRecord {
        let loan = Loan::new(Uuid::new_v4(), Money::from_major(4_000), start(), Frequency::Monthly, start());
        let installments = schedule::generate(loan.loan_amount, start(), loan.frequency)
            .unwrap()
            .into_iter()
            .map(|s| Installment::from_scheduled(&loan, s))
            .collect();
        LoanRecord { loan, installments }
    }

    #[test]
    fn test_new_loan_balances() {
        let loan = record().loan;
        assert_eq!(loan.tenure, 4);
        assert_eq!(loan.installment_amount, Money::from_major(1_000));
        assert_eq!(loan.remaining_amount, Money::from_major(4_000));
        assert_eq!(loan.status, LoanStatus::PendingApproval);
        assert!(loan.balance_is_consistent());
    }

    #[test]
    fn test_recompute_remaining() {
        let mut loan = record().loan;
        loan.total_paid = Money::from_major(1_500);
        assert!(!loan.balance_is_consistent());
        loan.recompute_remaining();
        assert_eq!(loan.remaining_amount, Money::from_major(2_500));
    }

    #[test]
    fn test_past_due_only_for_pending() {
        let mut rec = record();
        let later = Utc.with_ymd_and_hms(2023, 11, 2, 0, 0, 0).unwrap();
        assert!(rec.installments[0].is_past_due(later));
        assert!(!rec.installments[0].is_past_due(rec.installments[0].due_date));
        rec.installments[0].status = InstallmentStatus::Paid;
        assert!(!rec.installments[0].is_past_due(later));
    }

    #[test]
    fn test_next_due_skips_paid() {
        let mut rec = record();
        rec.installments[0].status = InstallmentStatus::Paid;
        rec.installments[1].status = InstallmentStatus::Overdue;
        assert_eq!(rec.next_due().map(|i| i.installment_no), Some(2));
        assert_eq!(paid_total(&rec.installments), Money::from_major(1_000));
    }
}
