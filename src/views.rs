//! serializable read models for clients and their loans

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::decimal::Money;
use crate::state::{Client, Installment, Loan, LoanRecord};
use crate::types::{ClientId, ClientStatus, Frequency, LoanId, LoanStatus, StaffId};

/// label for a completed loan
pub const ALL_PAID: &str = "All Paid";

/// label when there is nothing to show
pub const NO_DUE_DATE: &str = "-";

/// next outstanding due date as `01 Nov 2023`, or a placeholder
pub fn next_due_label(record: Option<&LoanRecord>) -> String {
    let Some(record) = record else {
        return NO_DUE_DATE.to_string();
    };
    match record.next_due() {
        Some(installment) => installment.due_date.format("%d %b %Y").to_string(),
        None if record.loan.status == LoanStatus::Completed => ALL_PAID.to_string(),
        None => NO_DUE_DATE.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanView {
    pub id: LoanId,
    pub loan_amount: Money,
    pub loan_start_date: DateTime<Utc>,
    pub frequency: Frequency,
    pub tenure: u32,
    pub installment_amount: Money,
    pub total_paid: Money,
    pub remaining_amount: Money,
    pub status: LoanStatus,
}

impl LoanView {
    pub fn from_loan(loan: &Loan) -> Self {
        LoanView {
            id: loan.id,
            loan_amount: loan.loan_amount,
            loan_start_date: loan.loan_start_date,
            frequency: loan.frequency,
            tenure: loan.tenure,
            installment_amount: loan.installment_amount,
            total_paid: loan.total_paid,
            remaining_amount: loan.remaining_amount,
            status: loan.status,
        }
    }
}

/// row of the client list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientSummaryView {
    pub id: ClientId,
    pub name: String,
    pub email: String,
    pub phone: String,
    pub assigned_staff: StaffId,
    pub status: ClientStatus,
    pub created_at: DateTime<Utc>,
    pub loan: Option<LoanView>,
    /// installments ordered by due date
    pub installments: Vec<Installment>,
    pub next_due: String,
}

impl ClientSummaryView {
    pub fn new(client: Client, record: Option<LoanRecord>) -> Self {
        let next_due = next_due_label(record.as_ref());
        let (loan, installments) = match &record {
            Some(r) => (
                Some(LoanView::from_loan(&r.loan)),
                r.sorted_by_due_date().into_iter().cloned().collect(),
            ),
            None => (None, Vec::new()),
        };

        ClientSummaryView {
            id: client.id,
            name: client.name,
            email: client.email,
            phone: client.phone,
            assigned_staff: client.assigned_staff,
            status: client.status,
            created_at: client.created_at,
            loan,
            installments,
            next_due,
        }
    }

    /// convert to pretty-printed json string
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// single client with loan and installments in number order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfileView {
    pub client: Client,
    pub loan: Option<LoanView>,
    pub installments: Vec<Installment>,
}

impl ClientProfileView {
    pub fn new(client: Client, record: Option<LoanRecord>) -> Self {
        let (loan, installments) = match record {
            Some(r) => {
                let mut installments = r.installments;
                installments.sort_by_key(|i| i.installment_no);
                (Some(LoanView::from_loan(&r.loan)), installments)
            }
            None => (None, Vec::new()),
        };

        ClientProfileView {
            client,
            loan,
            installments,
        }
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::LoanLedger;
    use crate::types::InstallmentStatus;
    use chrono::TimeZone;
    use uuid::Uuid;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    }

    fn record() -> (Client, LoanRecord) {
        let client = Client::new("John Doe".into(), "john@example.com".into(), String::new(), Uuid::new_v4(), start());
        let plan = LoanLedger::originate(client.clone(), Money::from_major(10_000), start(), Frequency::Monthly, start()).unwrap();
        let record = plan.apply_to(&LoanRecord {
            loan: plan.loan.clone(),
            installments: Vec::new(),
        });
        (client, record)
    }

    #[test]
    fn test_next_due_labels() {
        assert_eq!(next_due_label(None), "-");

        let (_, mut record) = record();
        assert_eq!(next_due_label(Some(&record)), "01 Nov 2023");

        record.installments[0].status = InstallmentStatus::Paid;
        assert_eq!(next_due_label(Some(&record)), "01 Dec 2023");

        for i in record.installments.iter_mut() {
            i.status = InstallmentStatus::Paid;
        }
        assert_eq!(next_due_label(Some(&record)), "-");

        record.loan.status = LoanStatus::Completed;
        assert_eq!(next_due_label(Some(&record)), "All Paid");
    }

    #[test]
    fn test_overdue_counts_as_next_due() {
        let (_, mut record) = record();
        record.installments[0].status = InstallmentStatus::Overdue;
        assert_eq!(next_due_label(Some(&record)), "01 Nov 2023");
    }

    #[test]
    fn test_profile_orders_by_number() {
        let (client, mut record) = record();
        record.installments.reverse();
        let view = ClientProfileView::new(client, Some(record));

        let numbers: Vec<u32> = view.installments.iter().map(|i| i.installment_no).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4]);
        assert_eq!(view.loan.map(|l| l.tenure), Some(4));
    }

    #[test]
    fn test_summary_serializes() {
        let (client, record) = record();
        let view = ClientSummaryView::new(client, Some(record));
        let json = view.to_json_pretty().unwrap();
        assert!(json.contains("\"next_due\": \"01 Nov 2023\""));
        assert!(json.contains("\"status\": \"In Progress\""));
    }
}
