use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// unique identifier for a client
pub type ClientId = Uuid;

/// unique identifier for a loan
pub type LoanId = Uuid;

/// unique identifier for an installment
pub type InstallmentId = Uuid;

/// unique identifier for a staff member
pub type StaffId = Uuid;

/// repayment cadence, fixed at origination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Frequency {
    #[default]
    Monthly,
    #[serde(rename = "Bi-Weekly")]
    BiWeekly,
}

impl Frequency {
    /// number of installments the schedule holds
    pub fn tenure(&self) -> u32 {
        match self {
            Frequency::Monthly => 4,
            Frequency::BiWeekly => 8,
        }
    }

    /// parse the labels used by intake forms; anything but bi-weekly is monthly
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "bi-weekly" | "biweekly" | "bi_weekly" => Frequency::BiWeekly,
            _ => Frequency::Monthly,
        }
    }
}

impl fmt::Display for Frequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Frequency::Monthly => write!(f, "Monthly"),
            Frequency::BiWeekly => write!(f, "Bi-Weekly"),
        }
    }
}

/// loan status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum LoanStatus {
    /// recorded but not yet scheduled
    #[default]
    #[serde(rename = "Pending Approval")]
    PendingApproval,
    /// schedule running, nothing overdue
    #[serde(rename = "In Progress")]
    InProgress,
    /// at least one installment overdue
    Overdue,
    /// nothing left to pay
    Completed,
}

impl fmt::Display for LoanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LoanStatus::PendingApproval => "Pending Approval",
            LoanStatus::InProgress => "In Progress",
            LoanStatus::Overdue => "Overdue",
            LoanStatus::Completed => "Completed",
        };
        write!(f, "{}", label)
    }
}

/// installment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum InstallmentStatus {
    #[default]
    Pending,
    Paid,
    Overdue,
}

impl InstallmentStatus {
    /// not yet paid
    pub fn is_outstanding(&self) -> bool {
        !matches!(self, InstallmentStatus::Paid)
    }
}

impl fmt::Display for InstallmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// client status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ClientStatus {
    #[default]
    Active,
    Inactive,
}

/// role of the caller acting on client data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Actor {
    Admin,
    Staff(StaffId),
}

impl Actor {
    /// whether this actor may see or change a client assigned to `assigned_staff`
    pub fn can_access(&self, assigned_staff: StaffId) -> bool {
        match self {
            Actor::Admin => true,
            Actor::Staff(id) => *id == assigned_staff,
        }
    }
}
