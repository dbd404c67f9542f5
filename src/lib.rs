pub mod config;
pub mod decimal;
pub mod errors;
pub mod events;
pub mod import;
pub mod ledger;
pub mod reconcile;
pub mod schedule;
pub mod service;
pub mod state;
pub mod status;
pub mod store;
pub mod types;
pub mod views;

// re-export key types
pub use config::{AmendmentConfig, ImportConfig, LedgerConfig, SweepConfig};
pub use decimal::Money;
pub use errors::{ErrorKind, LedgerError, Result};
pub use events::{Event, EventStore};
pub use import::{BulkImporter, CellValue, ImportReport, ImportRow, RowError, StaffMember};
pub use ledger::{derive_status, Amendment, LedgerPlan, LoanLedger};
pub use reconcile::{reconcile_all, Reconciler, SweepGuard, SweepReport};
pub use schedule::{generate, ScheduledInstallment};
pub use service::{ClientUpdate, LoanService, OnboardRequest, Onboarded};
pub use state::{Client, Installment, Loan, LoanRecord};
pub use store::{CascadeSummary, InMemoryStore, LedgerStore};
pub use types::{
    Actor, ClientId, ClientStatus, Frequency, InstallmentId, InstallmentStatus, LoanId,
    LoanStatus, StaffId,
};
pub use views::{ClientProfileView, ClientSummaryView, LoanView};

// re-export external dependencies that users will need
pub use chrono;
pub use hourglass_rs::{SafeTimeProvider, TimeSource};
pub use rust_decimal::Decimal;
pub use uuid::Uuid;
