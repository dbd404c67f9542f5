//! bulk client import
//!
//! Rows arrive already read from the first sheet of a workbook, keyed by
//! header. Each row is onboarded on its own; a bad row is reported and the
//! batch carries on.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::service::{LoanService, OnboardRequest};
use crate::store::LedgerStore;
use crate::types::StaffId;

/// header row of the downloadable template
pub const TEMPLATE_HEADERS: [&str; 6] = [
    "Name",
    "Email",
    "Phone",
    "Loan Amount",
    "Loan Start Date (YYYY-MM-DD)",
    "Assigned Staff (Name)",
];

/// sample rows shipped with the template
pub const TEMPLATE_SAMPLE_ROWS: [[&str; 6]; 2] = [
    ["John Doe", "john@example.com", "9876543210", "10000", "2023-10-01", "Admin"],
    ["Jane Smith", "jane@example.com", "9123456780", "5000", "2023-11-15", "Sarah Jones"],
];

const NAME: &[&str] = &["Name", "name"];
const EMAIL: &[&str] = &["Email", "email"];
const PHONE: &[&str] = &["Phone", "phone"];
const LOAN_AMOUNT: &[&str] = &["Loan Amount", "loanAmount"];
const START_DATE: &[&str] = &["Loan Start Date (YYYY-MM-DD)", "Loan Start Date", "loanStartDate"];
const STAFF: &[&str] = &["Assigned Staff (Name)", "Assigned Staff", "assignedStaff"];

/// days between the spreadsheet epoch (1899-12-30) and 1970-01-01
const SHEET_EPOCH_OFFSET_DAYS: f64 = 25_569.0;
const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// a spreadsheet cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    /// blank text and zero count as missing
    fn is_blank(&self) -> bool {
        match self {
            CellValue::Number(n) => *n == 0.0 || n.is_nan(),
            CellValue::Text(s) => s.trim().is_empty(),
        }
    }

    fn as_text(&self) -> String {
        match self {
            CellValue::Text(s) => s.trim().to_string(),
            CellValue::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => format!("{}", *n as i64),
            CellValue::Number(n) => n.to_string(),
        }
    }

    fn as_money(&self) -> Result<Money> {
        let parsed = match self {
            CellValue::Number(n) => Money::from_f64(*n),
            CellValue::Text(s) => Money::from_str_exact(s).ok(),
        };
        parsed.ok_or_else(|| LedgerError::validation(format!("invalid loan amount '{}'", self.as_text())))
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// one data row keyed by header
pub type ImportRow = HashMap<String, CellValue>;

/// staff member that rows may name as assignee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffMember {
    pub id: StaffId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    /// sheet row number, counting the header as row 1
    pub row: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub imported: usize,
    pub errors: Vec<RowError>,
}

impl ImportReport {
    pub fn failed(&self) -> usize {
        self.errors.len()
    }

    pub fn message(&self) -> String {
        format!(
            "Import completed. {} imported, {} failed.",
            self.imported,
            self.failed()
        )
    }
}

/// start date from a sheet cell: serial day number or date text; blank is `now`
pub fn parse_sheet_date(cell: Option<&CellValue>, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let Some(cell) = cell.filter(|c| !c.is_blank()) else {
        return Ok(now);
    };

    match cell {
        CellValue::Number(serial) => {
            let millis = ((serial - SHEET_EPOCH_OFFSET_DAYS) * MILLIS_PER_DAY).ceil();
            DateTime::from_timestamp_millis(millis as i64)
                .ok_or_else(|| LedgerError::validation(format!("invalid loan start date '{}'", serial)))
        }
        CellValue::Text(text) => parse_date_text(text.trim())
            .ok_or_else(|| LedgerError::validation(format!("invalid loan start date '{}'", text.trim()))),
    }
}

fn parse_date_text(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn pick<'r>(row: &'r ImportRow, aliases: &[&str]) -> Option<&'r CellValue> {
    aliases
        .iter()
        .filter_map(|key| row.get(*key))
        .find(|cell| !cell.is_blank())
}

/// message reported for a rejected row
fn row_message(error: &LedgerError) -> String {
    match error {
        LedgerError::Validation { message } => message.clone(),
        LedgerError::DuplicateClient { email } => format!("Client with email {} already exists", email),
        other => other.to_string(),
    }
}

/// onboards clients from sheet rows through a [`LoanService`]
pub struct BulkImporter<'a, S: LedgerStore> {
    service: &'a LoanService<S>,
    staff: &'a [StaffMember],
    uploader: StaffId,
}

impl<'a, S: LedgerStore> BulkImporter<'a, S> {
    /// rows naming no known staff member are assigned to `uploader`
    pub fn new(service: &'a LoanService<S>, staff: &'a [StaffMember], uploader: StaffId) -> Self {
        Self {
            service,
            staff,
            uploader,
        }
    }

    pub fn import(&self, rows: &[ImportRow], time: &SafeTimeProvider) -> ImportReport {
        let mut report = ImportReport::default();

        for (index, row) in rows.iter().enumerate() {
            let row_no = index + 2;
            match self.import_row(row, time) {
                Ok(()) => report.imported += 1,
                Err(e) => {
                    let message = row_message(&e);
                    warn!(row = row_no, %message, "import row rejected");
                    report.errors.push(RowError {
                        row: row_no,
                        message,
                    });
                }
            }
        }

        info!(
            imported = report.imported,
            failed = report.failed(),
            "bulk import finished"
        );
        report
    }

    fn import_row(&self, row: &ImportRow, time: &SafeTimeProvider) -> Result<()> {
        let config = &self.service.config().import;
        let (Some(name), Some(email), Some(amount)) =
            (pick(row, NAME), pick(row, EMAIL), pick(row, LOAN_AMOUNT))
        else {
            return Err(LedgerError::validation("Missing Name, Email, or Loan Amount"));
        };
        let email = email.as_text();

        let phone = pick(row, PHONE).map(CellValue::as_text).unwrap_or_default();
        if config.require_phone && phone.is_empty() {
            return Err(LedgerError::validation("Missing Phone"));
        }

        if self.service.store().find_client_by_email(&email)?.is_some() {
            return Err(LedgerError::DuplicateClient { email });
        }

        let request = OnboardRequest {
            name: name.as_text(),
            email,
            phone,
            assigned_staff: self.resolve_staff(pick(row, STAFF)),
            loan_amount: amount.as_money()?,
            loan_start_date: parse_sheet_date(pick(row, START_DATE), time.now())?,
            frequency: Some(config.default_frequency),
        };

        self.service.onboard_client(request, time).map(|_| ())
    }

    fn resolve_staff(&self, cell: Option<&CellValue>) -> StaffId {
        let Some(name) = cell.map(CellValue::as_text) else {
            return self.uploader;
        };
        self.staff
            .iter()
            .find(|s| s.name.to_lowercase() == name.to_lowercase())
            .map_or(self.uploader, |s| s.id)
    }
}
