/// bulk import - onboard clients from spreadsheet rows
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use installment_ledger_rs::import::TEMPLATE_HEADERS;
use installment_ledger_rs::{
    Actor, BulkImporter, CellValue, ImportRow, InMemoryStore, LedgerConfig, LoanService,
    SafeTimeProvider, StaffMember, TimeSource, Uuid,
};

fn sheet_row(values: [CellValue; 6]) -> ImportRow {
    TEMPLATE_HEADERS
        .iter()
        .map(|h| h.to_string())
        .zip(values)
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== bulk import example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap()
    ));
    let service = LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default());
    let staff = vec![StaffMember {
        id: Uuid::new_v4(),
        name: "Sarah Jones".to_string(),
    }];

    let rows = vec![
        sheet_row([
            "John Doe".into(),
            "john@example.com".into(),
            CellValue::Number(9876543210.0),
            CellValue::Number(10000.0),
            CellValue::Number(45200.0),
            "Admin".into(),
        ]),
        sheet_row([
            "Jane Smith".into(),
            "jane@example.com".into(),
            "9123456780".into(),
            "5000".into(),
            "2023-11-15".into(),
            "sarah jones".into(),
        ]),
        sheet_row([
            "".into(),
            "nobody@example.com".into(),
            "".into(),
            "100".into(),
            "".into(),
            "".into(),
        ]),
    ];

    let report = BulkImporter::new(&service, &staff, Uuid::new_v4()).import(&rows, &time);
    println!("{}", report.message());
    for error in &report.errors {
        println!("row {}: {}", error.row, error.message);
    }

    println!();
    for client in service.list_clients(Actor::Admin)? {
        println!("{} <{}> next due: {}", client.name, client.email, client.next_due);
    }

    Ok(())
}
