/// sweep timer - drive the overdue reconciliation from an external clock
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use installment_ledger_rs::{
    InMemoryStore, LedgerConfig, LoanService, Money, OnboardRequest, SafeTimeProvider,
    TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== sweep timer example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let config = LedgerConfig::default();
    let interval = Duration::from_std(config.sweep.interval())?;
    let service = LoanService::new(Arc::new(InMemoryStore::new()), config);

    let created = service.onboard_client(
        OnboardRequest {
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            phone: String::new(),
            assigned_staff: Uuid::new_v4(),
            loan_amount: Money::from_major(10_000),
            loan_start_date: time.now(),
            frequency: None,
        },
        &time,
    )?;

    // one pass per simulated day for ten weeks
    for _ in 0..70 {
        controller.advance(interval);
        let report = service.run_sweep(&time);
        for change in &report.status_changes {
            println!(
                "{}: loan {} {} -> {}",
                time.now().format("%Y-%m-%d"),
                change.loan_id,
                change.old_status,
                change.new_status
            );
        }
        if report.installments_flagged > 0 {
            println!(
                "{}: {} installment(s) flagged overdue",
                time.now().format("%Y-%m-%d"),
                report.installments_flagged
            );
        }
    }

    let record = service.loan(created.loan.loan.id)?;
    println!("\nfinal status: {}", record.loan.status);
    for installment in &record.installments {
        println!("#{} {} {}", installment.installment_no, installment.due_date.format("%Y-%m-%d"), installment.status);
    }

    Ok(())
}
