/// payments - pay installments until the loan completes
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use installment_ledger_rs::{
    Event, Frequency, InMemoryStore, LedgerConfig, LedgerError, LoanService, Money,
    OnboardRequest, SafeTimeProvider, TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== payments example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    ));
    let controller = time.test_control().unwrap();
    let service = LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default());

    let created = service.onboard_client(
        OnboardRequest {
            name: "Jane Smith".to_string(),
            email: "jane@example.com".to_string(),
            phone: "9123456780".to_string(),
            assigned_staff: Uuid::new_v4(),
            loan_amount: Money::from_major(5_000),
            loan_start_date: time.now(),
            frequency: Some(Frequency::BiWeekly),
        },
        &time,
    )?;
    println!(
        "loan of ${} in {} installments of ${}",
        created.loan.loan.loan_amount, created.loan.loan.tenure, created.loan.loan.installment_amount
    );

    for installment in &created.loan.installments {
        controller.advance(Duration::days(14));
        let record = service.record_payment(installment.id, &time)?;
        println!(
            "{}: paid #{}, total paid ${}, remaining ${}, status {}",
            time.now().format("%Y-%m-%d"),
            installment.installment_no,
            record.loan.total_paid,
            record.loan.remaining_amount,
            record.loan.status
        );
    }

    // paying twice is rejected
    match service.record_payment(created.loan.installments[0].id, &time) {
        Err(e @ LedgerError::AlreadyPaid { .. }) => println!("\nsecond payment rejected: {} ({})", e, e.http_status()),
        other => println!("\nunexpected: {:?}", other),
    }

    let completed = service
        .take_events()
        .into_iter()
        .any(|e| matches!(e, Event::LoanCompleted { .. }));
    println!("loan completed event emitted: {}", completed);

    Ok(())
}
