/// quick start - onboard a client and print the schedule
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use installment_ledger_rs::{
    Actor, InMemoryStore, LedgerConfig, LoanService, Money, OnboardRequest, SafeTimeProvider,
    TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    ));
    let service = LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default());

    // a $10,000 loan repaid monthly
    let created = service.onboard_client(
        OnboardRequest {
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            phone: "9876543210".to_string(),
            assigned_staff: Uuid::new_v4(),
            loan_amount: Money::from_major(10_000),
            loan_start_date: time.now(),
            frequency: None,
        },
        &time,
    )?;

    for installment in &created.loan.installments {
        println!(
            "#{} due {} amount ${}",
            installment.installment_no,
            installment.due_date.format("%Y-%m-%d"),
            installment.amount
        );
    }

    // print the client list entry
    let profile = service.client_profile(Actor::Admin, created.client.id)?;
    println!("{}", profile.to_json_pretty()?);

    Ok(())
}
