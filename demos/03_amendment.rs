/// amendment - change principal after a payment and regenerate the schedule
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use installment_ledger_rs::{
    Actor, ClientUpdate, InMemoryStore, LedgerConfig, LoanService, Money, OnboardRequest,
    SafeTimeProvider, TimeSource, Uuid,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_env_filter("info").init();
    println!("=== amendment example ===\n");

    let time = SafeTimeProvider::new(TimeSource::Test(
        Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
    ));
    let staff = Uuid::new_v4();
    let service = LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default());

    let created = service.onboard_client(
        OnboardRequest {
            name: "John Doe".to_string(),
            email: "john@example.com".to_string(),
            phone: "9876543210".to_string(),
            assigned_staff: staff,
            loan_amount: Money::from_major(10_000),
            loan_start_date: time.now(),
            frequency: None,
        },
        &time,
    )?;
    service.record_payment(created.loan.installments[0].id, &time)?;

    // raise the principal and push the start date
    service.update_client(
        Actor::Staff(staff),
        created.client.id,
        ClientUpdate {
            loan_amount: Some(Money::from_major(12_000)),
            loan_start_date: Some(Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap()),
            ..Default::default()
        },
        &time,
    )?;

    let profile = service.client_profile(Actor::Staff(staff), created.client.id)?;
    if let Some(loan) = &profile.loan {
        println!(
            "amount ${}, paid ${}, remaining ${}",
            loan.loan_amount, loan.total_paid, loan.remaining_amount
        );
    }
    for installment in &profile.installments {
        println!(
            "#{} due {} ${} {}",
            installment.installment_no,
            installment.due_date.format("%Y-%m-%d"),
            installment.amount,
            installment.status
        );
    }

    Ok(())
}
