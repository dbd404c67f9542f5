use std::sync::{Arc, Barrier, Mutex};
use std::thread;

use chrono::{DateTime, Duration, TimeZone, Utc};
use installment_ledger_rs::{
    Amendment, CascadeSummary, Client, ClientId, Event, InMemoryStore, Installment,
    InstallmentId, InstallmentStatus, LedgerConfig, LedgerError, LedgerPlan, LedgerStore, Loan,
    LoanId, LoanLedger, LoanRecord, LoanService, LoanStatus, Money, OnboardRequest, Result,
    SafeTimeProvider, TimeSource, Uuid,
};

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 10, 1, 0, 0, 0).unwrap()
}

fn request(email: &str, amount: i64) -> OnboardRequest {
    OnboardRequest {
        name: "Test Client".to_string(),
        email: email.to_string(),
        phone: String::new(),
        assigned_staff: Uuid::new_v4(),
        loan_amount: Money::from_major(amount),
        loan_start_date: start(),
        frequency: None,
    }
}

/// store wrapper that fails or races writes on demand
#[derive(Default)]
struct FlakyStore {
    inner: InMemoryStore,
    /// loans whose writes always fail
    broken: Mutex<Vec<LoanId>>,
    /// number of upcoming writes to fail
    transient_failures: Mutex<u32>,
    /// installment a competing writer pays just before the next write
    race_payment: Mutex<Option<InstallmentId>>,
    /// instant at which a competing sweep reconciles just before the next write
    race_sweep: Mutex<Option<DateTime<Utc>>>,
}

impl FlakyStore {
    fn break_loan(&self, id: LoanId) {
        self.broken.lock().unwrap().push(id);
    }

    fn fail_next(&self, writes: u32) {
        *self.transient_failures.lock().unwrap() = writes;
    }

    fn race_with_payment(&self, id: InstallmentId) {
        *self.race_payment.lock().unwrap() = Some(id);
    }

    fn race_with_sweep(&self, at: DateTime<Utc>) {
        *self.race_sweep.lock().unwrap() = Some(at);
    }
}

impl LedgerStore for FlakyStore {
    fn client(&self, id: ClientId) -> Result<Client> {
        self.inner.client(id)
    }

    fn clients(&self) -> Result<Vec<Client>> {
        self.inner.clients()
    }

    fn find_client_by_email(&self, email: &str) -> Result<Option<Client>> {
        self.inner.find_client_by_email(email)
    }

    fn update_client(&self, client: &Client) -> Result<()> {
        self.inner.update_client(client)
    }

    fn loan(&self, id: LoanId) -> Result<LoanRecord> {
        self.inner.loan(id)
    }

    fn loan_for_client(&self, client_id: ClientId) -> Result<Option<LoanRecord>> {
        self.inner.loan_for_client(client_id)
    }

    fn loan_ids(&self) -> Result<Vec<LoanId>> {
        self.inner.loan_ids()
    }

    fn installment(&self, id: InstallmentId) -> Result<Installment> {
        self.inner.installment(id)
    }

    fn apply(&self, plan: &LedgerPlan) -> Result<Loan> {
        if self.broken.lock().unwrap().contains(&plan.loan.id) {
            return Err(LedgerError::Storage {
                message: "disk unavailable".to_string(),
            });
        }

        {
            let mut remaining = self.transient_failures.lock().unwrap();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(LedgerError::Storage {
                    message: "connection reset".to_string(),
                });
            }
        }

        if let Some(id) = self.race_payment.lock().unwrap().take() {
            let record = self.inner.loan(plan.loan.id)?;
            let competing = LoanLedger::new(&record).record_payment(id, plan.loan.updated_at)?;
            self.inner.apply(&competing)?;
        }

        if let Some(at) = self.race_sweep.lock().unwrap().take() {
            let record = self.inner.loan(plan.loan.id)?;
            if let Some(competing) = LoanLedger::new(&record).reconcile(at) {
                self.inner.apply(&competing)?;
            }
        }

        self.inner.apply(plan)
    }

    fn delete_client(&self, id: ClientId) -> Result<CascadeSummary> {
        self.inner.delete_client(id)
    }
}

#[test]
fn test_overdue_then_repaid_to_completion() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let control = time.test_control().unwrap();
    let service = LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default());
    let created = service.onboard_client(request("flow@example.com", 10_000), &time).unwrap();
    let loan_id = created.loan.loan.id;

    control.advance(Duration::days(32));
    service.run_sweep(&time);
    let record = service.loan(loan_id).unwrap();
    assert_eq!(record.loan.status, LoanStatus::Overdue);
    assert_eq!(record.installments[0].status, InstallmentStatus::Overdue);

    // paying the overdue installment clears the loan's overdue status
    let record = service.record_payment(record.installments[0].id, &time).unwrap();
    assert_eq!(record.loan.status, LoanStatus::InProgress);
    assert_eq!(record.loan.remaining_amount, Money::from_major(7_500));

    for installment in &created.loan.installments[1..] {
        service.record_payment(installment.id, &time).unwrap();
    }
    let record = service.loan(loan_id).unwrap();
    assert_eq!(record.loan.status, LoanStatus::Completed);
    assert!(record.loan.remaining_amount.is_zero());
    assert_eq!(record.loan.total_paid, record.loan.loan_amount);

    // a completed loan stays completed through later sweeps
    control.advance(Duration::days(200));
    let report = service.run_sweep(&time);
    assert_eq!(report.loans_updated, 0);

    let events = service.take_events();
    assert!(events.iter().any(|e| matches!(e, Event::InstallmentOverdue { installment_no: 1, .. })));
    assert!(events.iter().any(|e| matches!(e, Event::LoanCompleted { .. })));
}

#[test]
fn test_sweep_isolates_failing_loan() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let control = time.test_control().unwrap();
    let service = LoanService::new(Arc::new(FlakyStore::default()), LedgerConfig::default());
    let broken = service.onboard_client(request("broken@example.com", 4_000), &time).unwrap();
    let healthy = service.onboard_client(request("healthy@example.com", 4_000), &time).unwrap();
    service.store().break_loan(broken.loan.loan.id);

    control.advance(Duration::days(40));
    let report = service.run_sweep(&time);

    assert_eq!(report.loans_scanned, 2);
    assert_eq!(report.loans_updated, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].loan_id, broken.loan.loan.id);
    assert!(!report.is_clean());

    assert_eq!(service.loan(healthy.loan.loan.id).unwrap().loan.status, LoanStatus::Overdue);
    assert_eq!(service.loan(broken.loan.loan.id).unwrap().loan.status, LoanStatus::InProgress);
}

#[test]
fn test_sweep_retries_after_racing_payment() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let control = time.test_control().unwrap();
    let service = LoanService::new(Arc::new(FlakyStore::default()), LedgerConfig::default());
    let created = service.onboard_client(request("race@example.com", 4_000), &time).unwrap();
    let first = created.loan.installments[0].id;

    control.advance(Duration::days(40));
    service.store().race_with_payment(first);
    let report = service.run_sweep(&time);
    assert!(report.is_clean());

    // the payment won; the retried pass saw it and left the loan in progress
    let record = service.loan(created.loan.loan.id).unwrap();
    assert_eq!(record.installments[0].status, InstallmentStatus::Paid);
    assert_eq!(record.loan.total_paid, Money::from_major(1_000));
    assert_eq!(record.loan.status, LoanStatus::InProgress);
    assert_eq!(report.installments_flagged, 0);
}

#[test]
fn test_payment_replans_after_racing_sweep() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let control = time.test_control().unwrap();
    let service = LoanService::new(Arc::new(FlakyStore::default()), LedgerConfig::default());
    let created = service.onboard_client(request("sweep-race@example.com", 4_000), &time).unwrap();
    let second = created.loan.installments[1].id;

    control.advance(Duration::days(40));
    service.store().race_with_sweep(time.now());
    let record = service.record_payment(second, &time).unwrap();

    assert_eq!(record.installments[0].status, InstallmentStatus::Overdue);
    assert_eq!(record.installments[1].status, InstallmentStatus::Paid);
    assert_eq!(record.loan.total_paid, Money::from_major(1_000));
    assert_eq!(record.loan.remaining_amount, Money::from_major(3_000));
    assert_eq!(record.loan.status, LoanStatus::Overdue);
    assert_eq!(record.loan.version, 3);
}

#[test]
fn test_amendment_retries_transient_failures() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let service = LoanService::new(
        Arc::new(FlakyStore::default()),
        LedgerConfig::default().with_max_amendment_attempts(3),
    );
    let created = service.onboard_client(request("amend@example.com", 4_000), &time).unwrap();
    let loan_id = created.loan.loan.id;

    service.store().fail_next(2);
    let record = service
        .amend_loan(loan_id, &Amendment::amount(Money::from_major(8_000)), &time)
        .unwrap();
    assert_eq!(record.loan.loan_amount, Money::from_major(8_000));
    assert_eq!(record.installments.len(), 4);
    assert_eq!(record.loan.version, 2);

    service.store().fail_next(3);
    let err = service
        .amend_loan(loan_id, &Amendment::amount(Money::from_major(6_000)), &time)
        .unwrap_err();
    assert!(matches!(err, LedgerError::Storage { .. }));

    // nothing partial landed
    let record = service.loan(loan_id).unwrap();
    assert_eq!(record.loan.loan_amount, Money::from_major(8_000));
    assert_eq!(record.installments.len(), 4);
    assert!(record.installments.iter().all(|i| i.amount == Money::from_major(2_000)));
}

#[test]
fn test_concurrent_payments_keep_balance() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let service = Arc::new(LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default()));
    let created = service.onboard_client(request("threads@example.com", 10_000), &time).unwrap();

    let handles: Vec<_> = created
        .loan
        .installments
        .iter()
        .map(|installment| {
            let service = Arc::clone(&service);
            let time = time.clone();
            let id = installment.id;
            thread::spawn(move || service.record_payment(id, &time))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }

    let record = service.loan(created.loan.loan.id).unwrap();
    assert_eq!(record.loan.total_paid, Money::from_major(10_000));
    assert_eq!(record.loan.status, LoanStatus::Completed);
    assert_eq!(record.loan.version, 5);
}

#[test]
fn test_double_payment_race_pays_once() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let service = Arc::new(LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default()));
    let created = service.onboard_client(request("twice@example.com", 10_000), &time).unwrap();
    let id = created.loan.installments[0].id;

    let handles: Vec<_> = (0..2)
        .map(|_| {
            let service = Arc::clone(&service);
            let time = time.clone();
            thread::spawn(move || service.record_payment(id, &time))
        })
        .collect();
    let outcomes: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_ok()).count(), 1);
    assert!(outcomes
        .iter()
        .any(|o| matches!(o, Err(LedgerError::AlreadyPaid { .. }))));
    assert_eq!(
        service.loan(created.loan.loan.id).unwrap().loan.total_paid,
        Money::from_major(2_500)
    );
}

#[test]
fn test_amendment_and_payment_do_not_interleave() {
    let time = SafeTimeProvider::new(TimeSource::Test(start()));
    let service = Arc::new(LoanService::new(Arc::new(InMemoryStore::new()), LedgerConfig::default()));
    let created = service.onboard_client(request("interleave@example.com", 10_000), &time).unwrap();
    let loan_id = created.loan.loan.id;
    let first = created.loan.installments[0].id;
    let barrier = Arc::new(Barrier::new(2));

    let amend = {
        let (service, time, barrier) = (Arc::clone(&service), time.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            service.amend_loan(loan_id, &Amendment::amount(Money::from_major(8_000)), &time)
        })
    };
    let pay = {
        let (service, time, barrier) = (Arc::clone(&service), time.clone(), Arc::clone(&barrier));
        thread::spawn(move || {
            barrier.wait();
            service.record_payment(first, &time)
        })
    };
    amend.join().unwrap().unwrap();
    let paid = pay.join().unwrap();

    let record = service.loan(loan_id).unwrap();
    let paid_sum: Money = record
        .installments
        .iter()
        .filter(|i| i.status == InstallmentStatus::Paid)
        .map(|i| i.amount)
        .sum();
    assert_eq!(record.loan.loan_amount, Money::from_major(8_000));
    assert_eq!(record.loan.total_paid, paid_sum);
    assert_eq!(record.loan.remaining_amount, record.loan.loan_amount - record.loan.total_paid);

    let mut numbers: Vec<u32> = record.installments.iter().map(|i| i.installment_no).collect();
    numbers.dedup();
    assert_eq!(numbers.len(), record.installments.len());

    match paid {
        // payment first: the paid row survives the amendment
        Ok(_) => {
            assert_eq!(record.loan.total_paid, Money::from_major(2_500));
            assert_eq!(record.installments.len(), 5);
            assert_eq!(record.loan.version, 3);
        }
        // amendment first: the installment no longer exists
        Err(e) => {
            assert!(matches!(e, LedgerError::InstallmentNotFound { .. }));
            assert!(record.loan.total_paid.is_zero());
            assert_eq!(record.installments.len(), 4);
            assert_eq!(record.loan.version, 2);
        }
    }
}
