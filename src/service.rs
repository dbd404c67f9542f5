//! loan service
//!
//! Entry point for callers: wires ledger plans to a [`LedgerStore`],
//! serializes payments and amendments per loan, and scopes client access by
//! role.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::LedgerConfig;
use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventStore};
use crate::ledger::{Amendment, LedgerPlan, LoanLedger};
use crate::reconcile::{Reconciler, SweepReport};
use crate::state::{Client, Loan, LoanRecord};
use crate::store::LedgerStore;
use crate::types::{Actor, ClientId, ClientStatus, Frequency, InstallmentId, LoanId, StaffId};
use crate::views::{ClientProfileView, ClientSummaryView};

/// intake for a new client and loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnboardRequest {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub assigned_staff: StaffId,
    pub loan_amount: Money,
    pub loan_start_date: DateTime<Utc>,
    pub frequency: Option<Frequency>,
}

/// partial client update; loan fields route to an amendment
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub status: Option<ClientStatus>,
    pub loan_amount: Option<Money>,
    pub loan_start_date: Option<DateTime<Utc>>,
}

impl ClientUpdate {
    fn amendment(&self) -> Amendment {
        Amendment {
            new_amount: self.loan_amount,
            new_start_date: self.loan_start_date,
        }
    }
}

/// created client with its loan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Onboarded {
    pub client: Client,
    pub loan: LoanRecord,
}

pub struct LoanService<S: LedgerStore> {
    store: Arc<S>,
    config: LedgerConfig,
    reconciler: Reconciler,
    loan_locks: Mutex<HashMap<LoanId, Arc<Mutex<()>>>>,
    events: Mutex<EventStore>,
}

impl<S: LedgerStore> LoanService<S> {
    pub fn new(store: Arc<S>, config: LedgerConfig) -> Self {
        Self {
            store,
            config,
            reconciler: Reconciler::new(),
            loan_locks: Mutex::new(HashMap::new()),
            events: Mutex::new(EventStore::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// create a client, its loan and the repayment schedule in one unit
    pub fn onboard_client(&self, request: OnboardRequest, time: &SafeTimeProvider) -> Result<Onboarded> {
        let now = time.now();
        let email = request.email.trim().to_string();
        if self.store.find_client_by_email(&email)?.is_some() {
            return Err(LedgerError::DuplicateClient { email });
        }

        let client = Client::new(
            request.name.trim().to_string(),
            email,
            request.phone.trim().to_string(),
            request.assigned_staff,
            now,
        );
        let frequency = request.frequency.unwrap_or(self.config.default_frequency);
        let plan = LoanLedger::originate(
            client.clone(),
            request.loan_amount,
            request.loan_start_date,
            frequency,
            now,
        )?;

        let loan = self.commit(&plan)?;
        info!(client_id = %client.id, loan_id = %loan.id, "client onboarded");

        Ok(Onboarded {
            client,
            loan: self.store.loan(loan.id)?,
        })
    }

    /// mark one installment paid and update the loan balance
    pub fn record_payment(&self, installment_id: InstallmentId, time: &SafeTimeProvider) -> Result<LoanRecord> {
        let loan_id = self.store.installment(installment_id)?.loan_id;
        let lock = self.loan_lock(loan_id);
        let _held = hold(&lock);

        // a sweep write does not take the loan lock; re-plan once if one lands
        // between the read and the write
        let mut replanned = false;
        loop {
            let record = self.store.loan(loan_id)?;
            let plan = LoanLedger::new(&record).record_payment(installment_id, time.now())?;
            match self.commit(&plan) {
                Ok(_) => return self.store.loan(loan_id),
                Err(LedgerError::ConcurrentModification { .. }) if !replanned => {
                    warn!(%loan_id, %installment_id, "loan changed before payment was stored, replanning");
                    replanned = true;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// change principal and/or start date, regenerating the unpaid schedule
    ///
    /// The whole regeneration is retried on retryable failures; it always
    /// replaces the full unpaid set, so a retry cannot duplicate rows.
    pub fn amend_loan(&self, loan_id: LoanId, amendment: &Amendment, time: &SafeTimeProvider) -> Result<LoanRecord> {
        self.amend_with(loan_id, amendment, None, time)
    }

    /// amend, optionally writing the owning client in the same plan
    fn amend_with(
        &self,
        loan_id: LoanId,
        amendment: &Amendment,
        client: Option<&Client>,
        time: &SafeTimeProvider,
    ) -> Result<LoanRecord> {
        let lock = self.loan_lock(loan_id);
        let _held = hold(&lock);

        let attempts = self.config.amendment.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let outcome = self
                .store
                .loan(loan_id)
                .and_then(|record| {
                    let mut plan = LoanLedger::new(&record).amend(amendment, time.now())?;
                    plan.client_update = client.cloned();
                    Ok(plan)
                })
                .and_then(|plan| self.commit(&plan));

            match outcome {
                Ok(_) => return self.store.loan(loan_id),
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(%loan_id, attempt, error = %e, "amendment failed, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// update contact fields and amend the loan when loan fields are given
    pub fn update_client(
        &self,
        actor: Actor,
        client_id: ClientId,
        update: ClientUpdate,
        time: &SafeTimeProvider,
    ) -> Result<Client> {
        let mut client = self.accessible_client(actor, client_id)?;

        if let Some(name) = update.name.as_deref().filter(|s| !s.trim().is_empty()) {
            client.name = name.trim().to_string();
        }
        if let Some(email) = update.email.as_deref().filter(|s| !s.trim().is_empty()) {
            client.email = email.trim().to_string();
        }
        if let Some(phone) = update.phone.as_deref().filter(|s| !s.trim().is_empty()) {
            client.phone = phone.trim().to_string();
        }
        if let Some(status) = update.status {
            client.status = status;
        }

        let amendment = update.amendment();
        let loan = if amendment.is_empty() {
            None
        } else {
            self.store.loan_for_client(client_id)?
        };
        match loan {
            Some(record) => {
                self.amend_with(record.loan.id, &amendment, Some(&client), time)?;
            }
            None => self.store.update_client(&client)?,
        }

        Ok(client)
    }

    /// delete a client with its loan and installments; admin only
    pub fn delete_client(&self, actor: Actor, client_id: ClientId, time: &SafeTimeProvider) -> Result<()> {
        if actor != Actor::Admin {
            return Err(LedgerError::Forbidden {
                message: "only admins may delete clients".to_string(),
            });
        }

        let loan = self.store.loan_for_client(client_id)?;
        let lock = loan.as_ref().map(|r| self.loan_lock(r.loan.id));
        let _held = lock.as_ref().map(|l| hold(l));

        let summary = self.store.delete_client(client_id)?;
        if let Some(record) = loan {
            self.forget_lock(record.loan.id);
        }

        info!(
            %client_id,
            loans = summary.loans,
            installments = summary.installments,
            "client removed"
        );
        self.emit(vec![Event::ClientRemoved {
            client_id,
            loans_removed: summary.loans,
            installments_removed: summary.installments,
            timestamp: time.now(),
        }]);
        Ok(())
    }

    /// client with loan and installments ordered by number
    pub fn client_profile(&self, actor: Actor, client_id: ClientId) -> Result<ClientProfileView> {
        let client = self.accessible_client(actor, client_id)?;
        let record = self.store.loan_for_client(client_id)?;
        Ok(ClientProfileView::new(client, record))
    }

    /// clients visible to `actor`, newest first, with a next-due label
    pub fn list_clients(&self, actor: Actor) -> Result<Vec<ClientSummaryView>> {
        let mut clients: Vec<Client> = self
            .store
            .clients()?
            .into_iter()
            .filter(|c| actor.can_access(c.assigned_staff))
            .collect();
        clients.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        clients
            .into_iter()
            .map(|client| {
                let record = self.store.loan_for_client(client.id)?;
                Ok(ClientSummaryView::new(client, record))
            })
            .collect()
    }

    pub fn loan(&self, loan_id: LoanId) -> Result<LoanRecord> {
        self.store.loan(loan_id)
    }

    /// run one reconciliation pass at the provider's current time
    pub fn run_sweep(&self, time: &SafeTimeProvider) -> SweepReport {
        let mut report = self.reconciler.run_with_time(self.store.as_ref(), time);
        self.emit(std::mem::take(&mut report.events));
        report
    }

    pub fn is_sweep_running(&self) -> bool {
        self.reconciler.is_running()
    }

    /// drain events from every applied operation
    pub fn take_events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|mut store| store.take_events())
            .unwrap_or_default()
    }

    fn accessible_client(&self, actor: Actor, client_id: ClientId) -> Result<Client> {
        let client = self.store.client(client_id)?;
        if !actor.can_access(client.assigned_staff) {
            return Err(LedgerError::Forbidden {
                message: format!("client {} is not assigned to this staff member", client_id),
            });
        }
        Ok(client)
    }

    fn commit(&self, plan: &LedgerPlan) -> Result<Loan> {
        let loan = self.store.apply(plan)?;
        self.emit(plan.events.clone());
        Ok(loan)
    }

    fn emit(&self, events: Vec<Event>) {
        if let Ok(mut store) = self.events.lock() {
            store.extend(events);
        }
    }

    fn loan_lock(&self, loan_id: LoanId) -> Arc<Mutex<()>> {
        let mut locks = self
            .loan_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(loan_id).or_default().clone()
    }

    fn forget_lock(&self, loan_id: LoanId) {
        let mut locks = self
            .loan_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.remove(&loan_id);
    }
}

fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
