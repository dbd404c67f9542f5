//! persistence collaborator
//!
//! The ledger never talks to storage itself. A [`LedgerStore`] applies each
//! [`LedgerPlan`] as one unit: either every mutation lands or none does.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::errors::{LedgerError, Result};
use crate::ledger::LedgerPlan;
use crate::state::{Client, Installment, Loan, LoanRecord};
use crate::status;
use crate::types::{ClientId, InstallmentId, LoanId};

/// rows removed by a cascading client delete
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CascadeSummary {
    pub loans: usize,
    pub installments: usize,
}

/// storage operations the ledger services depend on
pub trait LedgerStore: Send + Sync {
    fn client(&self, id: ClientId) -> Result<Client>;

    fn clients(&self) -> Result<Vec<Client>>;

    fn find_client_by_email(&self, email: &str) -> Result<Option<Client>>;

    fn update_client(&self, client: &Client) -> Result<()>;

    /// loan and installments by loan id
    fn loan(&self, id: LoanId) -> Result<LoanRecord>;

    /// the loan owned by a client, if any
    fn loan_for_client(&self, client_id: ClientId) -> Result<Option<LoanRecord>>;

    fn loan_ids(&self) -> Result<Vec<LoanId>>;

    fn installment(&self, id: InstallmentId) -> Result<Installment>;

    /// apply a plan atomically, returning the stored loan with its new version
    fn apply(&self, plan: &LedgerPlan) -> Result<Loan>;

    /// delete a client together with its loans and installments
    fn delete_client(&self, id: ClientId) -> Result<CascadeSummary>;
}

#[derive(Debug, Default)]
struct Tables {
    clients: HashMap<ClientId, Client>,
    loans: HashMap<LoanId, Loan>,
    installments: HashMap<InstallmentId, Installment>,
}

impl Tables {
    fn record(&self, loan: &Loan) -> LoanRecord {
        let mut installments: Vec<Installment> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan.id)
            .cloned()
            .collect();
        installments.sort_by_key(|i| i.installment_no);
        LoanRecord {
            loan: loan.clone(),
            installments,
        }
    }

    /// the client must exist and keep a unique email
    fn check_client_update(&self, client: &Client) -> Result<()> {
        if !self.clients.contains_key(&client.id) {
            return Err(LedgerError::ClientNotFound { id: client.id });
        }
        let clash = self
            .clients
            .values()
            .any(|c| c.id != client.id && c.email.eq_ignore_ascii_case(&client.email));
        if clash {
            return Err(LedgerError::DuplicateClient {
                email: client.email.clone(),
            });
        }
        Ok(())
    }

    /// check every precondition of a plan without mutating anything
    fn validate(&self, plan: &LedgerPlan) -> Result<()> {
        let loan_id = plan.loan.id;

        match (plan.expected_version, self.loans.get(&loan_id)) {
            (None, Some(existing)) => {
                return Err(LedgerError::version_mismatch(loan_id, 0, existing.version));
            }
            (None, None) => {
                let owner_known = self.clients.contains_key(&plan.loan.client_id)
                    || plan.client.as_ref().map(|c| c.id) == Some(plan.loan.client_id);
                if !owner_known {
                    return Err(LedgerError::ClientNotFound {
                        id: plan.loan.client_id,
                    });
                }
                if self.loans.values().any(|l| l.client_id == plan.loan.client_id) {
                    return Err(LedgerError::validation("client already has a loan"));
                }
            }
            (Some(_), None) => return Err(LedgerError::LoanNotFound { id: loan_id }),
            (Some(expected), Some(existing)) if existing.version != expected => {
                return Err(LedgerError::version_mismatch(loan_id, expected, existing.version));
            }
            (Some(_), Some(_)) => {}
        }

        if let Some(client) = &plan.client {
            if self.clients.contains_key(&client.id) {
                return Err(LedgerError::validation(format!("client {} already stored", client.id)));
            }
            if self.clients.values().any(|c| c.email.eq_ignore_ascii_case(&client.email)) {
                return Err(LedgerError::DuplicateClient {
                    email: client.email.clone(),
                });
            }
        }

        if let Some(client) = &plan.client_update {
            if client.id != plan.loan.client_id {
                return Err(LedgerError::validation(format!(
                    "client {} does not own loan {}",
                    client.id, loan_id
                )));
            }
            self.check_client_update(client)?;
        }

        for id in plan.delete.iter().chain(plan.update.iter().map(|i| &i.id)) {
            match self.installments.get(id) {
                Some(existing) if existing.loan_id == loan_id => {}
                _ => return Err(LedgerError::InstallmentNotFound { id: *id }),
            }
        }

        let mut numbers: Vec<u32> = self
            .installments
            .values()
            .filter(|i| i.loan_id == loan_id && !plan.delete.contains(&i.id))
            .map(|i| i.installment_no)
            .collect();
        for item in &plan.insert {
            if item.loan_id != loan_id || self.installments.contains_key(&item.id) {
                return Err(LedgerError::validation(format!(
                    "installment {} cannot be inserted into loan {}",
                    item.id, loan_id
                )));
            }
            numbers.push(item.installment_no);
        }
        let count = numbers.len();
        numbers.sort_unstable();
        numbers.dedup();
        if numbers.len() != count {
            return Err(LedgerError::validation(format!(
                "duplicate installment numbers for loan {}",
                loan_id
            )));
        }

        Ok(())
    }
}

/// in-memory store guarded by a single lock
#[derive(Debug, Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, Tables>> {
        self.tables.read().map_err(|_| LedgerError::Storage {
            message: "store lock poisoned".to_string(),
        })
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, Tables>> {
        self.tables.write().map_err(|_| LedgerError::Storage {
            message: "store lock poisoned".to_string(),
        })
    }

    pub fn installment_count(&self) -> Result<usize> {
        Ok(self.read()?.installments.len())
    }
}

impl LedgerStore for InMemoryStore {
    fn client(&self, id: ClientId) -> Result<Client> {
        self.read()?
            .clients
            .get(&id)
            .cloned()
            .ok_or(LedgerError::ClientNotFound { id })
    }

    fn clients(&self) -> Result<Vec<Client>> {
        Ok(self.read()?.clients.values().cloned().collect())
    }

    fn find_client_by_email(&self, email: &str) -> Result<Option<Client>> {
        Ok(self
            .read()?
            .clients
            .values()
            .find(|c| c.email.eq_ignore_ascii_case(email.trim()))
            .cloned())
    }

    fn update_client(&self, client: &Client) -> Result<()> {
        let mut tables = self.write()?;
        tables.check_client_update(client)?;
        tables.clients.insert(client.id, client.clone());
        Ok(())
    }

    fn loan(&self, id: LoanId) -> Result<LoanRecord> {
        let tables = self.read()?;
        let loan = tables.loans.get(&id).ok_or(LedgerError::LoanNotFound { id })?;
        Ok(tables.record(loan))
    }

    fn loan_for_client(&self, client_id: ClientId) -> Result<Option<LoanRecord>> {
        let tables = self.read()?;
        Ok(tables
            .loans
            .values()
            .find(|l| l.client_id == client_id)
            .map(|l| tables.record(l)))
    }

    fn loan_ids(&self) -> Result<Vec<LoanId>> {
        let tables = self.read()?;
        let mut loans: Vec<&Loan> = tables.loans.values().collect();
        loans.sort_by_key(|l| (l.created_at, l.id));
        Ok(loans.into_iter().map(|l| l.id).collect())
    }

    fn installment(&self, id: InstallmentId) -> Result<Installment> {
        self.read()?
            .installments
            .get(&id)
            .cloned()
            .ok_or(LedgerError::InstallmentNotFound { id })
    }

    fn apply(&self, plan: &LedgerPlan) -> Result<Loan> {
        let mut tables = self.write()?;
        tables.validate(plan)?;

        for client in plan.client.iter().chain(plan.client_update.iter()) {
            tables.clients.insert(client.id, client.clone());
        }
        for id in &plan.delete {
            tables.installments.remove(id);
        }
        for item in &plan.update {
            if let Some(stored) = tables.installments.get_mut(&item.id) {
                let merged = status::merge(stored.status, item.status);
                *stored = item.clone();
                stored.status = merged;
            }
        }
        for item in &plan.insert {
            tables.installments.insert(item.id, item.clone());
        }

        let mut loan = plan.loan.clone();
        loan.version = plan.expected_version.map_or(1, |v| v + 1);
        tables.loans.insert(loan.id, loan.clone());
        Ok(loan)
    }

    fn delete_client(&self, id: ClientId) -> Result<CascadeSummary> {
        let mut tables = self.write()?;
        if tables.clients.remove(&id).is_none() {
            return Err(LedgerError::ClientNotFound { id });
        }

        let before_loans = tables.loans.len();
        tables.loans.retain(|_, l| l.client_id != id);
        let before_installments = tables.installments.len();
        tables.installments.retain(|_, i| i.client_id != id);

        Ok(CascadeSummary {
            loans: before_loans - tables.loans.len(),
            installments: before_installments - tables.installments.len(),
        })
    }
}
