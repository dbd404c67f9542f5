use thiserror::Error;

use crate::types::{ClientId, InstallmentId, LoanId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
    },

    #[error("client not found: {id}")]
    ClientNotFound {
        id: ClientId,
    },

    #[error("loan not found: {id}")]
    LoanNotFound {
        id: LoanId,
    },

    #[error("installment not found: {id}")]
    InstallmentNotFound {
        id: InstallmentId,
    },

    #[error("installment already paid: {installment_id}")]
    AlreadyPaid {
        installment_id: InstallmentId,
    },

    #[error("concurrent modification of loan {loan_id}: {message}")]
    ConcurrentModification {
        loan_id: LoanId,
        message: String,
    },

    #[error("access denied: {message}")]
    Forbidden {
        message: String,
    },

    #[error("client with email {email} already exists")]
    DuplicateClient {
        email: String,
    },

    #[error("storage error: {message}")]
    Storage {
        message: String,
    },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration {
        message: String,
    },
}

/// coarse error classes surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    AlreadyPaid,
    ConcurrentModification,
    Forbidden,
    Storage,
}

impl LedgerError {
    pub fn validation(message: impl Into<String>) -> Self {
        LedgerError::Validation {
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Validation { .. }
            | LedgerError::DuplicateClient { .. }
            | LedgerError::InvalidConfiguration { .. } => ErrorKind::Validation,
            LedgerError::ClientNotFound { .. }
            | LedgerError::LoanNotFound { .. }
            | LedgerError::InstallmentNotFound { .. } => ErrorKind::NotFound,
            LedgerError::AlreadyPaid { .. } => ErrorKind::AlreadyPaid,
            LedgerError::ConcurrentModification { .. } => ErrorKind::ConcurrentModification,
            LedgerError::Forbidden { .. } => ErrorKind::Forbidden,
            LedgerError::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// status code the api layer answers with
    pub fn http_status(&self) -> u16 {
        match self.kind() {
            ErrorKind::Validation => 400,
            ErrorKind::Forbidden => 403,
            ErrorKind::NotFound => 404,
            ErrorKind::AlreadyPaid | ErrorKind::ConcurrentModification => 409,
            ErrorKind::Storage => 500,
        }
    }

    /// true when retrying the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::ConcurrentModification | ErrorKind::Storage
        )
    }

    pub(crate) fn version_mismatch(loan_id: LoanId, expected: u64, found: u64) -> Self {
        LedgerError::ConcurrentModification {
            loan_id,
            message: format!("expected version {}, found {}", expected, found),
        }
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
