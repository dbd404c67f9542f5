//! installment lifecycle
//!
//! `Pending` is the only initial state. `Overdue` is reachable only from
//! `Pending`, and `Paid` is terminal. Nothing moves back to `Pending`.

use chrono::{DateTime, Utc};

use crate::errors::{LedgerError, Result};
use crate::state::Installment;
use crate::types::InstallmentStatus;

/// whether `from -> to` is a legal installment transition
pub fn can_transition(from: InstallmentStatus, to: InstallmentStatus) -> bool {
    use crate::types::InstallmentStatus::*;
    matches!((from, to), (Pending, Overdue) | (Pending, Paid) | (Overdue, Paid))
}

/// mark an installment paid; fails if it was paid already
pub fn mark_paid(installment: &mut Installment, now: DateTime<Utc>) -> Result<()> {
    if !can_transition(installment.status, InstallmentStatus::Paid) {
        return Err(LedgerError::AlreadyPaid {
            installment_id: installment.id,
        });
    }
    installment.status = InstallmentStatus::Paid;
    installment.paid_at = Some(now);
    Ok(())
}

/// flag a pending installment as overdue once `now` is past its due date
///
/// Returns whether the status changed. Overdue and paid installments are left
/// alone, so repeating the call is harmless.
pub fn mark_overdue_if_due(installment: &mut Installment, now: DateTime<Utc>) -> bool {
    if installment.is_past_due(now) {
        installment.status = InstallmentStatus::Overdue;
        true
    } else {
        false
    }
}

/// merge a concurrently written status into the stored one
///
/// Paid always wins, and a stored overdue flag is never reverted to pending,
/// so last-writer races cannot undo a payment.
pub fn merge(stored: InstallmentStatus, incoming: InstallmentStatus) -> InstallmentStatus {
    if stored == incoming || can_transition(stored, incoming) {
        incoming
    } else {
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decimal::Money;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;
    use crate::types::InstallmentStatus::*;

    fn installment(status: InstallmentStatus) -> Installment {
        Installment {
            id: Uuid::new_v4(),
            loan_id: Uuid::new_v4(),
            client_id: Uuid::new_v4(),
            installment_no: 1,
            amount: Money::from_major(250),
            due_date: Utc.with_ymd_and_hms(2023, 11, 1, 0, 0, 0).unwrap(),
            status,
            paid_at: None,
        }
    }

    #[test]
    fn test_transition_table() {
        assert!(can_transition(Pending, Overdue));
        assert!(can_transition(Pending, Paid));
        assert!(can_transition(Overdue, Paid));

        assert!(!can_transition(Paid, Pending));
        assert!(!can_transition(Paid, Overdue));
        assert!(!can_transition(Overdue, Pending));
        assert!(!can_transition(Paid, Paid));
    }

    #[test]
    fn test_overdue_installment_is_payable() {
        let mut item = installment(Overdue);
        let now = item.due_date + Duration::days(3);
        mark_paid(&mut item, now).unwrap();
        assert_eq!(item.status, Paid);
        assert_eq!(item.paid_at, Some(now));
    }

    #[test]
    fn test_second_payment_rejected() {
        let mut item = installment(Pending);
        let now = item.due_date;
        mark_paid(&mut item, now).unwrap();

        let err = mark_paid(&mut item, now + Duration::days(1)).unwrap_err();
        assert_eq!(err, LedgerError::AlreadyPaid { installment_id: item.id });
        assert_eq!(item.paid_at, Some(now));
    }

    #[test]
    fn test_overdue_requires_strictly_past_due() {
        let mut item = installment(Pending);
        let due = item.due_date;
        assert!(!mark_overdue_if_due(&mut item, due));
        assert_eq!(item.status, Pending);

        let later = item.due_date + Duration::seconds(1);
        assert!(mark_overdue_if_due(&mut item, later));
        assert_eq!(item.status, Overdue);
        assert!(!mark_overdue_if_due(&mut item, later));
    }

    #[test]
    fn test_paid_never_flagged_overdue() {
        let mut item = installment(Paid);
        let now = item.due_date + Duration::days(30);
        assert!(!mark_overdue_if_due(&mut item, now));
        assert_eq!(item.status, Paid);
    }

    #[test]
    fn test_merge_keeps_paid_sticky() {
        assert_eq!(merge(Paid, Overdue), Paid);
        assert_eq!(merge(Overdue, Pending), Overdue);
        assert_eq!(merge(Overdue, Paid), Paid);
        assert_eq!(merge(Pending, Overdue), Overdue);
    }
}
