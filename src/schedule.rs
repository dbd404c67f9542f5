use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::decimal::Money;
use crate::errors::{LedgerError, Result};
use crate::types::{Frequency, InstallmentStatus};

/// days between bi-weekly due dates
pub const BI_WEEKLY_DAYS: i64 = 14;

/// one row of a freshly generated repayment schedule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledInstallment {
    pub installment_no: u32,
    pub amount: Money,
    pub due_date: DateTime<Utc>,
    pub status: InstallmentStatus,
}

/// generate the repayment schedule for a principal
///
/// Returns `frequency.tenure()` installments numbered `1..=tenure`, each for an
/// equal share of the principal and all `Pending`. Due dates are offset from
/// `start_date`, which itself is never a due date.
pub fn generate(
    principal: Money,
    start_date: DateTime<Utc>,
    frequency: Frequency,
) -> Result<Vec<ScheduledInstallment>> {
    if !principal.is_positive() {
        return Err(LedgerError::validation(format!(
            "principal must be positive, got {}",
            principal
        )));
    }

    let tenure = frequency.tenure();
    let amount = installment_amount(principal, tenure);

    let schedule = (1..=tenure)
        .map(|i| {
            Ok(ScheduledInstallment {
                installment_no: i,
                amount,
                due_date: due_date(start_date, frequency, i)?,
                status: InstallmentStatus::Pending,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        %principal,
        %frequency,
        tenure,
        %amount,
        "generated repayment schedule"
    );

    Ok(schedule)
}

/// equal split of the principal across the tenure
///
/// No remainder is redistributed; the sum of installments equals the principal
/// only up to the 8dp rounding of `Money`.
pub fn installment_amount(principal: Money, tenure: u32) -> Money {
    principal / Decimal::from(tenure.max(1))
}

/// due date of the `n`th installment (1-indexed)
pub fn due_date(start_date: DateTime<Utc>, frequency: Frequency, n: u32) -> Result<DateTime<Utc>> {
    match frequency {
        Frequency::BiWeekly => start_date
            .checked_add_signed(Duration::days(BI_WEEKLY_DAYS * n as i64))
            .ok_or_else(|| LedgerError::validation("due date out of range")),
        Frequency::Monthly => add_months_rolling(start_date, n),
    }
}

/// advance by calendar months, letting an out-of-range day spill into the
/// following month (Jan 31 + 1 month lands on Mar 3, or Mar 2 in a leap year)
pub fn add_months_rolling(date: DateTime<Utc>, months: u32) -> Result<DateTime<Utc>> {
    let out_of_range = || LedgerError::validation("due date out of range");

    let naive = date.naive_utc();
    let month_index = naive.month0() as i64 + months as i64;
    let year = naive.year() as i64 + month_index.div_euclid(12);
    let month = month_index.rem_euclid(12) as u32 + 1;
    let year = i32::try_from(year).map_err(|_| out_of_range())?;

    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(out_of_range)?;
    let day = first
        .checked_add_signed(Duration::days(naive.day() as i64 - 1))
        .ok_or_else(out_of_range)?;

    Ok(day.and_time(naive.time()).and_utc())
}
