//! Bill ledger arithmetic
//!
//! Pure functions shared by every store backend, so the in-memory and
//! Postgres finalization paths apply exactly the same update.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::warn;

use crate::error::ConflictError;
use crate::models::{Bill, BillStatus};

/// Result of applying one settled payment to a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedgerUpdate {
    pub amount_paid: Decimal,
    pub status: BillStatus,
    pub installment_count: i32,
    /// Portion of the payment beyond `amount_due`; never credited.
    pub overpayment: Decimal,
}

impl LedgerUpdate {
    pub fn apply_to(&self, bill: &mut Bill, now: DateTime<Utc>) {
        bill.amount_paid = self.amount_paid;
        bill.status = self.status;
        bill.installment_count = self.installment_count;
        bill.updated_at = now;
    }
}

pub fn derive_status(amount_due: Decimal, amount_paid: Decimal) -> BillStatus {
    if amount_paid >= amount_due {
        BillStatus::Paid
    } else if amount_paid > Decimal::ZERO {
        BillStatus::Partial
    } else {
        BillStatus::Pending
    }
}

/// `amount_paid` only grows and is capped at `amount_due`.
pub fn apply_payment(bill: &Bill, amount: Decimal, counts_installment: bool) -> LedgerUpdate {
    let credited = amount.max(Decimal::ZERO);
    let uncapped = bill.amount_paid + credited;
    let amount_paid = uncapped.min(bill.amount_due).max(bill.amount_paid);
    let overpayment = uncapped - amount_paid;
    if overpayment > Decimal::ZERO {
        warn!(
            bill_id = bill.id,
            %overpayment,
            "Settled payment exceeds bill balance, capping ledger at amount due"
        );
    }

    let installment_count = if counts_installment {
        bill.installment_count + 1
    } else {
        bill.installment_count
    };

    LedgerUpdate {
        amount_paid,
        status: derive_status(bill.amount_due, amount_paid),
        installment_count,
        overpayment,
    }
}

/// Pre-checks before a new payment may be initiated against `bill`.
pub fn check_payable(bill: &Bill, pay_amount: Decimal) -> Result<(), ConflictError> {
    if bill.status == BillStatus::Paid || bill.balance() <= Decimal::ZERO {
        return Err(ConflictError::AlreadyPaid);
    }
    if bill.allow_installments && bill.installment_count >= bill.max_installments {
        return Err(ConflictError::InstallmentLimitReached {
            used: bill.installment_count,
            max: bill.max_installments,
        });
    }
    if pay_amount > bill.balance() {
        return Err(ConflictError::AmountExceedsBalance {
            requested: pay_amount,
            remaining: bill.balance(),
        });
    }
    Ok(())
}
