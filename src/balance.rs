use rust_decimal::Decimal;

use crate::domain::Expense;
use crate::session::split_divisor;

/// Settlement of the shared pool from one user's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SharedBalance {
    /// Every shared expense in the ledger, whoever paid it.
    pub total_shared: Decimal,
    pub fair_share: Decimal,
    /// What the user paid into the pool.
    pub user_paid: Decimal,
    /// Positive when the user is owed money, negative when they owe.
    pub net: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    Owed(Decimal),
    Owes(Decimal),
    Settled,
}

impl SharedBalance {
    pub fn settlement(&self) -> Settlement {
        if self.net > Decimal::ZERO {
            Settlement::Owed(self.net)
        } else if self.net < Decimal::ZERO {
            Settlement::Owes(-self.net)
        } else {
            Settlement::Settled
        }
    }
}

/// Computes the user's position over the whole ledger, not only their view.
/// Returns `None` when nothing is shared.
pub fn balance(ledger: &[Expense], user: &str, user_count: usize) -> Option<SharedBalance> {
    let shared: Vec<&Expense> = shared_rows(ledger);
    if shared.is_empty() {
        return None;
    }

    let total_shared: Decimal = shared.iter().map(|e| e.amount).sum();
    let user_paid: Decimal = shared
        .iter()
        .filter(|e| e.owner == user)
        .map(|e| e.amount)
        .sum();
    let fair_share = total_shared / split_divisor(user_count);

    Some(SharedBalance {
        total_shared,
        fair_share,
        user_paid,
        net: user_paid - fair_share,
    })
}

pub fn shared_rows(ledger: &[Expense]) -> Vec<&Expense> {
    ledger.iter().filter(|e| e.shared).collect()
}
