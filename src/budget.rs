use rust_decimal::Decimal;
use std::fmt;

use crate::domain::check_amount_bound;
use crate::error::{LedgerError, LedgerResult};
use crate::store::BudgetStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetState {
    Surplus,
    Deficit,
}

impl fmt::Display for BudgetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            BudgetState::Surplus => "surplus",
            BudgetState::Deficit => "deficit",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetStatus {
    pub budget: Decimal,
    pub spent: Decimal,
    pub remaining: Decimal,
    pub state: BudgetState,
}

pub fn remaining(budget: Decimal, monthly_total: Decimal) -> BudgetStatus {
    let remaining = budget - monthly_total;
    BudgetStatus {
        budget,
        spent: monthly_total,
        remaining,
        state: if remaining < Decimal::ZERO {
            BudgetState::Deficit
        } else {
            BudgetState::Surplus
        },
    }
}

/// Overwrites the user's monthly budget. Negative amounts are rejected.
pub fn set_budget(store: &mut dyn BudgetStore, username: &str, amount: Decimal) -> LedgerResult<()> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::validation(format!(
            "budget must not be negative (got {amount})"
        )));
    }
    check_amount_bound(amount)?;
    store.store_budget(username, amount)
}

pub fn status_for(store: &dyn BudgetStore, username: &str, monthly_total: Decimal) -> LedgerResult<BudgetStatus> {
    Ok(remaining(store.budget_for(username)?, monthly_total))
}
