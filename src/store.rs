use rust_decimal::Decimal;

use crate::domain::{Expense, ExpenseChanges, NewExpense};
use crate::error::LedgerResult;

/// Row-oriented persistence for expenses, keyed by a store-assigned id.
pub trait LedgerStore {
    /// Every expense, ordered by id.
    fn list_all(&self) -> LedgerResult<Vec<Expense>>;

    fn insert(&mut self, expense: &NewExpense) -> LedgerResult<i64>;

    /// Fails with `NotFound` when `id` is absent.
    fn update_by_id(&mut self, id: i64, changes: &ExpenseChanges) -> LedgerResult<()>;

    /// Fails with `NotFound` when `id` is absent.
    fn delete_by_id(&mut self, id: i64) -> LedgerResult<()>;
}

/// A ledger store that can group several mutations into one commit.
pub trait TransactionalStore: LedgerStore {
    /// Runs `apply` inside a single transaction. The transaction commits when
    /// `apply` returns `Ok` and rolls back otherwise.
    fn in_transaction<T, F>(&mut self, apply: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerStore) -> LedgerResult<T>;
}

/// Per-user monthly budget values.
pub trait BudgetStore {
    /// Zero when the user never set a budget.
    fn budget_for(&self, username: &str) -> LedgerResult<Decimal>;

    fn store_budget(&mut self, username: &str, amount: Decimal) -> LedgerResult<()>;
}
