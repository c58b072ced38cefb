use thiserror::Error;

#[derive(Debug, Error)]
pub enum LedgerError {
    /// Malformed input caught before any store mutation.
    #[error("Invalid input: {0}")]
    Validation(String),

    /// A grid position that no longer resolves to a row.
    #[error("Row {position} is no longer in the ledger")]
    StaleIndex { position: usize },

    #[error("Expense {0} not found")]
    NotFound(i64),

    #[error("Ledger store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    #[error("Corrupt value in ledger store: {0}")]
    Corrupt(String),
}

impl LedgerError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Errors that skip a single row instead of failing the whole edit-set.
    pub fn is_row_level(&self) -> bool {
        matches!(self, Self::StaleIndex { .. } | Self::NotFound(_))
    }
}

pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
