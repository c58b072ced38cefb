use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::YearMonth;
use crate::error::{LedgerError, LedgerResult};

/// Source of the acting user and the size of the household roster.
pub trait IdentityProvider {
    fn current_user(&self) -> &str;

    /// May be zero for an empty roster; see [`split_divisor`].
    fn user_count(&self) -> usize;
}

/// Household roster with the user acting in this invocation.
#[derive(Debug, Clone)]
pub struct Roster<'a> {
    users: &'a [String],
    current: String,
}

impl<'a> Roster<'a> {
    /// Picks `requested` if given, else `fallback`. The chosen user must be on the roster.
    pub fn resolve(
        users: &'a [String],
        requested: Option<&str>,
        fallback: Option<&str>,
    ) -> LedgerResult<Self> {
        let Some(current) = requested.or(fallback).map(str::trim).filter(|u| !u.is_empty()) else {
            return Err(LedgerError::validation(
                "No current user. Run: houseledger user add <name>",
            ));
        };
        if !users.iter().any(|u| u == current) {
            return Err(LedgerError::validation(format!(
                "Unknown user '{current}'. Known users: {}",
                users.join(", ")
            )));
        }
        Ok(Self {
            users,
            current: current.to_string(),
        })
    }
}

impl IdentityProvider for Roster<'_> {
    fn current_user(&self) -> &str {
        &self.current
    }

    fn user_count(&self) -> usize {
        self.users.len()
    }
}

/// Per-invocation context handed to every core call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub user: String,
    pub user_count: usize,
    pub today: NaiveDate,
}

impl Session {
    pub fn new(user: impl Into<String>, user_count: usize, today: NaiveDate) -> Self {
        Self {
            user: user.into(),
            user_count,
            today,
        }
    }

    pub fn from_identity(identity: &dyn IdentityProvider, today: NaiveDate) -> Self {
        Self::new(identity.current_user(), identity.user_count(), today)
    }

    pub fn current_month(&self) -> YearMonth {
        YearMonth::of(self.today)
    }
}

/// Divisor applied to shared amounts. Never below one.
pub fn split_divisor(user_count: usize) -> Decimal {
    Decimal::from(user_count.max(1))
}
