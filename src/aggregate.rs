//! Read-side views over one ledger snapshot.
//!
//! A user's figures are their fair share, not their raw outlay: their own
//! non-shared expenses count in full and every shared expense counts at
//! `amount / user_count`.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::BTreeMap;

use crate::domain::{Expense, YearMonth};
use crate::session::{Session, split_divisor};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagScope {
    Month(YearMonth),
    All,
}

/// Own rows plus every shared row, in ledger order.
pub fn user_scope<'a>(ledger: &'a [Expense], user: &'a str) -> impl Iterator<Item = &'a Expense> {
    ledger.iter().filter(move |e| e.visible_to(user))
}

fn split_amount(expense: &Expense, divisor: Decimal) -> Decimal {
    if expense.shared {
        expense.amount / divisor
    } else {
        expense.amount
    }
}

/// The user's scope with each shared amount replaced by its split value.
pub fn adjusted_view(ledger: &[Expense], user: &str, user_count: usize) -> Vec<Expense> {
    let divisor = split_divisor(user_count);
    user_scope(ledger, user)
        .map(|e| Expense {
            amount: split_amount(e, divisor),
            ..e.clone()
        })
        .collect()
}

pub fn monthly_total(ledger: &[Expense], user: &str, month: YearMonth, user_count: usize) -> Decimal {
    let divisor = split_divisor(user_count);
    user_scope(ledger, user)
        .filter(|e| month.contains(e.date))
        .map(|e| split_amount(e, divisor))
        .sum()
}

/// Month totals use the split view, like [`monthly_total`]. The all-time view
/// sums raw amounts over the user's own and shared rows.
pub fn per_tag_totals(
    ledger: &[Expense],
    user: &str,
    scope: TagScope,
    user_count: usize,
) -> BTreeMap<String, Decimal> {
    let mut out = BTreeMap::new();
    match scope {
        TagScope::Month(month) => {
            for e in adjusted_view(ledger, user, user_count) {
                if month.contains(e.date) {
                    *out.entry(e.tag).or_insert(Decimal::ZERO) += e.amount;
                }
            }
        }
        TagScope::All => {
            for e in user_scope(ledger, user) {
                *out.entry(e.tag.clone()).or_insert(Decimal::ZERO) += e.amount;
            }
        }
    }
    out
}

pub fn monthly_series(ledger: &[Expense], user: &str, user_count: usize) -> BTreeMap<YearMonth, Decimal> {
    let mut out = BTreeMap::new();
    for e in adjusted_view(ledger, user, user_count) {
        *out.entry(e.month()).or_insert(Decimal::ZERO) += e.amount;
    }
    out
}

/// `total` spread over the days of `month` that have elapsed by `today`.
///
/// For the current month that is today's day of month, so on the 1st the
/// whole total is the daily average. Past months use their full length;
/// future months divide by one.
pub fn average_daily(total: Decimal, month: YearMonth, today: NaiveDate) -> Decimal {
    let current = YearMonth::of(today);
    let days = if month == current {
        today.day()
    } else if month < current {
        month.days()
    } else {
        1
    };
    total / Decimal::from(days)
}

/// Every tag in the ledger followed by the configured defaults, without duplicates.
pub fn known_tags(ledger: &[Expense], defaults: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    let ledger_tags = ledger.iter().map(|e| e.tag.as_str());
    for tag in ledger_tags.chain(defaults.iter().map(String::as_str)) {
        if !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

/// The figures shown for one user and month, all from the same snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dashboard {
    pub month: YearMonth,
    pub total: Decimal,
    pub average_daily: Decimal,
    pub tags_month: BTreeMap<String, Decimal>,
    pub tags_all: BTreeMap<String, Decimal>,
    pub series: BTreeMap<YearMonth, Decimal>,
}

impl Dashboard {
    pub fn compute(ledger: &[Expense], session: &Session, month: YearMonth) -> Self {
        let user = session.user.as_str();
        let total = monthly_total(ledger, user, month, session.user_count);
        Self {
            month,
            total,
            average_daily: average_daily(total, month, session.today),
            tags_month: per_tag_totals(ledger, user, TagScope::Month(month), session.user_count),
            tags_all: per_tag_totals(ledger, user, TagScope::All, session.user_count),
            series: monthly_series(ledger, user, session.user_count),
        }
    }
}
