use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{LedgerError, LedgerResult};

/// Tag used when an added row leaves the tag cell blank.
pub const FALLBACK_TAG: &str = "Outros";

/// Largest magnitude accepted for an amount. Keeps ledger sums far from
/// `Decimal::MAX`.
const MAX_AMOUNT_UNITS: i64 = 1_000_000_000_000_000;

/// Rejects amounts whose magnitude exceeds [`MAX_AMOUNT_UNITS`].
pub fn check_amount_bound(amount: Decimal) -> LedgerResult<()> {
    if amount.abs() > Decimal::from(MAX_AMOUNT_UNITS) {
        return Err(LedgerError::validation(format!(
            "amount {amount} is too large (limit {MAX_AMOUNT_UNITS})"
        )));
    }
    Ok(())
}

/// One loosely typed grid row, keyed by column name.
pub type Cells = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    pub name: String,
    pub tag: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub shared: bool,
    pub owner: String,
}

impl Expense {
    pub fn month(&self) -> YearMonth {
        YearMonth::of(self.date)
    }

    /// Own rows plus every shared row are visible to a user.
    pub fn visible_to(&self, user: &str) -> bool {
        self.shared || self.owner == user
    }
}

/// An expense that has not been assigned an id by the store yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewExpense {
    pub name: String,
    pub tag: String,
    pub date: NaiveDate,
    pub amount: Decimal,
    pub shared: bool,
    pub owner: String,
}

impl NewExpense {
    pub fn validate(&self) -> LedgerResult<()> {
        if self.name.trim().is_empty() {
            return Err(LedgerError::validation("expense name must not be empty"));
        }
        if self.amount <= Decimal::ZERO {
            return Err(LedgerError::validation(format!(
                "expense amount must be > 0 (got {})",
                self.amount
            )));
        }
        check_amount_bound(self.amount)
    }

    /// Builds a validated expense from an added grid row.
    ///
    /// Any client supplied `id` is dropped, a blank owner becomes `default_owner`,
    /// a blank tag becomes [`FALLBACK_TAG`] and a blank date becomes `today`.
    pub fn from_cells(cells: &Cells, default_owner: &str, today: NaiveDate) -> LedgerResult<Self> {
        reject_unknown_columns(cells, ADD_COLUMNS)?;

        let name = cell(cells, "name")
            .map(|v| coerce_text("name", v))
            .transpose()?
            .flatten()
            .unwrap_or_default();
        let tag = cell(cells, "tag")
            .map(|v| coerce_text("tag", v))
            .transpose()?
            .flatten()
            .unwrap_or_else(|| FALLBACK_TAG.to_string());
        let date = cell(cells, "date")
            .map(coerce_date)
            .transpose()?
            .flatten()
            .unwrap_or(today);
        let amount = cell(cells, "amount")
            .map(coerce_amount)
            .transpose()?
            .flatten()
            .ok_or_else(|| LedgerError::validation("expense amount is required"))?;
        let shared = cell(cells, "shared")
            .map(coerce_bool)
            .transpose()?
            .flatten()
            .unwrap_or(false);
        let owner = cell(cells, "owner")
            .map(|v| coerce_text("owner", v))
            .transpose()?
            .flatten()
            .unwrap_or_else(|| default_owner.to_string());

        let expense = Self {
            name,
            tag,
            date,
            amount,
            shared,
            owner,
        };
        expense.validate()?;
        Ok(expense)
    }
}

/// Partial update of an expense. `id` and `owner` are not editable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpenseChanges {
    pub name: Option<String>,
    pub tag: Option<String>,
    pub date: Option<NaiveDate>,
    pub amount: Option<Decimal>,
    pub shared: Option<bool>,
}

impl ExpenseChanges {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.tag.is_none()
            && self.date.is_none()
            && self.amount.is_none()
            && self.shared.is_none()
    }

    /// Coerces an edited grid row. Cells for `id` and `owner` are ignored.
    pub fn from_cells(cells: &Cells) -> LedgerResult<Self> {
        reject_unknown_columns(cells, ADD_COLUMNS)?;

        let name = match cell(cells, "name") {
            Some(v) => Some(
                coerce_text("name", v)?
                    .ok_or_else(|| LedgerError::validation("expense name must not be empty"))?,
            ),
            None => None,
        };
        let tag = match cell(cells, "tag") {
            Some(v) => Some(coerce_text("tag", v)?.unwrap_or_else(|| FALLBACK_TAG.to_string())),
            None => None,
        };
        let date = cell(cells, "date").map(coerce_date).transpose()?.flatten();
        let amount = cell(cells, "amount").map(coerce_amount).transpose()?.flatten();
        if let Some(amount) = amount {
            check_amount_bound(amount)?;
        }
        let shared = cell(cells, "shared").map(coerce_bool).transpose()?.flatten();

        Ok(Self {
            name,
            tag,
            date,
            amount,
            shared,
        })
    }

    /// Keeps only the fields whose value differs from `current`.
    pub fn changed_from(&self, current: &Expense) -> Self {
        Self {
            name: self.name.clone().filter(|v| *v != current.name),
            tag: self.tag.clone().filter(|v| *v != current.tag),
            date: self.date.filter(|v| *v != current.date),
            amount: self.amount.filter(|v| *v != current.amount),
            shared: self.shared.filter(|v| *v != current.shared),
        }
    }

    pub fn apply_to(&self, expense: &mut Expense) {
        if let Some(name) = &self.name {
            expense.name = name.clone();
        }
        if let Some(tag) = &self.tag {
            expense.tag = tag.clone();
        }
        if let Some(date) = self.date {
            expense.date = date;
        }
        if let Some(amount) = self.amount {
            expense.amount = amount;
        }
        if let Some(shared) = self.shared {
            expense.shared = shared;
        }
    }
}

impl fmt::Display for ExpenseChanges {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(v) = &self.name {
            parts.push(format!("name={v}"));
        }
        if let Some(v) = &self.tag {
            parts.push(format!("tag={v}"));
        }
        if let Some(v) = self.date {
            parts.push(format!("date={v}"));
        }
        if let Some(v) = self.amount {
            parts.push(format!("amount={v}"));
        }
        if let Some(v) = self.shared {
            parts.push(format!("shared={v}"));
        }
        if parts.is_empty() {
            f.write_str("(no changes)")
        } else {
            f.write_str(&parts.join(", "))
        }
    }
}

/// Calendar month, ordered chronologically and displayed as `YYYY-MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }

    pub fn first_day(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }

    pub fn days(&self) -> u32 {
        self.first_day()
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .and_then(|next| next.pred_opt())
            .map_or(31, |last| last.day())
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = LedgerError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let invalid = || LedgerError::validation(format!("Invalid month '{raw}'. Expected YYYY-MM"));
        let (y, m) = raw.trim().split_once('-').ok_or_else(invalid)?;
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        Self::new(year, month).ok_or_else(invalid)
    }
}

const ADD_COLUMNS: &[&str] = &["id", "name", "tag", "date", "amount", "shared", "owner"];

fn cell<'a>(cells: &'a Cells, column: &str) -> Option<&'a Value> {
    cells.get(column).filter(|v| !v.is_null())
}

fn reject_unknown_columns(cells: &Cells, known: &[&str]) -> LedgerResult<()> {
    match cells.keys().find(|k| !known.contains(&k.as_str())) {
        Some(unknown) => Err(LedgerError::validation(format!("unknown column '{unknown}'"))),
        None => Ok(()),
    }
}

/// Blank strings coerce to `None`.
fn coerce_text(column: &str, value: &Value) -> LedgerResult<Option<String>> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => {
            return Err(LedgerError::validation(format!(
                "{column} must be text, got {other}"
            )));
        }
    };
    Ok((!text.is_empty()).then_some(text))
}

pub fn parse_amount(raw: &str) -> LedgerResult<Decimal> {
    let trimmed = raw.trim();
    // Accept a decimal comma when no decimal point is present ("12,50").
    let normalized = if trimmed.contains(',') && !trimmed.contains('.') {
        trimmed.replace(',', ".")
    } else {
        trimmed.to_string()
    };
    Decimal::from_str(&normalized)
        .or_else(|_| Decimal::from_scientific(&normalized))
        .map_err(|_| LedgerError::validation(format!("Invalid amount: {raw}")))
}

fn coerce_amount(value: &Value) -> LedgerResult<Option<Decimal>> {
    match value {
        Value::Number(n) => parse_amount(&n.to_string()).map(Some),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_amount(s).map(Some),
        other => Err(LedgerError::validation(format!(
            "amount must be a number, got {other}"
        ))),
    }
}

pub fn parse_date(raw: &str) -> LedgerResult<NaiveDate> {
    let trimmed = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(d);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.date());
    }
    Err(LedgerError::validation(format!(
        "Invalid date: {raw}. Expected YYYY-MM-DD"
    )))
}

fn coerce_date(value: &Value) -> LedgerResult<Option<NaiveDate>> {
    match value {
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_date(s).map(Some),
        // Grids serialize timestamps as epoch milliseconds.
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|dt| Some(dt.date_naive()))
            .ok_or_else(|| LedgerError::validation(format!("Invalid date timestamp: {n}"))),
        other => Err(LedgerError::validation(format!(
            "date must be YYYY-MM-DD, got {other}"
        ))),
    }
}

pub fn parse_flag(raw: &str) -> LedgerResult<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "y" | "1" => Ok(true),
        "false" | "no" | "n" | "0" => Ok(false),
        _ => Err(LedgerError::validation(format!(
            "Invalid boolean: {raw}. Expected true or false"
        ))),
    }
}

fn coerce_bool(value: &Value) -> LedgerResult<Option<bool>> {
    match value {
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => match n.as_i64() {
            Some(0) => Ok(Some(false)),
            Some(1) => Ok(Some(true)),
            _ => Err(LedgerError::validation(format!("shared must be 0 or 1, got {n}"))),
        },
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_flag(s).map(Some),
        other => Err(LedgerError::validation(format!(
            "shared must be a boolean, got {other}"
        ))),
    }
}
