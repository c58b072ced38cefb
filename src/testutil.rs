use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::domain::Expense;

pub fn dec(raw: &str) -> Decimal {
    raw.parse().expect("decimal literal")
}

pub fn date(raw: &str) -> NaiveDate {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").expect("date literal")
}

pub fn expense(id: i64, name: &str, amount: &str, date_raw: &str, shared: bool, owner: &str) -> Expense {
    Expense {
        id,
        name: name.to_string(),
        tag: "Outros".to_string(),
        date: date(date_raw),
        amount: dec(amount),
        shared,
        owner: owner.to_string(),
    }
}

pub fn tagged(mut e: Expense, tag: &str) -> Expense {
    e.tag = tag.to_string();
    e
}
