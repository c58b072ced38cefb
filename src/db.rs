use crate::config::{AppPaths, household_slug};
use crate::domain::{Expense, ExpenseChanges, NewExpense};
use crate::error::{LedgerError, LedgerResult};
use crate::store::{BudgetStore, LedgerStore, TransactionalStore};
use anyhow::Context;
use chrono::{NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{Connection, OptionalExtension, TransactionBehavior, params, params_from_iter};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

const DATE_FORMAT: &str = "%Y-%m-%d";

pub struct Db {
    conn: Connection,
}

impl Db {
    pub fn open(paths: &AppPaths, household: &str) -> anyhow::Result<(Self, PathBuf)> {
        let slug = household_slug(household);
        let dir = paths.data_dir.join("households").join(slug);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create household dir {}", dir.display()))?;

        let db_path = dir.join("houseledger.sqlite3");
        let db = Self::open_at(&db_path)
            .with_context(|| format!("Failed to open DB {}", db_path.display()))?;
        Ok((db, db_path))
    }

    pub fn open_at(path: &Path) -> LedgerResult<Self> {
        let conn = Connection::open(path)?;
        // Fail fast when another session holds the write lock.
        conn.busy_timeout(Duration::from_secs(2))?;
        let db = Self { conn };
        db.migrate()?;
        Ok(db)
    }

    fn migrate(&self) -> LedgerResult<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS expenses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                tag TEXT NOT NULL,
                date TEXT NOT NULL,
                amount TEXT NOT NULL,
                shared INTEGER NOT NULL DEFAULT 0,
                owner TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);
            CREATE INDEX IF NOT EXISTS idx_expenses_owner ON expenses(owner);

            CREATE TABLE IF NOT EXISTS budgets (
                username TEXT PRIMARY KEY,
                amount TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;
        Ok(())
    }

    fn ledger(&self) -> SqlLedger<'_> {
        SqlLedger { conn: &self.conn }
    }
}

/// Ledger operations over a connection or an open transaction.
struct SqlLedger<'c> {
    conn: &'c Connection,
}

impl SqlLedger<'_> {
    fn fetch_all(&self) -> LedgerResult<Vec<Expense>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, name, tag, date, amount, shared, owner FROM expenses ORDER BY id ASC",
        )?;

        let rows = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let tag: String = row.get(2)?;
            let date: String = row.get(3)?;
            let amount: String = row.get(4)?;
            let shared: bool = row.get(5)?;
            let owner: String = row.get(6)?;
            Ok((id, name, tag, date, amount, shared, owner))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (id, name, tag, date, amount, shared, owner) = row?;
            let date = NaiveDate::parse_from_str(&date, DATE_FORMAT).map_err(|_| {
                LedgerError::Corrupt(format!("invalid date '{date}' on expense {id}"))
            })?;
            let amount = amount.parse::<Decimal>().map_err(|_| {
                LedgerError::Corrupt(format!("invalid amount '{amount}' on expense {id}"))
            })?;

            out.push(Expense {
                id,
                name,
                tag,
                date,
                amount,
                shared,
                owner,
            });
        }
        Ok(out)
    }

    fn insert_row(&self, expense: &NewExpense) -> LedgerResult<i64> {
        self.conn.execute(
            r#"
            INSERT INTO expenses (name, tag, date, amount, shared, owner)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                expense.name,
                expense.tag,
                expense.date.format(DATE_FORMAT).to_string(),
                expense.amount.to_string(),
                expense.shared,
                expense.owner,
            ],
        )?;
        let id = self.conn.last_insert_rowid();
        debug!(id, "inserted expense");
        Ok(id)
    }

    fn update_row(&self, id: i64, changes: &ExpenseChanges) -> LedgerResult<()> {
        let mut columns: Vec<&str> = Vec::new();
        let mut values: Vec<Value> = Vec::new();
        if let Some(name) = &changes.name {
            columns.push("name");
            values.push(Value::Text(name.clone()));
        }
        if let Some(tag) = &changes.tag {
            columns.push("tag");
            values.push(Value::Text(tag.clone()));
        }
        if let Some(date) = changes.date {
            columns.push("date");
            values.push(Value::Text(date.format(DATE_FORMAT).to_string()));
        }
        if let Some(amount) = changes.amount {
            columns.push("amount");
            values.push(Value::Text(amount.to_string()));
        }
        if let Some(shared) = changes.shared {
            columns.push("shared");
            values.push(Value::Integer(i64::from(shared)));
        }

        if columns.is_empty() {
            return if self.exists(id)? {
                Ok(())
            } else {
                Err(LedgerError::NotFound(id))
            };
        }

        let assignments = columns
            .iter()
            .enumerate()
            .map(|(i, col)| format!("{col} = ?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        values.push(Value::Integer(id));
        let sql = format!(
            "UPDATE expenses SET {assignments} WHERE id = ?{}",
            values.len()
        );

        let changed = self.conn.execute(&sql, params_from_iter(values))?;
        if changed == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    fn delete_row(&self, id: i64) -> LedgerResult<()> {
        let changed = self
            .conn
            .execute("DELETE FROM expenses WHERE id = ?1", params![id])?;
        if changed == 0 {
            return Err(LedgerError::NotFound(id));
        }
        Ok(())
    }

    fn exists(&self, id: i64) -> LedgerResult<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM expenses WHERE id = ?1", params![id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }
}

impl LedgerStore for SqlLedger<'_> {
    fn list_all(&self) -> LedgerResult<Vec<Expense>> {
        self.fetch_all()
    }

    fn insert(&mut self, expense: &NewExpense) -> LedgerResult<i64> {
        self.insert_row(expense)
    }

    fn update_by_id(&mut self, id: i64, changes: &ExpenseChanges) -> LedgerResult<()> {
        self.update_row(id, changes)
    }

    fn delete_by_id(&mut self, id: i64) -> LedgerResult<()> {
        self.delete_row(id)
    }
}

impl LedgerStore for Db {
    fn list_all(&self) -> LedgerResult<Vec<Expense>> {
        self.ledger().fetch_all()
    }

    fn insert(&mut self, expense: &NewExpense) -> LedgerResult<i64> {
        self.ledger().insert_row(expense)
    }

    fn update_by_id(&mut self, id: i64, changes: &ExpenseChanges) -> LedgerResult<()> {
        self.ledger().update_row(id, changes)
    }

    fn delete_by_id(&mut self, id: i64) -> LedgerResult<()> {
        self.ledger().delete_row(id)
    }
}

impl TransactionalStore for Db {
    fn in_transaction<T, F>(&mut self, apply: F) -> LedgerResult<T>
    where
        F: FnOnce(&mut dyn LedgerStore) -> LedgerResult<T>,
    {
        // The snapshot read and the writes run under one write lock.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let out = {
            let mut scope = SqlLedger { conn: &tx };
            apply(&mut scope)?
        };
        // Dropping `tx` on the error path above rolls back.
        tx.commit()?;
        Ok(out)
    }
}

impl BudgetStore for Db {
    fn budget_for(&self, username: &str) -> LedgerResult<Decimal> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT amount FROM budgets WHERE username = ?1",
                params![username],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            None => Ok(Decimal::ZERO),
            Some(raw) => raw.parse::<Decimal>().map_err(|_| {
                LedgerError::Corrupt(format!("invalid budget '{raw}' for {username}"))
            }),
        }
    }

    fn store_budget(&mut self, username: &str, amount: Decimal) -> LedgerResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO budgets (username, amount, updated_at)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(username) DO UPDATE SET amount = excluded.amount, updated_at = excluded.updated_at
            "#,
            params![username, amount.to_string(), Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget;
    use crate::domain::Cells;
    use crate::reconcile::{EditSet, reconcile};
    use crate::session::Session;
    use crate::testutil::{date, dec};
    use serde_json::json;
    use std::collections::BTreeMap;

    fn cells(value: serde_json::Value) -> Cells {
        serde_json::from_value(value).unwrap()
    }

    fn test_db() -> (tempfile::TempDir, Db) {
        let dir = tempfile::tempdir().unwrap();
        let db = Db::open_at(&dir.path().join("test.sqlite3")).unwrap();
        (dir, db)
    }

    #[test]
    fn transaction_holds_the_write_lock_from_its_first_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.sqlite3");
        let mut db = Db::open_at(&path).unwrap();

        db.in_transaction(|tx| {
            tx.list_all()?;
            let other = Connection::open(&path)?;
            other.busy_timeout(Duration::ZERO)?;
            assert!(other.execute_batch("BEGIN IMMEDIATE; ROLLBACK;").is_err());
            Ok(())
        })
        .unwrap();
    }

    fn rent() -> NewExpense {
        NewExpense {
            name: "Rent".into(),
            tag: "Casa".into(),
            date: date("2026-02-01"),
            amount: dec("1000.50"),
            shared: true,
            owner: "alice".into(),
        }
    }

    #[test]
    fn insert_then_list_round_trips_every_field() {
        let (_dir, mut db) = test_db();
        let first = db.insert(&rent()).unwrap();
        let second = db.insert(&rent()).unwrap();
        assert_ne!(first, second);

        let rows = db.list_all().unwrap();
        assert_eq!(rows.len(), 2);
        let e = &rows[0];
        assert_eq!(e.id, first);
        assert_eq!(e.name, "Rent");
        assert_eq!(e.tag, "Casa");
        assert_eq!(e.date, date("2026-02-01"));
        assert_eq!(e.amount, dec("1000.50"));
        assert!(e.shared);
        assert_eq!(e.owner, "alice");
    }

    #[test]
    fn ids_are_not_reused_after_delete() {
        let (_dir, mut db) = test_db();
        let first = db.insert(&rent()).unwrap();
        db.delete_by_id(first).unwrap();
        let next = db.insert(&rent()).unwrap();
        assert!(next > first);
    }

    #[test]
    fn partial_update_touches_only_given_fields() {
        let (_dir, mut db) = test_db();
        let id = db.insert(&rent()).unwrap();
        let changes = ExpenseChanges {
            amount: Some(dec("50")),
            shared: Some(false),
            ..Default::default()
        };
        db.update_by_id(id, &changes).unwrap();

        let e = db.list_all().unwrap().remove(0);
        assert_eq!(e.amount, dec("50"));
        assert!(!e.shared);
        assert_eq!(e.name, "Rent");
        assert_eq!(e.owner, "alice");
    }

    #[test]
    fn missing_ids_report_not_found() {
        let (_dir, mut db) = test_db();
        let changes = ExpenseChanges {
            name: Some("x".into()),
            ..Default::default()
        };
        assert!(matches!(db.update_by_id(42, &changes), Err(LedgerError::NotFound(42))));
        assert!(matches!(
            db.update_by_id(42, &ExpenseChanges::default()),
            Err(LedgerError::NotFound(42))
        ));
        assert!(matches!(db.delete_by_id(42), Err(LedgerError::NotFound(42))));
    }

    #[test]
    fn failed_transaction_leaves_the_table_untouched() {
        let (_dir, mut db) = test_db();
        db.insert(&rent()).unwrap();

        let result: LedgerResult<()> = db.in_transaction(|tx| {
            tx.insert(&rent())?;
            tx.delete_by_id(1)?;
            Err(LedgerError::validation("abort"))
        });

        assert!(result.is_err());
        assert_eq!(db.list_all().unwrap().len(), 1);
    }

    #[test]
    fn reconcile_applies_against_sqlite() {
        let (_dir, mut db) = test_db();
        for _ in 0..3 {
            db.insert(&rent()).unwrap();
        }
        let rendered = db.list_all().unwrap();
        let session = Session::new("bob", 2, date("2026-02-14"));
        let edits = EditSet {
            added: vec![cells(json!({"name": "Feira", "amount": "35.5"}))],
            edited: BTreeMap::from([(1, cells(json!({"amount": 50})))]),
            deleted: vec![0],
            ..Default::default()
        };

        let report = reconcile(&mut db, &rendered, &edits, &session).unwrap();

        assert_eq!(report.counts.added, 1);
        assert_eq!(report.counts.edited, 1);
        assert_eq!(report.counts.deleted, 1);
        let rows = db.list_all().unwrap();
        let ids: Vec<i64> = rows.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![rendered[1].id, rendered[2].id, report.inserted_ids[0]]);
        assert_eq!(rows[0].amount, dec("50"));
        assert_eq!(rows[2].owner, "bob");
    }

    #[test]
    fn budgets_default_to_zero_and_upsert() {
        let (_dir, mut db) = test_db();
        assert_eq!(db.budget_for("alice").unwrap(), Decimal::ZERO);
        budget::set_budget(&mut db, "alice", dec("800")).unwrap();
        budget::set_budget(&mut db, "alice", dec("650.25")).unwrap();
        assert_eq!(db.budget_for("alice").unwrap(), dec("650.25"));
    }
}
