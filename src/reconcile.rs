//! Applies an edit-set from the editable ledger view to the store.
//!
//! Positions index the view as it was rendered. Each rendered row carries its
//! id, so a position resolves to an id from that view and the id is then
//! re-checked against a snapshot read inside the transaction.

use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::{debug, info, warn};

use crate::domain::{Cells, Expense, ExpenseChanges, NewExpense};
use crate::error::{LedgerError, LedgerResult};
use crate::session::Session;
use crate::store::{LedgerStore, TransactionalStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum RowRef {
    /// Index into the rendered view.
    Position(usize),
    Id(i64),
}

impl fmt::Display for RowRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowRef::Position(pos) => write!(f, "row {pos}"),
            RowRef::Id(id) => write!(f, "expense #{id}"),
        }
    }
}

/// One interaction's worth of grid changes.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EditSet {
    #[serde(default)]
    pub added: Vec<Cells>,
    #[serde(default)]
    pub edited: BTreeMap<usize, Cells>,
    #[serde(default)]
    pub deleted: Vec<usize>,
    #[serde(default)]
    pub edited_by_id: BTreeMap<i64, Cells>,
    #[serde(default)]
    pub deleted_by_id: Vec<i64>,
}

impl EditSet {
    pub fn from_json(raw: &str) -> LedgerResult<Self> {
        serde_json::from_str(raw)
            .map_err(|e| LedgerError::validation(format!("malformed edit-set: {e}")))
    }

    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.edited.is_empty()
            && self.deleted.is_empty()
            && self.edited_by_id.is_empty()
            && self.deleted_by_id.is_empty()
    }

    fn edit_targets(&self) -> impl Iterator<Item = (RowRef, &Cells)> {
        let by_pos = self.edited.iter().map(|(p, c)| (RowRef::Position(*p), c));
        let by_id = self.edited_by_id.iter().map(|(id, c)| (RowRef::Id(*id), c));
        by_pos.chain(by_id)
    }

    fn delete_targets(&self) -> impl Iterator<Item = RowRef> + '_ {
        let by_pos = self.deleted.iter().map(|p| RowRef::Position(*p));
        let by_id = self.deleted_by_id.iter().map(|id| RowRef::Id(*id));
        by_pos.chain(by_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Position past the end of the rendered view.
    StalePosition,
    /// Row no longer exists in the store.
    NotFound,
    NoChanges,
    DeletedInSameEdit,
    /// Another target in the same edit-set already edits this row.
    DuplicateEdit,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            SkipReason::StalePosition => "no such row in the displayed ledger",
            SkipReason::NotFound => "row no longer exists (deleted elsewhere?)",
            SkipReason::NoChanges => "nothing changed",
            SkipReason::DeletedInSameEdit => "row is also being deleted",
            SkipReason::DuplicateEdit => "row is already edited by another entry",
        };
        f.write_str(text)
    }
}

impl From<&LedgerError> for SkipReason {
    fn from(err: &LedgerError) -> Self {
        match err {
            LedgerError::StaleIndex { .. } => SkipReason::StalePosition,
            _ => SkipReason::NotFound,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Skipped {
    pub target: RowRef,
    pub reason: SkipReason,
}

impl fmt::Display for Skipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.target, self.reason)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AppliedCounts {
    pub added: usize,
    pub edited: usize,
    pub deleted: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub counts: AppliedCounts,
    pub skipped: Vec<Skipped>,
    pub inserted_ids: Vec<i64>,
}

impl ReconcileReport {
    fn skip(&mut self, target: RowRef, reason: SkipReason) {
        self.skipped.push(Skipped { target, reason });
    }
}

/// Applies `edits` against `rendered`, the view the user edited.
///
/// Every cell is coerced and validated before the store is touched; a bad
/// cell aborts the whole edit-set. Deletes, edits and inserts then run in one
/// transaction, in that order. Targets that no longer resolve are skipped and
/// reported. A store failure rolls everything back.
pub fn reconcile<S: TransactionalStore>(
    store: &mut S,
    rendered: &[Expense],
    edits: &EditSet,
    session: &Session,
) -> LedgerResult<ReconcileReport> {
    if edits.is_empty() {
        return Ok(ReconcileReport::default());
    }

    let additions = edits
        .added
        .iter()
        .enumerate()
        .map(|(i, cells)| {
            NewExpense::from_cells(cells, &session.user, session.today)
                .map_err(|e| in_row(format!("added row {i}"), e))
        })
        .collect::<LedgerResult<Vec<_>>>()?;

    let changes = edits
        .edit_targets()
        .map(|(target, cells)| {
            ExpenseChanges::from_cells(cells)
                .map(|c| (target, c))
                .map_err(|e| in_row(target, e))
        })
        .collect::<LedgerResult<Vec<_>>>()?;

    let deletes: Vec<RowRef> = edits.delete_targets().collect();

    let report = store.in_transaction(|tx| {
        apply(tx, rendered, &additions, &changes, &deletes)
    })?;

    for skipped in &report.skipped {
        warn!(user = %session.user, "skipped {skipped}");
    }
    info!(
        user = %session.user,
        added = report.counts.added,
        edited = report.counts.edited,
        deleted = report.counts.deleted,
        skipped = report.skipped.len(),
        "applied edit-set"
    );
    Ok(report)
}

fn apply(
    tx: &mut dyn LedgerStore,
    rendered: &[Expense],
    additions: &[NewExpense],
    changes: &[(RowRef, ExpenseChanges)],
    deletes: &[RowRef],
) -> LedgerResult<ReconcileReport> {
    let fresh = tx.list_all()?;
    let live: BTreeMap<i64, &Expense> = fresh.iter().map(|e| (e.id, e)).collect();
    let mut report = ReconcileReport::default();

    // Resolve every target before the first destructive call.
    let mut delete_ids = Vec::new();
    let mut doomed = BTreeSet::new();
    for &target in deletes {
        match resolve(target, rendered, &live) {
            Ok(id) => {
                if doomed.insert(id) {
                    delete_ids.push((target, id));
                }
            }
            Err(e) => report.skip(target, SkipReason::from(&e)),
        }
    }

    let mut updates = Vec::new();
    let mut edited = BTreeSet::new();
    for (target, change) in changes {
        let target = *target;
        match resolve(target, rendered, &live) {
            Ok(id) if doomed.contains(&id) => report.skip(target, SkipReason::DeletedInSameEdit),
            Ok(id) if !edited.insert(id) => report.skip(target, SkipReason::DuplicateEdit),
            Ok(id) => {
                let delta = change.changed_from(live[&id]);
                if delta.is_empty() {
                    report.skip(target, SkipReason::NoChanges);
                } else {
                    updates.push((target, id, delta));
                }
            }
            Err(e) => report.skip(target, SkipReason::from(&e)),
        }
    }

    for (target, id) in delete_ids {
        debug!(id, "delete expense");
        match tx.delete_by_id(id) {
            Ok(()) => report.counts.deleted += 1,
            Err(e) if e.is_row_level() => report.skip(target, SkipReason::NotFound),
            Err(e) => return Err(e),
        }
    }

    for (target, id, delta) in updates {
        if delta.amount.is_some_and(|a| a.is_sign_negative() || a.is_zero()) {
            warn!(id, "edit leaves expense with a non-positive amount ({delta})");
        }
        debug!(id, "update expense: {delta}");
        match tx.update_by_id(id, &delta) {
            Ok(()) => report.counts.edited += 1,
            Err(e) if e.is_row_level() => report.skip(target, SkipReason::NotFound),
            Err(e) => return Err(e),
        }
    }

    for expense in additions {
        let id = tx.insert(expense)?;
        debug!(id, owner = %expense.owner, "insert expense");
        report.counts.added += 1;
        report.inserted_ids.push(id);
    }

    Ok(report)
}

fn in_row(row: impl fmt::Display, err: LedgerError) -> LedgerError {
    match err {
        LedgerError::Validation(msg) => LedgerError::validation(format!("{row}: {msg}")),
        other => other,
    }
}

fn resolve(
    target: RowRef,
    rendered: &[Expense],
    live: &BTreeMap<i64, &Expense>,
) -> LedgerResult<i64> {
    let id = match target {
        RowRef::Position(position) => rendered
            .get(position)
            .map(|e| e.id)
            .ok_or(LedgerError::StaleIndex { position })?,
        RowRef::Id(id) => id,
    };
    if live.contains_key(&id) {
        Ok(id)
    } else {
        Err(LedgerError::NotFound(id))
    }
}
