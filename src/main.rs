mod aggregate;
mod balance;
mod budget;
mod cli;
mod config;
mod db;
mod domain;
mod error;
mod reconcile;
mod session;
mod store;
#[cfg(test)]
mod testutil;

use anyhow::{Context, Result, anyhow};
use chrono::Local;
use clap::Parser;
use rust_decimal::Decimal;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::Read;
use tracing_subscriber::EnvFilter;

use crate::aggregate::{Dashboard, known_tags, monthly_series, monthly_total, user_scope};
use crate::balance::{Settlement, balance, shared_rows};
use crate::cli::{BudgetCmd, Cli, Command, EditArgs, UserCmd};
use crate::config::{AppConfig, app_paths, load_or_init_config, write_config};
use crate::db::Db;
use crate::domain::{Cells, Expense, YearMonth, parse_amount};
use crate::reconcile::{EditSet, ReconcileReport, reconcile};
use crate::session::{Roster, Session};
use crate::store::LedgerStore;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("{err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("houseledger=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let paths = app_paths(cli.home.clone())?;
    let (mut cfg, cfg_path) = load_or_init_config(&paths)?;
    let today = cli.today.unwrap_or_else(|| Local::now().date_naive());

    match cli.command {
        Command::User(args) => handle_user(args.cmd, &mut cfg, &cfg_path),
        cmd => {
            let roster = Roster::resolve(
                &cfg.users,
                cli.user.as_deref(),
                cfg.current_user.as_deref(),
            )?;
            let session = Session::from_identity(&roster, today);
            let (mut db, _db_path) = Db::open(&paths, &cfg.household)?;

            match cmd {
                Command::Add(args) => {
                    let mut cells = Cells::new();
                    cells.insert("name".into(), Value::String(args.name));
                    cells.insert("amount".into(), Value::String(args.amount));
                    cells.insert("shared".into(), Value::Bool(args.shared));
                    if let Some(tag) = args.tag {
                        cells.insert("tag".into(), Value::String(tag));
                    }
                    if let Some(date) = args.date {
                        cells.insert("date".into(), Value::String(date));
                    }
                    let edits = EditSet {
                        added: vec![cells],
                        ..Default::default()
                    };
                    let report = reconcile(&mut db, &[], &edits, &session)?;
                    for id in &report.inserted_ids {
                        println!("Added expense #{id}.");
                    }
                }
                Command::List(args) => {
                    let ledger = db.list_all()?;
                    let view = rendered_view(&ledger, &session.user);
                    if args.json {
                        println!("{}", serde_json::to_string_pretty(&view)?);
                    } else {
                        print_ledger(&view);
                    }
                }
                Command::Edit(args) => {
                    let id = args.id;
                    let cells = edit_cells(args)?;
                    let edits = EditSet {
                        edited_by_id: BTreeMap::from([(id, cells)]),
                        ..Default::default()
                    };
                    apply_and_report(&mut db, &edits, &session)?;
                }
                Command::Rm(args) => {
                    let edits = EditSet {
                        deleted_by_id: args.ids,
                        ..Default::default()
                    };
                    apply_and_report(&mut db, &edits, &session)?;
                }
                Command::Apply(args) => {
                    let raw = read_input(&args.file)?;
                    let edits = EditSet::from_json(&raw)?;
                    apply_and_report(&mut db, &edits, &session)?;
                }
                Command::Summary(args) => {
                    let month = parse_month_or_current(args.month.as_deref(), &session)?;
                    print_summary(&db, &session, month)?;
                }
                Command::Series => {
                    let ledger = db.list_all()?;
                    let series = monthly_series(&ledger, &session.user, session.user_count);
                    if series.is_empty() {
                        println!("(no expenses)");
                    }
                    for (month, total) in series {
                        println!("{month}\t{}", money(total));
                    }
                }
                Command::Tags => {
                    let ledger = db.list_all()?;
                    for tag in known_tags(&ledger, &cfg.default_tags) {
                        println!("{tag}");
                    }
                }
                Command::Shared => {
                    let ledger = db.list_all()?;
                    print_shared(&ledger, &session);
                }
                Command::Budget(args) => {
                    handle_budget(&mut db, args.cmd, &session)?;
                }
                Command::User(_) => unreachable!("user commands are handled before the roster"),
            }

            Ok(())
        }
    }
}

fn handle_user(cmd: UserCmd, cfg: &mut AppConfig, cfg_path: &std::path::Path) -> Result<()> {
    match cmd {
        UserCmd::Add { name } => {
            cfg.add_user(&name)?;
            write_config(cfg_path, cfg)?;
            println!("Added user: {}", name.trim());
        }
        UserCmd::Switch { name } => {
            cfg.switch_user(&name)?;
            write_config(cfg_path, cfg)?;
            println!("Switched to user: {name}");
        }
        UserCmd::List => {
            if cfg.users.is_empty() {
                println!("(no users)");
            }
            for user in &cfg.users {
                let marker = if cfg.current_user.as_deref() == Some(user.as_str()) {
                    "*"
                } else {
                    " "
                };
                println!("{marker} {user}");
            }
        }
    }
    Ok(())
}

fn handle_budget(db: &mut Db, cmd: BudgetCmd, session: &Session) -> Result<()> {
    match cmd {
        BudgetCmd::Set { amount } => {
            let amount = parse_amount(&amount)?;
            budget::set_budget(db, &session.user, amount)?;
            println!("Budget for {} set to {}.", session.user, money(amount));
        }
        BudgetCmd::Show { month } => {
            let month = parse_month_or_current(month.as_deref(), session)?;
            let ledger = db.list_all()?;
            let spent = monthly_total(&ledger, &session.user, month, session.user_count);
            let status = budget::status_for(&*db, &session.user, spent)?;
            println!("month\tbudget\tspent\tremaining\tstatus");
            println!(
                "{}\t{}\t{}\t{}\t{}",
                month,
                money(status.budget),
                money(status.spent),
                money(status.remaining),
                status.state
            );
        }
    }
    Ok(())
}

/// The editable view: the user's own rows plus every shared row, in ledger order.
fn rendered_view(ledger: &[Expense], user: &str) -> Vec<Expense> {
    user_scope(ledger, user).cloned().collect()
}

fn apply_and_report(db: &mut Db, edits: &EditSet, session: &Session) -> Result<()> {
    let ledger = db.list_all()?;
    let view = rendered_view(&ledger, &session.user);
    let report = reconcile(db, &view, edits, session).context("Edit-set not applied")?;
    print_reconcile_report(&report);
    Ok(())
}

fn edit_cells(args: EditArgs) -> Result<Cells> {
    let mut cells = Cells::new();
    let fields = [
        ("name", args.name),
        ("tag", args.tag),
        ("date", args.date),
        ("amount", args.amount),
        ("shared", args.shared),
    ];
    for (column, value) in fields {
        if let Some(value) = value {
            cells.insert(column.to_string(), Value::String(value));
        }
    }
    if cells.is_empty() {
        return Err(anyhow!(
            "Nothing to edit. Pass at least one of --name, --tag, --date, --amount, --shared"
        ));
    }
    Ok(cells)
}

fn read_input(file: &str) -> Result<String> {
    if file == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read edit-set from stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(file).with_context(|| format!("Failed to read {file}"))
}

fn parse_month_or_current(raw: Option<&str>, session: &Session) -> Result<YearMonth> {
    match raw {
        None => Ok(session.current_month()),
        Some(m) => Ok(m.parse::<YearMonth>()?),
    }
}

fn money(amount: Decimal) -> String {
    let mut rounded = amount.round_dp(2);
    rounded.rescale(2);
    rounded.to_string()
}

fn print_reconcile_report(report: &ReconcileReport) {
    let c = report.counts;
    println!(
        "Applied: {} added, {} edited, {} deleted.",
        c.added, c.edited, c.deleted
    );
    for skipped in &report.skipped {
        println!("skipped\t{skipped}");
    }
}

fn print_ledger(view: &[Expense]) {
    if view.is_empty() {
        println!("(no expenses)");
        return;
    }
    println!("pos\tid\tdate\tname\ttag\tamount\tshared\towner");
    for (pos, e) in view.iter().enumerate() {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            pos,
            e.id,
            e.date,
            e.name,
            e.tag,
            money(e.amount),
            if e.shared { "yes" } else { "no" },
            e.owner
        );
    }
}

fn print_summary(db: &Db, session: &Session, month: YearMonth) -> Result<()> {
    let ledger = db.list_all()?;
    let dashboard = Dashboard::compute(&ledger, session, month);
    let status = budget::status_for(db, &session.user, dashboard.total)?;

    println!("user\t{}", session.user);
    println!("month\t{}", dashboard.month);
    println!("total\t{}", money(dashboard.total));
    println!("daily_average\t{}", money(dashboard.average_daily));
    println!("budget\t{}", money(status.budget));
    println!("remaining\t{}\t{}", money(status.remaining), status.state);

    println!("(tags {})", dashboard.month);
    if dashboard.tags_month.is_empty() {
        println!("(none)");
    }
    for (tag, total) in &dashboard.tags_month {
        println!("{tag}\t{}", money(*total));
    }

    println!("(tags all time)");
    if dashboard.tags_all.is_empty() {
        println!("(none)");
    }
    for (tag, total) in &dashboard.tags_all {
        println!("{tag}\t{}", money(*total));
    }

    println!("(by month)");
    if dashboard.series.is_empty() {
        println!("(none)");
    }
    for (month, total) in &dashboard.series {
        println!("{month}\t{}", money(*total));
    }
    Ok(())
}

fn print_shared(ledger: &[Expense], session: &Session) {
    let Some(b) = balance(ledger, &session.user, session.user_count) else {
        println!("No shared expenses.");
        return;
    };

    println!("total_shared\t{}", money(b.total_shared));
    println!("your_share\t{}", money(b.fair_share));
    println!("you_paid\t{}", money(b.user_paid));
    match b.settlement() {
        Settlement::Owed(amount) => println!("you are owed\t{}", money(amount)),
        Settlement::Owes(amount) => println!("you owe\t{}", money(amount)),
        Settlement::Settled => println!("settled\t{}", money(Decimal::ZERO)),
    }
    println!();

    let rows: Vec<Vec<String>> = shared_rows(ledger)
        .into_iter()
        .map(|e| {
            vec![
                e.id.to_string(),
                e.date.to_string(),
                e.name.clone(),
                e.tag.clone(),
                money(e.amount),
                e.owner.clone(),
            ]
        })
        .collect();
    print_table(&["id", "date", "name", "tag", "amount", "owner"], &rows);
}

fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if headers.is_empty() {
        println!("(no columns)");
        return;
    }

    let cols = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.chars().count()).collect();

    for row in rows {
        for (i, cell) in row.iter().take(cols).enumerate() {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    fn print_row(cells: &[String], widths: &[usize]) {
        print!("|");
        for (i, w) in widths.iter().enumerate() {
            let cell = cells.get(i).map(String::as_str).unwrap_or("");
            print!(" {:width$} |", cell, width = *w);
        }
        println!();
    }

    fn print_sep(widths: &[usize]) {
        print!("|");
        for w in widths {
            print!("{}|", "-".repeat(w + 2));
        }
        println!();
    }

    let header_cells: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
    print_row(&header_cells, &widths);
    print_sep(&widths);
    for row in rows {
        print_row(row, &widths);
    }
}
