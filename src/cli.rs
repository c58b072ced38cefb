use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "houseledger")]
#[command(about = "Shared household expense ledger", long_about = None)]
pub struct Cli {
    /// Override Houseledger home directory (config/data subdirs will be created inside it).
    #[arg(long, env = "HOUSELEDGER_HOME", global = true)]
    pub home: Option<PathBuf>,

    /// Act as this user instead of the configured current user.
    #[arg(long, env = "HOUSELEDGER_USER", global = true)]
    pub user: Option<String>,

    /// Reference date for defaults and "current month" figures (YYYY-MM-DD).
    #[arg(long, env = "HOUSELEDGER_TODAY", global = true, hide = true)]
    pub today: Option<NaiveDate>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    User(UserArgs),

    Add(AddArgs),
    List(ListArgs),
    Edit(EditArgs),
    Rm(RmArgs),
    Apply(ApplyArgs),

    Summary(SummaryArgs),
    Series,
    Tags,
    Shared,

    Budget(BudgetArgs),
}

#[derive(Debug, Subcommand)]
pub enum UserCmd {
    Add { name: String },
    Switch { name: String },
    List,
}

#[derive(Debug, Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub cmd: UserCmd,
}

#[derive(Debug, Args)]
pub struct AddArgs {
    pub name: String,
    pub amount: String,

    #[arg(long)]
    pub tag: Option<String>,

    /// Expense date (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    pub date: Option<String>,

    /// Split the cost evenly across every household member.
    #[arg(long)]
    pub shared: bool,
}

#[derive(Debug, Args)]
pub struct ListArgs {
    /// Print the rows as JSON instead of tab-separated text.
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct EditArgs {
    pub id: i64,

    #[arg(long)]
    pub name: Option<String>,

    #[arg(long)]
    pub tag: Option<String>,

    #[arg(long)]
    pub date: Option<String>,

    #[arg(long, allow_hyphen_values = true)]
    pub amount: Option<String>,

    /// true or false
    #[arg(long)]
    pub shared: Option<String>,
}

#[derive(Debug, Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub ids: Vec<i64>,
}

#[derive(Debug, Args)]
pub struct ApplyArgs {
    /// JSON edit-set file, or "-" for stdin.
    ///
    /// `edited`/`deleted` positions index the current `houseledger list` view,
    /// which shifts if another session changes the ledger in between. Use
    /// `edited_by_id`/`deleted_by_id` to target rows by their id instead.
    pub file: String,
}

#[derive(Debug, Args)]
pub struct SummaryArgs {
    /// Month to summarize (YYYY-MM). Defaults to the current month.
    #[arg(long)]
    pub month: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum BudgetCmd {
    Set {
        #[arg(allow_hyphen_values = true)]
        amount: String,
    },
    Show {
        #[arg(long)]
        month: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct BudgetArgs {
    #[command(subcommand)]
    pub cmd: BudgetCmd,
}
