use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use thiserror::Error;

use villaops_lib::config::Config;
use villaops_lib::export::{self, ExportFormat, SortDirection, TableView};
use villaops_lib::guesty::{self, SyncOptions};
use villaops_lib::reports::{self, Window};
use villaops_lib::repo::ListQuery;
use villaops_lib::time::{format_date, today};
use villaops_lib::{bookings, cleaning, db, logging, migrate, AppError, AppState};

#[derive(Debug, Parser)]
#[command(name = "villaops", about = "Villa operations toolkit", version)]
struct Cli {
    /// Database file; overrides VILLAOPS_DB_PATH.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Database maintenance and inspection.
    #[command(subcommand)]
    Db(DbCommand),
    /// Pull data from Guesty through the remote functions.
    #[command(subcommand)]
    Sync(SyncCommand),
    /// Print the booked dates of a property.
    Calendar {
        #[arg(long)]
        property: String,
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
    },
    /// Inspect cleaning rules.
    #[command(subcommand)]
    Rules(RulesCommand),
    /// Housekeeping task commands.
    #[command(subcommand)]
    Tasks(TasksCommand),
    /// Export a table view to CSV or JSON.
    Export {
        #[arg(long)]
        table: String,
        #[arg(long, default_value = "csv")]
        format: ExportFormat,
        #[arg(long)]
        out: PathBuf,
        /// Keep rows containing this text in any visible column.
        #[arg(long)]
        filter: Option<String>,
        #[arg(long)]
        sort: Option<String>,
        #[arg(long)]
        desc: bool,
        /// Comma-separated visible columns.
        #[arg(long, value_delimiter = ',')]
        columns: Vec<String>,
    },
    /// Settings snapshot export and import.
    #[command(subcommand)]
    Settings(SettingsCommand),
    /// Print the dashboard aggregates for a date window.
    Report {
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,
    },
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply pending migrations.
    Migrate,
    /// Show applied and pending migrations.
    Status,
}

#[derive(Debug, Subcommand)]
enum SyncCommand {
    Listings,
    Bookings {
        #[arg(long)]
        listing: String,
        /// Fetch a single page starting here instead of the whole listing.
        #[arg(long)]
        start: Option<u64>,
    },
    Health,
    /// Most recent sync log entries.
    Logs {
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
}

#[derive(Debug, Subcommand)]
enum RulesCommand {
    List,
    /// Show which rules apply to a stay and the resulting day plan.
    Plan {
        #[arg(long)]
        nights: i64,
        #[arg(long)]
        property: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum TasksCommand {
    /// Generate housekeeping tasks from cleaning rules.
    Generate {
        /// A single booking; otherwise every booking from today on.
        #[arg(long)]
        booking: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum SettingsCommand {
    Export {
        #[arg(long)]
        out: PathBuf,
    },
    Import {
        path: PathBuf,
    },
}

#[derive(Debug, Error)]
enum ArgError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    Date(String),
}

fn parse_date_arg(raw: &str) -> Result<NaiveDate, ArgError> {
    villaops_lib::time::parse_date(raw).ok_or_else(|| ArgError::Date(raw.to_string()))
}

fn main() {
    let cli = Cli::parse();
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("Error: start runtime: {err}");
            process::exit(1);
        }
    };
    match runtime.block_on(run(cli)) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("Error: {err:#}");
            process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = Config::from_env().context("load configuration")?;
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    let _guard = logging::init(&config).context("initialise logging")?;

    if let Commands::Db(DbCommand::Status) = cli.command {
        return db_status(&config).await;
    }

    let state = AppState::open(config).await.context("open application state")?;
    let store = &state.store;

    match cli.command {
        Commands::Db(_) => {
            println!("Database is up to date.");
        }
        Commands::Sync(cmd) => {
            let functions = state.functions().map_err(notify)?;
            match cmd {
                SyncCommand::Listings => {
                    print_json(&guesty::sync_listings(store, functions.as_ref()).await.map_err(notify)?)?
                }
                SyncCommand::Bookings { listing, start: Some(start) } => print_json(
                    &guesty::sync_bookings_for_listing(store, functions.as_ref(), &listing, start)
                        .await
                        .map_err(notify)?,
                )?,
                SyncCommand::Bookings { listing, start: None } => {
                    let options = SyncOptions::from_config(&state.config);
                    print_json(
                        &guesty::sync_all_bookings(store, functions.as_ref(), &listing, options)
                            .await
                            .map_err(notify)?,
                    )?
                }
                SyncCommand::Health => {
                    let health = guesty::health_check(store, functions.as_ref()).await.map_err(notify)?;
                    print_json(&health)?;
                    if health.status == "error" {
                        return Ok(1);
                    }
                }
                SyncCommand::Logs { limit } => {
                    print_json(&guesty::list_sync_logs(store, limit).await.map_err(notify)?)?
                }
            }
        }
        Commands::Calendar { property, from, to } => {
            let from = from.unwrap_or_else(today);
            let to = to.unwrap_or(from + chrono::Duration::days(90));
            let found = bookings::list_in_window(store, Some(&property), from, to)
                .await
                .map_err(notify)?;
            for day in bookings::booked_dates(&found)
                .into_iter()
                .filter(|d| *d >= from && *d <= to)
            {
                println!("{}", format_date(day));
            }
        }
        Commands::Rules(RulesCommand::List) => {
            print_json(&cleaning::list_rules(store, false).await.map_err(notify)?)?;
        }
        Commands::Rules(RulesCommand::Plan { nights, property }) => {
            let rules = cleaning::rules_for_stay(store, nights, property.as_deref())
                .await
                .map_err(notify)?;
            let actions = cleaning::list_actions(store).await.map_err(notify)?;
            match rules.first() {
                Some(rule) => {
                    let plan = cleaning::plan_for_stay(rule, nights);
                    println!("rule: {} ({}-{} nights)", rule.rule_name, rule.stay_range.min, rule.stay_range.max);
                    for day in &plan {
                        println!("day {:>3}: {}", day.day, day.actions.join(", "));
                    }
                    println!("estimated minutes: {}", cleaning::plan_minutes(&plan, &actions));
                }
                None => println!("no active rule covers a {nights}-night stay"),
            }
        }
        Commands::Tasks(TasksCommand::Generate { booking }) => {
            let targets = match booking {
                Some(id) => vec![bookings::get(store, &id)
                    .await
                    .map_err(notify)?
                    .with_context(|| format!("booking {id} not found"))?],
                None => {
                    let from = today();
                    bookings::list_in_window(store, None, from, from + chrono::Duration::days(365))
                        .await
                        .map_err(notify)?
                }
            };
            let mut created = 0;
            for booking in &targets {
                match cleaning::generate_tasks_for_booking(store, booking).await {
                    Ok(outcome) => created += outcome.created.len(),
                    Err(err) => {
                        err.log_with_event("task_generation_failed");
                        eprintln!("{}: {}", booking.id, err);
                    }
                }
            }
            println!("{created} task(s) created for {} booking(s)", targets.len());
        }
        Commands::Export {
            table,
            format,
            out,
            filter,
            sort,
            desc,
            columns,
        } => {
            let mut view = TableView::load(store, &table, &ListQuery::new()).await.map_err(notify)?;
            if !columns.is_empty() {
                let names: Vec<&str> = columns.iter().map(String::as_str).collect();
                view = view.select_columns(&names);
            }
            if let Some(needle) = filter {
                view = view.filter_text(&needle);
            }
            if let Some(column) = sort {
                let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
                view = view.sort_by(&column, direction);
            }
            let file = export::write_view(&view, &out, format).map_err(notify)?;
            println!("{} row(s) written to {}", file.rows, file.path);
        }
        Commands::Settings(SettingsCommand::Export { out }) => {
            let file = export::export_settings_file(store, &out).await.map_err(notify)?;
            println!("{} preference(s) written to {}", file.rows, file.path);
        }
        Commands::Settings(SettingsCommand::Import { path }) => {
            let count = export::import_settings_file(store, &path).await.map_err(notify)?;
            println!("{count} preference(s) restored");
        }
        Commands::Report { from, to } => {
            let to = to.unwrap_or_else(today);
            let from = from.unwrap_or(to - chrono::Duration::days(29));
            let window = Window::new(from, to).map_err(notify)?;
            print_json(&reports::dashboard(store, window).await.map_err(notify)?)?;
        }
    }
    Ok(0)
}

/// Reports migrations without applying them; exits 2 when any are pending.
async fn db_status(config: &Config) -> Result<i32> {
    let pool = db::open_sqlite_pool(&config.db_path)
        .await
        .context("open database")?;
    let status = migrate::status(&pool).await.context("read migration status")?;
    for entry in &status {
        let mark = if entry.applied { "applied" } else { "pending" };
        println!("{mark:<8} {}", entry.version);
    }
    pool.close().await;
    Ok(if status.iter().all(|m| m.applied) { 0 } else { 2 })
}

/// Surface the failure the way the app would, then hand it to anyhow.
fn notify(err: AppError) -> anyhow::Error {
    let notice = err.to_notification();
    err.log_with_event("cli_command_failed");
    anyhow::Error::from(err).context(notice.title)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{text}");
    Ok(())
}
