use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use messenger_monitor::config::MonitorConfig;
use messenger_monitor::dashboard::{HistoryPage, MessageRow, SnapshotSummary};
use messenger_monitor::history::{ExecutionRecord, Specification, Status, Store};

#[derive(Parser)]
#[command(
    name = "messenger-monitor",
    about = "Execution history and dashboard summaries for message-queue workers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the history database path
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the last 24 hours and the most recent messages
    Dashboard {
        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Query execution history
    History {
        /// Only this outcome (pending, processing, success, failed, retried)
        #[arg(long)]
        status: Option<String>,

        /// Only this transport
        #[arg(long)]
        transport: Option<String>,

        /// Only this message type
        #[arg(long)]
        message_type: Option<String>,

        /// Only records carrying this tag
        #[arg(long)]
        tag: Option<String>,

        /// Only records enqueued in the last N hours
        #[arg(long, allow_negative_numbers = true)]
        since_hours: Option<i64>,

        /// Maximum records to list
        #[arg(long, allow_negative_numbers = true)]
        limit: Option<i64>,

        /// Oldest first
        #[arg(long)]
        asc: bool,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Show configured schedules and the history of one of them
    Schedules {
        /// Schedule name (defaults to the first)
        name: Option<String>,

        /// JSON output for machine parsing
        #[arg(long)]
        json: bool,
    },

    /// Write or inspect individual execution records
    Record {
        #[command(subcommand)]
        action: RecordAction,
    },
}

#[derive(Subcommand)]
enum RecordAction {
    /// Append a new execution record
    Append {
        #[arg(long)]
        id: i64,

        #[arg(long)]
        message_type: String,

        #[arg(long)]
        transport: String,

        /// Initial outcome (pending or processing)
        #[arg(long, default_value = "pending")]
        status: String,

        #[arg(long, default_value = "1")]
        attempt: u32,

        /// Tag to attach (repeatable)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Record the outcome of an attempt
    Complete {
        #[arg(long)]
        id: i64,

        /// success, failed or retried
        #[arg(long)]
        outcome: String,

        /// Error summary (required for failed)
        #[arg(long)]
        error: Option<String>,
    },

    /// Show a single record
    Show {
        #[arg(long)]
        id: i64,
    },
}

fn print_summary(title: &str, summary: &SnapshotSummary) {
    println!("\n=== {} ===", title);
    println!("Total:        {}", summary.total);
    println!(
        "Outcomes:     {} success / {} failed / {} retried / {} processing / {} pending",
        summary.counts.success,
        summary.counts.failed,
        summary.counts.retried,
        summary.counts.processing,
        summary.counts.pending
    );
    println!("Success rate: {:.1}%", summary.success_rate * 100.0);
    println!(
        "Avg handling: {}",
        summary.average_duration.as_deref().unwrap_or("n/a")
    );
    println!("Avg wait:     {}", summary.average_wait.as_deref().unwrap_or("n/a"));
    if let Some(per_hour) = summary.per_hour {
        println!("Throughput:   {:.1}/hour", per_hour);
    }
    if !summary.by_message_type.is_empty() {
        println!("\n{:<30} | {:>7} | {:>7} | {:>7}", "Message type", "Total", "Success", "Failed");
        println!("{:-<30}-|-{:-<7}-|-{:-<7}-|-{:-<7}", "", "", "", "");
        for row in &summary.by_message_type {
            println!(
                "{:<30} | {:>7} | {:>7} | {:>7}",
                row.message_type, row.total, row.counts.success, row.counts.failed
            );
        }
    }
}

fn print_messages(messages: &[MessageRow]) {
    if messages.is_empty() {
        println!("\nNo messages found.");
        return;
    }
    println!(
        "\n{:>8} | {:<24} | {:<12} | {:<10} | {:<20} | Duration",
        "ID", "Message type", "Transport", "Status", "Enqueued"
    );
    println!("{:->8}-|-{:-<24}-|-{:-<12}-|-{:-<10}-|-{:-<20}-|-{:-<10}", "", "", "", "", "", "");
    for m in messages {
        println!(
            "{:>8} | {:<24} | {:<12} | {:<10} | {:<20} | {}",
            m.id,
            m.message_type,
            m.transport,
            m.status,
            m.enqueued,
            m.duration.as_deref().unwrap_or("-")
        );
        if let Some(err) = &m.error {
            println!("{:>8} |   -> {}", "", err);
        }
    }
}

fn print_history(page: &HistoryPage) {
    print_summary("History", &page.summary);
    print_messages(&page.messages);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = MonitorConfig::resolve(cli.config.as_deref())?;
    if let Some(db) = cli.db {
        config.storage.path = db;
    }
    messenger_monitor::init_tracing(&config.logging);
    tracing::debug!(db = %config.storage.path.display(), "configuration resolved");

    match cli.command {
        Commands::Dashboard { json } => {
            let dashboard = messenger_monitor::build_dashboard(&config)?;
            let overview = dashboard.overview().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&overview)?);
            } else {
                println!("\nmessenger-monitor dashboard ({})", overview.generated_at.to_rfc3339());
                println!("Workers:    {}", overview.workers.len());
                for t in &overview.transports {
                    let queued = t.queued.map(|q| q.to_string()).unwrap_or_else(|| "?".to_string());
                    println!("Transport:  {} (queued: {}, workers: {})", t.name, queued, t.workers);
                }
                print_summary("Last 24 hours", &overview.last_day);
                println!("\n=== Recent messages ===");
                print_messages(&overview.recent);
                println!();
            }
        }
        Commands::History {
            status,
            transport,
            message_type,
            tag,
            since_hours,
            limit,
            asc,
            json,
        } => {
            let mut spec = Specification::new();
            if let Some(status) = status {
                spec = spec.with_status(status.parse::<Status>()?);
            }
            if let Some(transport) = transport {
                spec = spec.with_transport(transport);
            }
            if let Some(message_type) = message_type {
                spec = spec.with_message_type(message_type);
            }
            if let Some(tag) = tag {
                spec = spec.with_tag(tag);
            }
            if let Some(hours) = since_hours {
                let since = chrono::Duration::try_hours(hours)
                    .filter(|window| *window > chrono::Duration::zero())
                    .and_then(|window| Utc::now().checked_sub_signed(window))
                    .with_context(|| format!("--since-hours out of range: {}", hours))?;
                spec = spec.from(since);
            }
            if let Some(n) = limit {
                spec = spec.limit(n)?;
            }
            if asc {
                spec = spec.ascending();
            }

            let dashboard = messenger_monitor::build_dashboard(&config)?;
            let page = dashboard.history(spec).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&page)?);
            } else {
                print_history(&page);
                println!();
            }
        }
        Commands::Schedules { name, json } => {
            let dashboard = messenger_monitor::build_dashboard(&config)?;
            let view = dashboard.schedules(name.as_deref()).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&view)?);
            } else {
                println!("\n{:<24} | {:<40} | {:<24} | Next run", "Name", "Trigger", "Message type");
                println!("{:-<24}-|-{:-<40}-|-{:-<24}-|-{:-<20}", "", "", "", "");
                for s in &view.schedules {
                    println!(
                        "{:<24} | {:<40} | {:<24} | {}",
                        s.name,
                        s.trigger,
                        s.message_type,
                        s.next_run.as_deref().unwrap_or("-")
                    );
                }
                print_summary(&format!("Schedule '{}' (last 24 hours)", view.selected.name), &view.last_day);
                print_messages(&view.recent);
                println!();
            }
        }
        Commands::Record { action } => {
            let store = messenger_monitor::open_store(&config.storage)?;
            match action {
                RecordAction::Append {
                    id,
                    message_type,
                    transport,
                    status,
                    attempt,
                    tags,
                } => {
                    let status: Status = status.parse()?;
                    let now = Utc::now();
                    let mut record = ExecutionRecord::pending(id, message_type, transport, now);
                    record.attempt = attempt;
                    record.tags = tags;
                    match status {
                        Status::Pending => {}
                        Status::Processing => {
                            record.status = Status::Processing;
                            record.started_at = Some(now);
                        }
                        other => anyhow::bail!(
                            "new records start as pending or processing, not '{}'; use `record complete`",
                            other
                        ),
                    }
                    store.append(&record)?;
                    println!("Record {} appended.", id);
                }
                RecordAction::Complete { id, outcome, error } => {
                    let outcome: Status = outcome.parse()?;
                    store
                        .mark_complete(id, outcome, Utc::now(), error.as_deref())
                        .with_context(|| format!("failed to complete record {}", id))?;
                    println!("Record {} marked {}.", id, outcome);
                }
                RecordAction::Show { id } => {
                    let record = store.get(id)?;
                    println!("{}", serde_json::to_string_pretty(&record)?);
                }
            }
        }
    }

    Ok(())
}
