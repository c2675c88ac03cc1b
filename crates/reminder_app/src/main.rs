use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reminder_app::app::{AppConfig, ReminderHost};
use reminder_core::ScheduleRequest;
use tracing_subscriber::EnvFilter;

/// Daily reminder host: registers, inspects and fires the daily notification.
#[derive(Parser)]
#[command(name = "reminderd")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replace the daily reminder (defaults to 22:00 and "/daily")
    Schedule {
        #[arg(long, allow_negative_numbers = true)]
        hour: Option<i64>,
        #[arg(long, allow_negative_numbers = true)]
        minute: Option<i64>,
        #[arg(long)]
        payload: Option<String>,
    },
    /// Remove the daily reminder if one is registered
    Cancel,
    /// Print the registered reminder as JSON
    Status,
    /// Fire due reminders until the process is stopped
    Run,
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = AppConfig::from_env();
    match execute(cli.command, config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("reminderd: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn execute(command: Command, config: AppConfig) -> Result<()> {
    let host = ReminderHost::start(config)?;
    match command {
        Command::Schedule {
            hour,
            minute,
            payload,
        } => {
            let request = ScheduleRequest::from_parts(hour, minute, payload)?;
            let task = host.scheduler().schedule(&request)?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::Cancel => {
            let removed = host.scheduler().cancel()?;
            println!("{}", serde_json::json!({ "cancelled": removed }));
        }
        Command::Status => {
            let active = host.scheduler().active()?;
            println!("{}", serde_json::to_string_pretty(&active)?);
        }
        Command::Run => host.run(|| false)?,
    }
    Ok(())
}
