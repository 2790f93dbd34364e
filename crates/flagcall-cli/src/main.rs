//! flagcall - command-line companion for the flag-ceremony reminder app.
//!
//! Reads and writes the same local data the app uses and exports the weekly
//! reminder as an `.ics` file.

use std::io;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use flagcall_core::reminder::{self, FileTransport, SETTINGS_KEY};
use flagcall_core::{Config, FileStore, Language, LocalStore, ReminderSettings};
use serde_json::Value;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const USAGE: &str = "\
Usage: flagcall <command>

Commands:
  next                      Show the next reminder
  remind <HH:MM> <days>     Set the reminder, days as 0-6 (0 = Sunday), e.g. 1,3,5
  export [vi|en]            Write the reminder as an .ics file
  language <vi|en>          Set the default export language
  get <key>                 Print a stored value
  put <key> <json-object>   Merge fields into a stored value";

/// Initialize the tracing subscriber for logging
fn init_tracing() {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let Some(command) = args.first() else {
        println!("{}", USAGE);
        return Ok(());
    };

    let config = Config::load()?;
    let data_dir = config.data_dir()?;
    let store = FileStore::new(data_dir.clone())
        .with_context(|| format!("Failed to open data directory: {}", data_dir.display()))?;
    let local = LocalStore::new(Arc::new(store), config.write_scope);
    info!(data_dir = %data_dir.display(), command = %command, "flagcall starting");

    let result = run(&config, &local, command, &args[1..]).await;
    local.flush().await;
    result
}

async fn run(config: &Config, local: &LocalStore, command: &str, args: &[String]) -> Result<()> {
    match command {
        "next" => {
            let settings: ReminderSettings = local.load_as(SETTINGS_KEY).await?;
            let next = reminder::next_occurrence_from_local_clock(&settings)?;
            println!("{}", next.format("%A %Y-%m-%d %H:%M"));
        }
        "remind" => {
            let [time, days] = args else {
                bail!("remind takes a time and a day list\n\n{}", USAGE);
            };
            let settings = ReminderSettings::parse(time, parse_days(days)?)?;
            settings.validate()?;
            local.save_as(SETTINGS_KEY, &settings)?.wait().await?;
            println!(
                "Reminder set for {} on {}",
                settings.time.format("%H:%M"),
                settings.day_codes().join(",")
            );
        }
        "export" => {
            let language = match args.first() {
                Some(code) => parse_language(code)?,
                None => config.language,
            };
            let settings: ReminderSettings = local.load_as(SETTINGS_KEY).await?;
            let transport = FileTransport::new(config.export_dir()?);
            let now = chrono::Local::now().naive_local();
            if reminder::export_reminder(&transport, &settings, language, now)? {
                println!("{}", transport.path_for(reminder::ICS_FILENAME).display());
            } else {
                bail!("Export failed, see log for details");
            }
        }
        "language" => {
            let [code] = args else {
                bail!("language takes vi or en\n\n{}", USAGE);
            };
            let language = parse_language(code)?;
            let updated = Config {
                language,
                ..config.clone()
            };
            updated.save()?;
            println!("Default language set to {}", language);
        }
        "get" => {
            let [key] = args else {
                bail!("get takes a key\n\n{}", USAGE);
            };
            let value = local.load(key).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        "put" => {
            let [key, json] = args else {
                bail!("put takes a key and a JSON object\n\n{}", USAGE);
            };
            let patch = match serde_json::from_str::<Value>(json).context("Invalid JSON")? {
                Value::Object(patch) => patch,
                _ => bail!("put expects a JSON object"),
            };
            local.save(key, patch).wait().await?;
        }
        _ => bail!("Unknown command '{}'\n\n{}", command, USAGE),
    }
    Ok(())
}

fn parse_language(code: &str) -> Result<Language> {
    Language::from_code(code)
        .with_context(|| format!("Unsupported language '{}' (use vi or en)", code))
}

/// Parse a comma-separated list of day numbers.
fn parse_days(value: &str) -> Result<Vec<u8>> {
    value
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| {
            part.trim()
                .parse::<u8>()
                .with_context(|| format!("Invalid day '{}'", part.trim()))
        })
        .collect()
}
