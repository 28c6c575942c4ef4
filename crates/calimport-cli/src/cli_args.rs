use std::path::PathBuf;

use calimport_core::RuntimeOverrides;
use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};

/// Top-level CLI entrypoint.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "calimport",
    version,
    about = "Insert events from a plain-text list into Google Calendar",
    long_about = None
)]
pub struct Cli {
    #[command(flatten)]
    pub import: ImportArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Supported subcommands.
#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List the calendars the credentials can access.
    Calendars(CalendarsArgs),
    /// Show upcoming events of a calendar.
    Upcoming(UpcomingArgs),
    /// Authorize calendar access in the browser and write a credentials file.
    Consent(ConsentArgs),
}

/// Arguments for the import flow (default command).
#[derive(Debug, Clone, Args, Default)]
pub struct ImportArgs {
    /// Credentials JSON file.
    #[arg(long = "creds", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub creds: Option<String>,

    /// Calendar ID, typically the owner's email address.
    #[arg(long = "id", value_name = "CALENDAR")]
    pub id: Option<String>,

    /// File of blank-line separated events.
    #[arg(long = "events", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub events: Option<String>,

    /// 1-based event to start inserting at.
    #[arg(long = "start", value_name = "N")]
    pub start: Option<usize>,

    /// 1-based event to end inserting at, inclusive (defaults to the last).
    #[arg(long = "end", value_name = "N")]
    pub end: Option<usize>,

    /// Nothing is inserted unless this is provided.
    #[arg(long, action = ArgAction::SetTrue)]
    pub doit: bool,

    /// IANA time zone for event times (defaults to config, then the system zone).
    #[arg(long = "time-zone", value_name = "TZ")]
    pub time_zone: Option<String>,

    /// Year for date lines that omit it (defaults to the current year).
    #[arg(long = "year", value_name = "YYYY")]
    pub year: Option<i32>,
}

impl ImportArgs {
    /// Returns true when no import flags were provided.
    pub fn is_empty(&self) -> bool {
        self.to_runtime_overrides().is_empty()
    }

    pub fn to_runtime_overrides(&self) -> RuntimeOverrides {
        RuntimeOverrides {
            credentials_path: self.creds.clone(),
            calendar_id: self.id.clone(),
            event_file: self.events.clone(),
            start: self.start,
            end: self.end,
            confirmed: self.doit,
            time_zone: self.time_zone.clone(),
            year: self.year,
        }
    }
}

#[derive(Debug, Clone, Args)]
pub struct CalendarsArgs {
    /// Credentials JSON file.
    #[arg(long = "creds", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub creds: Option<String>,
}

#[derive(Debug, Clone, Args)]
pub struct UpcomingArgs {
    /// Credentials JSON file.
    #[arg(long = "creds", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub creds: Option<String>,

    /// Calendar ID.
    #[arg(long = "id", value_name = "CALENDAR")]
    pub id: Option<String>,

    /// Maximum number of events to show.
    #[arg(
        long = "max",
        value_name = "N",
        default_value_t = 25,
        value_parser = clap::value_parser!(u32).range(1..=2500)
    )]
    pub max: u32,
}

#[derive(Debug, Clone, Args)]
pub struct ConsentArgs {
    /// OAuth client ID of a desktop application.
    #[arg(long = "client-id")]
    pub client_id: Option<String>,

    /// OAuth client secret; prompted for when absent.
    #[arg(long = "client-secret")]
    pub client_secret: Option<String>,

    /// Loopback port for the redirect.
    #[arg(long = "port")]
    pub port: Option<u16>,

    /// Where to write the credentials JSON.
    #[arg(long = "out", value_name = "FILE", value_hint = ValueHint::FilePath)]
    pub out: Option<PathBuf>,

    /// Print the consent URL instead of opening a browser.
    #[arg(long = "no-browser", action = ArgAction::SetTrue)]
    pub no_browser: bool,

    /// Remember the credentials path in config.toml.
    #[arg(long = "save", action = ArgAction::SetTrue)]
    pub save: bool,
}
