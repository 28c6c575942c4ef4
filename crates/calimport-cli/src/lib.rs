//! Command-line front end for calimport.

mod cli_args;

use std::io::{self, Write};
use std::path::PathBuf;

use calimport_core::config::{expand_path, resolve_calendar_id, resolve_credentials_path};
use calimport_core::oauth::ConsentClient;
use calimport_core::{
    ConfigLoadResult, FileConfig, LoggingDestination, init_logging, load_config,
    resolve_import_settings, run_consent, run_import_command, run_list_calendars,
    run_list_upcoming, save_config,
};
use clap::Parser;
use rpassword::prompt_password;

pub use cli_args::{CalendarsArgs, Cli, Command, ConsentArgs, ImportArgs, UpcomingArgs};

const DEFAULT_CREDENTIALS_FILE: &str = "~/.config/calimport/credentials.json";

/// Parse the process arguments and run the selected command.
pub async fn run() -> Result<(), String> {
    dispatch(Cli::parse()).await
}

pub async fn dispatch(cli: Cli) -> Result<(), String> {
    if cli.command.is_some() && !cli.import.is_empty() {
        return Err("Import flags cannot be combined with subcommands.".into());
    }

    if let Err(err) = init_logging(LoggingDestination::FileAndStderr) {
        eprintln!("Warning: file logging unavailable ({err}); logging to stderr only.");
        let _ = init_logging(LoggingDestination::StderrOnly);
    }

    let load = load_config();
    for warning in &load.warnings {
        eprintln!("Warning: {warning}");
    }

    match cli.command {
        Some(Command::Calendars(args)) => handle_calendars(&load.config, args).await,
        Some(Command::Upcoming(args)) => handle_upcoming(&load.config, args).await,
        Some(Command::Consent(args)) => handle_consent(load, args).await,
        None => handle_import(&load.config, cli.import).await,
    }
}

async fn handle_import(config: &FileConfig, args: ImportArgs) -> Result<(), String> {
    let settings = resolve_import_settings(config, &args.to_runtime_overrides())
        .map_err(|err| err.to_string())?;
    let mut stdout = io::stdout().lock();
    run_import_command(&settings, &mut stdout)
        .await
        .map(|_| ())
        .map_err(|err| err.to_string())
}

async fn handle_calendars(config: &FileConfig, args: CalendarsArgs) -> Result<(), String> {
    let creds = resolve_credentials_path(config, args.creds.as_deref())
        .map_err(|err| err.to_string())?;
    let mut stdout = io::stdout().lock();
    run_list_calendars(&creds, &config.endpoints.to_endpoints(), &mut stdout)
        .await
        .map_err(|err| err.to_string())
}

async fn handle_upcoming(config: &FileConfig, args: UpcomingArgs) -> Result<(), String> {
    let creds = resolve_credentials_path(config, args.creds.as_deref())
        .map_err(|err| err.to_string())?;
    let calendar_id =
        resolve_calendar_id(config, args.id.as_deref()).map_err(|err| err.to_string())?;
    let mut stdout = io::stdout().lock();
    run_list_upcoming(
        &creds,
        &config.endpoints.to_endpoints(),
        &calendar_id,
        args.max,
        &mut stdout,
    )
    .await
    .map_err(|err| err.to_string())
}

async fn handle_consent(load: ConfigLoadResult, args: ConsentArgs) -> Result<(), String> {
    if args.save && !load.is_safe_to_save() {
        return Err(
            "Refusing --save: config.toml could not be loaded; fix or remove it first.".into(),
        );
    }
    let mut config = load.config;

    let client_id = args
        .client_id
        .or_else(|| config.oauth.client_id.clone())
        .ok_or("need --client-id (or `oauth.client_id` in config.toml)")?;
    let client_secret = match args
        .client_secret
        .or_else(|| config.oauth.client_secret.clone())
    {
        Some(secret) => secret,
        None => prompt_password("Enter OAuth client secret: ")
            .map_err(|err| format!("Failed to read client secret: {err}"))?,
    };
    let client = ConsentClient {
        client_id,
        client_secret: client_secret.trim().to_string(),
        token_url: config.endpoints.token_url.clone(),
    };

    let out_path: PathBuf = match args.out {
        Some(path) => path,
        None => config
            .credentials_path
            .as_deref()
            .map(expand_path)
            .unwrap_or_else(|| expand_path(DEFAULT_CREDENTIALS_FILE)),
    };
    let port = args.port.unwrap_or(config.oauth.redirect_port);

    let mut stdout = io::stdout().lock();
    run_consent(&client, port, !args.no_browser, &out_path, &mut stdout)
        .await
        .map_err(|err| err.to_string())?;

    if args.save {
        config.credentials_path = Some(out_path.display().to_string());
        save_config(&config).map_err(|err| err.to_string())?;
        writeln!(stdout, "Saved credentials_path to config.toml").map_err(|err| err.to_string())?;
    }
    Ok(())
}
