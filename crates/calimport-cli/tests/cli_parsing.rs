use std::path::PathBuf;

use calimport_cli::{Cli, Command, dispatch};
use calimport_core::RuntimeOverrides;
use clap::Parser;

// Argument parsing and flag-to-override mapping for the calimport binary.

#[test]
fn test_no_arguments_is_an_empty_import() {
    let cli = Cli::try_parse_from(["calimport"]).expect("parses");
    assert!(cli.command.is_none());
    assert!(cli.import.is_empty());
    assert_eq!(cli.import.to_runtime_overrides(), RuntimeOverrides::default());
}

#[test]
fn test_import_flags_map_to_overrides() {
    let cli = Cli::try_parse_from([
        "calimport",
        "--creds",
        "~/creds.json",
        "--id",
        "me@example.com",
        "--events",
        "events.txt",
        "--start",
        "3",
        "--end",
        "5",
        "--doit",
        "--time-zone",
        "America/New_York",
        "--year",
        "2018",
    ])
    .expect("parses");

    let overrides = cli.import.to_runtime_overrides();
    assert_eq!(overrides.credentials_path.as_deref(), Some("~/creds.json"));
    assert_eq!(overrides.calendar_id.as_deref(), Some("me@example.com"));
    assert_eq!(overrides.event_file.as_deref(), Some("events.txt"));
    assert_eq!(overrides.start, Some(3));
    assert_eq!(overrides.end, Some(5));
    assert!(overrides.confirmed);
    assert_eq!(overrides.time_zone.as_deref(), Some("America/New_York"));
    assert_eq!(overrides.year, Some(2018));
}

#[test]
fn test_doit_alone_is_not_empty() {
    let cli = Cli::try_parse_from(["calimport", "--doit"]).expect("parses");
    assert!(!cli.import.is_empty());
}

#[test]
fn test_non_numeric_start_is_rejected() {
    assert!(Cli::try_parse_from(["calimport", "--start", "first"]).is_err());
    assert!(Cli::try_parse_from(["calimport", "--end", "-1"]).is_err());
}

#[test]
fn test_calendars_subcommand() {
    let cli = Cli::try_parse_from(["calimport", "calendars", "--creds", "c.json"]).expect("parses");
    match cli.command {
        Some(Command::Calendars(args)) => assert_eq!(args.creds.as_deref(), Some("c.json")),
        other => panic!("unexpected command: {other:?}"),
    }
    assert!(cli.import.is_empty());
}

#[test]
fn test_upcoming_defaults_and_bounds() {
    let cli = Cli::try_parse_from(["calimport", "upcoming"]).expect("parses");
    match cli.command {
        Some(Command::Upcoming(args)) => {
            assert_eq!(args.max, 25);
            assert!(args.id.is_none());
        }
        other => panic!("unexpected command: {other:?}"),
    }

    assert!(Cli::try_parse_from(["calimport", "upcoming", "--max", "0"]).is_err());
    assert!(Cli::try_parse_from(["calimport", "upcoming", "--max", "2501"]).is_err());
}

#[test]
fn test_consent_subcommand() {
    let cli = Cli::try_parse_from([
        "calimport",
        "consent",
        "--client-id",
        "abc.apps.googleusercontent.com",
        "--port",
        "9000",
        "--out",
        "/tmp/creds.json",
        "--no-browser",
        "--save",
    ])
    .expect("parses");

    match cli.command {
        Some(Command::Consent(args)) => {
            assert_eq!(
                args.client_id.as_deref(),
                Some("abc.apps.googleusercontent.com")
            );
            assert!(args.client_secret.is_none());
            assert_eq!(args.port, Some(9000));
            assert_eq!(args.out, Some(PathBuf::from("/tmp/creds.json")));
            assert!(args.no_browser);
            assert!(args.save);
        }
        other => panic!("unexpected command: {other:?}"),
    }
}

#[test]
fn test_unknown_subcommand_is_rejected() {
    assert!(Cli::try_parse_from(["calimport", "delete"]).is_err());
}

#[tokio::test]
async fn test_import_flags_with_subcommand_are_rejected() {
    let cli = Cli::try_parse_from(["calimport", "--doit", "calendars"]).expect("parses");
    let err = dispatch(cli).await.unwrap_err();
    assert_eq!(err, "Import flags cannot be combined with subcommands.");
}
