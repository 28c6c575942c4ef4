//! Core library for importing hand-written event lists into Google Calendar.

pub mod config;
pub mod event_file;
pub mod google;
pub mod import;
pub mod logging;
pub mod oauth;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoadResult, ConfigSource, FileConfig, ImportSettings, RuntimeOverrides,
    load_config, resolve_import_settings, save_config,
};
pub use event_file::{EventDraft, EventFileError, EventZone, ParseContext, read_event_file};
pub use google::{CalendarError, Credentials, Endpoints, GoogleCalendar};
pub use import::{
    CalendarService, EventRange, ImportError, ImportProgress, ImportReport, InsertedEvent,
    run_import,
};
pub use logging::{LoggingDestination, init_logging};
pub use runtime::{
    CommandError, import_events, run_consent, run_import_command, run_list_calendars,
    run_list_upcoming,
};
