//! Command implementations shared by the CLI binary.

use std::io::{self, Write};
use std::ops::ControlFlow;
use std::path::Path;

use chrono::Utc;
use thiserror::Error;
use tokio::sync::OnceCell;
use tracing::info;

use crate::config::{ConfigError, ImportSettings};
use crate::event_file::{EventDraft, EventFileError, read_event_file};
use crate::google::{CalendarError, Credentials, Endpoints, GoogleCalendar};
use crate::import::{
    CalendarService, EventRange, ImportError, ImportPlan, ImportProgress, ImportReport,
    InsertedEvent, run_import,
};
use crate::oauth::{ConsentClient, OAuthError, run_consent_flow, write_credentials};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    EventFile(#[from] EventFileError),
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(transparent)]
    Import(#[from] ImportError),
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Calendar client that refreshes its token on the first insert.
struct DeferredCalendar<'a> {
    credentials_path: &'a Path,
    endpoints: &'a Endpoints,
    client: OnceCell<GoogleCalendar>,
}

impl<'a> DeferredCalendar<'a> {
    fn new(credentials_path: &'a Path, endpoints: &'a Endpoints) -> Self {
        Self {
            credentials_path,
            endpoints,
            client: OnceCell::new(),
        }
    }
}

impl CalendarService for DeferredCalendar<'_> {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<InsertedEvent, CalendarError> {
        let client = self
            .client
            .get_or_try_init(|| connect(self.credentials_path, self.endpoints))
            .await?;
        client.insert(calendar_id, event).await
    }
}

/// Parse the event file, report the selection and, when confirmed, insert it.
///
/// Without confirmation no credentials are read and no remote call is made.
pub async fn run_import_command<W: Write>(
    settings: &ImportSettings,
    out: &mut W,
) -> Result<ImportReport, CommandError> {
    let events = read_event_file(&settings.event_file, &settings.parse)?;
    let calendar = DeferredCalendar::new(&settings.credentials_path, &settings.endpoints);
    import_events(
        &calendar,
        &settings.calendar_id,
        &events,
        settings.range,
        settings.confirmed,
        out,
    )
    .await
}

/// Run the import through `service`, printing the selection and one line per event.
///
/// A failed write stops the import before the next insert.
pub async fn import_events<S, W>(
    service: &S,
    calendar_id: &str,
    events: &[EventDraft],
    range: EventRange,
    confirmed: bool,
    out: &mut W,
) -> Result<ImportReport, CommandError>
where
    S: CalendarService,
    W: Write,
{
    let mut write_error: Option<io::Error> = None;
    let result = run_import(service, calendar_id, events, range, confirmed, |progress| {
        let line = match progress {
            ImportProgress::Planned { plan } => write_plan(&mut *out, plan),
            ImportProgress::Inserted { event, .. } => writeln!(
                out,
                "inserted {} - {}\t{:?}\t{}",
                event.start_rfc3339(),
                event.end_rfc3339(),
                event.summary,
                event.description
            ),
            ImportProgress::Failed { .. } => Ok(()),
        };
        match line {
            Ok(()) => ControlFlow::Continue(()),
            Err(err) => {
                write_error = Some(err);
                ControlFlow::Break(())
            }
        }
    })
    .await;

    if let Some(err) = write_error {
        return Err(err.into());
    }
    let report = result?;

    if report.dry_run {
        writeln!(out, "pass --doit to insert")?;
    } else {
        writeln!(out, "inserted {} events.", report.inserted.len())?;
        info!(calendar_id, inserted = report.inserted.len(), "Import finished");
    }
    Ok(report)
}

fn write_plan<W: Write>(out: &mut W, plan: &ImportPlan) -> io::Result<()> {
    match plan.selection {
        Some(selection) => writeln!(
            out,
            "events {}..={} of {} selected",
            selection.first + 1,
            selection.last + 1,
            plan.total
        ),
        None => writeln!(out, "no events selected ({} parsed)", plan.total),
    }
}

async fn connect(
    credentials_path: &Path,
    endpoints: &Endpoints,
) -> Result<GoogleCalendar, CalendarError> {
    let credentials = Credentials::load(credentials_path)?;
    GoogleCalendar::connect(&credentials, endpoints).await
}

/// Print every calendar the credentials can see.
pub async fn run_list_calendars<W: Write>(
    credentials_path: &Path,
    endpoints: &Endpoints,
    out: &mut W,
) -> Result<(), CommandError> {
    let client = connect(credentials_path, endpoints).await?;
    for (idx, entry) in client.list_calendars().await?.iter().enumerate() {
        writeln!(
            out,
            "{idx}: ID:{:?} Primary:{} Summary:{:?}",
            entry.id,
            entry.primary,
            entry.summary.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

/// Print upcoming events of one calendar, soonest first.
pub async fn run_list_upcoming<W: Write>(
    credentials_path: &Path,
    endpoints: &Endpoints,
    calendar_id: &str,
    max_results: u32,
    out: &mut W,
) -> Result<(), CommandError> {
    let client = connect(credentials_path, endpoints).await?;
    let now = Utc::now();
    writeln!(out, "{}", now.to_rfc3339())?;
    for (idx, event) in client
        .list_upcoming(calendar_id, now, max_results)
        .await?
        .iter()
        .enumerate()
    {
        writeln!(
            out,
            "{idx}: Start:{} End:{}  Summary:{}",
            event.start.display(),
            event.end.display(),
            event.summary.as_deref().unwrap_or("")
        )?;
    }
    Ok(())
}

/// Run the browser consent flow and store the resulting credentials at `out_path`.
pub async fn run_consent<W: Write>(
    client: &ConsentClient,
    port: u16,
    open_browser: bool,
    out_path: &Path,
    out: &mut W,
) -> Result<(), CommandError> {
    let mut announce_error = None;
    let credentials = run_consent_flow(client, port, open_browser, |url| {
        let result = writeln!(out, "Visit this URL to authorize calendar access:\n{url}")
            .and_then(|_| out.flush());
        announce_error = result.err();
    })
    .await?;
    if let Some(err) = announce_error {
        return Err(err.into());
    }

    write_credentials(out_path, &credentials)?;
    writeln!(out, "Credentials saved to {}", out_path.display())?;
    Ok(())
}
