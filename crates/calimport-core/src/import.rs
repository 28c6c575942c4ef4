//! Range selection and the sequential insert loop.

use std::ops::{ControlFlow, RangeInclusive};

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::event_file::EventDraft;
use crate::google::CalendarError;

/// Remote calendar that accepts new events.
#[allow(async_fn_in_trait)]
pub trait CalendarService {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<InsertedEvent, CalendarError>;
}

/// What the service reports back for a created event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertedEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub html_link: Option<String>,
}

/// Caller-facing, 1-based inclusive event range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventRange {
    pub start: usize,
    /// `None` or `Some(0)` means through the last event.
    pub end: Option<usize>,
}

impl Default for EventRange {
    fn default() -> Self {
        Self {
            start: 1,
            end: None,
        }
    }
}

/// Resolved 0-based inclusive selection over the parsed events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub first: usize,
    pub last: usize,
}

impl Selection {
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn indices(&self) -> RangeInclusive<usize> {
        self.first..=self.last
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportPlan {
    pub total: usize,
    pub selection: Option<Selection>,
}

impl ImportPlan {
    pub fn len(&self) -> usize {
        self.selection.map_or(0, |selection| selection.len())
    }

    pub fn is_empty(&self) -> bool {
        self.selection.is_none()
    }
}

pub enum ImportProgress<'a> {
    /// The range has been resolved; sent once before any insert.
    Planned { plan: &'a ImportPlan },
    Inserted {
        /// 1-based position in the event file.
        index: usize,
        event: &'a EventDraft,
        inserted: &'a InsertedEvent,
    },
    Failed {
        index: usize,
        event: &'a EventDraft,
        error: &'a CalendarError,
    },
}

/// Result of [`run_import`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub total: usize,
    /// 1-based positions of the selected events.
    pub selected: Vec<usize>,
    pub inserted: Vec<InsertedEvent>,
    pub dry_run: bool,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid event range: {0}")]
    InvalidRange(String),
    #[error("failed to insert event {index} ({inserted} inserted before it): {source}")]
    Insert {
        index: usize,
        inserted: usize,
        #[source]
        source: CalendarError,
    },
    #[error("import stopped by caller after {inserted} inserted events")]
    Stopped { inserted: usize },
}

/// Map a 1-based range onto `total` events.
///
/// An absent, zero or too large end is clamped to the last event. A start past the end
/// selects nothing.
pub fn resolve_range(range: EventRange, total: usize) -> Result<Option<Selection>, ImportError> {
    if range.start == 0 {
        return Err(ImportError::InvalidRange(
            "start is 1-based and must be at least 1".to_string(),
        ));
    }

    let end = match range.end {
        Some(end) if end > 0 && end <= total => end,
        _ => total,
    };

    if total == 0 || range.start > end {
        return Ok(None);
    }

    Ok(Some(Selection {
        first: range.start - 1,
        last: end - 1,
    }))
}

pub fn plan_import(total: usize, range: EventRange) -> Result<ImportPlan, ImportError> {
    let selection = resolve_range(range, total)?;
    info!(
        total,
        selected = selection.map_or(0, |s| s.len()),
        "Resolved import range"
    );
    Ok(ImportPlan { total, selection })
}

/// Select `range` out of `events` and, when `confirmed`, insert the selection.
///
/// Unconfirmed runs and empty selections never touch `service`.
pub async fn run_import<S, F>(
    service: &S,
    calendar_id: &str,
    events: &[EventDraft],
    range: EventRange,
    confirmed: bool,
    mut observer: F,
) -> Result<ImportReport, ImportError>
where
    S: CalendarService,
    F: FnMut(ImportProgress<'_>) -> ControlFlow<()>,
{
    let plan = plan_import(events.len(), range)?;
    if observer(ImportProgress::Planned { plan: &plan }).is_break() {
        return Err(ImportError::Stopped { inserted: 0 });
    }

    let selected = plan
        .selection
        .map(|selection| selection.indices().map(|idx| idx + 1).collect())
        .unwrap_or_default();

    if !confirmed {
        info!(calendar_id, "Dry run; nothing inserted");
        return Ok(ImportReport {
            total: plan.total,
            selected,
            inserted: Vec::new(),
            dry_run: true,
        });
    }

    let inserted = execute_plan(service, calendar_id, events, &plan, observer).await?;
    Ok(ImportReport {
        total: plan.total,
        selected,
        inserted,
        dry_run: false,
    })
}

/// Insert the planned events one at a time, in file order.
///
/// The first failure ends the import; nothing after it is attempted. The observer can
/// also end it by breaking after an inserted event.
pub async fn execute_plan<S, F>(
    service: &S,
    calendar_id: &str,
    events: &[EventDraft],
    plan: &ImportPlan,
    mut observer: F,
) -> Result<Vec<InsertedEvent>, ImportError>
where
    S: CalendarService,
    F: FnMut(ImportProgress<'_>) -> ControlFlow<()>,
{
    let Some(selection) = plan.selection else {
        return Ok(Vec::new());
    };
    if selection.last >= events.len() {
        return Err(ImportError::InvalidRange(format!(
            "plan selects event {} but only {} were parsed",
            selection.last + 1,
            events.len()
        )));
    }

    let mut inserted = Vec::with_capacity(selection.len());
    for idx in selection.indices() {
        let event = &events[idx];
        let index = idx + 1;
        match service.insert_event(calendar_id, event).await {
            Ok(created) => {
                info!(calendar_id, index, summary = %event.summary, "Inserted event");
                let flow = observer(ImportProgress::Inserted {
                    index,
                    event,
                    inserted: &created,
                });
                inserted.push(created);
                if flow.is_break() {
                    warn!(calendar_id, index, "Import stopped by caller");
                    return Err(ImportError::Stopped {
                        inserted: inserted.len(),
                    });
                }
            }
            Err(err) => {
                error!(calendar_id, index, summary = %event.summary, error = %err, "Insert failed");
                let _ = observer(ImportProgress::Failed {
                    index,
                    event,
                    error: &err,
                });
                return Err(ImportError::Insert {
                    index,
                    inserted: inserted.len(),
                    source: err,
                });
            }
        }
    }

    Ok(inserted)
}
