//! Minimal Google Calendar v3 REST client.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::event_file::EventDraft;
use crate::import::{CalendarService, InsertedEvent};

pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const CALENDAR_SCOPE: &str = "https://www.googleapis.com/auth/calendar";
pub const AUTHORIZED_USER: &str = "authorized_user";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("failed to read credentials {}: {source}", .path.display())]
    CredentialsIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid credentials file {}: {source}", .path.display())]
    CredentialsFormat {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported credentials type '{0}' (expected 'authorized_user')")]
    UnsupportedCredentials(String),
    #[error("token refresh failed: {0}")]
    TokenRefresh(String),
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("calendar API error ({status}): {message}")]
    Api { status: u16, message: String },
}

/// Contents of a user credentials file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "type")]
    pub kind: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
}

impl Credentials {
    pub fn authorized_user(client_id: &str, client_secret: &str, refresh_token: &str) -> Self {
        Self {
            kind: AUTHORIZED_USER.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            refresh_token: refresh_token.to_string(),
            token_uri: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, CalendarError> {
        let raw = fs::read_to_string(path).map_err(|source| CalendarError::CredentialsIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw).map_err(|err| match err {
            CredentialsParseError::Json(source) => CalendarError::CredentialsFormat {
                path: path.to_path_buf(),
                source,
            },
            CredentialsParseError::Unsupported(kind) => CalendarError::UnsupportedCredentials(kind),
        })
    }

    fn from_json(raw: &str) -> Result<Self, CredentialsParseError> {
        #[derive(Deserialize)]
        struct Probe {
            #[serde(rename = "type")]
            kind: String,
        }

        let probe: Probe = serde_json::from_str(raw).map_err(CredentialsParseError::Json)?;
        if probe.kind != AUTHORIZED_USER {
            return Err(CredentialsParseError::Unsupported(probe.kind));
        }
        serde_json::from_str(raw).map_err(CredentialsParseError::Json)
    }
}

enum CredentialsParseError {
    Json(serde_json::Error),
    Unsupported(String),
}

/// Remote endpoints; only overridden in tests or for proxies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub token_url: String,
    pub api_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }
}

/// Start or end of an event as the API represents it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventDateTime {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_time: Option<String>,
}

impl EventDateTime {
    pub fn at(date_time: String) -> Self {
        Self {
            date: None,
            date_time: Some(date_time),
        }
    }

    /// All-day events only carry a date.
    pub fn display(&self) -> &str {
        self.date
            .as_deref()
            .or(self.date_time.as_deref())
            .unwrap_or("")
    }
}

#[derive(Debug, Serialize)]
struct EventResource<'a> {
    summary: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    start: EventDateTime,
    end: EventDateTime,
}

impl<'a> From<&'a EventDraft> for EventResource<'a> {
    fn from(event: &'a EventDraft) -> Self {
        Self {
            summary: &event.summary,
            description: (!event.description.is_empty()).then_some(event.description.as_str()),
            start: EventDateTime::at(event.start_rfc3339()),
            end: EventDateTime::at(event.end_rfc3339()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CalendarEntry {
    pub id: String,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub primary: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UpcomingEvent {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub start: EventDateTime,
    #[serde(default)]
    pub end: EventDateTime,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Page<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorBody,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    message: String,
}

/// Authenticated calendar client holding a short-lived access token.
#[derive(Debug, Clone)]
pub struct GoogleCalendar {
    http: Client,
    access_token: String,
    api_base: String,
}

impl GoogleCalendar {
    /// Exchange the refresh token in `credentials` for an access token.
    pub async fn connect(
        credentials: &Credentials,
        endpoints: &Endpoints,
    ) -> Result<Self, CalendarError> {
        let http = Client::builder()
            .user_agent(concat!("calimport/", env!("CARGO_PKG_VERSION")))
            .build()?;
        let token_url = credentials
            .token_uri
            .as_deref()
            .unwrap_or(endpoints.token_url.as_str());

        debug!(token_url, "Refreshing access token");
        let response = http
            .post(token_url)
            .form(&[
                ("client_id", credentials.client_id.as_str()),
                ("client_secret", credentials.client_secret.as_str()),
                ("refresh_token", credentials.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {description}", err.error),
                    None => err.error,
                },
                Err(_) => format!("{status}"),
            };
            return Err(CalendarError::TokenRefresh(message));
        }

        let token: TokenResponse = response.json().await?;
        info!(expires_in = token.expires_in, "Obtained access token");

        Ok(Self {
            http,
            access_token: token.access_token,
            api_base: endpoints.api_base.trim_end_matches('/').to_string(),
        })
    }

    fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }

    pub async fn insert(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<InsertedEvent, CalendarError> {
        let response = self
            .http
            .post(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .json(&EventResource::from(event))
            .send()
            .await?;
        let response = check_status(response).await?;
        Ok(response.json().await?)
    }

    /// Calendars the authenticated user can access.
    pub async fn list_calendars(&self) -> Result<Vec<CalendarEntry>, CalendarError> {
        let url = format!("{}/users/me/calendarList", self.api_base);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.http.get(&url).bearer_auth(&self.access_token);
            if let Some(token) = page_token.as_deref() {
                request = request.query(&[("pageToken", token)]);
            }
            let response = check_status(request.send().await?).await?;
            let page: Page<CalendarEntry> = response.json().await?;
            entries.extend(page.items);
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(entries)
    }

    /// Upcoming single events starting from `now`, ordered by start time.
    pub async fn list_upcoming(
        &self,
        calendar_id: &str,
        now: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<UpcomingEvent>, CalendarError> {
        let time_min = now.to_rfc3339_opts(SecondsFormat::Secs, true);
        let max_results = max_results.to_string();
        let response = self
            .http
            .get(self.events_url(calendar_id))
            .bearer_auth(&self.access_token)
            .query(&[
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
                ("timeMin", time_min.as_str()),
                ("maxResults", max_results.as_str()),
            ])
            .send()
            .await?;
        let page: Page<UpcomingEvent> = check_status(response).await?.json().await?;
        Ok(page.items)
    }
}

impl CalendarService for GoogleCalendar {
    async fn insert_event(
        &self,
        calendar_id: &str,
        event: &EventDraft,
    ) -> Result<InsertedEvent, CalendarError> {
        self.insert(calendar_id, event).await
    }
}

async fn check_status(response: Response) -> Result<Response, CalendarError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiErrorResponse>(&body)
        .map(|err| err.error.message)
        .unwrap_or_else(|_| {
            let trimmed = body.trim();
            if trimmed.is_empty() {
                status.to_string()
            } else {
                trimmed.to_string()
            }
        });
    Err(CalendarError::Api {
        status: status.as_u16(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_credentials_reject_service_accounts() {
        let raw = r#"{"type":"service_account","client_email":"x@example.com"}"#;
        assert!(matches!(
            Credentials::from_json(raw),
            Err(CredentialsParseError::Unsupported(kind)) if kind == "service_account"
        ));
    }

    #[test]
    fn test_credentials_authorized_user() {
        let raw = r#"{
            "type": "authorized_user",
            "client_id": "id",
            "client_secret": "secret",
            "refresh_token": "refresh"
        }"#;
        let creds = Credentials::from_json(raw).ok().unwrap();
        assert_eq!(creds, Credentials::authorized_user("id", "secret", "refresh"));
    }

    #[test]
    fn test_event_resource_shape() {
        let tz = chrono::FixedOffset::west_opt(5 * 3600).unwrap();
        let event = EventDraft {
            start: tz.with_ymd_and_hms(2018, 1, 19, 19, 0, 0).unwrap(),
            end: tz.with_ymd_and_hms(2018, 1, 19, 21, 0, 0).unwrap(),
            summary: "Dinner".to_string(),
            description: String::new(),
        };
        let json = serde_json::to_value(EventResource::from(&event)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "summary": "Dinner",
                "start": {"dateTime": "2018-01-19T19:00:00-05:00"},
                "end": {"dateTime": "2018-01-19T21:00:00-05:00"},
            })
        );
    }

    #[test]
    fn test_event_date_time_display_prefers_date() {
        let all_day = EventDateTime {
            date: Some("2018-01-19".to_string()),
            date_time: None,
        };
        assert_eq!(all_day.display(), "2018-01-19");
        assert_eq!(
            EventDateTime::at("2018-01-19T19:00:00Z".to_string()).display(),
            "2018-01-19T19:00:00Z"
        );
    }
}
