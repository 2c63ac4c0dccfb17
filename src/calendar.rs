//! Google Calendar v3 client for the primary calendar.
//!
//! Every call is a single best-effort request; failures come back as
//! `CalendarError` for the calendar window to show. No retries, no queueing.

use crate::oauth::{self, ClientSecrets, Credential, CALENDAR_SCOPE};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

const API_BASE: &str = "https://www.googleapis.com/calendar/v3";
const NO_TITLE: &str = "(No Title)";

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("client secret file not found at {0}")]
    MissingClientSecret(PathBuf),
    #[error("authorization failed: {0}")]
    Auth(String),
    #[error("calendar API returned {status}: {message}")]
    Api { status: u16, message: String },
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CalendarError>;

/// Start or end of an event: a date-time, or a date for all-day events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventTime {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_time: Option<DateTime<FixedOffset>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

impl EventTime {
    pub fn at(when: DateTime<Utc>) -> Self {
        Self {
            date_time: Some(when.fixed_offset()),
            date: None,
            time_zone: Some("UTC".into()),
        }
    }

    pub fn label(&self) -> String {
        match (&self.date_time, &self.date) {
            (Some(dt), _) => dt.to_rfc3339(),
            (None, Some(d)) => d.to_string(),
            (None, None) => String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub id: String,
    #[serde(default = "no_title")]
    pub summary: String,
    #[serde(default)]
    pub start: EventTime,
    #[serde(default)]
    pub end: EventTime,
    #[serde(default)]
    pub description: String,
}

fn no_title() -> String {
    NO_TITLE.into()
}

impl CalendarEvent {
    /// One-line list label, `summary | start`.
    pub fn label(&self) -> String {
        format!("{} | {}", self.summary, self.start.label())
    }
}

#[derive(Debug, Deserialize)]
struct EventList {
    #[serde(default)]
    items: Vec<CalendarEvent>,
}

#[derive(Debug, Serialize)]
struct NewEvent<'a> {
    summary: &'a str,
    description: &'a str,
    start: EventTime,
    end: EventTime,
}

/// Fields to change on an existing event; `None` leaves a field as is.
#[derive(Debug, Clone, Default)]
pub struct EventPatch {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

pub struct CalendarClient {
    http: reqwest::Client,
    token_path: PathBuf,
    client_secret_path: PathBuf,
    credential: Option<Credential>,
}

impl CalendarClient {
    pub fn new(token_path: PathBuf, client_secret_path: PathBuf) -> Self {
        Self {
            http: reqwest::Client::new(),
            token_path,
            client_secret_path,
            credential: None,
        }
    }

    /// Loads the cached credential, refreshing it if expired or running the
    /// interactive flow if there is nothing usable, then rewrites the cache.
    pub async fn authenticate(&mut self) -> Result<()> {
        let now = Utc::now();
        let mut credential = match self.credential.take() {
            Some(c) => Some(c),
            None => Credential::load(&self.token_path).unwrap_or_else(|e| {
                log::warn!("Ignoring unreadable calendar token {}: {e}", self.token_path.display());
                None
            }),
        };

        if let Some(c) = &credential {
            if c.is_valid(now) {
                self.credential = credential;
                return Ok(());
            }
        }

        let refreshed = match credential.as_mut() {
            Some(c) if c.can_refresh() => match oauth::refresh(&self.http, c).await {
                Ok(()) => true,
                Err(e) => {
                    log::warn!("Calendar token refresh failed, re-authorizing: {e}");
                    false
                }
            },
            _ => false,
        };

        let credential = match (refreshed, credential) {
            (true, Some(c)) => c,
            _ => {
                let secrets = ClientSecrets::load(&self.client_secret_path)?;
                oauth::run_installed_flow(&self.http, &secrets, &[CALENDAR_SCOPE]).await?
            }
        };
        credential.save(&self.token_path)?;
        self.credential = Some(credential);
        Ok(())
    }

    async fn access_token(&mut self) -> Result<String> {
        let usable = self
            .credential
            .as_ref()
            .is_some_and(|c| c.is_valid(Utc::now()));
        if !usable {
            self.authenticate().await?;
        }
        self.credential
            .as_ref()
            .and_then(|c| c.token.clone())
            .ok_or_else(|| CalendarError::Auth("no access token after authorization".into()))
    }

    fn events_url(&self) -> String {
        format!("{API_BASE}/calendars/primary/events")
    }

    /// Upcoming single occurrences on the primary calendar, soonest first.
    pub async fn list_upcoming(&mut self, max_results: u32) -> Result<Vec<CalendarEvent>> {
        let token = self.access_token().await?;
        let time_min = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        let max_results = max_results.to_string();
        let response = self
            .http
            .get(self.events_url())
            .bearer_auth(token)
            .query(&[
                ("timeMin", time_min.as_str()),
                ("maxResults", max_results.as_str()),
                ("singleEvents", "true"),
                ("orderBy", "startTime"),
            ])
            .send()
            .await?;
        let list: EventList = check(response).await?.json().await?;
        Ok(list.items)
    }

    pub async fn add(
        &mut self,
        summary: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        description: Option<&str>,
    ) -> Result<CalendarEvent> {
        let token = self.access_token().await?;
        let body = NewEvent {
            summary,
            description: description.unwrap_or(""),
            start: EventTime::at(start),
            end: EventTime::at(end),
        };
        let response = self
            .http
            .post(self.events_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        let event: CalendarEvent = check(response).await?.json().await?;
        log::info!("Created calendar event {} ({})", event.id, event.label());
        Ok(event)
    }

    /// Fetches the event, applies `patch`, and writes the whole event back.
    pub async fn update(&mut self, event_id: &str, patch: EventPatch) -> Result<CalendarEvent> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", self.events_url(), event_id);
        let response = self.http.get(&url).bearer_auth(&token).send().await?;
        let mut event: serde_json::Value = check(response).await?.json().await?;
        apply_patch(&mut event, &patch)?;

        let response = self
            .http
            .put(&url)
            .bearer_auth(&token)
            .json(&event)
            .send()
            .await?;
        let event: CalendarEvent = check(response).await?.json().await?;
        log::info!("Updated calendar event {} ({})", event.id, event.label());
        Ok(event)
    }

    pub async fn delete(&mut self, event_id: &str) -> Result<()> {
        let token = self.access_token().await?;
        let url = format!("{}/{}", self.events_url(), event_id);
        let response = self.http.delete(&url).bearer_auth(token).send().await?;
        check(response).await?;
        log::info!("Deleted calendar event {event_id}");
        Ok(())
    }
}

/// Patches the raw event so fields this client does not model survive the PUT.
fn apply_patch(event: &mut serde_json::Value, patch: &EventPatch) -> Result<()> {
    let object = event
        .as_object_mut()
        .ok_or_else(|| CalendarError::Api {
            status: 200,
            message: "event is not a JSON object".into(),
        })?;
    if let Some(summary) = &patch.summary {
        object.insert("summary".into(), summary.clone().into());
    }
    if let Some(description) = &patch.description {
        object.insert("description".into(), description.clone().into());
    }
    if let Some(start) = patch.start {
        object.insert("start".into(), serde_json::to_value(EventTime::at(start))?);
    }
    if let Some(end) = patch.end {
        object.insert("end".into(), serde_json::to_value(EventTime::at(end))?);
    }
    Ok(())
}

async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(api_error(status.as_u16(), &body))
}

fn api_error(status: u16, body: &str) -> CalendarError {
    let message = serde_json::from_str::<ApiErrorBody>(body)
        .map(|b| b.error.message)
        .unwrap_or_else(|_| body.trim().to_string());
    CalendarError::Api { status, message }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_list_with_timed_and_all_day_events() {
        let list: EventList = serde_json::from_str(
            r#"{"kind":"calendar#events","items":[
                {"id":"a1","summary":"Stand-up","description":"daily",
                 "start":{"dateTime":"2025-05-22T09:00:00+02:00","timeZone":"Europe/Berlin"},
                 "end":{"dateTime":"2025-05-22T09:15:00+02:00"}},
                {"id":"b2","start":{"date":"2025-05-23"},"end":{"date":"2025-05-24"}}
            ]}"#,
        )
        .unwrap();
        assert_eq!(list.items.len(), 2);
        assert_eq!(list.items[0].label(), "Stand-up | 2025-05-22T09:00:00+02:00");
        assert_eq!(list.items[1].summary, "(No Title)");
        assert_eq!(list.items[1].label(), "(No Title) | 2025-05-23");
        assert_eq!(list.items[1].description, "");
    }

    #[test]
    fn empty_list_has_no_items_field() {
        let list: EventList = serde_json::from_str(r#"{"kind":"calendar#events"}"#).unwrap();
        assert!(list.items.is_empty());
    }

    #[test]
    fn new_event_body_uses_utc_date_times() {
        let start = "2025-05-22T15:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let body = NewEvent {
            summary: "Test Event",
            description: "",
            start: EventTime::at(start),
            end: EventTime::at(start + chrono::Duration::hours(1)),
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({
                "summary": "Test Event",
                "description": "",
                "start": {"dateTime": "2025-05-22T15:00:00+00:00", "timeZone": "UTC"},
                "end": {"dateTime": "2025-05-22T16:00:00+00:00", "timeZone": "UTC"},
            })
        );
    }

    #[test]
    fn patch_keeps_unmodelled_fields() {
        let mut event = serde_json::json!({
            "id": "a1",
            "summary": "Old",
            "attendees": [{"email": "a@example.com"}],
        });
        apply_patch(
            &mut event,
            &EventPatch {
                summary: Some("New".into()),
                ..EventPatch::default()
            },
        )
        .unwrap();
        assert_eq!(event["summary"], "New");
        assert_eq!(event["attendees"][0]["email"], "a@example.com");
        assert!(event.get("start").is_none());
    }

    #[test]
    fn api_errors_surface_google_message() {
        let err = api_error(
            403,
            r#"{"error":{"code":403,"message":"Rate Limit Exceeded","errors":[]}}"#,
        );
        assert_eq!(err.to_string(), "calendar API returned 403: Rate Limit Exceeded");
        let err = api_error(502, "Bad Gateway\n");
        assert_eq!(err.to_string(), "calendar API returned 502: Bad Gateway");
    }

    #[tokio::test]
    async fn missing_client_secret_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let mut client = CalendarClient::new(
            dir.path().join("token.json"),
            dir.path().join("credentials.json"),
        );
        let err = client.authenticate().await.unwrap_err();
        assert!(matches!(err, CalendarError::MissingClientSecret(_)));
    }

    #[tokio::test]
    async fn valid_cached_token_needs_no_network() {
        let dir = tempfile::tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        Credential {
            token: Some("cached".into()),
            refresh_token: None,
            token_uri: "https://oauth2.googleapis.com/token".into(),
            client_id: "id".into(),
            client_secret: "secret".into(),
            scopes: vec![CALENDAR_SCOPE.into()],
            expiry: Some(Utc::now() + chrono::Duration::hours(1)),
        }
        .save(&token_path)
        .unwrap();

        let mut client = CalendarClient::new(token_path, dir.path().join("credentials.json"));
        assert_eq!(client.access_token().await.unwrap(), "cached");
    }
}
