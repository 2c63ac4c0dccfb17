use crate::calendar::{CalendarClient, CalendarEvent, EventPatch};
use crate::config::AppConfig;
use crate::shell::{AppEvent, Input, PetAction};
use crate::tasks::{parse_due, TaskId};
use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tauri::{AppHandle, State};
use tauri_plugin_autostart::ManagerExt;
use tokio::sync::mpsc::UnboundedSender;

/// Tauri state container.
pub struct AppState {
    pub events: UnboundedSender<AppEvent>,
    /// Held across the network round trip, so calendar calls run one at a time.
    pub calendar: tokio::sync::Mutex<CalendarClient>,
    pub config: std::sync::Mutex<AppConfig>,
}

/// Lock a Mutex, recovering from poisoning gracefully.
macro_rules! lock {
    ($m:expr) => {
        $m.lock().unwrap_or_else(|e| e.into_inner())
    };
}

const UPCOMING_EVENTS: u32 = 20;

pub fn send_input(state: &AppState, input: Input) -> Result<(), String> {
    state
        .events
        .send(AppEvent::Input(input))
        .map_err(|_| "the app is shutting down".to_string())
}

// --- Pet overlay ---

#[tauri::command]
pub fn pet_ready(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::PetReady)
}

#[tauri::command]
pub fn pet_pointer_enter(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::PointerEnter)
}

#[tauri::command]
pub fn pet_pointer_leave(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::PointerLeave)
}

/// `x`/`y` are logical screen coordinates of the cursor.
#[tauri::command]
pub fn pet_pointer_down(x: f64, y: f64, state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::PointerDown(x, y))
}

#[tauri::command]
pub fn pet_pointer_move(x: f64, y: f64, state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::PointerMove(x, y))
}

#[tauri::command]
pub fn pet_pointer_up(x: f64, y: f64, state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::PointerUp(x, y))
}

#[tauri::command]
pub fn pet_action(action: PetAction, state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::Action(action))
}

#[tauri::command]
pub fn dismiss_reminder(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::DismissReminder)
}

// --- Dashboard and task manager ---

#[tauri::command]
pub fn dashboard_ready(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::DashboardReady)
}

#[tauri::command]
pub fn open_task_manager(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::OpenTaskManager)
}

#[tauri::command]
pub fn back_to_dashboard(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::BackToDashboard)
}

#[tauri::command]
pub fn tasks_refresh(state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::TasksRefresh)
}

/// `due` is "yyyy-MM-dd hh:mm" (a `T` separator is accepted too).
#[tauri::command]
pub fn task_add(text: String, due: String, state: State<AppState>) -> Result<(), String> {
    let (description, due_at) = validate_task(&text, &due)?;
    send_input(
        &state,
        Input::AddTask {
            description,
            due_at,
        },
    )
}

#[tauri::command]
pub fn task_complete(id: u64, state: State<AppState>) -> Result<(), String> {
    send_input(&state, Input::CompleteTask(TaskId(id)))
}

fn validate_task(text: &str, due: &str) -> Result<(String, NaiveDateTime), String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("Please enter a task description.".into());
    }
    let due_at = parse_due(&due.replace('T', " ")).map_err(|e| e.to_string())?;
    Ok((text.to_string(), due_at))
}

// --- Calendar ---

/// Fields the calendar window may change; times are local "yyyy-MM-dd hh:mm".
#[derive(Debug, Default, Deserialize)]
pub struct EventForm {
    pub summary: Option<String>,
    pub description: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

fn local_to_utc(raw: &str) -> Result<DateTime<Utc>, String> {
    let naive = parse_due(&raw.replace('T', " ")).map_err(|e| e.to_string())?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| format!("{raw} does not exist in the local time zone"))
}

impl EventForm {
    fn into_patch(self) -> Result<EventPatch, String> {
        let start = self.start.as_deref().map(local_to_utc).transpose()?;
        let end = self.end.as_deref().map(local_to_utc).transpose()?;
        if let (Some(start), Some(end)) = (start, end) {
            if end <= start {
                return Err("The event must end after it starts.".into());
            }
        }
        Ok(EventPatch {
            summary: self.summary,
            description: self.description,
            start,
            end,
        })
    }
}

#[tauri::command]
pub async fn calendar_list(state: State<'_, AppState>) -> Result<Vec<CalendarEvent>, String> {
    let mut client = state.calendar.lock().await;
    client
        .list_upcoming(UPCOMING_EVENTS)
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn calendar_add(
    form: EventForm,
    state: State<'_, AppState>,
) -> Result<CalendarEvent, String> {
    let summary = form
        .summary
        .clone()
        .filter(|s| !s.trim().is_empty())
        .ok_or("Please enter an event title.")?;
    let patch = form.into_patch()?;
    let (Some(start), Some(end)) = (patch.start, patch.end) else {
        return Err("Please enter a start and end time.".into());
    };
    let mut client = state.calendar.lock().await;
    client
        .add(summary.trim(), start, end, patch.description.as_deref())
        .await
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn calendar_update(
    id: String,
    form: EventForm,
    state: State<'_, AppState>,
) -> Result<CalendarEvent, String> {
    let patch = form.into_patch()?;
    let mut client = state.calendar.lock().await;
    client.update(&id, patch).await.map_err(|e| e.to_string())
}

#[tauri::command]
pub async fn calendar_delete(id: String, state: State<'_, AppState>) -> Result<(), String> {
    let mut client = state.calendar.lock().await;
    client.delete(&id).await.map_err(|e| e.to_string())
}

// --- Settings ---

#[tauri::command]
pub fn get_launch_at_login(state: State<AppState>) -> bool {
    lock!(state.config).launch_at_login
}

#[tauri::command]
pub fn set_launch_at_login(
    enabled: bool,
    app: AppHandle,
    state: State<AppState>,
) -> Result<(), String> {
    apply_launch_at_login(&app, enabled);
    let mut config = lock!(state.config);
    config.launch_at_login = enabled;
    config.save()?;
    log::info!("Launch at login set to {enabled}");
    Ok(())
}

/// Syncs the login item with the setting; failures are logged only.
pub fn apply_launch_at_login(app: &AppHandle, enabled: bool) {
    let autolaunch = app.autolaunch();
    let result = if enabled {
        autolaunch.enable()
    } else {
        autolaunch.disable()
    };
    if let Err(e) = result {
        log::warn!("Failed to update launch at login: {e}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_input_is_trimmed_and_due_parsed() {
        let (text, due) = validate_task("  Call vet ", "2025-05-22T15:00").unwrap();
        assert_eq!(text, "Call vet");
        assert_eq!(due.format("%Y-%m-%d %H:%M").to_string(), "2025-05-22 15:00");

        assert!(validate_task("   ", "2025-05-22 15:00").is_err());
        assert!(validate_task("Call vet", "tomorrow").is_err());
    }

    #[test]
    fn event_form_converts_local_times_and_rejects_backwards_ranges() {
        let form = EventForm {
            summary: Some("Walk".into()),
            start: Some("2025-05-22 15:00".into()),
            end: Some("2025-05-22 16:00".into()),
            ..Default::default()
        };
        let patch = form.into_patch().unwrap();
        let (start, end) = (patch.start.unwrap(), patch.end.unwrap());
        assert_eq!(end - start, chrono::Duration::hours(1));
        assert_eq!(
            start.with_timezone(&Local).naive_local(),
            parse_due("2025-05-22 15:00").unwrap()
        );

        let backwards = EventForm {
            start: Some("2025-05-22 16:00".into()),
            end: Some("2025-05-22 15:00".into()),
            ..Default::default()
        };
        assert!(backwards.into_patch().is_err());
    }

    #[test]
    fn partial_form_leaves_other_fields_alone() {
        let patch = EventForm {
            description: Some("bring treats".into()),
            ..Default::default()
        }
        .into_patch()
        .unwrap();
        assert_eq!(patch.summary, None);
        assert_eq!(patch.description.as_deref(), Some("bring treats"));
        assert!(patch.start.is_none() && patch.end.is_none());
    }
}
