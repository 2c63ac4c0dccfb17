use crate::frames::Frame;
use crate::needs::Needs;
use crate::pet::PET_SIZE;
use crate::tasks::Task;
use serde::{Deserialize, Serialize};
use tauri::{AppHandle, Emitter, Manager, WebviewUrl, WebviewWindow, WebviewWindowBuilder};

pub const PET_LABEL: &str = "pet";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Animation {
    Idle,
    Eating,
}

/// The windows other than the pet overlay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Secondary {
    Dashboard,
    TaskManager,
    Calendar,
}

impl Secondary {
    pub fn label(self) -> &'static str {
        match self {
            Secondary::Dashboard => "dashboard",
            Secondary::TaskManager => "tasks",
            Secondary::Calendar => "calendar",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        [Secondary::Dashboard, Secondary::TaskManager, Secondary::Calendar]
            .into_iter()
            .find(|w| w.label() == label)
    }

    fn title(self) -> &'static str {
        match self {
            Secondary::Dashboard => "Dog Dashboard",
            Secondary::TaskManager => "Task Manager",
            Secondary::Calendar => "Google Calendar",
        }
    }

    fn size(self) -> (f64, f64) {
        match self {
            Secondary::Dashboard => (300.0, 480.0),
            Secondary::TaskManager => (420.0, 500.0),
            Secondary::Calendar => (520.0, 600.0),
        }
    }
}

/// Everything the shell does to the outside world.
pub trait Surface {
    /// Logical size of the screen the pet lives on.
    fn screen_size(&self) -> (f64, f64);
    fn show_pet(&mut self);
    fn hide_pet(&mut self);
    fn move_pet(&mut self, x: f64, y: f64);
    fn set_buttons_visible(&mut self, visible: bool);
    /// `None` removes the speech bubble.
    fn set_bubble(&mut self, text: Option<&str>);
    fn show_frame(&mut self, animation: Animation, index: usize);
    fn publish_frames(&mut self, idle: &[Frame], eating: &[Frame]);
    fn show_window(&mut self, window: Secondary);
    fn hide_window(&mut self, window: Secondary);
    /// OS notification.
    fn notify(&mut self, body: &str);
    fn publish_tasks(&mut self, tasks: &[Task]);
    fn publish_needs(&mut self, needs: &Needs);
}

const FALLBACK_SCREEN: (f64, f64) = (1440.0, 900.0);

#[derive(Clone, Serialize)]
struct FramePayload {
    animation: Animation,
    index: usize,
}

#[derive(Clone, Serialize)]
struct FrameSetPayload<'a> {
    idle: Vec<&'a str>,
    eating: Vec<&'a str>,
}

/// Drives the real webview windows.
pub struct TauriSurface {
    app: AppHandle,
}

impl TauriSurface {
    pub fn new(app: AppHandle) -> Self {
        Self { app }
    }

    fn pet(&self) -> Option<WebviewWindow> {
        let win = self.app.get_webview_window(PET_LABEL);
        if win.is_none() {
            log::warn!("Pet window is missing");
        }
        win
    }

    fn emit<S: Serialize + Clone>(&self, label: &str, event: &str, payload: S) {
        if let Err(e) = self.app.emit_to(label, event, payload) {
            log::warn!("Failed to emit {event} to {label}: {e}");
        }
    }
}

impl Surface for TauriSurface {
    fn screen_size(&self) -> (f64, f64) {
        let monitor = self
            .app
            .get_webview_window(PET_LABEL)
            .and_then(|w| w.current_monitor().ok().flatten())
            .or_else(|| self.app.primary_monitor().ok().flatten());
        match monitor {
            Some(m) => {
                let size = m.size().to_logical::<f64>(m.scale_factor());
                (size.width, size.height)
            }
            None => FALLBACK_SCREEN,
        }
    }

    fn show_pet(&mut self) {
        if let Some(win) = self.pet() {
            let _ = win.show();
        }
    }

    fn hide_pet(&mut self) {
        if let Some(win) = self.pet() {
            let _ = win.hide();
        }
    }

    fn move_pet(&mut self, x: f64, y: f64) {
        if let Some(win) = self.pet() {
            if let Err(e) = win.set_position(tauri::LogicalPosition::new(x, y)) {
                log::warn!("Failed to move pet window: {e}");
            }
        }
    }

    fn set_buttons_visible(&mut self, visible: bool) {
        self.emit(PET_LABEL, "pet:buttons", visible);
    }

    fn set_bubble(&mut self, text: Option<&str>) {
        self.emit(PET_LABEL, "pet:bubble", text);
    }

    fn show_frame(&mut self, animation: Animation, index: usize) {
        self.emit(PET_LABEL, "pet:frame", FramePayload { animation, index });
    }

    fn publish_frames(&mut self, idle: &[Frame], eating: &[Frame]) {
        fn urls(frames: &[Frame]) -> Vec<&str> {
            frames.iter().map(|f| f.data_url.as_str()).collect()
        }
        let payload = FrameSetPayload {
            idle: urls(idle),
            eating: urls(eating),
        };
        self.emit(PET_LABEL, "pet:frames", payload);
    }

    fn show_window(&mut self, window: Secondary) {
        let app = self.app.clone();
        if let Err(e) = self
            .app
            .run_on_main_thread(move || open_secondary(&app, window))
        {
            log::error!("Failed to schedule {} window: {e}", window.label());
        }
    }

    fn hide_window(&mut self, window: Secondary) {
        if let Some(win) = self.app.get_webview_window(window.label()) {
            let _ = win.hide();
        }
    }

    fn notify(&mut self, body: &str) {
        use tauri_plugin_notification::NotificationExt;
        if let Err(e) = self
            .app
            .notification()
            .builder()
            .title("Digital Dog")
            .body(body)
            .show()
        {
            log::warn!("Failed to show notification: {e}");
        }
    }

    fn publish_tasks(&mut self, tasks: &[Task]) {
        self.emit(Secondary::TaskManager.label(), "tasks:changed", tasks);
    }

    fn publish_needs(&mut self, needs: &Needs) {
        self.emit(Secondary::Dashboard.label(), "needs:changed", *needs);
    }
}

/// Builds the hidden, frameless, always-on-top pet window.
pub fn create_pet_window(app: &AppHandle) -> tauri::Result<()> {
    let win = WebviewWindowBuilder::new(app, PET_LABEL, WebviewUrl::App("pet.html".into()))
        .title("Digital Dog")
        .inner_size(PET_SIZE, PET_SIZE)
        .resizable(false)
        .decorations(false)
        .transparent(true)
        .shadow(false)
        .always_on_top(true)
        .skip_taskbar(true)
        .focused(false)
        .visible(false)
        .build()?;

    #[cfg(target_os = "macos")]
    {
        use objc2_app_kit::{NSWindow, NSWindowCollectionBehavior};

        if let Ok(raw_ptr) = win.ns_window() {
            unsafe {
                let ns_win = &*(raw_ptr as *const NSWindow);
                // Follow the user across Spaces, including fullscreen ones.
                ns_win.setCollectionBehavior(
                    NSWindowCollectionBehavior::CanJoinAllSpaces
                        | NSWindowCollectionBehavior::FullScreenAuxiliary,
                );
            }
        }
    }

    log::info!("Created pet window {}", win.label());
    Ok(())
}

/// Shows a secondary window, creating it on first use. Must run on the main thread.
fn open_secondary(app: &AppHandle, window: Secondary) {
    if let Some(win) = app.get_webview_window(window.label()) {
        let _ = win.show();
        let _ = win.set_focus();
        return;
    }

    let (width, height) = window.size();
    let page = format!("{}.html", window.label());
    match WebviewWindowBuilder::new(app, window.label(), WebviewUrl::App(page.into()))
        .title(window.title())
        .inner_size(width, height)
        .resizable(false)
        .always_on_top(true)
        .visible(true)
        .build()
    {
        Ok(win) => {
            let _ = win.set_focus();
            log::info!("Opened {} window", window.label());
        }
        Err(e) => {
            log::error!("Failed to open {} window: {e}", window.label());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_round_trip_and_unknown_labels_are_rejected() {
        for w in [Secondary::Dashboard, Secondary::TaskManager, Secondary::Calendar] {
            assert_eq!(Secondary::from_label(w.label()), Some(w));
        }
        assert_eq!(Secondary::from_label(PET_LABEL), None);
    }

    #[test]
    fn secondary_names_match_frontend_strings() {
        assert_eq!(
            serde_json::to_string(&Secondary::TaskManager).unwrap(),
            "\"task_manager\""
        );
        let w: Secondary = serde_json::from_str("\"calendar\"").unwrap();
        assert_eq!(w, Secondary::Calendar);
    }
}
