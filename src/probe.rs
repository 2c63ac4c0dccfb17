//! Foreground application / browser tab inspection.
//!
//! One sample per detector poll:
//!   1. Frontmost application bundle ID via NSWorkspace.
//!   2. For Chrome and Brave only, the active tab URL via AppleScript.
//!
//! Every query is best-effort. A failed query yields `None` and marks the
//! sample as degraded; nothing is ever surfaced to the user.

/// Browsers whose active tab URL can be read, keyed by bundle ID, with the
/// application name AppleScript addresses them by.
pub const SUPPORTED_BROWSERS: &[(&str, &str)] = &[
    ("com.google.Chrome", "Google Chrome"),
    ("com.brave.Browser", "Brave Browser"),
];

/// What the OS reported for a single poll.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ForegroundSample {
    /// Frontmost application bundle identifier.
    pub app: Option<String>,
    /// Active tab URL when `app` is a supported browser.
    pub url: Option<String>,
    /// Set when an OS query failed this tick (as opposed to reporting nothing).
    pub degraded: bool,
}

#[cfg(test)]
impl ForegroundSample {
    pub fn app(bundle_id: &str) -> Self {
        Self {
            app: Some(bundle_id.to_string()),
            ..Self::default()
        }
    }

    pub fn browser(bundle_id: &str, url: &str) -> Self {
        Self {
            app: Some(bundle_id.to_string()),
            url: Some(url.to_string()),
            degraded: false,
        }
    }
}

pub trait ForegroundProbe: Send + Sync {
    fn sample(&self) -> ForegroundSample;
}

/// AppleScript application name for a bundle ID, if its tab URL can be queried.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn browser_script_name(bundle_id: &str) -> Option<&'static str> {
    SUPPORTED_BROWSERS
        .iter()
        .find(|(id, _)| *id == bundle_id)
        .map(|(_, name)| *name)
}

/// AppleScript returning the active tab URL of `app_name`'s front window.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub fn tab_url_script(app_name: &str) -> String {
    format!(r#"tell application "{app_name}" to get URL of active tab of front window"#)
}

/// Normalises raw `osascript` output into a URL, treating blank output as none.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_script_output(raw: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(raw);
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[cfg(target_os = "macos")]
mod macos {
    use super::{browser_script_name, parse_script_output, tab_url_script, ForegroundProbe, ForegroundSample};
    use std::time::{Duration, Instant};

    /// Upper bound for one `osascript` call; a browser showing a modal can hang it.
    const SCRIPT_TIMEOUT: Duration = Duration::from_secs(5);

    pub struct SystemProbe;

    impl ForegroundProbe for SystemProbe {
        fn sample(&self) -> ForegroundSample {
            let Some(app) = frontmost_bundle_id() else {
                return ForegroundSample {
                    degraded: true,
                    ..ForegroundSample::default()
                };
            };
            match browser_script_name(&app) {
                Some(name) => {
                    let url = run_script(&tab_url_script(name));
                    ForegroundSample {
                        degraded: url.is_none(),
                        app: Some(app),
                        url,
                    }
                }
                None => ForegroundSample {
                    app: Some(app),
                    url: None,
                    degraded: false,
                },
            }
        }
    }

    fn frontmost_bundle_id() -> Option<String> {
        use objc2_app_kit::NSWorkspace;

        let workspace = NSWorkspace::sharedWorkspace();
        let app = workspace.frontmostApplication()?;
        app.bundleIdentifier().map(|id| id.to_string())
    }

    /// Runs an AppleScript snippet and returns its trimmed stdout.
    ///
    /// Returns `None` when the helper cannot be spawned, exits unsuccessfully
    /// (browser not running, not scriptable), prints nothing, or exceeds
    /// `SCRIPT_TIMEOUT`.
    fn run_script(script: &str) -> Option<String> {
        let mut child = match std::process::Command::new("osascript")
            .arg("-e")
            .arg(script)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .spawn()
        {
            Ok(c) => c,
            Err(e) => {
                log::debug!("osascript spawn failed: {e}");
                return None;
            }
        };

        let deadline = Instant::now() + SCRIPT_TIMEOUT;
        loop {
            match child.try_wait() {
                Ok(Some(status)) => {
                    if !status.success() {
                        return None;
                    }
                    use std::io::Read;
                    let mut buf = Vec::new();
                    if let Some(mut stdout) = child.stdout.take() {
                        let _ = stdout.read_to_end(&mut buf);
                    }
                    return parse_script_output(&buf);
                }
                Ok(None) => {
                    if Instant::now() >= deadline {
                        log::warn!("osascript timed out, killing it");
                        let _ = child.kill();
                        let _ = child.wait(); // reap zombie
                        return None;
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(_) => return None,
            }
        }
    }
}

#[cfg(not(target_os = "macos"))]
mod fallback {
    use super::{ForegroundProbe, ForegroundSample};

    /// Foreground inspection is macOS-only; elsewhere nothing is ever frontmost.
    pub struct SystemProbe;

    impl ForegroundProbe for SystemProbe {
        fn sample(&self) -> ForegroundSample {
            ForegroundSample::default()
        }
    }
}

#[cfg(not(target_os = "macos"))]
pub use fallback::SystemProbe;
#[cfg(target_os = "macos")]
pub use macos::SystemProbe;
