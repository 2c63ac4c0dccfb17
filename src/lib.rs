mod calendar;
mod commands;
mod config;
mod detector;
mod frames;
mod needs;
mod oauth;
mod pet;
mod probe;
mod scheduler;
mod shell;
mod tasks;
mod tray;
mod windows;

use commands::AppState;
use config::AppConfig;
use probe::{ForegroundProbe, ForegroundSample, SystemProbe};
use scheduler::TimerId;
use shell::{AppEvent, Input, Shell};
use std::sync::{Arc, Mutex};
use tauri::Manager;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};
use windows::{Secondary, TauriSurface};

/// Initializes logging and configuration, then runs the Tauri application.
///
/// Registers the autostart, notification and opener plugins, the command
/// handlers and the managed `AppState`. Setup builds the pet window and the
/// tray, then spawns the run loop that owns the pet, the distraction detector
/// and the task store. Closing a window hides it; only Quit exits.
///
/// # Examples
///
/// ```no_run
/// // Does not return until the app exits.
/// digital_dog_lib::run();
/// ```
#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = AppConfig::load();
    let (events_tx, events_rx) = unbounded_channel::<AppEvent>();
    let calendar = calendar::CalendarClient::new(
        config.calendar_token_path(),
        config.calendar_client_secret_path(),
    );

    tauri::Builder::default()
        .plugin(tauri_plugin_autostart::init(
            tauri_plugin_autostart::MacosLauncher::LaunchAgent,
            Some(vec![]),
        ))
        .plugin(tauri_plugin_notification::init())
        .plugin(tauri_plugin_opener::init())
        .manage(AppState {
            events: events_tx.clone(),
            calendar: tokio::sync::Mutex::new(calendar),
            config: Mutex::new(config.clone()),
        })
        .invoke_handler(tauri::generate_handler![
            commands::pet_ready,
            commands::pet_pointer_enter,
            commands::pet_pointer_leave,
            commands::pet_pointer_down,
            commands::pet_pointer_move,
            commands::pet_pointer_up,
            commands::pet_action,
            commands::dismiss_reminder,
            commands::dashboard_ready,
            commands::open_task_manager,
            commands::back_to_dashboard,
            commands::tasks_refresh,
            commands::task_add,
            commands::task_complete,
            commands::calendar_list,
            commands::calendar_add,
            commands::calendar_update,
            commands::calendar_delete,
            commands::get_launch_at_login,
            commands::set_launch_at_login,
        ])
        .on_window_event(|window, event| {
            // Secondary windows hide instead of closing, so they can be reopened cheaply.
            if let tauri::WindowEvent::CloseRequested { api, .. } = event {
                let Some(secondary) = Secondary::from_label(window.label()) else {
                    return;
                };
                api.prevent_close();
                let _ = window.hide();
                let state = window.state::<AppState>();
                if let Err(e) = commands::send_input(&state, Input::WindowClosed(secondary)) {
                    log::warn!("Window close not delivered: {e}");
                }
            }
        })
        .setup(move |app| {
            #[cfg(target_os = "macos")]
            app.set_activation_policy(tauri::ActivationPolicy::Accessory);

            commands::apply_launch_at_login(app.handle(), config.launch_at_login);
            windows::create_pet_window(app.handle())?;
            tray::setup_tray(app)?;

            // Relative frame patterns live in the bundle's resources.
            let frames_base = app.path().resource_dir().unwrap_or_else(|e| {
                log::warn!("No resource directory ({e}); loading frames from the config directory");
                AppConfig::config_dir()
            });
            let idle_frames = frames::load_frames(
                &frames::resolve_pattern(&config.idle_frames, &frames_base),
                config.frame_size,
            );
            let eating_frames = frames::load_frames(
                &frames::resolve_pattern(&config.eating_frames, &frames_base),
                config.frame_size,
            );
            let shell = Shell::new(
                &config,
                TauriSurface::new(app.handle().clone()),
                events_tx,
                idle_frames,
                eating_frames,
            );
            let probe: Arc<dyn ForegroundProbe> = Arc::new(SystemProbe);
            tauri::async_runtime::spawn(run_event_loop(shell, events_rx, probe));

            Ok(())
        })
        .build(tauri::generate_context!())
        .expect("error while building tauri application")
        .run(|_app_handle, event| {
            // Only prevent exit when it was triggered by a window close (no exit code).
            // Explicit app.exit(0) calls (e.g. from the quit menu) carry a code and must proceed.
            if let tauri::RunEvent::ExitRequested { code, api, .. } = event {
                if code.is_none() {
                    api.prevent_exit();
                }
            }
        });
}

/// The app's single run loop.
///
/// Sleeps until the next timer deadline or the next `AppEvent`, whichever
/// comes first, and handles it to completion before waiting again. The
/// foreground probe blocks on `osascript`, so it runs on the blocking pool and
/// is awaited inline; nothing else is handled while it runs.
async fn run_event_loop(
    mut shell: Shell<TauriSurface>,
    mut events: UnboundedReceiver<AppEvent>,
    probe: Arc<dyn ForegroundProbe>,
) {
    use std::time::Instant;

    shell.start(Instant::now());

    loop {
        let deadline = shell.next_deadline();
        let sleep = async {
            match deadline {
                Some(at) => tokio::time::sleep_until(at.into()).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            event = events.recv() => match event {
                Some(event) => shell.handle_event(event, Instant::now()),
                None => {
                    log::info!("Event channel closed; run loop exiting");
                    break;
                }
            },
            _ = sleep => {
                for id in shell.take_due(Instant::now()) {
                    if id == TimerId::DetectorPoll {
                        let sample = sample_foreground(&probe).await;
                        shell.poll_detector(&sample, Instant::now());
                    } else {
                        shell.handle_timer(
                            id,
                            Instant::now(),
                            chrono::Local::now().naive_local(),
                        );
                    }
                }
            }
        }
    }
}

async fn sample_foreground(probe: &Arc<dyn ForegroundProbe>) -> ForegroundSample {
    let probe = Arc::clone(probe);
    tokio::task::spawn_blocking(move || probe.sample())
        .await
        .unwrap_or_else(|e| {
            log::debug!("Foreground probe task failed: {e}");
            ForegroundSample {
                degraded: true,
                ..Default::default()
            }
        })
}
