use crate::commands::{send_input, AppState};
use crate::shell::{Input, PetAction};
use crate::windows::Secondary;
use tauri::{
    menu::{Menu, MenuItem, PredefinedMenuItem},
    tray::TrayIconBuilder,
    App, AppHandle, Manager,
};

pub fn setup_tray(app: &mut App) -> tauri::Result<()> {
    let show_item = MenuItem::with_id(app, "show", "Show Dog", true, None::<&str>)?;
    let hide_item = MenuItem::with_id(app, "hide", "Hide Dog", true, None::<&str>)?;
    let feed_item = MenuItem::with_id(app, "feed", "Feed Dog", true, None::<&str>)?;
    let calendar_item = MenuItem::with_id(app, "calendar", "Open Calendar", true, None::<&str>)?;
    let separator = PredefinedMenuItem::separator(app)?;
    let quit_item = MenuItem::with_id(app, "quit", "Quit", true, None::<&str>)?;

    let menu = Menu::with_items(
        app,
        &[
            &show_item,
            &hide_item,
            &feed_item,
            &calendar_item,
            &separator,
            &quit_item,
        ],
    )?;

    let mut builder = TrayIconBuilder::new()
        .tooltip("Digital Dog")
        .menu(&menu)
        .on_menu_event(|app, event| match event.id().as_ref() {
            "quit" => {
                log::info!("Quit requested from tray");
                app.exit(0);
            }
            id => {
                if let Some(input) = menu_input(id) {
                    dispatch(app, input);
                }
            }
        });
    match app.default_window_icon() {
        Some(icon) => builder = builder.icon(icon.clone()),
        None => log::warn!("No default window icon; tray icon will be blank"),
    }
    builder.build(app)?;

    Ok(())
}

fn menu_input(id: &str) -> Option<Input> {
    match id {
        "show" => Some(Input::ShowPet),
        "hide" => Some(Input::Action(PetAction::Hide)),
        "feed" => Some(Input::Action(PetAction::Feed)),
        "calendar" => Some(Input::OpenWindow(Secondary::Calendar)),
        _ => None,
    }
}

fn dispatch(app: &AppHandle, input: Input) {
    let state = app.state::<AppState>();
    if let Err(e) = send_input(&state, input) {
        log::warn!("Tray action dropped: {e}");
    }
}
