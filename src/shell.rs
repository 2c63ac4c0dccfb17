//! The run-loop side of the app: owns the detector, the task store, the pet
//! and the dashboard needs, and turns `AppEvent`s and timer firings into
//! calls on a `Surface`.

use crate::config::AppConfig;
use crate::detector::{DetectorSettings, Distraction, DistractionDetector};
use crate::frames::Frame;
use crate::needs::Needs;
use crate::pet::{Ctx, PetController};
use crate::probe::ForegroundSample;
use crate::scheduler::{Scheduler, TimerId};
use crate::tasks::{TaskId, TaskNotice, TaskStore};
use crate::windows::{Secondary, Surface};
use chrono::NaiveDateTime;
use serde::Deserialize;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::UnboundedSender;

const NEEDS_DEPLETE_EVERY: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PetAction {
    Feed,
    Walk,
    Play,
    Hide,
}

/// User input from commands, the tray and window events.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    PetReady,
    PointerEnter,
    PointerLeave,
    PointerDown(f64, f64),
    PointerMove(f64, f64),
    PointerUp(f64, f64),
    Action(PetAction),
    DismissReminder,
    ShowPet,
    OpenWindow(Secondary),
    WindowClosed(Secondary),
    OpenTaskManager,
    BackToDashboard,
    DashboardReady,
    TasksRefresh,
    AddTask { description: String, due_at: NaiveDateTime },
    CompleteTask(TaskId),
}

#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    Input(Input),
    Distraction(Distraction),
    TaskNotice(TaskNotice),
}

pub struct Shell<S: Surface> {
    surface: S,
    timers: Scheduler,
    pet: PetController,
    needs: Needs,
    detector: DistractionDetector,
    tasks: TaskStore,
    idle_frames: Vec<Frame>,
    eating_frames: Vec<Frame>,
    poll_every: Duration,
    reminder_every: Duration,
    lead_minutes: i64,
}

impl<S: Surface> Shell<S> {
    /// Builds the shell. The detector and task store report back through
    /// `events`, so their notices are handled on the next loop turn.
    pub fn new(
        config: &AppConfig,
        surface: S,
        events: UnboundedSender<AppEvent>,
        idle_frames: Vec<Frame>,
        eating_frames: Vec<Frame>,
    ) -> Self {
        let tx = events.clone();
        let detector = DistractionDetector::new(
            DetectorSettings::from(config),
            Box::new(move |d| {
                let _ = tx.send(AppEvent::Distraction(d));
            }),
        );
        let tasks = TaskStore::open(
            config.tasks_path(),
            Box::new(move |notice| {
                let _ = events.send(AppEvent::TaskNotice(notice));
            }),
        );
        let pet = PetController::new(
            Duration::from_secs(config.idle_slide_out_seconds),
            idle_frames.len(),
            eating_frames.len(),
        );
        Self {
            surface,
            timers: Scheduler::new(),
            pet,
            needs: Needs::default(),
            detector,
            tasks,
            idle_frames,
            eating_frames,
            poll_every: Duration::from_secs(config.poll_interval_seconds),
            reminder_every: Duration::from_secs(config.reminder_check_seconds),
            lead_minutes: config.reminder_lead_minutes,
        }
    }

    fn with_pet<R>(&mut self, now: Instant, f: impl FnOnce(&mut PetController, &mut Ctx) -> R) -> R {
        let Self {
            pet,
            surface,
            timers,
            ..
        } = self;
        f(pet, &mut Ctx { surface, timers, now })
    }

    pub fn start(&mut self, now: Instant) {
        self.timers.start(TimerId::DetectorPoll, self.poll_every, now);
        self.timers.start(TimerId::ReminderCheck, self.reminder_every, now);
        self.timers.start(TimerId::NeedsDeplete, NEEDS_DEPLETE_EVERY, now);
        self.with_pet(now, |pet, ctx| pet.start(ctx));
        log::info!(
            "Shell started with {} task(s), {} idle and {} eating frame(s)",
            self.tasks.tasks().len(),
            self.idle_frames.len(),
            self.eating_frames.len()
        );
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    pub fn take_due(&mut self, now: Instant) -> Vec<TimerId> {
        self.timers.take_due(now)
    }

    /// Feeds one probe result to the detector.
    pub fn poll_detector(&mut self, sample: &ForegroundSample, now: Instant) {
        self.detector.poll(sample, now);
    }

    /// Handles a fired timer. `DetectorPoll` is the caller's job, since the
    /// probe blocks; see `poll_detector`. `wall` is the local wall-clock time
    /// that task due dates are compared against.
    pub fn handle_timer(&mut self, id: TimerId, now: Instant, wall: NaiveDateTime) {
        match id {
            TimerId::DetectorPoll => {}
            TimerId::ReminderCheck => self.tasks.check_reminders(self.lead_minutes, wall),
            TimerId::PetIdle => {
                self.with_pet(now, |pet, ctx| pet.slide_out(ctx));
            }
            TimerId::IdleFrame => self.with_pet(now, |pet, ctx| pet.advance_idle_frame(ctx)),
            TimerId::EatingFrame => self.with_pet(now, |pet, ctx| pet.advance_eating_frame(ctx)),
            TimerId::SlideStep => self.with_pet(now, |pet, ctx| pet.step_slide(ctx)),
            TimerId::NeedsDeplete => {
                self.needs.deplete();
                if self.pet.is_open(Secondary::Dashboard) {
                    self.surface.publish_needs(&self.needs);
                }
            }
        }
    }

    pub fn handle_event(&mut self, event: AppEvent, now: Instant) {
        match event {
            AppEvent::Input(input) => self.handle_input(input, now),
            AppEvent::Distraction(d) => {
                let message = self.detector.settings().message_for(&d).to_string();
                log::info!("Distraction reaction (app={:?}, url={:?})", d.app, d.url);
                self.surface.notify(&message);
                if self.pet.is_visible() {
                    self.with_pet(now, |pet, ctx| pet.show_reminder(ctx, &message));
                }
            }
            AppEvent::TaskNotice(notice) => {
                log::info!("Task reminder: {}", notice.text());
                self.surface.notify(notice.text());
                self.with_pet(now, |pet, ctx| pet.show_reminder(ctx, notice.text()));
            }
        }
    }

    fn handle_input(&mut self, input: Input, now: Instant) {
        match input {
            Input::PetReady => {
                self.surface
                    .publish_frames(&self.idle_frames, &self.eating_frames);
                self.with_pet(now, |pet, ctx| pet.resync(ctx));
            }
            Input::PointerEnter => self.with_pet(now, |pet, ctx| pet.pointer_enter(ctx)),
            Input::PointerLeave => self.with_pet(now, |pet, ctx| pet.pointer_leave(ctx)),
            Input::PointerDown(x, y) => self.with_pet(now, |pet, ctx| pet.pointer_down(ctx, (x, y))),
            Input::PointerMove(x, y) => self.with_pet(now, |pet, ctx| pet.pointer_move(ctx, (x, y))),
            Input::PointerUp(x, y) => {
                if let Some(gesture) = self.with_pet(now, |pet, ctx| pet.pointer_up(ctx, (x, y))) {
                    log::debug!("Pet {gesture:?}");
                }
            }
            Input::Action(action) => self.act(action, now),
            Input::DismissReminder => self.with_pet(now, |pet, ctx| pet.dismiss_reminder(ctx)),
            Input::ShowPet => self.with_pet(now, |pet, ctx| pet.show(ctx)),
            Input::OpenWindow(window) => {
                self.with_pet(now, |pet, ctx| pet.open_window(ctx, window));
            }
            Input::WindowClosed(window) => {
                if window == Secondary::TaskManager {
                    self.save_tasks();
                }
                self.with_pet(now, |pet, ctx| pet.window_closed(ctx, window));
            }
            Input::OpenTaskManager => {
                self.with_pet(now, |pet, ctx| {
                    pet.close_window(ctx, Secondary::Dashboard);
                    pet.open_window(ctx, Secondary::TaskManager);
                });
                self.surface.publish_tasks(self.tasks.tasks());
            }
            Input::BackToDashboard => {
                self.save_tasks();
                self.with_pet(now, |pet, ctx| {
                    pet.close_window(ctx, Secondary::TaskManager);
                    pet.open_window(ctx, Secondary::Dashboard);
                });
                self.surface.publish_needs(&self.needs);
            }
            Input::DashboardReady => self.surface.publish_needs(&self.needs),
            Input::TasksRefresh => {
                let tasks = self.tasks.load_all();
                self.surface.publish_tasks(&tasks);
            }
            Input::AddTask {
                description,
                due_at,
            } => {
                match self.tasks.add(&description, due_at) {
                    Ok(id) => log::info!("Added task {id:?}"),
                    Err(e) => log::warn!("Rejected task: {e}"),
                }
                self.surface.publish_tasks(self.tasks.tasks());
            }
            Input::CompleteTask(id) => {
                if let Err(e) = self.tasks.mark_complete(id) {
                    log::warn!("Failed to complete task: {e}");
                }
                self.surface.publish_tasks(self.tasks.tasks());
            }
        }
    }

    fn act(&mut self, action: PetAction, now: Instant) {
        match action {
            PetAction::Feed => {
                self.with_pet(now, |pet, ctx| pet.feed(ctx));
                self.needs.feed();
            }
            PetAction::Walk => self.needs.walk(),
            PetAction::Play => self.needs.play(),
            PetAction::Hide => {
                self.with_pet(now, |pet, ctx| pet.hide(ctx));
                return;
            }
        }
        self.surface.publish_needs(&self.needs);
    }

    fn save_tasks(&self) {
        if let Err(e) = self.tasks.save() {
            log::error!("Failed to save tasks to {}: {e}", self.tasks.path().display());
        }
    }
}
