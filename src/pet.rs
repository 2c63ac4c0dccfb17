//! The pet overlay: position, slide animation, hover controls, drag-vs-click,
//! the reminder bubble and the frame animations.
//!
//! Everything here is driven by the shell's run loop. Window work goes
//! through a `Surface`; timing goes through the `Scheduler`.

use crate::scheduler::{Scheduler, TimerId};
use crate::windows::{Animation, Secondary, Surface};
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// Logical size of the (square) pet window.
pub const PET_SIZE: f64 = 220.0;
const EDGE_MARGIN: f64 = 10.0;

const SLIDE_DURATION: Duration = Duration::from_millis(500);
const SLIDE_STEP: Duration = Duration::from_millis(16);
const IDLE_FRAME_EVERY: Duration = Duration::from_millis(200);
const EATING_FRAME_EVERY: Duration = Duration::from_millis(120);

/// A press/release pair is a click below both limits, otherwise a drag.
const CLICK_MAX_TRAVEL: f64 = 5.0;
const CLICK_MAX_ELAPSED: Duration = Duration::from_millis(200);

/// Borrowed run-loop state handed to every controller call.
pub struct Ctx<'a> {
    pub surface: &'a mut dyn Surface,
    pub timers: &'a mut Scheduler,
    pub now: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Click,
    Drag,
}

pub fn classify_gesture(travel: f64, elapsed: Duration) -> Gesture {
    if travel < CLICK_MAX_TRAVEL && elapsed < CLICK_MAX_ELAPSED {
        Gesture::Click
    } else {
        Gesture::Drag
    }
}

#[derive(Debug, Clone, Copy)]
struct Slide {
    from: (f64, f64),
    to: (f64, f64),
    started: Instant,
    hide_when_done: bool,
}

impl Slide {
    /// Position at `now` and whether the slide has finished.
    fn position_at(&self, now: Instant) -> ((f64, f64), bool) {
        let t = now.saturating_duration_since(self.started).as_secs_f64() / SLIDE_DURATION.as_secs_f64();
        if t >= 1.0 {
            return (self.to, true);
        }
        let lerp = |a: f64, b: f64| a + (b - a) * t;
        ((lerp(self.from.0, self.to.0), lerp(self.from.1, self.to.1)), false)
    }
}

#[derive(Debug, Clone, Copy)]
struct Press {
    cursor: (f64, f64),
    window: (f64, f64),
    at: Instant,
}

pub struct PetController {
    visible: bool,
    position: (f64, f64),
    hovered: bool,
    press: Option<Press>,
    reminder: Option<String>,
    slide: Option<Slide>,
    open_windows: HashSet<Secondary>,
    idle_after: Duration,
    idle_frames: usize,
    eating_frames: usize,
    frame: usize,
    eating: Option<usize>,
}

impl PetController {
    pub fn new(idle_after: Duration, idle_frames: usize, eating_frames: usize) -> Self {
        Self {
            visible: false,
            position: (0.0, EDGE_MARGIN),
            hovered: false,
            press: None,
            reminder: None,
            slide: None,
            open_windows: HashSet::new(),
            idle_after,
            idle_frames,
            eating_frames,
            frame: 0,
            eating: None,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    #[cfg(test)]
    pub fn position(&self) -> (f64, f64) {
        self.position
    }

    #[cfg(test)]
    pub fn reminder(&self) -> Option<&str> {
        self.reminder.as_deref()
    }

    pub fn is_open(&self, window: Secondary) -> bool {
        self.open_windows.contains(&window)
    }

    /// Parks the (hidden) pet at the top-right corner and starts the idle animation.
    pub fn start(&mut self, ctx: &mut Ctx) {
        let (screen_w, _) = ctx.surface.screen_size();
        self.position = (screen_w - PET_SIZE - EDGE_MARGIN, EDGE_MARGIN);
        ctx.surface.move_pet(self.position.0, self.position.1);
        if self.idle_frames > 0 {
            ctx.timers.start(TimerId::IdleFrame, IDLE_FRAME_EVERY, ctx.now);
        }
    }

    /// Re-sends everything the pet webview renders, after it (re)loads.
    pub fn resync(&self, ctx: &mut Ctx) {
        match self.eating {
            Some(i) => ctx.surface.show_frame(Animation::Eating, i.saturating_sub(1)),
            None => ctx.surface.show_frame(Animation::Idle, self.frame),
        }
        ctx.surface.set_bubble(self.reminder.as_deref());
        ctx.surface.set_buttons_visible(self.hovered);
    }

    /// The idle slide-out is held off while a reminder is up, while the pet
    /// is pressed or hovered, and while the dashboard or task manager is open.
    fn idle_blocked(&self) -> bool {
        !self.visible
            || self.reminder.is_some()
            || self.press.is_some()
            || self.hovered
            || self.is_open(Secondary::Dashboard)
            || self.is_open(Secondary::TaskManager)
    }

    fn arm_idle(&self, ctx: &mut Ctx) {
        if self.idle_blocked() {
            ctx.timers.stop(TimerId::PetIdle);
        } else {
            ctx.timers.start_once(TimerId::PetIdle, self.idle_after, ctx.now);
        }
    }

    fn side(&self, screen_w: f64) -> Side {
        if self.position.0 + PET_SIZE / 2.0 < screen_w / 2.0 {
            Side::Left
        } else {
            Side::Right
        }
    }

    fn begin_slide(&mut self, ctx: &mut Ctx, to: (f64, f64), hide_when_done: bool) {
        self.slide = Some(Slide {
            from: self.position,
            to,
            started: ctx.now,
            hide_when_done,
        });
        ctx.timers.start(TimerId::SlideStep, SLIDE_STEP, ctx.now);
    }

    fn cancel_slide(&mut self, ctx: &mut Ctx) {
        self.slide = None;
        ctx.timers.stop(TimerId::SlideStep);
    }

    /// Tray "Show Dog".
    pub fn show(&mut self, ctx: &mut Ctx) {
        self.slide_in(ctx);
    }

    /// Tray "Hide Dog" and the Hide button.
    pub fn hide(&mut self, ctx: &mut Ctx) {
        self.cancel_slide(ctx);
        self.visible = false;
        self.hovered = false;
        self.press = None;
        ctx.surface.hide_pet();
        ctx.timers.stop(TimerId::PetIdle);
    }

    /// Slides in from the nearer screen edge.
    pub fn slide_in(&mut self, ctx: &mut Ctx) {
        let (screen_w, screen_h) = ctx.surface.screen_size();
        let y = self.position.1;
        let end_y = if (0.0..=screen_h - PET_SIZE).contains(&y) {
            y
        } else {
            EDGE_MARGIN
        };
        let (start_x, end_x) = match self.side(screen_w) {
            Side::Left => (-PET_SIZE, EDGE_MARGIN),
            Side::Right => (screen_w, screen_w - PET_SIZE - EDGE_MARGIN),
        };
        self.position = (start_x, end_y);
        self.visible = true;
        ctx.surface.move_pet(start_x, end_y);
        ctx.surface.show_pet();
        self.begin_slide(ctx, (end_x, end_y), false);
        self.arm_idle(ctx);
    }

    /// Slides off the nearer edge and hides. Refused while the idle slide-out
    /// is blocked; returns whether it started.
    pub fn slide_out(&mut self, ctx: &mut Ctx) -> bool {
        if self.idle_blocked() {
            log::debug!("Slide-out suppressed");
            ctx.timers.stop(TimerId::PetIdle);
            return false;
        }
        let (screen_w, _) = ctx.surface.screen_size();
        let end_x = match self.side(screen_w) {
            Side::Left => -PET_SIZE,
            Side::Right => screen_w,
        };
        self.begin_slide(ctx, (end_x, self.position.1), true);
        ctx.timers.stop(TimerId::PetIdle);
        true
    }

    /// `SlideStep` timer.
    pub fn step_slide(&mut self, ctx: &mut Ctx) {
        let Some(slide) = self.slide else {
            ctx.timers.stop(TimerId::SlideStep);
            return;
        };
        let (pos, done) = slide.position_at(ctx.now);
        self.position = pos;
        ctx.surface.move_pet(pos.0, pos.1);
        if done {
            self.cancel_slide(ctx);
            if slide.hide_when_done {
                self.visible = false;
                ctx.surface.hide_pet();
            }
        }
    }

    pub fn pointer_enter(&mut self, ctx: &mut Ctx) {
        self.hovered = true;
        if self.slide.is_some_and(|s| s.hide_when_done) {
            self.cancel_slide(ctx);
        }
        if !self.visible {
            self.visible = true;
            ctx.surface.show_pet();
        }
        let (screen_w, _) = ctx.surface.screen_size();
        if self.position.0 < 0.0 {
            self.position.0 = EDGE_MARGIN;
            ctx.surface.move_pet(self.position.0, self.position.1);
        } else if self.position.0 + PET_SIZE > screen_w {
            self.position.0 = screen_w - PET_SIZE - EDGE_MARGIN;
            ctx.surface.move_pet(self.position.0, self.position.1);
        }
        ctx.surface.set_buttons_visible(true);
        ctx.timers.stop(TimerId::PetIdle);
    }

    pub fn pointer_leave(&mut self, ctx: &mut Ctx) {
        self.hovered = false;
        ctx.surface.set_buttons_visible(false);
        self.arm_idle(ctx);
    }

    pub fn pointer_down(&mut self, ctx: &mut Ctx, cursor: (f64, f64)) {
        self.cancel_slide(ctx);
        self.press = Some(Press {
            cursor,
            window: self.position,
            at: ctx.now,
        });
        ctx.timers.stop(TimerId::PetIdle);
    }

    pub fn pointer_move(&mut self, ctx: &mut Ctx, cursor: (f64, f64)) {
        if let Some(press) = self.press {
            self.position = (
                press.window.0 + cursor.0 - press.cursor.0,
                press.window.1 + cursor.1 - press.cursor.1,
            );
            ctx.surface.move_pet(self.position.0, self.position.1);
        }
    }

    /// Ends a press. A click opens the dashboard; a drag re-arms the idle timer.
    pub fn pointer_up(&mut self, ctx: &mut Ctx, cursor: (f64, f64)) -> Option<Gesture> {
        let press = self.press.take()?;
        let travel = (cursor.0 - press.cursor.0).abs() + (cursor.1 - press.cursor.1).abs();
        let gesture = classify_gesture(travel, ctx.now.saturating_duration_since(press.at));
        match gesture {
            Gesture::Click => self.open_window(ctx, Secondary::Dashboard),
            Gesture::Drag => self.arm_idle(ctx),
        }
        Some(gesture)
    }

    pub fn open_window(&mut self, ctx: &mut Ctx, window: Secondary) {
        self.open_windows.insert(window);
        ctx.surface.show_window(window);
        self.arm_idle(ctx);
    }

    pub fn close_window(&mut self, ctx: &mut Ctx, window: Secondary) {
        self.open_windows.remove(&window);
        ctx.surface.hide_window(window);
        self.arm_idle(ctx);
    }

    /// Bookkeeping for a window the user closed themselves.
    pub fn window_closed(&mut self, ctx: &mut Ctx, window: Secondary) {
        self.open_windows.remove(&window);
        self.arm_idle(ctx);
    }

    /// Slides the pet in with a speech bubble that stays until dismissed.
    pub fn show_reminder(&mut self, ctx: &mut Ctx, text: &str) {
        self.reminder = Some(text.to_string());
        self.slide_in(ctx);
        ctx.surface.set_bubble(Some(text));
    }

    pub fn dismiss_reminder(&mut self, ctx: &mut Ctx) {
        self.reminder = None;
        ctx.surface.set_bubble(None);
        self.arm_idle(ctx);
    }

    /// Plays the eating animation once, pausing the idle animation.
    pub fn feed(&mut self, ctx: &mut Ctx) {
        if self.eating_frames == 0 {
            ctx.surface.show_frame(Animation::Idle, self.frame);
            return;
        }
        ctx.timers.stop(TimerId::IdleFrame);
        self.eating = Some(0);
        ctx.timers.start(TimerId::EatingFrame, EATING_FRAME_EVERY, ctx.now);
    }

    /// `IdleFrame` timer.
    pub fn advance_idle_frame(&mut self, ctx: &mut Ctx) {
        if self.idle_frames == 0 {
            return;
        }
        self.frame = (self.frame + 1) % self.idle_frames;
        ctx.surface.show_frame(Animation::Idle, self.frame);
    }

    /// `EatingFrame` timer.
    pub fn advance_eating_frame(&mut self, ctx: &mut Ctx) {
        let Some(i) = self.eating else {
            ctx.timers.stop(TimerId::EatingFrame);
            return;
        };
        if i < self.eating_frames {
            ctx.surface.show_frame(Animation::Eating, i);
            self.eating = Some(i + 1);
        } else {
            self.eating = None;
            ctx.timers.stop(TimerId::EatingFrame);
            if self.idle_frames > 0 {
                ctx.timers.start(TimerId::IdleFrame, IDLE_FRAME_EVERY, ctx.now);
            }
            ctx.surface.show_frame(Animation::Idle, self.frame);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::frames::Frame;
    use crate::needs::Needs;
    use crate::tasks::Task;

    #[derive(Debug, Clone, PartialEq)]
    pub enum Call {
        Show,
        Hide,
        Move(f64, f64),
        Buttons(bool),
        Bubble(Option<String>),
        Frame(Animation, usize),
        Frames(usize, usize),
        OpenWindow(Secondary),
        CloseWindow(Secondary),
        Notify(String),
        Tasks(Vec<String>),
        Needs,
    }

    #[derive(Default)]
    pub struct FakeSurface {
        pub calls: Vec<Call>,
    }

    impl FakeSurface {
        pub fn take(&mut self) -> Vec<Call> {
            std::mem::take(&mut self.calls)
        }
    }

    impl Surface for FakeSurface {
        fn screen_size(&self) -> (f64, f64) {
            (1000.0, 800.0)
        }
        fn show_pet(&mut self) {
            self.calls.push(Call::Show);
        }
        fn hide_pet(&mut self) {
            self.calls.push(Call::Hide);
        }
        fn move_pet(&mut self, x: f64, y: f64) {
            self.calls.push(Call::Move(x, y));
        }
        fn set_buttons_visible(&mut self, visible: bool) {
            self.calls.push(Call::Buttons(visible));
        }
        fn set_bubble(&mut self, text: Option<&str>) {
            self.calls.push(Call::Bubble(text.map(String::from)));
        }
        fn show_frame(&mut self, animation: Animation, index: usize) {
            self.calls.push(Call::Frame(animation, index));
        }
        fn publish_frames(&mut self, idle: &[Frame], eating: &[Frame]) {
            self.calls.push(Call::Frames(idle.len(), eating.len()));
        }
        fn show_window(&mut self, window: Secondary) {
            self.calls.push(Call::OpenWindow(window));
        }
        fn hide_window(&mut self, window: Secondary) {
            self.calls.push(Call::CloseWindow(window));
        }
        fn notify(&mut self, body: &str) {
            self.calls.push(Call::Notify(body.to_string()));
        }
        fn publish_tasks(&mut self, tasks: &[Task]) {
            self.calls
                .push(Call::Tasks(tasks.iter().map(|t| t.description.clone()).collect()));
        }
        fn publish_needs(&mut self, _needs: &Needs) {
            self.calls.push(Call::Needs);
        }
    }

    struct Rig {
        pet: PetController,
        surface: FakeSurface,
        timers: Scheduler,
        t0: Instant,
    }

    impl Rig {
        fn new(idle_frames: usize, eating_frames: usize) -> Self {
            let mut rig = Self {
                pet: PetController::new(Duration::from_secs(5), idle_frames, eating_frames),
                surface: FakeSurface::default(),
                timers: Scheduler::new(),
                t0: Instant::now(),
            };
            rig.with(0, |pet, ctx| pet.start(ctx));
            rig
        }

        fn with<R>(&mut self, ms: u64, f: impl FnOnce(&mut PetController, &mut Ctx) -> R) -> R {
            let mut ctx = Ctx {
                surface: &mut self.surface,
                timers: &mut self.timers,
                now: self.t0 + Duration::from_millis(ms),
            };
            f(&mut self.pet, &mut ctx)
        }

        /// Runs every due timer up to `ms`, the way the shell does.
        fn run_until(&mut self, ms: u64) -> Vec<TimerId> {
            let now = self.t0 + Duration::from_millis(ms);
            let fired = self.timers.take_due(now);
            for id in &fired {
                let mut ctx = Ctx {
                    surface: &mut self.surface,
                    timers: &mut self.timers,
                    now,
                };
                match id {
                    TimerId::PetIdle => {
                        self.pet.slide_out(&mut ctx);
                    }
                    TimerId::SlideStep => self.pet.step_slide(&mut ctx),
                    TimerId::IdleFrame => self.pet.advance_idle_frame(&mut ctx),
                    TimerId::EatingFrame => self.pet.advance_eating_frame(&mut ctx),
                    _ => {}
                }
            }
            fired
        }
    }

    #[test]
    fn starts_hidden_at_top_right() {
        let rig = Rig::new(0, 0);
        assert!(!rig.pet.is_visible());
        assert_eq!(rig.pet.position(), (1000.0 - PET_SIZE - 10.0, 10.0));
        assert_eq!(rig.surface.calls, vec![Call::Move(770.0, 10.0)]);
    }

    #[test]
    fn show_slides_in_from_right_then_idles_out() {
        let mut rig = Rig::new(0, 0);
        rig.surface.take();
        rig.with(0, |pet, ctx| pet.show(ctx));
        assert_eq!(rig.surface.take()[..2], [Call::Move(1000.0, 10.0), Call::Show]);

        rig.run_until(600);
        assert_eq!(rig.pet.position(), (770.0, 10.0));
        assert!(!rig.timers.is_active(TimerId::SlideStep));

        assert!(rig.run_until(5000).contains(&TimerId::PetIdle));
        rig.run_until(5600);
        assert!(!rig.pet.is_visible());
        assert_eq!(rig.pet.position(), (1000.0, 10.0));
        assert_eq!(rig.surface.calls.last(), Some(&Call::Hide));
    }

    #[test]
    fn pet_on_left_half_slides_from_left_edge() {
        let mut rig = Rig::new(0, 0);
        rig.with(0, |pet, ctx| {
            pet.pointer_down(ctx, (900.0, 50.0));
            pet.pointer_move(ctx, (300.0, 50.0));
        });
        rig.with(400, |pet, ctx| {
            pet.pointer_up(ctx, (300.0, 50.0));
            pet.slide_in(ctx);
        });
        rig.run_until(1000);
        assert_eq!(rig.pet.position(), (10.0, 10.0));
    }

    #[test]
    fn reminder_blocks_idle_slide_out_until_dismissed() {
        let mut rig = Rig::new(0, 0);
        rig.with(0, |pet, ctx| pet.show_reminder(ctx, "Task 'Rent' is due!"));
        assert!(rig.pet.is_visible());
        assert!(!rig.timers.is_active(TimerId::PetIdle));
        assert!(rig
            .surface
            .calls
            .contains(&Call::Bubble(Some("Task 'Rent' is due!".into()))));

        rig.run_until(60_000);
        assert!(rig.pet.is_visible());

        // Even a stray idle firing is refused.
        assert!(!rig.with(60_000, |pet, ctx| pet.slide_out(ctx)));

        rig.with(61_000, |pet, ctx| pet.dismiss_reminder(ctx));
        assert_eq!(rig.pet.reminder(), None);
        assert!(rig.run_until(66_000).contains(&TimerId::PetIdle));
        rig.run_until(67_000);
        assert!(!rig.pet.is_visible());
    }

    #[test]
    fn quick_small_press_is_a_click_that_opens_the_dashboard() {
        let mut rig = Rig::new(0, 0);
        rig.with(0, |pet, ctx| pet.show(ctx));
        rig.run_until(600);
        rig.with(1000, |pet, ctx| pet.pointer_down(ctx, (800.0, 100.0)));
        let gesture = rig.with(1150, |pet, ctx| pet.pointer_up(ctx, (802.0, 102.0)));
        assert_eq!(gesture, Some(Gesture::Click));
        assert!(rig.pet.is_open(Secondary::Dashboard));
        assert!(rig.surface.calls.contains(&Call::OpenWindow(Secondary::Dashboard)));

        // Dashboard open: no slide-out.
        rig.run_until(20_000);
        assert!(rig.pet.is_visible());

        rig.with(20_000, |pet, ctx| pet.window_closed(ctx, Secondary::Dashboard));
        assert!(rig.timers.is_active(TimerId::PetIdle));
    }

    #[test]
    fn slow_or_long_presses_are_drags() {
        assert_eq!(classify_gesture(4.9, Duration::from_millis(199)), Gesture::Click);
        assert_eq!(classify_gesture(5.0, Duration::from_millis(10)), Gesture::Drag);
        assert_eq!(classify_gesture(0.0, Duration::from_millis(200)), Gesture::Drag);

        let mut rig = Rig::new(0, 0);
        rig.with(0, |pet, ctx| pet.show(ctx));
        rig.run_until(600);
        rig.with(1000, |pet, ctx| pet.pointer_down(ctx, (800.0, 100.0)));
        // Dragging: the idle timer is off no matter how long it takes.
        assert!(!rig.timers.is_active(TimerId::PetIdle));
        rig.with(1100, |pet, ctx| pet.pointer_move(ctx, (700.0, 150.0)));
        assert_eq!(rig.pet.position(), (670.0, 60.0));
        rig.run_until(9000);
        assert!(rig.pet.is_visible());

        let gesture = rig.with(9000, |pet, ctx| pet.pointer_up(ctx, (700.0, 150.0)));
        assert_eq!(gesture, Some(Gesture::Drag));
        assert!(!rig.pet.is_open(Secondary::Dashboard));
        assert!(rig.timers.is_active(TimerId::PetIdle));
    }

    #[test]
    fn hover_shows_buttons_and_recovers_offscreen_pet() {
        let mut rig = Rig::new(0, 0);
        rig.with(0, |pet, ctx| pet.show(ctx));
        rig.run_until(600);
        rig.run_until(5600);
        rig.run_until(6200);
        assert!(!rig.pet.is_visible());

        rig.surface.take();
        rig.with(7000, |pet, ctx| pet.pointer_enter(ctx));
        assert!(rig.pet.is_visible());
        assert_eq!(rig.pet.position(), (770.0, 10.0));
        assert!(rig.surface.calls.contains(&Call::Buttons(true)));
        assert!(!rig.timers.is_active(TimerId::PetIdle));

        rig.with(8000, |pet, ctx| pet.pointer_leave(ctx));
        assert!(rig.timers.is_active(TimerId::PetIdle));
    }

    #[test]
    fn task_manager_blocks_idle_but_calendar_does_not() {
        let mut rig = Rig::new(0, 0);
        rig.with(0, |pet, ctx| pet.show(ctx));
        rig.with(100, |pet, ctx| pet.open_window(ctx, Secondary::TaskManager));
        assert!(!rig.timers.is_active(TimerId::PetIdle));
        rig.with(200, |pet, ctx| pet.close_window(ctx, Secondary::TaskManager));
        rig.with(300, |pet, ctx| pet.open_window(ctx, Secondary::Calendar));
        assert!(rig.timers.is_active(TimerId::PetIdle));
    }

    #[test]
    fn feeding_plays_eating_frames_then_resumes_idle() {
        let mut rig = Rig::new(3, 2);
        rig.with(0, |pet, ctx| pet.feed(ctx));
        assert!(!rig.timers.is_active(TimerId::IdleFrame));
        rig.surface.take();

        rig.run_until(120);
        rig.run_until(240);
        rig.run_until(360);
        assert_eq!(
            rig.surface.take(),
            vec![
                Call::Frame(Animation::Eating, 0),
                Call::Frame(Animation::Eating, 1),
                Call::Frame(Animation::Idle, 0),
            ]
        );
        assert!(rig.timers.is_active(TimerId::IdleFrame));
        assert!(!rig.timers.is_active(TimerId::EatingFrame));

        rig.run_until(560);
        assert_eq!(rig.surface.take(), vec![Call::Frame(Animation::Idle, 1)]);
    }

    #[test]
    fn idle_animation_wraps_around() {
        let mut rig = Rig::new(2, 0);
        rig.surface.take();
        rig.run_until(200);
        rig.run_until(400);
        assert_eq!(
            rig.surface.take(),
            vec![Call::Frame(Animation::Idle, 1), Call::Frame(Animation::Idle, 0)]
        );
    }
}
