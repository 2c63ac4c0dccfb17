use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Every timer the run loop knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerId {
    /// Foreground poll for the distraction detector.
    DetectorPoll,
    /// Task due-date check.
    ReminderCheck,
    /// Pet slides out when this fires.
    PetIdle,
    /// Idle animation frame advance.
    IdleFrame,
    /// Eating animation frame advance.
    EatingFrame,
    /// Slide animation step.
    SlideStep,
    /// Dashboard needs depletion.
    NeedsDeplete,
}

#[derive(Debug, Clone)]
struct Timer {
    due: Instant,
    /// `None` for one-shot timers.
    every: Option<Duration>,
}

/// Cooperative timer set. The run loop sleeps until `next_deadline`, then
/// handles everything `take_due` hands back, one at a time.
#[derive(Debug, Default)]
pub struct Scheduler {
    timers: HashMap<TimerId, Timer>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// (Re)starts a repeating timer; the first firing is one interval from `now`.
    pub fn start(&mut self, id: TimerId, every: Duration, now: Instant) {
        self.timers.insert(
            id,
            Timer {
                due: now + every,
                every: Some(every),
            },
        );
    }

    /// (Re)starts a one-shot timer.
    pub fn start_once(&mut self, id: TimerId, after: Duration, now: Instant) {
        self.timers.insert(
            id,
            Timer {
                due: now + after,
                every: None,
            },
        );
    }

    pub fn stop(&mut self, id: TimerId) {
        self.timers.remove(&id);
    }

    #[cfg(test)]
    pub fn is_active(&self, id: TimerId) -> bool {
        self.timers.contains_key(&id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.values().map(|t| t.due).min()
    }

    /// Removes one-shot timers that are due and re-arms repeating ones,
    /// returning their ids in deadline order. A repeating timer that fell
    /// behind fires once and skips the missed ticks.
    pub fn take_due(&mut self, now: Instant) -> Vec<TimerId> {
        let mut due: Vec<(Instant, TimerId)> = self
            .timers
            .iter()
            .filter(|(_, t)| t.due <= now)
            .map(|(id, t)| (t.due, *id))
            .collect();
        due.sort_by_key(|(at, _)| *at);

        for (_, id) in &due {
            let Some(timer) = self.timers.get_mut(id) else {
                continue;
            };
            match timer.every {
                Some(every) => {
                    timer.due += every;
                    if timer.due <= now {
                        timer.due = now + every;
                    }
                }
                None => {
                    self.timers.remove(id);
                }
            }
        }
        due.into_iter().map(|(_, id)| id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn due_timers_come_back_in_deadline_order() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.start(TimerId::DetectorPoll, ms(2000), t0);
        s.start(TimerId::IdleFrame, ms(200), t0);
        s.start_once(TimerId::PetIdle, ms(1000), t0);

        assert_eq!(s.next_deadline(), Some(t0 + ms(200)));
        assert!(s.take_due(t0 + ms(100)).is_empty());
        assert_eq!(
            s.take_due(t0 + ms(2000)),
            vec![TimerId::IdleFrame, TimerId::PetIdle, TimerId::DetectorPoll]
        );
    }

    #[test]
    fn repeating_timers_rearm_and_one_shots_do_not() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.start(TimerId::DetectorPoll, ms(2000), t0);
        s.start_once(TimerId::PetIdle, ms(5000), t0);

        assert_eq!(s.take_due(t0 + ms(2000)), vec![TimerId::DetectorPoll]);
        assert_eq!(s.next_deadline(), Some(t0 + ms(4000)));

        assert_eq!(
            s.take_due(t0 + ms(5000)),
            vec![TimerId::DetectorPoll, TimerId::PetIdle]
        );
        assert!(!s.is_active(TimerId::PetIdle));
        assert!(s.is_active(TimerId::DetectorPoll));
    }

    #[test]
    fn late_repeating_timer_skips_missed_ticks() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.start(TimerId::IdleFrame, ms(200), t0);
        assert_eq!(s.take_due(t0 + ms(1100)), vec![TimerId::IdleFrame]);
        assert_eq!(s.next_deadline(), Some(t0 + ms(1300)));
    }

    #[test]
    fn stopped_and_restarted_timers() {
        let t0 = Instant::now();
        let mut s = Scheduler::new();
        s.start_once(TimerId::PetIdle, ms(5000), t0);
        s.stop(TimerId::PetIdle);
        assert!(s.take_due(t0 + ms(6000)).is_empty());
        assert_eq!(s.next_deadline(), None);

        s.start_once(TimerId::PetIdle, ms(5000), t0);
        s.start_once(TimerId::PetIdle, ms(5000), t0 + ms(3000));
        assert!(s.take_due(t0 + ms(5000)).is_empty());
        assert_eq!(s.take_due(t0 + ms(8000)), vec![TimerId::PetIdle]);
    }
}
