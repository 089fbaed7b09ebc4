//! Reminder logic for sustained bad readings.
//!
//! A [`Monitor`] consumes one good/bad [reading](Monitor::observe) per tick and decides when the
//! user should be interrupted with a reminder. Interruptions are gated twice: the recent reading
//! history must be mostly bad (a single noisy frame is not enough), *and* the current bad streak
//! must have lasted a minimum duration (a brief lean towards the screen is not enough).
//!
//! Once a reminder has been surfaced, the user's choice is fed back in via [`Monitor::resolve`]:
//! *snooze* suppresses everything for ten minutes, *acknowledge* suppresses further reminders
//! until the condition recovers and goes bad again.

use std::time::{Duration, Instant};

/// Number of readings kept in the history window.
pub const HISTORY_LEN: usize = 5;

/// Minimum number of bad readings in the history window before a reminder fires.
pub const MIN_RECENT_BAD: usize = 4;

/// Minimum duration of an uninterrupted bad streak before a reminder fires.
pub const MIN_STREAK_DURATION: Duration = Duration::from_secs(30);

/// How long a snoozed monitor stays quiet.
pub const SNOOZE_DURATION: Duration = Duration::from_secs(600);

#[derive(Debug, Clone, Copy)]
struct Reading {
    bad: bool,
}

/// Fixed-capacity FIFO over the most recent [`HISTORY_LEN`] readings.
#[derive(Debug)]
struct History {
    slots: [Option<Reading>; HISTORY_LEN],
    /// Next slot to overwrite. The oldest reading lives here once the buffer is full.
    head: usize,
    len: usize,
}

impl History {
    fn new() -> Self {
        Self {
            slots: [None; HISTORY_LEN],
            head: 0,
            len: 0,
        }
    }

    fn push(&mut self, reading: Reading) {
        self.slots[self.head] = Some(reading);
        self.head = (self.head + 1) % HISTORY_LEN;
        self.len = (self.len + 1).min(HISTORY_LEN);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.len
    }

    fn count_bad(&self) -> usize {
        self.slots
            .iter()
            .flatten()
            .filter(|reading| reading.bad)
            .count()
    }
}

/// The user's answer to a reminder prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReminderResponse {
    /// "Remind me later": suppress all monitoring for [`SNOOZE_DURATION`].
    Snooze,
    /// "OK": dismiss this reminder; stay quiet until the condition recovers and recurs.
    Acknowledge,
}

/// Observable monitor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No bad streak in progress.
    Idle,
    /// A bad streak is in progress but has not yet crossed the reminder gates.
    Tracking,
    /// A reminder has been surfaced; awaiting user response or condition recovery.
    Notified,
    /// Reminders (and all upstream processing) are suppressed until a deadline.
    Snoozed,
}

/// What the caller should do after feeding a reading to the monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Decision {
    /// Nothing to do this tick.
    Quiet,
    /// The bad condition has persisted; surface a reminder to the user.
    Remind,
}

/// Debounce/snooze state machine for one monitored condition.
#[derive(Debug)]
pub struct Monitor {
    history: History,
    /// Start of the current contiguous run of bad readings. Cleared by any good reading; a tick
    /// without a usable reading leaves it untouched.
    bad_streak_start: Option<Instant>,
    notified: bool,
    snoozed_until: Option<Instant>,
}

impl Monitor {
    /// Creates a monitor with no history, in the [`State::Idle`] state.
    pub fn new() -> Self {
        Self {
            history: History::new(),
            bad_streak_start: None,
            notified: false,
            snoozed_until: None,
        }
    }

    /// Returns whether the monitor is snoozed at time `now`.
    ///
    /// While snoozed, the driver must skip the tick entirely (no capture, no inference) instead of
    /// calling [`Monitor::observe`].
    pub fn is_snoozed(&self, now: Instant) -> bool {
        self.snoozed_until.map_or(false, |until| now < until)
    }

    /// Returns the current [`State`] as of time `now`.
    pub fn state(&self, now: Instant) -> State {
        if self.is_snoozed(now) {
            State::Snoozed
        } else if self.notified {
            State::Notified
        } else if self.bad_streak_start.is_some() {
            State::Tracking
        } else {
            State::Idle
        }
    }

    /// Feeds one reading into the monitor.
    ///
    /// Ticks without a usable reading (no detection, degenerate geometry) must not call this:
    /// absent data neither extends nor resets a streak.
    pub fn observe(&mut self, now: Instant, bad: bool) -> Decision {
        if self.is_snoozed(now) {
            return Decision::Quiet;
        }

        self.history.push(Reading { bad });

        if !bad {
            self.bad_streak_start = None;
            self.notified = false;
            return Decision::Quiet;
        }

        let streak_start = *self.bad_streak_start.get_or_insert(now);
        let elapsed = now.saturating_duration_since(streak_start);
        let recent_bad = self.history.count_bad();

        if recent_bad >= MIN_RECENT_BAD && elapsed >= MIN_STREAK_DURATION && !self.notified {
            self.notified = true;
            Decision::Remind
        } else {
            Decision::Quiet
        }
    }

    /// Applies the user's response to a previously surfaced reminder.
    pub fn resolve(&mut self, response: ReminderResponse, now: Instant) {
        match response {
            ReminderResponse::Snooze => {
                self.snoozed_until = Some(now + SNOOZE_DURATION);
                self.notified = true;
            }
            ReminderResponse::Acknowledge => {
                self.notified = true;
            }
        }
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    /// Feeds `monitor` a reading `s` seconds after `t0`.
    fn feed(monitor: &mut Monitor, t0: Instant, s: u64, bad: bool) -> Decision {
        monitor.observe(t0 + secs(s), bad)
    }

    #[test]
    fn reminds_after_sustained_bad() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        assert_eq!(feed(&mut monitor, t0, 0, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 10, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 20, true), Decision::Quiet);
        // 4 bad readings in the window and 30 seconds of streak: both gates pass.
        assert_eq!(feed(&mut monitor, t0, 30, true), Decision::Remind);
        assert_eq!(monitor.state(t0 + secs(30)), State::Notified);
    }

    #[test]
    fn reminds_with_one_good_reading_in_window() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        // The good reading comes first so that it does not reset the streak.
        assert_eq!(feed(&mut monitor, t0, 0, false), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 10, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 20, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 30, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 40, true), Decision::Remind);
    }

    #[test]
    fn no_reminder_with_three_bad_in_window() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        // Alternate so the window never holds more than 3 bad readings.
        let pattern = [true, true, false, true, false, true, false, true, false];
        for (i, &bad) in pattern.iter().enumerate() {
            assert_eq!(
                feed(&mut monitor, t0, i as u64 * 20, bad),
                Decision::Quiet,
                "reading #{i}",
            );
        }
    }

    #[test]
    fn no_reminder_before_min_streak_duration() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        for i in 0..5 {
            assert_eq!(feed(&mut monitor, t0, i * 3, true), Decision::Quiet);
        }
        assert_eq!(monitor.state(t0 + secs(12)), State::Tracking);
    }

    #[test]
    fn snooze_suppresses_reminders() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        for i in 0..3 {
            let _ = feed(&mut monitor, t0, i * 10, true);
        }
        assert_eq!(feed(&mut monitor, t0, 30, true), Decision::Remind);
        monitor.resolve(ReminderResponse::Snooze, t0 + secs(30));

        assert!(monitor.is_snoozed(t0 + secs(31)));
        assert!(monitor.is_snoozed(t0 + secs(629)));
        assert_eq!(monitor.state(t0 + secs(31)), State::Snoozed);
        // Even if readings do arrive while snoozed, they are ignored.
        assert_eq!(feed(&mut monitor, t0, 100, true), Decision::Quiet);

        // The snooze deadline is exclusive.
        assert!(!monitor.is_snoozed(t0 + secs(630)));
    }

    #[test]
    fn acknowledge_holds_until_recovery() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        for i in 0..3 {
            let _ = feed(&mut monitor, t0, i * 10, true);
        }
        assert_eq!(feed(&mut monitor, t0, 30, true), Decision::Remind);
        monitor.resolve(ReminderResponse::Acknowledge, t0 + secs(30));

        // The streak continues, but no further reminders fire.
        assert_eq!(feed(&mut monitor, t0, 40, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 50, true), Decision::Quiet);
        assert_eq!(monitor.state(t0 + secs(50)), State::Notified);

        // Recovery clears the notification; a fresh qualifying streak reminds again.
        assert_eq!(feed(&mut monitor, t0, 60, false), Decision::Quiet);
        assert_eq!(monitor.state(t0 + secs(60)), State::Idle);
        assert_eq!(feed(&mut monitor, t0, 70, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 80, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 90, true), Decision::Quiet);
        assert_eq!(feed(&mut monitor, t0, 100, true), Decision::Remind);
    }

    #[test]
    fn good_readings_stay_idle() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        for i in 0..10 {
            assert_eq!(feed(&mut monitor, t0, i * 3, false), Decision::Quiet);
            assert_eq!(monitor.state(t0 + secs(i * 3)), State::Idle);
        }
        assert!(monitor.bad_streak_start.is_none());
    }

    #[test]
    fn history_is_capped() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        for i in 0..20 {
            let _ = feed(&mut monitor, t0, i, i % 2 == 0);
            assert!(monitor.history.len() <= HISTORY_LEN);
        }
        assert_eq!(monitor.history.len(), HISTORY_LEN);
    }

    #[test]
    fn window_eviction_forgets_old_bad_readings() {
        let mut monitor = Monitor::new();
        let t0 = Instant::now();

        // 3 bad readings scroll out of the window as good ones arrive.
        for (i, &bad) in [true, true, true, false, false, false, false, false]
            .iter()
            .enumerate()
        {
            let _ = feed(&mut monitor, t0, i as u64 * 10, bad);
        }
        assert_eq!(monitor.history.count_bad(), 0);
    }
}
