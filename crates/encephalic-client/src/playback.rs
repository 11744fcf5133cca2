use std::time::{Duration, Instant};

/// Tick interval of the playback clock.
pub const PLAYBACK_TICK: Duration = Duration::from_millis(100);
/// Seconds the cursor advances per tick.
pub const TICK_SECONDS: f64 = 0.1;
/// Wrap target. Never exactly zero: the backend rejects t = 0.
pub const WRAP_EPSILON: f64 = 0.01;

/// Cooperative playback clock driving the time cursor.
///
/// The clock is advanced from the UI loop via [`PlaybackClock::advance`]; it
/// holds no timer thread of its own, so the sequence of cursor values seen
/// downstream is exactly the order of `advance` and user writes. It does not
/// move until the session duration is known, and any user-initiated cursor
/// write pauses playback first so the user never fights the clock.
#[derive(Debug)]
pub struct PlaybackClock {
    cursor: f64,
    playing: bool,
    duration: Option<f64>,
    last_tick: Option<Instant>,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    pub fn new() -> Self {
        Self {
            cursor: WRAP_EPSILON,
            playing: false,
            duration: None,
            last_tick: None,
        }
    }

    pub fn cursor(&self) -> f64 {
        self.cursor
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn duration(&self) -> Option<f64> {
        self.duration
    }

    /// Supply the session duration once known. Clamps the cursor into range.
    pub fn set_duration(&mut self, duration: f64) {
        self.duration = Some(duration);
        self.cursor = clamp_cursor(self.cursor, duration);
    }

    pub fn toggle(&mut self, now: Instant) {
        if self.playing {
            self.pause();
        } else {
            self.playing = true;
            self.last_tick = Some(now);
        }
    }

    pub fn pause(&mut self) {
        self.playing = false;
        self.last_tick = None;
    }

    /// User-initiated cursor write (plot click, slider drag, direct set).
    /// Pauses before moving so the next tick cannot overwrite the value.
    pub fn seek(&mut self, time: f64) {
        self.pause();
        self.cursor = match self.duration {
            Some(duration) => clamp_cursor(time, duration),
            None => time.max(WRAP_EPSILON),
        };
    }

    /// Consume whole elapsed ticks, advancing the cursor by 0.1 s each and
    /// wrapping at the session duration. Returns `true` if the cursor moved.
    /// No-ops while paused or before the duration is known.
    pub fn advance(&mut self, now: Instant) -> bool {
        if !self.playing {
            return false;
        }
        let Some(duration) = self.duration else {
            return false;
        };
        let Some(mut last) = self.last_tick else {
            self.last_tick = Some(now);
            return false;
        };
        let mut elapsed = now.saturating_duration_since(last);
        let mut moved = false;
        while elapsed >= PLAYBACK_TICK {
            elapsed -= PLAYBACK_TICK;
            last += PLAYBACK_TICK;
            self.last_tick = Some(last);
            self.cursor += TICK_SECONDS;
            if self.cursor >= duration {
                self.cursor = WRAP_EPSILON;
            }
            moved = true;
        }
        moved
    }

    /// When the next tick is due, for scheduling a wakeup.
    pub fn next_tick(&self) -> Option<Instant> {
        if !self.playing || self.duration.is_none() {
            return None;
        }
        self.last_tick.map(|last| last + PLAYBACK_TICK)
    }
}

fn clamp_cursor(time: f64, duration: f64) -> f64 {
    // Stay a full wrap step below the end so the cursor never equals the
    // duration, whatever the float magnitude.
    let upper = (duration - WRAP_EPSILON).max(WRAP_EPSILON);
    time.clamp(WRAP_EPSILON, upper)
}
