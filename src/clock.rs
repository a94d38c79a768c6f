// Live clock ticker and countdown formatting

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::fmt::Display;
use std::time::Duration;

use crate::models::ActionItem;
use crate::settings::{ClockFormat, DEFAULT_TICK_INTERVAL_MS};

/// One clock update. Always carries the instant it was produced at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub at: DateTime<Utc>,
}

impl Tick {
    /// Time of day in `tz`, `HH:MM:SS.d` or `HH:MM:SS`
    pub fn time_text<Tz>(&self, tz: &Tz, format: ClockFormat) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        let local = self.at.with_timezone(tz);
        match format {
            ClockFormat::Millis => format!("{}.{}", local.format("%H:%M:%S"), local.timestamp_subsec_millis() / 100),
            ClockFormat::Seconds => local.format("%H:%M:%S").to_string(),
        }
    }

    /// Day of month in `tz`, zero padded
    pub fn day_text<Tz>(&self, tz: &Tz) -> String
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        self.at.with_timezone(tz).format("%d").to_string()
    }
}

/// Fixed-period ticker that only runs while its display is visible
///
/// Missed ticks are never replayed: a late poll yields one tick for "now" and
/// the schedule continues from there.
#[derive(Debug, Clone)]
pub struct LiveClock {
    period: TimeDelta,
    visible: bool,
    next_due: Option<DateTime<Utc>>,
}

impl Default for LiveClock {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TICK_INTERVAL_MS))
    }
}

impl LiveClock {
    /// A visible clock whose first tick is due immediately
    pub fn new(period: Duration) -> Self {
        let period = TimeDelta::from_std(period)
            .ok()
            .filter(|p| *p > TimeDelta::zero())
            .unwrap_or(TimeDelta::milliseconds(DEFAULT_TICK_INTERVAL_MS as i64));

        Self {
            period,
            visible: true,
            next_due: None,
        }
    }

    pub fn period(&self) -> Duration {
        self.period.to_std().unwrap_or(Duration::from_millis(DEFAULT_TICK_INTERVAL_MS))
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        if visible && !self.visible {
            // Resume with an immediate tick, nothing accumulated while hidden
            self.next_due = None;
        }
        self.visible = visible;
    }

    /// Produce a tick if one is due at `now`
    pub fn poll(&mut self, now: DateTime<Utc>) -> Option<Tick> {
        if !self.visible {
            return None;
        }

        match self.next_due {
            Some(due) if now < due => None,
            Some(due) => {
                let next = due + self.period;
                self.next_due = Some(if next > now { next } else { now + self.period });
                Some(Tick { at: now })
            }
            None => {
                self.next_due = Some(now + self.period);
                Some(Tick { at: now })
            }
        }
    }

    /// How long until the next tick is due, or None while hidden
    pub fn time_until_next(&self, now: DateTime<Utc>) -> Option<Duration> {
        if !self.visible {
            return None;
        }
        let wait = match self.next_due {
            Some(due) => (due - now).to_std().unwrap_or(Duration::ZERO),
            None => Duration::ZERO,
        };
        Some(wait)
    }
}

/// Drive `clock` against the system time, calling `render` for each tick
///
/// Stops after `max_ticks` ticks, or as soon as the clock is hidden.
/// Returns the number of ticks rendered.
pub fn run<F>(clock: &mut LiveClock, max_ticks: Option<u64>, mut render: F) -> u64
where
    F: FnMut(&Tick),
{
    let mut delivered = 0;

    while clock.is_visible() && max_ticks.is_none_or(|max| delivered < max) {
        if let Some(tick) = clock.poll(Utc::now()) {
            render(&tick);
            delivered += 1;
        }

        let wait = clock.time_until_next(Utc::now()).unwrap_or(Duration::ZERO);
        if !wait.is_zero() && max_ticks.is_none_or(|max| delivered < max) {
            std::thread::sleep(wait);
        }
    }

    delivered
}

/// Time left until an ongoing item is due
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    pub title: String,
    pub remaining: TimeDelta,
}

impl Countdown {
    /// None once the item has ended
    pub fn until(item: &ActionItem, now: DateTime<Utc>) -> Option<Self> {
        let remaining = item.due_date - now;
        (remaining > TimeDelta::zero()).then(|| Self {
            title: item.main_title.clone(),
            remaining,
        })
    }
}

impl Display for Countdown {
    /// Whole seconds rounded up, so an ongoing item never reads `00:00:00`
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let millis = self.remaining.num_milliseconds().max(0);
        let total = (millis + 999) / 1000;
        let days = total / 86_400;
        let hours = (total % 86_400) / 3_600;
        let minutes = (total % 3_600) / 60;
        let seconds = total % 60;

        if days > 0 {
            write!(f, "{}d ", days)?;
        }
        write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}
