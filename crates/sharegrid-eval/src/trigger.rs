//! Clock conditions that force re-evaluation.
//!
//! ```text
//! every 500ms | every 10s | every 5m | every 2h | every 1d
//! at 06:30 | at 06:30:15          (daily, UTC)
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveTime, TimeDelta, Utc};
use sharegrid_common::{EPOCH, Timestamp};

use crate::error::CompileError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Schedule {
    Every(TimeDelta),
    DailyAt(NaiveTime),
}

impl Schedule {
    /// First due time strictly after `now`, `None` past the end of
    /// representable time.
    pub fn next_after(&self, now: Timestamp) -> Option<Timestamp> {
        match *self {
            Schedule::Every(period) => now.checked_add_signed(period),
            Schedule::DailyAt(time) => {
                let today = now.date_naive().and_time(time).and_utc();
                if today > now {
                    Some(today)
                } else {
                    today.checked_add_signed(TimeDelta::days(1))
                }
            }
        }
    }
}

/// A schedule plus its armed due time.
#[derive(Clone, Debug, PartialEq)]
pub struct TimeTrigger {
    src: String,
    schedule: Schedule,
    next: Option<Timestamp>,
}

impl TimeTrigger {
    pub fn new(schedule: Schedule) -> Self {
        let src = match schedule {
            Schedule::Every(d) => format!("every {}ms", d.num_milliseconds()),
            Schedule::DailyAt(t) => format!("at {}", t.format("%H:%M:%S")),
        };
        TimeTrigger {
            src,
            schedule,
            next: None,
        }
    }

    pub fn schedule(&self) -> Schedule {
        self.schedule
    }

    pub fn next_due(&self) -> Option<Timestamp> {
        self.next
    }

    /// Schedule the next firing. A trigger whose next time cannot be
    /// represented stays disarmed.
    pub fn arm(&mut self, now: Timestamp) {
        self.next = self.schedule.next_after(now);
        if self.next.is_none() {
            tracing::warn!(trigger = %self.src, %now, "trigger disarmed, next time out of range");
        }
    }

    pub fn is_due(&self, now: Timestamp) -> bool {
        self.next.is_some_and(|due| due <= now)
    }

    /// Re-arm after firing at `now`. Missed periods are skipped rather than
    /// replayed.
    pub fn fire(&mut self, now: Timestamp) {
        self.arm(now);
    }
}

impl fmt::Display for TimeTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.src)
    }
}

impl FromStr for TimeTrigger {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = |reason: &str| CompileError::Trigger {
            spec: s.to_string(),
            reason: reason.to_string(),
        };
        let mut parts = s.split_whitespace();
        let schedule = match (parts.next(), parts.next(), parts.next()) {
            (Some("every"), Some(d), None) => {
                Schedule::Every(parse_duration(d).ok_or_else(|| err("bad duration"))?)
            }
            (Some("at"), Some(t), None) => {
                let time = NaiveTime::parse_from_str(t, "%H:%M:%S")
                    .or_else(|_| NaiveTime::parse_from_str(t, "%H:%M"))
                    .map_err(|_| err("bad time of day"))?;
                Schedule::DailyAt(time)
            }
            _ => return Err(err("expected 'every <duration>' or 'at <HH:MM>'")),
        };
        Ok(TimeTrigger {
            src: s.trim().to_string(),
            schedule,
            next: None,
        })
    }
}

fn parse_duration(s: &str) -> Option<TimeDelta> {
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (num, unit) = s.split_at(split);
    let n: i64 = num.parse().ok()?;
    let d = match unit {
        "ms" => TimeDelta::try_milliseconds(n)?,
        "s" => TimeDelta::try_seconds(n)?,
        "m" => TimeDelta::try_minutes(n)?,
        "h" => TimeDelta::try_hours(n)?,
        "d" => TimeDelta::try_days(n)?,
        _ => return None,
    };
    // the period must fit on the calendar at all
    let fits = EPOCH.checked_add_signed(d).is_some()
        && DateTime::<Utc>::MAX_UTC.checked_sub_signed(d).is_some();
    (d > TimeDelta::zero() && fits).then_some(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharegrid_common::from_epoch_millis;

    #[test]
    fn parses_periodic_and_daily() {
        let t: TimeTrigger = "every 10s".parse().unwrap();
        assert_eq!(t.schedule(), Schedule::Every(TimeDelta::seconds(10)));
        let t: TimeTrigger = "every 500ms".parse().unwrap();
        assert_eq!(t.schedule(), Schedule::Every(TimeDelta::milliseconds(500)));
        let t: TimeTrigger = "at 06:30".parse().unwrap();
        assert_eq!(
            t.schedule(),
            Schedule::DailyAt(NaiveTime::from_hms_opt(6, 30, 0).unwrap())
        );
        assert_eq!(t.to_string(), "at 06:30");
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "every", "every 0s", "every 10x", "at 25:00", "when 10s", "every 1s now"] {
            assert!(bad.parse::<TimeTrigger>().is_err(), "{bad}");
        }
    }

    #[test]
    fn periodic_arming() {
        let mut t: TimeTrigger = "every 10s".parse().unwrap();
        assert!(!t.is_due(from_epoch_millis(0)));
        t.arm(from_epoch_millis(1_000));
        assert!(!t.is_due(from_epoch_millis(10_999)));
        assert!(t.is_due(from_epoch_millis(11_000)));
        t.fire(from_epoch_millis(25_000));
        assert_eq!(t.next_due(), Some(from_epoch_millis(35_000)));
    }

    #[test]
    fn daily_rolls_over() {
        let t = Schedule::DailyAt(NaiveTime::from_hms_opt(1, 0, 0).unwrap());
        // 1970-01-01T00:30Z
        let before = from_epoch_millis(30 * 60 * 1000);
        assert_eq!(t.next_after(before), Some(from_epoch_millis(60 * 60 * 1000)));
        // exactly at the time: next day
        let at = from_epoch_millis(60 * 60 * 1000);
        assert_eq!(t.next_after(at), Some(from_epoch_millis(25 * 60 * 60 * 1000)));
    }

    #[test]
    fn periods_beyond_the_calendar_are_rejected() {
        let err = "every 100000000d".parse::<TimeTrigger>().unwrap_err();
        assert!(matches!(err, CompileError::Trigger { .. }), "{err}");
        assert!("every 36500d".parse::<TimeTrigger>().is_ok());
    }

    #[test]
    fn arming_near_the_end_of_time_disarms() {
        let mut t: TimeTrigger = "every 1d".parse().unwrap();
        t.arm(DateTime::<Utc>::MAX_UTC - TimeDelta::hours(1));
        assert_eq!(t.next_due(), None);
        assert!(!t.is_due(DateTime::<Utc>::MAX_UTC));

        let daily = Schedule::DailyAt(NaiveTime::from_hms_opt(0, 0, 0).unwrap());
        assert_eq!(daily.next_after(DateTime::<Utc>::MAX_UTC), None);
    }
}
