use std::io;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Offset, Utc};

use crate::model::Ms;

/// When the club is open, in club-local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClubHours {
    pub utc_offset: FixedOffset,
    pub open: NaiveTime,
    pub close: NaiveTime,
}

impl Default for ClubHours {
    fn default() -> Self {
        Self {
            utc_offset: Utc.fix(),
            open: NaiveTime::from_hms_opt(6, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
        }
    }
}

impl ClubHours {
    pub fn new(utc_offset_minutes: i32, open_hour: u32, close_hour: u32) -> io::Result<Self> {
        let utc_offset = FixedOffset::east_opt(utc_offset_minutes * 60).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "utc offset out of range")
        })?;
        if open_hour >= close_hour || close_hour > 23 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "opening hours must satisfy open < close <= 23",
            ));
        }
        let hour = |h: u32| {
            NaiveTime::from_hms_opt(h, 0, 0)
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "bad hour"))
        };
        Ok(Self {
            utc_offset,
            open: hour(open_hour)?,
            close: hour(close_hour)?,
        })
    }

    /// Club-local wall clock for an instant.
    pub fn local(&self, t: Ms) -> Option<DateTime<FixedOffset>> {
        DateTime::<Utc>::from_timestamp_millis(t).map(|dt| dt.with_timezone(&self.utc_offset))
    }

    pub fn today(&self, now: Ms) -> Option<NaiveDate> {
        self.local(now).map(|dt| dt.date_naive())
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Journal appends between automatic compactions.
    pub compact_threshold: u64,
    pub hours: ClubHours,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            hours: ClubHours::default(),
        }
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Config {
    pub fn from_env() -> io::Result<Self> {
        let data_dir = std::env::var("CLUBSCHED_DATA_DIR").unwrap_or_else(|_| "./data".into());
        let compact_threshold = env_or("CLUBSCHED_COMPACT_THRESHOLD", 1000u64);
        let hours = ClubHours::new(
            env_or("CLUBSCHED_UTC_OFFSET_MINUTES", 0i32),
            env_or("CLUBSCHED_OPEN_HOUR", 6u32),
            env_or("CLUBSCHED_CLOSE_HOUR", 22u32),
        )?;
        Ok(Self {
            data_dir: PathBuf::from(data_dir),
            compact_threshold,
            hours,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("club.wal")
    }
}
