//! # Notification Log Windows
//!
//! A [`WindowId`] names one page of the notification log: the closed range
//! of event ids `[low, high]` that page may contain. Every page has the same
//! width (`batch_size`) and pages tile the id space starting at 1.
//!
//! ```text
//!   batch_size = 5
//!
//!   ids:   1  2  3  4  5 │ 6  7  8  9 10 │11 12 13 14 15 │16 ...
//!          └──  "1,5" ──┘ └── "6,10" ──┘ └── "11,15" ─┘
//!                                              ▲
//!                                        last_id = 13 → current window
//! ```
//!
//! The canonical text form is `"<low>,<high>"`. That string is what
//! consumers see in links between pages, so it round-trips exactly through
//! [`Display`](fmt::Display) and [`FromStr`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};
use crate::types::EventId;

/// Closed `[low, high]` range of event ids identifying one log page.
///
/// Ordering is by `(low, high)`, so pages sort oldest first.
///
/// # Example
///
/// ```rust
/// use notilog::WindowId;
///
/// let id: WindowId = "11,15".parse()?;
/// assert_eq!(id.batch_size(), 5);
/// assert_eq!(id.previous().to_string(), "6,10");
/// assert_eq!(id.next().to_string(), "16,20");
/// # Ok::<(), notilog::Error>(())
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WindowId {
    low: i64,
    high: i64,
}

impl WindowId {
    /// Creates a window covering `low..=high`.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidWindow`] if `low > high`.
    pub fn new(low: i64, high: i64) -> Result<Self> {
        if low > high {
            return Err(Error::InvalidWindow { low, high });
        }
        Ok(Self { low, high })
    }

    /// The window that holds `last` when the log is paged in `batch_size`
    /// steps. An empty log (`last == 0`) maps to the first window.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidArgument`] if `batch_size` is zero or too large to
    /// address as a signed id range.
    pub fn current(last: EventId, batch_size: u64) -> Result<Self> {
        let batch = i64::try_from(batch_size)
            .ok()
            .filter(|b| *b > 0)
            .ok_or_else(|| {
                Error::InvalidArgument(format!("batch size must be in 1..=i64::MAX, got {batch_size}"))
            })?;
        let last = i64::try_from(last.as_raw()).unwrap_or(i64::MAX);

        let mut remainder = last % batch;
        if remainder == 0 {
            remainder = batch;
        }
        let low = (last - remainder + 1).max(1);
        let high = low.saturating_add(batch - 1);

        Ok(Self { low, high })
    }

    /// Lowest id the window may contain.
    pub fn low(&self) -> i64 {
        self.low
    }

    /// Highest id the window may contain.
    pub fn high(&self) -> i64 {
        self.high
    }

    /// Number of ids the window spans.
    pub fn batch_size(&self) -> u64 {
        // low <= high is held by every constructor.
        self.high.abs_diff(self.low).saturating_add(1)
    }

    /// The same-width window immediately after this one.
    pub fn next(&self) -> Self {
        let step = self.step();
        Self {
            low: self.low.saturating_add(step),
            high: self.high.saturating_add(step),
        }
    }

    /// The same-width window immediately before this one. May have a
    /// non-positive `low`; the service only links to it when `low > 1`.
    pub fn previous(&self) -> Self {
        let step = self.step();
        Self {
            low: self.low.saturating_sub(step),
            high: self.high.saturating_sub(step),
        }
    }

    /// Returns true if `id` falls inside the window.
    pub fn contains(&self, id: EventId) -> bool {
        i64::try_from(id.as_raw()).is_ok_and(|id| self.low <= id && id <= self.high)
    }

    fn step(&self) -> i64 {
        i64::try_from(self.batch_size()).unwrap_or(i64::MAX)
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.low, self.high)
    }
}

impl FromStr for WindowId {
    type Err = Error;

    /// Parses `"<low>,<high>"`. Whitespace around either bound is ignored.
    fn from_str(s: &str) -> Result<Self> {
        let malformed = || Error::InvalidWindowFormat(s.to_string());

        let (low, high) = s.split_once(',').ok_or_else(malformed)?;
        let low: i64 = low.trim().parse().map_err(|_| malformed())?;
        let high: i64 = high.trim().parse().map_err(|_| malformed())?;

        if low > high {
            return Err(malformed());
        }
        Ok(Self { low, high })
    }
}

impl Serialize for WindowId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for WindowId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        text.parse().map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================
