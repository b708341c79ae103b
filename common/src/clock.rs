use chrono::{Offset, Utc};
use chrono_tz::Tz;

use crate::types::Timestamp;

/// Wall clock that stamps everything in one configured zone.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    tz: Tz,
}

impl Clock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Falls back to UTC for names chrono-tz does not know.
    pub fn from_name(timezone: &str) -> Self {
        Self::new(timezone.parse().unwrap_or(Tz::UTC))
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn now(&self) -> Timestamp {
        let local = Utc::now().with_timezone(&self.tz);
        local.with_timezone(&local.offset().fix())
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(Tz::UTC)
    }
}
