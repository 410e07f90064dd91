//! Shared value types for the device module.

use std::fmt;

use crate::error::{Error, Result};

/// A wall-clock time of day as the device stores it: hour and minute bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockTime {
    hour: u8,
    minute: u8,
}

impl ClockTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self> {
        if hour > 23 || minute > 59 {
            return Err(Error::Validation(format!(
                "invalid time {hour:02}:{minute:02} (expected 00:00..23:59)"
            )));
        }
        Ok(Self { hour, minute })
    }

    /// Constructs from components known to be in range at compile time.
    pub(crate) const fn of(hour: u8, minute: u8) -> Self {
        Self { hour, minute }
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_components() {
        assert!(ClockTime::new(24, 0).is_err());
        assert!(ClockTime::new(0, 60).is_err());
        assert!(ClockTime::new(23, 59).is_ok());
    }

    #[test]
    fn formats_zero_padded() {
        let t = ClockTime::new(7, 5).unwrap();
        assert_eq!(t.to_string(), "07:05");
    }
}
