//! Alarm slots and the alarm table.
//!
//! The device holds 16 fixed slots. Each slot is a 5-byte record
//! `[enabled] [hour] [minute] [days bitmask] [snooze]`; an empty slot is all
//! `0xFF`. The table is delivered as one or more `11 06 <base index>` frames,
//! each carrying consecutive 5-byte entries. Deleting a slot means writing
//! the empty record back, the slot itself never disappears.

use std::fmt;

use crate::device::constants::{ALARMS_FRAME, ALARM_SLOTS};
use crate::device::types::ClockTime;
use crate::error::{Error, Result};

pub const ALARM_ENTRY_LEN: usize = 5;
pub const EMPTY_ENTRY: [u8; ALARM_ENTRY_LEN] = [0xff; ALARM_ENTRY_LEN];

/// Repeat-day set, one bit per weekday starting with Monday at bit 0.
/// An empty set means the alarm fires once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AlarmDays(u8);

impl AlarmDays {
    pub const MONDAY: AlarmDays = AlarmDays(1 << 0);
    pub const TUESDAY: AlarmDays = AlarmDays(1 << 1);
    pub const WEDNESDAY: AlarmDays = AlarmDays(1 << 2);
    pub const THURSDAY: AlarmDays = AlarmDays(1 << 3);
    pub const FRIDAY: AlarmDays = AlarmDays(1 << 4);
    pub const SATURDAY: AlarmDays = AlarmDays(1 << 5);
    pub const SUNDAY: AlarmDays = AlarmDays(1 << 6);

    pub const WEEKDAYS: AlarmDays = AlarmDays(0b001_1111);
    pub const WEEKEND: AlarmDays = AlarmDays(0b110_0000);
    pub const EVERY_DAY: AlarmDays = AlarmDays(0b111_1111);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x7f)
    }

    pub fn bits(&self) -> u8 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// Parses a repeat spec: `once`, `weekdays`, `weekend`, `all`, or a
    /// comma-separated list of `mon,tue,wed,thu,fri,sat,sun`.
    pub fn parse(spec: &str) -> Result<Self> {
        let s: String = spec.trim().to_ascii_lowercase().replace(' ', "");
        match s.as_str() {
            "" | "once" | "none" | "0" => return Ok(Self::default()),
            "weekdays" => return Ok(Self::WEEKDAYS),
            "weekend" => return Ok(Self::WEEKEND),
            "all" => return Ok(Self::EVERY_DAY),
            _ => {}
        }

        let mut days = Self::default();
        for part in s.split(',').filter(|p| !p.is_empty()) {
            days.0 |= match part {
                "mon" => Self::MONDAY.0,
                "tue" => Self::TUESDAY.0,
                "wed" => Self::WEDNESDAY.0,
                "thu" => Self::THURSDAY.0,
                "fri" => Self::FRIDAY.0,
                "sat" => Self::SATURDAY.0,
                "sun" => Self::SUNDAY.0,
                other => {
                    return Err(Error::Validation(format!(
                        "invalid repeat day \"{other}\" (use once|weekdays|weekend|all|mon,tue,...)"
                    )))
                }
            };
        }
        if days.is_empty() {
            return Err(Error::Validation(
                "invalid repeat days (use once|weekdays|weekend|all|mon,tue,...)".into(),
            ));
        }
        Ok(days)
    }
}

impl fmt::Display for AlarmDays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("once");
        }
        const NAMES: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];
        let mut first = true;
        for (bit, name) in NAMES.iter().enumerate() {
            if self.0 & (1 << bit) != 0 {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// The configured contents of a non-empty alarm slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlarmEntry {
    pub enabled: bool,
    pub time: ClockTime,
    pub days: AlarmDays,
    pub snooze: bool,
}

/// One alarm slot; `entry` is `None` for the empty/disabled record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alarm {
    pub slot: u8,
    pub entry: Option<AlarmEntry>,
}

impl Alarm {
    pub fn empty(slot: u8) -> Self {
        Self { slot, entry: None }
    }

    /// Decodes one 5-byte table entry.
    pub fn decode(slot: u8, raw: &[u8]) -> Result<Self> {
        if raw.len() != ALARM_ENTRY_LEN {
            return Err(Error::Protocol(format!(
                "alarm entry for slot {slot} has {} bytes, expected {ALARM_ENTRY_LEN}",
                raw.len()
            )));
        }
        if raw == EMPTY_ENTRY {
            return Ok(Self::empty(slot));
        }
        let time = ClockTime::new(raw[1], raw[2]).map_err(|_| {
            Error::Protocol(format!(
                "alarm slot {slot} contains an invalid time {:02x}:{:02x}",
                raw[1], raw[2]
            ))
        })?;
        Ok(Self {
            slot,
            entry: Some(AlarmEntry {
                enabled: raw[0] == 1,
                time,
                days: AlarmDays::from_bits(raw[3]),
                snooze: raw[4] == 1,
            }),
        })
    }

    /// Encodes the `07 05 <slot> <entry>` write command. An empty alarm
    /// encodes the all-`FF` record, which is also how deletion works.
    pub fn encode(&self) -> [u8; 3 + ALARM_ENTRY_LEN] {
        let mut out = [0u8; 3 + ALARM_ENTRY_LEN];
        out[0] = 0x07;
        out[1] = 0x05;
        out[2] = self.slot;
        match &self.entry {
            Some(e) => {
                out[3] = e.enabled as u8;
                out[4] = e.time.hour();
                out[5] = e.time.minute();
                out[6] = e.days.bits();
                out[7] = e.snooze as u8;
            }
            None => out[3..].copy_from_slice(&EMPTY_ENTRY),
        }
        out
    }
}

/// Assembles the alarm table from `11 06` notification frames. The device
/// may split the 16 slots across several frames; a frame with base index 0
/// starts a fresh snapshot.
#[derive(Debug, Default)]
pub struct AlarmCollector {
    slots: [Option<Alarm>; ALARM_SLOTS],
}

impl AlarmCollector {
    pub fn feed(&mut self, frame: &[u8]) -> Result<()> {
        if frame.len() < 3 + ALARM_ENTRY_LEN || !frame.starts_with(&ALARMS_FRAME) {
            return Err(Error::Protocol(format!(
                "unexpected alarm frame: {}",
                hex::encode(frame)
            )));
        }
        let base = frame[2] as usize;
        if base == 0 {
            self.slots = Default::default();
        }
        for (i, raw) in frame[3..].chunks_exact(ALARM_ENTRY_LEN).enumerate() {
            let slot = base + i;
            if slot >= ALARM_SLOTS {
                break;
            }
            self.slots[slot] = Some(Alarm::decode(slot as u8, raw)?);
        }
        Ok(())
    }

    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(Option::is_some)
    }

    pub fn into_alarms(self) -> Vec<Alarm> {
        self.slots.into_iter().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_configured_entry() {
        let alarm = Alarm::decode(0, &[0x01, 7, 30, 0x1f, 0x01]).unwrap();
        let entry = alarm.entry.unwrap();
        assert!(entry.enabled);
        assert_eq!(entry.time.to_string(), "07:30");
        assert_eq!(entry.days, AlarmDays::WEEKDAYS);
        assert!(entry.snooze);
    }

    #[test]
    fn decode_empty_entry() {
        let alarm = Alarm::decode(3, &EMPTY_ENTRY).unwrap();
        assert!(alarm.entry.is_none());
    }

    #[test]
    fn encode_round_trips() {
        let alarm = Alarm::decode(5, &[0x00, 22, 15, 0x60, 0x00]).unwrap();
        let encoded = alarm.encode();
        assert_eq!(&encoded[..3], &[0x07, 0x05, 5]);
        assert_eq!(Alarm::decode(5, &encoded[3..]).unwrap(), alarm);
    }

    #[test]
    fn empty_alarm_encodes_delete_record() {
        let encoded = Alarm::empty(2).encode();
        assert_eq!(&encoded[..3], &[0x07, 0x05, 2]);
        assert_eq!(&encoded[3..], &EMPTY_ENTRY);
    }

    #[test]
    fn days_parse_specs() {
        assert_eq!(AlarmDays::parse("once").unwrap(), AlarmDays::default());
        assert_eq!(AlarmDays::parse("weekdays").unwrap(), AlarmDays::WEEKDAYS);
        assert_eq!(AlarmDays::parse("weekend").unwrap(), AlarmDays::WEEKEND);
        assert_eq!(AlarmDays::parse("all").unwrap(), AlarmDays::EVERY_DAY);
        assert_eq!(
            AlarmDays::parse("mon,wed,fri").unwrap().bits(),
            AlarmDays::MONDAY.bits() | AlarmDays::WEDNESDAY.bits() | AlarmDays::FRIDAY.bits()
        );
        assert!(AlarmDays::parse("mon,funday").is_err());
        assert!(AlarmDays::parse(",").is_err());
    }

    #[test]
    fn days_display() {
        assert_eq!(AlarmDays::default().to_string(), "once");
        assert_eq!(AlarmDays::WEEKEND.to_string(), "Sat Sun");
        assert_eq!(AlarmDays::parse("fri,mon").unwrap().to_string(), "Mon Fri");
    }

    fn frame(base: u8, entries: &[[u8; ALARM_ENTRY_LEN]]) -> Vec<u8> {
        let mut f = vec![0x11, 0x06, base];
        for e in entries {
            f.extend_from_slice(e);
        }
        f
    }

    #[test]
    fn collector_assembles_split_table() {
        let mut collector = AlarmCollector::default();
        let first: Vec<[u8; 5]> = (0..8)
            .map(|i| if i == 0 { [1, 6, 45, 0x7f, 0] } else { EMPTY_ENTRY })
            .collect();
        collector.feed(&frame(0, &first)).unwrap();
        assert!(!collector.is_complete());
        collector.feed(&frame(8, &[EMPTY_ENTRY; 8])).unwrap();
        assert!(collector.is_complete());

        let alarms = collector.into_alarms();
        assert_eq!(alarms.len(), ALARM_SLOTS);
        assert!(alarms[0].entry.is_some());
        assert!(alarms[1..].iter().all(|a| a.entry.is_none()));
    }

    #[test]
    fn collector_restarts_on_base_zero() {
        let mut collector = AlarmCollector::default();
        collector.feed(&frame(8, &[EMPTY_ENTRY; 8])).unwrap();
        collector.feed(&frame(0, &[EMPTY_ENTRY; 8])).unwrap();
        // the base-0 frame reset the snapshot, so the tail is missing again
        assert!(!collector.is_complete());
    }

    #[test]
    fn collector_rejects_foreign_frames() {
        let mut collector = AlarmCollector::default();
        assert!(collector.feed(&[0x13, 0x02, 0x00]).is_err());
    }
}
