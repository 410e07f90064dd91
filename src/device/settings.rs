//! The device settings record.
//!
//! The CGD1 exposes its settings as one 20-byte blob; there are no
//! partial-field writes. Reads arrive as a `13 02` notification, writes go
//! out as `13 01` with the same payload layout:
//!
//! ```text
//! 0     0x13
//! 1     0x02 (read) / 0x01 (write)
//! 2     volume 1-5
//! 3-4   header/version bytes (preserved verbatim)
//! 5     flags: bit0 EN language, bit1 12h clock, bit2 Fahrenheit,
//!       bit4 master alarms off (a set bit means the non-default choice)
//! 6     |timezone offset| in 6-minute units
//! 7     backlight seconds, 0 = off
//! 8     brightness nibbles: day/10 << 4 | night/10
//! 9-12  night window start HH MM, end HH MM
//! 13    timezone sign, 1 = non-negative
//! 14    night mode enabled
//! 15    reserved (preserved verbatim)
//! 16-19 active ringtone signature
//! ```
//!
//! Every mutator range-checks its input, so an encoded record is valid by
//! construction and a `ValidationError` is raised before any device write.

use std::fmt;
use std::str::FromStr;

use crate::device::constants::{TZ_GRANULARITY_MIN, TZ_MAX_OFFSET_MIN};
use crate::device::types::ClockTime;
use crate::error::{Error, Result};

pub const SETTINGS_LEN: usize = 20;

const FLAG_LANGUAGE_EN: u8 = 1 << 0;
const FLAG_12H_CLOCK: u8 = 1 << 1;
const FLAG_FAHRENHEIT: u8 = 1 << 2;
const FLAG_ALARMS_OFF: u8 = 1 << 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    En,
    Zh,
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Language::En => "en",
            Language::Zh => "zh",
        })
    }
}

impl FromStr for Language {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            other => Err(Error::Validation(format!(
                "language must be \"en\" or \"zh\", got \"{other}\""
            ))),
        }
    }
}

/// In-memory mirror of the device settings record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    volume: u8,
    header: [u8; 2],
    language: Language,
    use_24h_format: bool,
    use_celsius: bool,
    alarms_enabled: bool,
    timezone_offset: i16,
    backlight_secs: u8,
    day_brightness: u8,
    night_brightness: u8,
    night_start: ClockTime,
    night_end: ClockTime,
    night_mode: bool,
    reserved: u8,
    ringtone_signature: [u8; 4],
}

impl Settings {
    /// Decodes a settings notification. Accepts both the read (`13 02`) and
    /// write (`13 01`) variants since the device echoes the latter back.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < SETTINGS_LEN || payload[0] != 0x13 {
            return Err(Error::Protocol(format!(
                "unexpected settings frame: {}",
                hex::encode(payload)
            )));
        }

        let flags = payload[5];
        let (day_brightness, night_brightness) = unpack_brightness(payload[8]);
        let magnitude = payload[6] as i16 * TZ_GRANULARITY_MIN;
        let timezone_offset = if payload[13] == 1 { magnitude } else { -magnitude };
        let night_window = |hour, minute| {
            ClockTime::new(hour, minute).map_err(|_| {
                Error::Protocol(format!(
                    "settings record contains an invalid night window ({hour:02}:{minute:02})"
                ))
            })
        };

        Ok(Self {
            volume: payload[2],
            header: [payload[3], payload[4]],
            language: if flags & FLAG_LANGUAGE_EN != 0 {
                Language::En
            } else {
                Language::Zh
            },
            use_24h_format: flags & FLAG_12H_CLOCK == 0,
            use_celsius: flags & FLAG_FAHRENHEIT == 0,
            alarms_enabled: flags & FLAG_ALARMS_OFF == 0,
            timezone_offset,
            backlight_secs: payload[7],
            day_brightness,
            night_brightness,
            night_start: night_window(payload[9], payload[10])?,
            night_end: night_window(payload[11], payload[12])?,
            night_mode: payload[14] == 1,
            reserved: payload[15],
            ringtone_signature: [payload[16], payload[17], payload[18], payload[19]],
        })
    }

    /// Encodes the full record as a `13 01` write command.
    pub fn encode(&self) -> [u8; SETTINGS_LEN] {
        let mut out = [0u8; SETTINGS_LEN];
        out[0] = 0x13;
        out[1] = 0x01;
        out[2] = self.volume;
        out[3..5].copy_from_slice(&self.header);

        let mut flags = 0u8;
        if self.language == Language::En {
            flags |= FLAG_LANGUAGE_EN;
        }
        if !self.use_24h_format {
            flags |= FLAG_12H_CLOCK;
        }
        if !self.use_celsius {
            flags |= FLAG_FAHRENHEIT;
        }
        if !self.alarms_enabled {
            flags |= FLAG_ALARMS_OFF;
        }
        out[5] = flags;

        out[6] = (self.timezone_offset.unsigned_abs() / TZ_GRANULARITY_MIN as u16) as u8;
        out[7] = self.backlight_secs;
        out[8] = pack_brightness(self.day_brightness, self.night_brightness);
        out[9] = self.night_start.hour();
        out[10] = self.night_start.minute();
        out[11] = self.night_end.hour();
        out[12] = self.night_end.minute();
        out[13] = (self.timezone_offset >= 0) as u8;
        out[14] = self.night_mode as u8;
        out[15] = self.reserved;
        out[16..].copy_from_slice(&self.ringtone_signature);
        out
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn set_volume(&mut self, volume: u8) -> Result<()> {
        if !(1..=5).contains(&volume) {
            return Err(Error::Validation(format!(
                "volume must be 1..5, got {volume}"
            )));
        }
        self.volume = volume;
        Ok(())
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn set_language(&mut self, language: Language) {
        self.language = language;
    }

    pub fn use_24h_format(&self) -> bool {
        self.use_24h_format
    }

    pub fn set_use_24h_format(&mut self, value: bool) {
        self.use_24h_format = value;
    }

    pub fn use_celsius(&self) -> bool {
        self.use_celsius
    }

    pub fn set_use_celsius(&mut self, value: bool) {
        self.use_celsius = value;
    }

    pub fn alarms_enabled(&self) -> bool {
        self.alarms_enabled
    }

    pub fn set_alarms_enabled(&mut self, value: bool) {
        self.alarms_enabled = value;
    }

    /// Timezone offset in minutes, east positive.
    pub fn timezone_offset(&self) -> i16 {
        self.timezone_offset
    }

    pub fn set_timezone_offset(&mut self, minutes: i16) -> Result<()> {
        if minutes.abs() > TZ_MAX_OFFSET_MIN {
            return Err(Error::Validation(format!(
                "timezone offset out of range (got {minutes} min, max +/-{TZ_MAX_OFFSET_MIN})"
            )));
        }
        if minutes % TZ_GRANULARITY_MIN != 0 {
            return Err(Error::Validation(format!(
                "timezone offset must be a multiple of {TZ_GRANULARITY_MIN} minutes, got {minutes}"
            )));
        }
        self.timezone_offset = minutes;
        Ok(())
    }

    pub fn backlight_secs(&self) -> u8 {
        self.backlight_secs
    }

    pub fn set_backlight_secs(&mut self, seconds: u8) -> Result<()> {
        if seconds > 30 {
            return Err(Error::Validation(format!(
                "backlight must be 0..30 seconds (0=off), got {seconds}"
            )));
        }
        self.backlight_secs = seconds;
        Ok(())
    }

    pub fn day_brightness(&self) -> u8 {
        self.day_brightness
    }

    pub fn set_day_brightness(&mut self, value: u8) -> Result<()> {
        check_brightness("day brightness", value)?;
        self.day_brightness = value;
        Ok(())
    }

    pub fn night_brightness(&self) -> u8 {
        self.night_brightness
    }

    pub fn set_night_brightness(&mut self, value: u8) -> Result<()> {
        check_brightness("night brightness", value)?;
        self.night_brightness = value;
        Ok(())
    }

    pub fn night_start(&self) -> ClockTime {
        self.night_start
    }

    pub fn set_night_start(&mut self, time: ClockTime) {
        self.night_start = time;
    }

    pub fn night_end(&self) -> ClockTime {
        self.night_end
    }

    pub fn set_night_end(&mut self, time: ClockTime) {
        self.night_end = time;
    }

    pub fn night_mode(&self) -> bool {
        self.night_mode
    }

    /// Toggles night mode and resets the window to the firmware defaults:
    /// 21:00-06:00 when enabling, the 00:00-00:01 sentinel when disabling.
    /// Explicit `set_night_start`/`set_night_end` calls afterwards override.
    pub fn set_night_mode(&mut self, enabled: bool) {
        self.night_mode = enabled;
        if enabled {
            self.night_start = ClockTime::of(21, 0);
            self.night_end = ClockTime::of(6, 0);
        } else {
            self.night_start = ClockTime::of(0, 0);
            self.night_end = ClockTime::of(0, 1);
        }
    }

    pub fn ringtone_signature(&self) -> [u8; 4] {
        self.ringtone_signature
    }

    pub fn set_ringtone_signature(&mut self, signature: [u8; 4]) {
        self.ringtone_signature = signature;
    }
}

fn check_brightness(field: &str, value: u8) -> Result<()> {
    if value > 100 || value % 10 != 0 {
        return Err(Error::Validation(format!(
            "{field} must be 0..100 in steps of 10, got {value}"
        )));
    }
    Ok(())
}

fn pack_brightness(day: u8, night: u8) -> u8 {
    ((day / 10) << 4) | (night / 10)
}

fn unpack_brightness(byte: u8) -> (u8, u8) {
    (((byte >> 4) & 0x0f) * 10, (byte & 0x0f) * 10)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_payload() -> Vec<u8> {
        vec![
            0x13, 0x02, // read response
            0x03, // volume 3
            0x58, 0x02, // header
            0x03, // flags: EN + 12h clock
            0x0a, // tz magnitude 10 * 6 = 60 min
            0x0f, // backlight 15 s
            0x53, // brightness day 50 / night 30
            0x15, 0x00, // night start 21:00
            0x06, 0x00, // night end 06:00
            0x01, // tz sign positive
            0x01, // night mode on
            0x00, // reserved
            0xfd, 0xc3, 0x66, 0xa5, // beep signature
        ]
    }

    #[test]
    fn decode_reads_every_field() {
        let s = Settings::decode(&sample_payload()).unwrap();
        assert_eq!(s.volume(), 3);
        assert_eq!(s.language(), Language::En);
        assert!(!s.use_24h_format());
        assert!(s.use_celsius());
        assert!(s.alarms_enabled());
        assert_eq!(s.timezone_offset(), 60);
        assert_eq!(s.backlight_secs(), 15);
        assert_eq!(s.day_brightness(), 50);
        assert_eq!(s.night_brightness(), 30);
        assert_eq!(s.night_start().to_string(), "21:00");
        assert_eq!(s.night_end().to_string(), "06:00");
        assert!(s.night_mode());
        assert_eq!(s.ringtone_signature(), [0xfd, 0xc3, 0x66, 0xa5]);
    }

    #[test]
    fn encode_round_trips_and_marks_write() {
        let s = Settings::decode(&sample_payload()).unwrap();
        let encoded = s.encode();
        assert_eq!(encoded[1], 0x01);
        assert_eq!(Settings::decode(&encoded).unwrap(), s);
    }

    #[test]
    fn negative_timezone_round_trips() {
        let mut s = Settings::decode(&sample_payload()).unwrap();
        s.set_timezone_offset(-360).unwrap();
        let encoded = s.encode();
        assert_eq!(encoded[6], 60);
        assert_eq!(encoded[13], 0);
        assert_eq!(Settings::decode(&encoded).unwrap().timezone_offset(), -360);
    }

    #[test]
    fn timezone_validation() {
        let mut s = Settings::decode(&sample_payload()).unwrap();
        assert!(s.set_timezone_offset(720).is_ok());
        assert!(s.set_timezone_offset(-720).is_ok());
        assert!(s.set_timezone_offset(726).is_err());
        // 100 is within range but not a multiple of 6
        assert!(s.set_timezone_offset(100).is_err());
        assert!(s.set_timezone_offset(0).is_ok());
        assert_eq!(s.encode()[13], 1);
    }

    #[test]
    fn field_range_validation() {
        let mut s = Settings::decode(&sample_payload()).unwrap();
        assert!(s.set_volume(0).is_err());
        assert!(s.set_volume(6).is_err());
        assert!(s.set_volume(5).is_ok());
        assert!(s.set_backlight_secs(31).is_err());
        assert!(s.set_backlight_secs(0).is_ok());
        assert!(s.set_day_brightness(55).is_err());
        assert!(s.set_day_brightness(110).is_err());
        assert!(s.set_night_brightness(0).is_ok());
    }

    #[test]
    fn night_mode_resets_window() {
        let mut s = Settings::decode(&sample_payload()).unwrap();
        s.set_night_mode(false);
        assert_eq!(s.night_start().to_string(), "00:00");
        assert_eq!(s.night_end().to_string(), "00:01");
        s.set_night_mode(true);
        assert_eq!(s.night_start().to_string(), "21:00");
        assert_eq!(s.night_end().to_string(), "06:00");
    }

    #[test]
    fn rejects_short_or_foreign_frames() {
        assert!(Settings::decode(&[0x13, 0x02, 0x03]).is_err());
        let mut other = sample_payload();
        other[0] = 0x11;
        assert!(Settings::decode(&other).is_err());
    }
}
