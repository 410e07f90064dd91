//! Command-line surface and value parsing.
//!
//! The tool has no subcommands; exactly one `--action` flag is required per
//! invocation, with option flags alongside it. Values that feed the device
//! protocol are parsed and range-checked here, before any BLE traffic.

use std::path::PathBuf;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use clap::{ArgGroup, Parser};
use log::warn;
use regex::Regex;

use crate::device::constants::{TZ_GRANULARITY_MIN, TZ_MAX_OFFSET_MIN};
use crate::device::types::ClockTime;
use crate::error::{Error, Result};

#[derive(Parser, Debug)]
#[command(
    name = "cgd1",
    version,
    about = "Qingping CGD1 BLE alarm clock CLI",
    group(ArgGroup::new("action").required(true)),
    after_help = "\
Examples:
  Save credentials once:
    cgd1 --set-config --address 58:AB:CD:EF:AB:CD --token 0e659b...ce6e
  Sync the clock to the host time:
    cgd1 --set-time
  Update settings:
    cgd1 --set-settings --volume 3 --lang en --timefmt 24 --night-mode off
  Configure alarm slot 0:
    cgd1 --set-alarm --alarm-slot 0 --alarm-enable --alarm-time 07:30 \\
         --alarm-days weekdays --alarm-snooze on
  Upload a custom ringtone (8 kHz u8 mono .wav or raw PCM):
    cgd1 --upload-ringtone my.wav --ringtone-slot auto"
)]
pub struct Cli {
    /// Credential file path (default: <config dir>/qingping-cgd1/config.json)
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose diagnostics and full error chains
    #[arg(long)]
    pub debug: bool,

    /// BLE MAC address (required unless saved with --set-config)
    #[arg(long, value_name = "MAC")]
    pub address: Option<String>,

    /// 16-byte device token as 32 hex chars (required unless saved)
    #[arg(long, value_name = "HEX32")]
    pub token: Option<String>,

    /// Save --address/--token to the credential file
    #[arg(long, group = "action")]
    pub set_config: bool,

    /// Show the stored credentials (token redacted)
    #[arg(long, group = "action")]
    pub show_config: bool,

    /// Set the device time: "YYYY-MM-DD HH:MM", epoch seconds, or omitted
    /// for the host clock
    #[arg(long, group = "action", value_name = "TIME", num_args = 0..=1, default_missing_value = "now")]
    pub set_time: Option<String>,

    /// Timezone override for --set-time: +HH:MM / -HH:MM or minutes
    /// (multiple of 6)
    #[arg(long, value_name = "OFFSET")]
    pub tz: Option<String>,

    /// With --set-time: leave the device timezone untouched
    #[arg(long)]
    pub no_tz: bool,

    /// Read the settings record
    #[arg(long, group = "action")]
    pub get_settings: bool,

    /// Update settings (combine with the field flags below)
    #[arg(long, group = "action")]
    pub set_settings: bool,

    /// Volume 1..5
    #[arg(long)]
    pub volume: Option<u8>,

    /// Display language
    #[arg(long, value_parser = ["en", "zh"])]
    pub lang: Option<String>,

    /// Clock format
    #[arg(long, value_parser = ["24", "12"])]
    pub timefmt: Option<String>,

    /// Temperature unit
    #[arg(long, value_parser = ["c", "f"])]
    pub temp: Option<String>,

    /// Master alarm switch: on/off
    #[arg(long, value_name = "ON|OFF")]
    pub master_alarms: Option<String>,

    /// Backlight seconds 0..30 (0=off)
    #[arg(long)]
    pub backlight: Option<u8>,

    /// Day brightness 0..100, steps of 10
    #[arg(long)]
    pub day_bright: Option<u8>,

    /// Night brightness 0..100, steps of 10
    #[arg(long)]
    pub night_bright: Option<u8>,

    /// Night mode: on/off
    #[arg(long, value_name = "ON|OFF")]
    pub night_mode: Option<String>,

    /// Night window start "HH:MM"
    #[arg(long, value_name = "HH:MM")]
    pub night_start: Option<String>,

    /// Night window end "HH:MM"
    #[arg(long, value_name = "HH:MM")]
    pub night_end: Option<String>,

    /// Active ringtone: built-in name, dead/beef, or 8 hex chars
    #[arg(long)]
    pub ringtone: Option<String>,

    /// Flash the display at a brightness (0..100, steps of 10)
    #[arg(long, group = "action", value_name = "0..100")]
    pub preview_brightness: Option<u8>,

    /// Play the active ringtone once
    #[arg(long, group = "action")]
    pub preview_ringtone: bool,

    /// With --preview-ringtone: volume 1..5
    #[arg(long)]
    pub preview_volume: Option<u8>,

    /// List all alarm slots
    #[arg(long, group = "action")]
    pub get_alarms: bool,

    /// Update one alarm slot (combine with --alarm-* flags)
    #[arg(long, group = "action")]
    pub set_alarm: bool,

    /// Clear one alarm slot, or every slot with --alarm-slot all
    #[arg(long, group = "action")]
    pub delete_alarm: bool,

    /// Alarm slot index 0..15 ("all" is valid with --delete-alarm only)
    #[arg(long, value_name = "SLOT")]
    pub alarm_slot: Option<String>,

    /// Alarm time "HH:MM"
    #[arg(long, value_name = "HH:MM")]
    pub alarm_time: Option<String>,

    /// Repeat days: once|weekdays|weekend|all|mon,tue,...
    #[arg(long, value_name = "DAYS")]
    pub alarm_days: Option<String>,

    /// Snooze: on/off
    #[arg(long, value_name = "ON|OFF")]
    pub alarm_snooze: Option<String>,

    /// Enable the alarm
    #[arg(long, conflicts_with = "alarm_disable")]
    pub alarm_enable: bool,

    /// Disable the alarm
    #[arg(long)]
    pub alarm_disable: bool,

    /// Upload a custom ringtone file (.wav 8kHz u8 mono, or raw PCM)
    #[arg(long, group = "action", value_name = "FILE")]
    pub upload_ringtone: Option<PathBuf>,

    /// Upload target slot
    #[arg(long, default_value = "auto", value_name = "auto|dead|beef")]
    pub ringtone_slot: String,
}

pub fn parse_hhmm(value: &str) -> Result<ClockTime> {
    let re = Regex::new(r"^(\d{1,2}):(\d{2})$")
        .map_err(|e| Error::Validation(format!("internal time pattern error: {e}")))?;
    let caps = re.captures(value.trim()).ok_or_else(|| {
        Error::Validation(format!("time must be \"HH:MM\" (e.g. 07:30), got \"{value}\""))
    })?;
    let hour: u8 = caps[1]
        .parse()
        .map_err(|_| Error::Validation(format!("invalid hour in \"{value}\"")))?;
    let minute: u8 = caps[2]
        .parse()
        .map_err(|_| Error::Validation(format!("invalid minute in \"{value}\"")))?;
    ClockTime::new(hour, minute)
}

pub fn parse_onoff(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "on" | "1" | "true" | "yes" | "enable" | "enabled" => Ok(true),
        "off" | "0" | "false" | "no" | "disable" | "disabled" => Ok(false),
        other => Err(Error::Validation(format!(
            "expected \"on\" or \"off\", got \"{other}\""
        ))),
    }
}

/// Parses a `--tz` value: `+HH:MM` / `-HH:MM` or plain minutes. The device
/// only represents multiples of 6 minutes, so anything else is rejected.
pub fn parse_timezone(value: &str) -> Result<i16> {
    let v = value.trim();
    let minutes: i16 = if v.contains(':') {
        let re = Regex::new(r"^([+-])(\d{1,2}):(\d{2})$")
            .map_err(|e| Error::Validation(format!("internal tz pattern error: {e}")))?;
        let caps = re.captures(v).ok_or_else(|| {
            Error::Validation(format!(
                "tz must be +HH:MM / -HH:MM or minutes (e.g. -60), got \"{value}\""
            ))
        })?;
        let sign: i16 = if &caps[1] == "+" { 1 } else { -1 };
        let hours: i16 = caps[2]
            .parse()
            .map_err(|_| Error::Validation(format!("invalid tz hours in \"{value}\"")))?;
        let mins: i16 = caps[3]
            .parse()
            .map_err(|_| Error::Validation(format!("invalid tz minutes in \"{value}\"")))?;
        sign * (hours * 60 + mins)
    } else {
        v.parse().map_err(|_| {
            Error::Validation(format!(
                "tz must be +HH:MM / -HH:MM or minutes (e.g. -60), got \"{value}\""
            ))
        })?
    };

    if minutes.abs() > TZ_MAX_OFFSET_MIN {
        return Err(Error::Validation(format!(
            "tz out of range (+/-12:00), got {minutes} min"
        )));
    }
    if minutes % TZ_GRANULARITY_MIN != 0 {
        return Err(Error::Validation(format!(
            "tz must be a multiple of {TZ_GRANULARITY_MIN} minutes (device limitation), got {minutes}"
        )));
    }
    Ok(minutes)
}

/// Rounds a host-derived offset to the device's 6-minute granularity.
/// Unlike an explicit `--tz`, the host offset is not user input, so it is
/// rounded (with a warning) rather than rejected.
pub fn round_to_device_granularity(minutes: i16) -> i16 {
    if minutes % TZ_GRANULARITY_MIN == 0 {
        return minutes;
    }
    let half = TZ_GRANULARITY_MIN / 2;
    let rounded =
        (minutes + if minutes >= 0 { half } else { -half }) / TZ_GRANULARITY_MIN * TZ_GRANULARITY_MIN;
    let rounded = rounded.clamp(-TZ_MAX_OFFSET_MIN, TZ_MAX_OFFSET_MIN);
    warn!("host timezone offset {minutes} min is not representable, rounding to {rounded}");
    rounded
}

/// A `--set-time` argument, resolved to a concrete instant only when the
/// write is about to happen so "now" stays accurate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimeSpec {
    Now,
    Epoch(i64),
    LocalNaive(NaiveDateTime),
}

impl TimeSpec {
    pub fn parse(raw: &str) -> Result<Self> {
        let s = raw.trim();
        if s.is_empty() || s == "now" {
            return Ok(TimeSpec::Now);
        }
        if (9..=12).contains(&s.len()) && s.bytes().all(|b| b.is_ascii_digit()) {
            let epoch = s
                .parse()
                .map_err(|_| Error::Validation(format!("invalid epoch seconds \"{s}\"")))?;
            return Ok(TimeSpec::Epoch(epoch));
        }
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M")
            .map(TimeSpec::LocalNaive)
            .map_err(|_| {
                Error::Validation(format!(
                    "time must be \"YYYY-MM-DD HH:MM\", epoch seconds, or omitted for the host clock, got \"{s}\""
                ))
            })
    }

    /// Returns `(unix timestamp, host offset minutes, display string)`.
    pub fn resolve(&self) -> Result<(i64, i16, String)> {
        let local: DateTime<Local> = match self {
            TimeSpec::Now => Local::now(),
            TimeSpec::Epoch(epoch) => Local
                .timestamp_opt(*epoch, 0)
                .single()
                .ok_or_else(|| Error::Validation(format!("epoch {epoch} is out of range")))?,
            TimeSpec::LocalNaive(naive) => naive.and_local_timezone(Local).single().ok_or_else(
                || Error::Validation(format!("local time {naive} is ambiguous or invalid")),
            )?,
        };
        let offset_min = (local.offset().local_minus_utc() / 60) as i16;
        Ok((
            local.timestamp(),
            offset_min,
            local.format("%Y-%m-%d %H:%M %z").to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_a_full_alarm_update() {
        let cli = Cli::try_parse_from([
            "cgd1",
            "--set-alarm",
            "--alarm-slot",
            "0",
            "--alarm-enable",
            "--alarm-time",
            "07:30",
            "--alarm-days",
            "weekdays",
            "--alarm-snooze",
            "on",
        ])
        .unwrap();
        assert!(cli.set_alarm);
        assert_eq!(cli.alarm_slot.as_deref(), Some("0"));
        assert!(cli.alarm_enable);
    }

    #[test]
    fn cli_requires_exactly_one_action() {
        assert!(Cli::try_parse_from(["cgd1"]).is_err());
        assert!(Cli::try_parse_from(["cgd1", "--get-settings", "--get-alarms"]).is_err());
    }

    #[test]
    fn cli_set_time_without_value_means_now() {
        let cli = Cli::try_parse_from(["cgd1", "--set-time"]).unwrap();
        assert_eq!(cli.set_time.as_deref(), Some("now"));
    }

    #[test]
    fn hhmm_parsing() {
        assert_eq!(parse_hhmm("07:30").unwrap(), ClockTime::new(7, 30).unwrap());
        assert_eq!(parse_hhmm("23:59").unwrap(), ClockTime::new(23, 59).unwrap());
        assert!(parse_hhmm("24:00").is_err());
        assert!(parse_hhmm("7:3").is_err());
        assert!(parse_hhmm("0730").is_err());
    }

    #[test]
    fn onoff_parsing() {
        assert!(parse_onoff("on").unwrap());
        assert!(parse_onoff("YES").unwrap());
        assert!(!parse_onoff("off").unwrap());
        assert!(parse_onoff("maybe").is_err());
    }

    #[test]
    fn timezone_parsing_accepts_multiples_of_six() {
        assert_eq!(parse_timezone("+01:00").unwrap(), 60);
        assert_eq!(parse_timezone("-02:30").unwrap(), -150);
        assert_eq!(parse_timezone("-60").unwrap(), -60);
        assert_eq!(parse_timezone("720").unwrap(), 720);
        assert_eq!(parse_timezone("0").unwrap(), 0);
    }

    #[test]
    fn timezone_parsing_rejects_the_rest() {
        // in range but not a multiple of 6
        assert!(parse_timezone("15").is_err());
        assert!(parse_timezone("+05:45").is_err());
        assert!(parse_timezone("726").is_err());
        assert!(parse_timezone("-721").is_err());
        assert!(parse_timezone("abc").is_err());
        assert!(parse_timezone("1:00").is_err());
    }

    #[test]
    fn host_offset_rounding() {
        assert_eq!(round_to_device_granularity(330), 330);
        assert_eq!(round_to_device_granularity(345), 348);
        assert_eq!(round_to_device_granularity(-345), -348);
        assert_eq!(round_to_device_granularity(0), 0);
    }

    #[test]
    fn time_spec_parsing() {
        assert_eq!(TimeSpec::parse("now").unwrap(), TimeSpec::Now);
        assert_eq!(TimeSpec::parse("").unwrap(), TimeSpec::Now);
        assert_eq!(
            TimeSpec::parse("1770000000").unwrap(),
            TimeSpec::Epoch(1_770_000_000)
        );
        assert!(matches!(
            TimeSpec::parse("2026-02-08 12:34").unwrap(),
            TimeSpec::LocalNaive(_)
        ));
        assert!(TimeSpec::parse("yesterday").is_err());
        assert!(TimeSpec::parse("2026-02-08").is_err());
    }

    #[test]
    fn epoch_resolves_to_itself() {
        let (ts, _, _) = TimeSpec::Epoch(1_770_000_000).resolve().unwrap();
        assert_eq!(ts, 1_770_000_000);
    }
}
