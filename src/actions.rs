//! One function per `--action` flag.
//!
//! Each action validates its inputs before any BLE traffic, opens a session
//! only if the command needs the device, and always disconnects on the way
//! out, success or not.

use std::io::{self, Write};
use std::path::Path;

use anyhow::Result;

use crate::cli::{
    parse_hhmm, parse_onoff, parse_timezone, round_to_device_granularity, Cli, TimeSpec,
};
use crate::device::alarm::{Alarm, AlarmEntry, AlarmDays};
use crate::device::constants::ALARM_SLOTS;
use crate::device::ringtone::{
    self, choose_upload_slot, load_pcm, signature_name, SlotSelector,
};
use crate::device::settings::{Language, Settings};
use crate::device::Session;
use crate::error::Error;
use crate::report::Reporter;
use crate::store::{self, Credentials};

/// The action label used in the final INFO/ERROR status line.
pub fn action_name(cli: &Cli) -> &'static str {
    if cli.set_config {
        "config set"
    } else if cli.show_config {
        "config show"
    } else if cli.set_time.is_some() {
        "time update"
    } else if cli.get_settings {
        "settings get"
    } else if cli.set_settings {
        "settings update"
    } else if cli.preview_brightness.is_some() {
        "brightness preview"
    } else if cli.preview_ringtone {
        "ringtone preview"
    } else if cli.get_alarms {
        "alarms get"
    } else if cli.set_alarm {
        "alarm update"
    } else if cli.delete_alarm {
        "alarm delete"
    } else if cli.upload_ringtone.is_some() {
        "ringtone upload"
    } else {
        "main"
    }
}

pub fn set_config(cli: &Cli, config_path: &Path, reporter: &Reporter) -> Result<()> {
    let (address, token) = match (&cli.address, &cli.token) {
        (Some(address), Some(token)) => (address, token),
        _ => {
            return Err(Error::Validation(
                "--set-config requires both --address and --token".into(),
            )
            .into())
        }
    };
    let credentials = Credentials::new(address, token)?;
    store::save(config_path, &credentials)?;
    reporter.info(
        "config set",
        Some(&format!("saved to {}", config_path.display())),
    );
    Ok(())
}

pub fn show_config(config_path: &Path, reporter: &Reporter) -> Result<()> {
    let credentials = store::load(config_path)?.ok_or_else(|| {
        Error::ConfigMissing(format!("no credential file at {}", config_path.display()))
    })?;
    println!("Config file: {}", config_path.display());
    println!("  Address: {}", credentials.address);
    println!("  Token:   {}", credentials.redacted_token());
    reporter.info("config show", None);
    Ok(())
}

pub async fn set_time(cli: &Cli, credentials: &Credentials, reporter: &Reporter) -> Result<()> {
    let spec = match &cli.set_time {
        Some(raw) => TimeSpec::parse(raw)?,
        None => TimeSpec::Now,
    };
    let explicit_tz = cli.tz.as_deref().map(parse_timezone).transpose()?;

    let mut session = open_session(credentials).await?;
    let result = set_time_on(&mut session, &spec, explicit_tz, cli.no_tz).await;
    close_quietly(session, reporter).await;

    let (display, tz_note) = result?;
    reporter.info("time update", Some(&format!("{display}{tz_note}")));
    Ok(())
}

async fn set_time_on(
    session: &mut Session,
    spec: &TimeSpec,
    explicit_tz: Option<i16>,
    no_tz: bool,
) -> Result<(String, String)> {
    // resolve "now" as late as possible
    let (timestamp, host_offset, display) = spec.resolve()?;
    let timestamp = u32::try_from(timestamp)
        .map_err(|_| Error::Validation(format!("timestamp {timestamp} is out of device range")))?;
    session.set_time(timestamp).await?;

    if no_tz {
        return Ok((display, ", timezone untouched".into()));
    }
    let target = match explicit_tz {
        Some(minutes) => minutes,
        None => round_to_device_granularity(host_offset),
    };
    let mut settings = session.settings().await?;
    if settings.timezone_offset() == target {
        return Ok((display, format!(", timezone already {}", fmt_offset(target))));
    }
    settings.set_timezone_offset(target)?;
    session.write_settings(&settings).await?;
    Ok((display, format!(", timezone set to {}", fmt_offset(target))))
}

pub async fn get_settings(credentials: &Credentials, reporter: &Reporter) -> Result<()> {
    let mut session = open_session(credentials).await?;
    let result = session.settings().await;
    close_quietly(session, reporter).await;

    print_settings(&result?);
    reporter.info("settings get", None);
    Ok(())
}

pub async fn set_settings(cli: &Cli, credentials: &Credentials, reporter: &Reporter) -> Result<()> {
    let patch = SettingsPatch::from_cli(cli)?;
    if patch.is_empty() {
        return Err(Error::Validation(
            "no settings provided (use --volume, --lang, --night-mode, ...)".into(),
        )
        .into());
    }

    let mut session = open_session(credentials).await?;
    let result = async {
        let mut settings = session.settings().await?;
        let changes = patch.apply(&mut settings)?;
        let confirmed = session.write_settings(&settings).await?;
        Ok::<_, Error>((changes, confirmed))
    }
    .await;
    close_quietly(session, reporter).await;

    let (changes, confirmed) = result?;
    print_settings(&confirmed);
    reporter.info("settings update", Some(&changes.join(", ")));
    Ok(())
}

pub async fn preview_brightness(
    value: u8,
    credentials: &Credentials,
    reporter: &Reporter,
) -> Result<()> {
    if value > 100 || value % 10 != 0 {
        return Err(Error::Validation(format!(
            "brightness must be 0..100 in steps of 10, got {value}"
        ))
        .into());
    }

    let mut session = open_session(credentials).await?;
    let result = session.preview_brightness(value).await;
    close_quietly(session, reporter).await;

    result?;
    reporter.info("brightness preview", Some(&format!("{value}%")));
    Ok(())
}

pub async fn preview_ringtone(
    cli: &Cli,
    credentials: &Credentials,
    reporter: &Reporter,
) -> Result<()> {
    if let Some(volume) = cli.preview_volume {
        if !(1..=5).contains(&volume) {
            return Err(Error::Validation(format!(
                "preview volume must be 1..5, got {volume}"
            ))
            .into());
        }
    }

    let mut session = open_session(credentials).await?;
    let result = session.preview_ringtone(cli.preview_volume).await;
    close_quietly(session, reporter).await;

    result?;
    reporter.info("ringtone preview", None);
    Ok(())
}

pub async fn get_alarms(credentials: &Credentials, reporter: &Reporter) -> Result<()> {
    let mut session = open_session(credentials).await?;
    let result = session.alarms().await;
    close_quietly(session, reporter).await;

    let alarms = result?;
    println!("Slot  State     Time   Repeat               Snooze");
    let mut configured = 0;
    let mut enabled = 0;
    for alarm in &alarms {
        match &alarm.entry {
            Some(entry) => {
                configured += 1;
                if entry.enabled {
                    enabled += 1;
                }
                println!(
                    "{:>4}  {:<8}  {}  {:<19}  {}",
                    alarm.slot,
                    if entry.enabled { "enabled" } else { "disabled" },
                    entry.time,
                    entry.days.to_string(),
                    if entry.snooze { "on" } else { "off" },
                );
            }
            None => println!("{:>4}  empty", alarm.slot),
        }
    }
    reporter.info(
        "alarms get",
        Some(&format!(
            "{configured} configured, {enabled} enabled, {} empty",
            alarms.len() - configured
        )),
    );
    Ok(())
}

pub async fn set_alarm(cli: &Cli, credentials: &Credentials, reporter: &Reporter) -> Result<()> {
    let slot = parse_slot_index(cli.alarm_slot.as_deref())?;
    let time = cli.alarm_time.as_deref().map(parse_hhmm).transpose()?;
    let days = cli.alarm_days.as_deref().map(AlarmDays::parse).transpose()?;
    let snooze = cli.alarm_snooze.as_deref().map(parse_onoff).transpose()?;
    let enabled = match (cli.alarm_enable, cli.alarm_disable) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    };

    let mut session = open_session(credentials).await?;
    let result = async {
        let current = session
            .alarms()
            .await?
            .into_iter()
            .find(|a| a.slot == slot)
            .and_then(|a| a.entry);

        let entry = match current {
            Some(existing) => AlarmEntry {
                enabled: enabled.unwrap_or(existing.enabled),
                time: time.unwrap_or(existing.time),
                days: days.unwrap_or(existing.days),
                snooze: snooze.unwrap_or(existing.snooze),
            },
            None => AlarmEntry {
                enabled: enabled.unwrap_or(true),
                time: time.ok_or_else(|| {
                    Error::Validation(format!(
                        "slot {slot} is empty, --alarm-time is required"
                    ))
                })?,
                days: days.unwrap_or_default(),
                snooze: snooze.unwrap_or(false),
            },
        };
        let alarm = Alarm {
            slot,
            entry: Some(entry),
        };
        session.write_alarm(&alarm).await?;

        let stored = session
            .alarms()
            .await?
            .into_iter()
            .find(|a| a.slot == slot)
            .ok_or_else(|| Error::Protocol(format!("slot {slot} missing from table")))?;
        if stored != alarm {
            return Err(Error::Protocol(format!(
                "device did not store alarm slot {slot} as written"
            )));
        }
        Ok::<_, Error>(entry)
    }
    .await;
    close_quietly(session, reporter).await;

    let entry = result?;
    reporter.info(
        "alarm update",
        Some(&format!(
            "slot {slot}: {} {} {} snooze {}",
            if entry.enabled { "enabled" } else { "disabled" },
            entry.time,
            entry.days,
            if entry.snooze { "on" } else { "off" },
        )),
    );
    Ok(())
}

pub async fn delete_alarm(cli: &Cli, credentials: &Credentials, reporter: &Reporter) -> Result<()> {
    let slot = parse_slot_or_all(cli.alarm_slot.as_deref())?;

    let mut session = open_session(credentials).await?;
    let result = async {
        match slot {
            Some(slot) => {
                session.write_alarm(&Alarm::empty(slot)).await?;
                let stored = session
                    .alarms()
                    .await?
                    .into_iter()
                    .find(|a| a.slot == slot);
                if stored.is_some_and(|a| a.entry.is_some()) {
                    return Err(Error::Protocol(format!(
                        "slot {slot} is still configured after the delete"
                    )));
                }
                Ok::<_, Error>(format!("slot {slot} cleared"))
            }
            None => {
                for slot in 0..ALARM_SLOTS as u8 {
                    session.write_alarm(&Alarm::empty(slot)).await?;
                }
                let leftover = session
                    .alarms()
                    .await?
                    .into_iter()
                    .filter(|a| a.entry.is_some())
                    .count();
                if leftover > 0 {
                    return Err(Error::Protocol(format!(
                        "{leftover} slots are still configured after the delete"
                    )));
                }
                Ok(format!("all {ALARM_SLOTS} slots cleared"))
            }
        }
    }
    .await;
    close_quietly(session, reporter).await;

    reporter.info("alarm delete", Some(&result?));
    Ok(())
}

pub async fn upload_ringtone(
    cli: &Cli,
    path: &Path,
    credentials: &Credentials,
    reporter: &Reporter,
) -> Result<()> {
    let pcm = load_pcm(path)?;
    let selector: SlotSelector = cli.ringtone_slot.parse()?;

    let mut session = open_session(credentials).await?;
    let result = async {
        let signature = match selector {
            SlotSelector::Dead => ringtone::SLOT_DEAD,
            SlotSelector::Beef => ringtone::SLOT_BEEF,
            SlotSelector::Auto => {
                let settings = session.settings().await?;
                choose_upload_slot(Some(settings.ringtone_signature()))
            }
        };
        session
            .upload_ringtone(&pcm, signature, |progress| {
                print!("\rUploading: {:3}%", (progress * 100.0) as u32);
                let _ = io::stdout().flush();
            })
            .await?;
        println!("\rUploading: 100%");
        Ok::<_, Error>(signature)
    }
    .await;
    close_quietly(session, reporter).await;

    let signature = result?;
    reporter.info(
        "ringtone upload",
        Some(&format!(
            "{} ({} bytes) into slot {} (activate with --set-settings --ringtone {})",
            path.display(),
            pcm.len(),
            signature_name(signature).unwrap_or("custom"),
            hex::encode(signature),
        )),
    );
    Ok(())
}

/// Parses `--alarm-slot` for actions that need one concrete slot index.
fn parse_slot_index(raw: Option<&str>) -> Result<u8, Error> {
    let raw = raw.ok_or_else(|| Error::Validation("--alarm-slot is required".into()))?;
    if raw.trim().eq_ignore_ascii_case("all") {
        return Err(Error::Validation(
            "--alarm-slot all is only valid with --delete-alarm".into(),
        ));
    }
    let slot: u8 = raw.trim().parse().map_err(|_| {
        Error::Validation(format!(
            "alarm slot must be 0..{} or \"all\", got \"{raw}\"",
            ALARM_SLOTS - 1
        ))
    })?;
    if slot as usize >= ALARM_SLOTS {
        return Err(Error::Validation(format!(
            "alarm slot must be 0..{}, got {slot}",
            ALARM_SLOTS - 1
        )));
    }
    Ok(slot)
}

/// Parses `--alarm-slot` for the delete action, where `all` (-> `None`)
/// clears every slot.
fn parse_slot_or_all(raw: Option<&str>) -> Result<Option<u8>, Error> {
    let raw = raw.ok_or_else(|| {
        Error::Validation("--alarm-slot is required (an index or \"all\")".into())
    })?;
    if raw.trim().eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    parse_slot_index(Some(raw)).map(Some)
}

async fn open_session(credentials: &Credentials) -> Result<Session, Error> {
    let token = credentials.token_bytes()?;
    Session::open(&credentials.address, &token).await
}

/// Disconnect errors after a completed (or already failed) operation are
/// only worth a debug line, never the exit status.
async fn close_quietly(session: Session, reporter: &Reporter) {
    if let Err(e) = session.close().await {
        reporter.debug(&format!("disconnect failed: {e}"));
    }
}

fn fmt_offset(minutes: i16) -> String {
    let sign = if minutes < 0 { '-' } else { '+' };
    let magnitude = minutes.unsigned_abs();
    format!("UTC{sign}{:02}:{:02}", magnitude / 60, magnitude % 60)
}

fn print_settings(settings: &Settings) {
    let signature = settings.ringtone_signature();
    println!("Settings:");
    println!("  Volume:           {}", settings.volume());
    println!("  Language:         {}", settings.language());
    println!(
        "  Clock format:     {}",
        if settings.use_24h_format() { "24h" } else { "12h" }
    );
    println!(
        "  Temperature unit: {}",
        if settings.use_celsius() { "Celsius" } else { "Fahrenheit" }
    );
    println!(
        "  Alarms:           {}",
        if settings.alarms_enabled() { "on" } else { "off" }
    );
    println!("  Timezone:         {}", fmt_offset(settings.timezone_offset()));
    println!(
        "  Backlight:        {}",
        match settings.backlight_secs() {
            0 => "off".to_string(),
            secs => format!("{secs}s"),
        }
    );
    println!("  Day brightness:   {}%", settings.day_brightness());
    println!("  Night brightness: {}%", settings.night_brightness());
    println!(
        "  Night mode:       {}",
        if settings.night_mode() {
            format!("on ({} - {})", settings.night_start(), settings.night_end())
        } else {
            "off".to_string()
        }
    );
    println!(
        "  Ringtone:         {} ({})",
        signature_name(signature).unwrap_or("unknown"),
        hex::encode(signature),
    );
}

/// The `--set-settings` field flags, parsed and range-checked before the
/// session opens.
struct SettingsPatch {
    volume: Option<u8>,
    language: Option<Language>,
    use_24h_format: Option<bool>,
    use_celsius: Option<bool>,
    alarms_enabled: Option<bool>,
    backlight_secs: Option<u8>,
    day_brightness: Option<u8>,
    night_brightness: Option<u8>,
    night_mode: Option<bool>,
    night_start: Option<crate::device::types::ClockTime>,
    night_end: Option<crate::device::types::ClockTime>,
    ringtone: Option<[u8; 4]>,
}

impl SettingsPatch {
    fn from_cli(cli: &Cli) -> Result<Self, Error> {
        Ok(Self {
            volume: cli.volume,
            language: cli.lang.as_deref().map(str::parse).transpose()?,
            use_24h_format: cli.timefmt.as_deref().map(|v| v == "24"),
            use_celsius: cli.temp.as_deref().map(|v| v == "c"),
            alarms_enabled: cli.master_alarms.as_deref().map(parse_onoff).transpose()?,
            backlight_secs: cli.backlight,
            day_brightness: cli.day_bright,
            night_brightness: cli.night_bright,
            night_mode: cli.night_mode.as_deref().map(parse_onoff).transpose()?,
            night_start: cli.night_start.as_deref().map(parse_hhmm).transpose()?,
            night_end: cli.night_end.as_deref().map(parse_hhmm).transpose()?,
            ringtone: cli
                .ringtone
                .as_deref()
                .map(ringtone::parse_signature)
                .transpose()?,
        })
    }

    fn is_empty(&self) -> bool {
        self.volume.is_none()
            && self.language.is_none()
            && self.use_24h_format.is_none()
            && self.use_celsius.is_none()
            && self.alarms_enabled.is_none()
            && self.backlight_secs.is_none()
            && self.day_brightness.is_none()
            && self.night_brightness.is_none()
            && self.night_mode.is_none()
            && self.night_start.is_none()
            && self.night_end.is_none()
            && self.ringtone.is_none()
    }

    /// Applies the patch to a freshly read snapshot. Night mode goes first
    /// since toggling it resets the window; explicit `--night-start`/`--night-end`
    /// then override the defaults.
    fn apply(&self, settings: &mut Settings) -> Result<Vec<String>, Error> {
        let mut changes = Vec::new();
        if let Some(v) = self.night_mode {
            settings.set_night_mode(v);
            changes.push(format!("night mode {}", onoff(v)));
        }
        if let Some(t) = self.night_start {
            settings.set_night_start(t);
            changes.push(format!("night start {t}"));
        }
        if let Some(t) = self.night_end {
            settings.set_night_end(t);
            changes.push(format!("night end {t}"));
        }
        if let Some(v) = self.volume {
            settings.set_volume(v)?;
            changes.push(format!("volume {v}"));
        }
        if let Some(v) = self.language {
            settings.set_language(v);
            changes.push(format!("language {v}"));
        }
        if let Some(v) = self.use_24h_format {
            settings.set_use_24h_format(v);
            changes.push(format!("clock format {}", if v { "24h" } else { "12h" }));
        }
        if let Some(v) = self.use_celsius {
            settings.set_use_celsius(v);
            changes.push(format!(
                "temperature unit {}",
                if v { "Celsius" } else { "Fahrenheit" }
            ));
        }
        if let Some(v) = self.alarms_enabled {
            settings.set_alarms_enabled(v);
            changes.push(format!("alarms {}", onoff(v)));
        }
        if let Some(v) = self.backlight_secs {
            settings.set_backlight_secs(v)?;
            changes.push(format!("backlight {v}s"));
        }
        if let Some(v) = self.day_brightness {
            settings.set_day_brightness(v)?;
            changes.push(format!("day brightness {v}%"));
        }
        if let Some(v) = self.night_brightness {
            settings.set_night_brightness(v)?;
            changes.push(format!("night brightness {v}%"));
        }
        if let Some(sig) = self.ringtone {
            settings.set_ringtone_signature(sig);
            let name = signature_name(sig)
                .map(str::to_string)
                .unwrap_or_else(|| hex::encode(sig));
            changes.push(format!("ringtone {name}"));
        }
        Ok(changes)
    }
}

fn onoff(v: bool) -> &'static str {
    if v {
        "on"
    } else {
        "off"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn action_names_cover_the_flags() {
        let cases = [
            (vec!["cgd1", "--set-config"], "config set"),
            (vec!["cgd1", "--show-config"], "config show"),
            (vec!["cgd1", "--set-time"], "time update"),
            (vec!["cgd1", "--get-settings"], "settings get"),
            (vec!["cgd1", "--set-settings"], "settings update"),
            (vec!["cgd1", "--preview-brightness", "50"], "brightness preview"),
            (vec!["cgd1", "--preview-ringtone"], "ringtone preview"),
            (vec!["cgd1", "--get-alarms"], "alarms get"),
            (vec!["cgd1", "--set-alarm"], "alarm update"),
            (vec!["cgd1", "--delete-alarm"], "alarm delete"),
            (vec!["cgd1", "--upload-ringtone", "x.wav"], "ringtone upload"),
        ];
        for (args, expected) in cases {
            let cli = Cli::try_parse_from(args).unwrap();
            assert_eq!(action_name(&cli), expected);
        }
    }

    #[test]
    fn slot_index_parsing() {
        assert_eq!(parse_slot_index(Some("0")).unwrap(), 0);
        assert_eq!(parse_slot_index(Some("15")).unwrap(), 15);
        assert!(parse_slot_index(Some("16")).is_err());
        assert!(parse_slot_index(Some("-1")).is_err());
        assert!(parse_slot_index(None).is_err());
        // "all" belongs to --delete-alarm
        let err = parse_slot_index(Some("all")).unwrap_err();
        assert!(err.to_string().contains("--delete-alarm"));
    }

    #[test]
    fn slot_or_all_parsing() {
        assert_eq!(parse_slot_or_all(Some("all")).unwrap(), None);
        assert_eq!(parse_slot_or_all(Some("7")).unwrap(), Some(7));
        assert!(parse_slot_or_all(Some("99")).is_err());
        assert!(parse_slot_or_all(None).is_err());
    }

    #[test]
    fn offset_formatting() {
        assert_eq!(fmt_offset(0), "UTC+00:00");
        assert_eq!(fmt_offset(60), "UTC+01:00");
        assert_eq!(fmt_offset(-150), "UTC-02:30");
        assert_eq!(fmt_offset(345), "UTC+05:45");
    }

    #[test]
    fn settings_patch_detects_empty_and_applies_in_order() {
        let cli = Cli::try_parse_from(["cgd1", "--set-settings"]).unwrap();
        assert!(SettingsPatch::from_cli(&cli).unwrap().is_empty());

        let cli = Cli::try_parse_from([
            "cgd1",
            "--set-settings",
            "--night-mode",
            "on",
            "--night-start",
            "22:30",
            "--volume",
            "4",
        ])
        .unwrap();
        let patch = SettingsPatch::from_cli(&cli).unwrap();
        assert!(!patch.is_empty());

        let mut settings = test_settings();
        let changes = patch.apply(&mut settings).unwrap();
        // explicit start wins over the night-mode default window
        assert_eq!(settings.night_start().to_string(), "22:30");
        assert_eq!(settings.night_end().to_string(), "06:00");
        assert_eq!(settings.volume(), 4);
        assert_eq!(changes.len(), 3);
    }

    #[test]
    fn settings_patch_rejects_out_of_range_fields() {
        let cli =
            Cli::try_parse_from(["cgd1", "--set-settings", "--volume", "9"]).unwrap();
        let patch = SettingsPatch::from_cli(&cli).unwrap();
        assert!(patch.apply(&mut test_settings()).is_err());
    }

    fn test_settings() -> Settings {
        Settings::decode(&[
            0x13, 0x02, 0x03, 0x58, 0x02, 0x03, 0x0a, 0x0f, 0x53, 0x15, 0x00, 0x06, 0x00,
            0x01, 0x01, 0x00, 0xfd, 0xc3, 0x66, 0xa5,
        ])
        .unwrap()
    }
}
