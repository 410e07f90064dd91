//! The authenticated device session.
//!
//! One session per invocation: resolve the adapter, find the device by MAC,
//! connect, discover the three vendor characteristics, run the two-step
//! token handshake and subscribe to the notification characteristic. All
//! exchanges are strictly sequential: write one command, await the matching
//! notification under a fixed timeout. There are no retries; a timeout or
//! unexpected frame fails the operation.

use async_trait::async_trait;
use bluest::{Adapter, Characteristic, Device};
use futures_util::{pin_mut, StreamExt};
use log::{debug, warn};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::device::alarm::{Alarm, AlarmCollector};
use crate::device::constants::{
    ALARMS_FRAME, AUTH_PREFIX_1, AUTH_PREFIX_2, CMD_GET_ALARMS, CMD_GET_SETTINGS,
    CMD_REPLAY_RINGTONE, CONNECT_TIMEOUT, RESPONSE_TIMEOUT, SETTINGS_FRAME, TOKEN_LEN,
    UUID_CFG_READ_CHAR, UUID_CFG_WRITE_CHAR, UUID_MAIN_CHAR,
};
use crate::device::ringtone::{self, AudioTransport};
use crate::device::scanner::DeviceScanner;
use crate::device::settings::Settings;
use crate::error::{Error, Result};

pub struct Session {
    adapter: Adapter,
    device: Device,
    main_char: Characteristic,
    cfg_write_char: Characteristic,
    notifications: mpsc::Receiver<Vec<u8>>,
    pump: JoinHandle<()>,
}

impl Session {
    /// Connects to the clock at `address` and authenticates with `token`.
    pub async fn open(address: &str, token: &[u8; TOKEN_LEN]) -> Result<Self> {
        let adapter = Adapter::default()
            .await
            .ok_or_else(|| Error::Connection("no Bluetooth adapter found".into()))?;
        adapter
            .wait_available()
            .await
            .map_err(|e| Error::Connection(format!("Bluetooth adapter unavailable: {e}")))?;

        let device = DeviceScanner::new(adapter.clone())
            .find_by_address(address)
            .await?;

        if !device.is_connected().await {
            debug!("Connecting to {address}");
            match timeout(CONNECT_TIMEOUT, adapter.connect_device(&device)).await {
                Ok(result) => result
                    .map_err(|e| Error::Connection(format!("connect to {address} failed: {e}")))?,
                Err(_) => {
                    return Err(Error::Connection(format!(
                        "connect to {address} timed out after {}s",
                        CONNECT_TIMEOUT.as_secs()
                    )))
                }
            }
        }

        let (main_char, cfg_write_char, cfg_read_char) =
            Self::resolve_characteristics(&device).await?;

        debug!("Authenticating");
        for prefix in [AUTH_PREFIX_1, AUTH_PREFIX_2] {
            let mut packet = Vec::with_capacity(2 + TOKEN_LEN);
            packet.extend_from_slice(&prefix);
            packet.extend_from_slice(token);
            main_char
                .write(&packet)
                .await
                .map_err(|e| Error::Auth(format!("device rejected the token handshake: {e}")))?;
        }

        let (notifications, pump) = Self::start_notifications(cfg_read_char).await?;

        Ok(Self {
            adapter,
            device,
            main_char,
            cfg_write_char,
            notifications,
            pump,
        })
    }

    async fn resolve_characteristics(
        device: &Device,
    ) -> Result<(Characteristic, Characteristic, Characteristic)> {
        let services = device
            .services()
            .await
            .map_err(|e| Error::Connection(format!("service discovery failed: {e}")))?;

        let mut main_char = None;
        let mut cfg_write = None;
        let mut cfg_read = None;
        for service in &services {
            let characteristics = service
                .characteristics()
                .await
                .map_err(|e| Error::Connection(format!("characteristic discovery failed: {e}")))?;
            for characteristic in characteristics {
                match characteristic.uuid() {
                    u if u == UUID_MAIN_CHAR => main_char = Some(characteristic),
                    u if u == UUID_CFG_WRITE_CHAR => cfg_write = Some(characteristic),
                    u if u == UUID_CFG_READ_CHAR => cfg_read = Some(characteristic),
                    _ => {}
                }
            }
        }

        let missing = |name: &str| Error::Protocol(format!("characteristic not found: {name}"));
        Ok((
            main_char.ok_or_else(|| missing("main"))?,
            cfg_write.ok_or_else(|| missing("config write"))?,
            cfg_read.ok_or_else(|| missing("config read"))?,
        ))
    }

    /// Spawns the notification pump. The task owns the characteristic and
    /// forwards every frame into a channel the session drains; it signals
    /// once the subscription is live so no response can be missed.
    async fn start_notifications(
        cfg_read_char: Characteristic,
    ) -> Result<(mpsc::Receiver<Vec<u8>>, JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel(32);
        let (ready_tx, ready_rx) = oneshot::channel();

        let pump = tokio::spawn(async move {
            let stream = match cfg_read_char.notify().await {
                Ok(stream) => {
                    let _ = ready_tx.send(Ok(()));
                    stream
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(Error::Protocol(format!(
                        "failed to subscribe to notifications: {e}"
                    ))));
                    return;
                }
            };
            pin_mut!(stream);
            while let Some(item) = stream.next().await {
                match item {
                    Ok(frame) => {
                        debug!("<< {}", hex::encode(&frame));
                        if tx.send(frame.to_vec()).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("notification stream error: {e}");
                        break;
                    }
                }
            }
            debug!("notification stream ended");
        });

        ready_rx
            .await
            .map_err(|_| Error::Protocol("notification task exited before subscribing".into()))??;
        Ok((rx, pump))
    }

    async fn write_main(&self, payload: &[u8]) -> Result<()> {
        debug!(">> main {}", hex::encode(payload));
        self.main_char
            .write(payload)
            .await
            .map_err(|e| Error::Protocol(format!("write failed: {e}")))
    }

    async fn write_cfg(&self, payload: &[u8]) -> Result<()> {
        debug!(">> cfg {}", hex::encode(payload));
        self.cfg_write_char
            .write(payload)
            .await
            .map_err(|e| Error::Protocol(format!("write failed: {e}")))
    }

    async fn next_notification(&mut self) -> Result<Vec<u8>> {
        match timeout(RESPONSE_TIMEOUT, self.notifications.recv()).await {
            Ok(Some(frame)) => Ok(frame),
            Ok(None) => Err(Error::Protocol("notification stream closed".into())),
            Err(_) => Err(Error::Protocol(format!(
                "no response from device within {}s",
                RESPONSE_TIMEOUT.as_secs()
            ))),
        }
    }

    /// Reads the settings record.
    pub async fn settings(&mut self) -> Result<Settings> {
        self.write_cfg(&CMD_GET_SETTINGS).await?;
        loop {
            let frame = self.next_notification().await?;
            if frame.starts_with(&SETTINGS_FRAME) {
                return Settings::decode(&frame);
            }
            debug!("ignoring frame {}", hex::encode(&frame));
        }
    }

    /// Writes the full settings record and re-reads it as confirmation.
    /// Callers must mutate a freshly read snapshot; the device has no
    /// partial-field writes, so writing a stale record would clobber
    /// unrelated fields.
    pub async fn write_settings(&mut self, settings: &Settings) -> Result<Settings> {
        self.write_cfg(&settings.encode()).await?;
        self.settings().await
    }

    /// Reads the complete 16-slot alarm table.
    pub async fn alarms(&mut self) -> Result<Vec<Alarm>> {
        self.write_cfg(&CMD_GET_ALARMS).await?;
        let mut collector = AlarmCollector::default();
        loop {
            let frame = self.next_notification().await?;
            if frame.starts_with(&ALARMS_FRAME) {
                collector.feed(&frame)?;
                if collector.is_complete() {
                    return Ok(collector.into_alarms());
                }
            } else {
                debug!("ignoring frame {}", hex::encode(&frame));
            }
        }
    }

    /// Writes one alarm slot record (a delete is an empty record).
    pub async fn write_alarm(&mut self, alarm: &Alarm) -> Result<()> {
        self.write_cfg(&alarm.encode()).await
    }

    /// Sets the device clock to the given unix timestamp.
    pub async fn set_time(&mut self, timestamp: u32) -> Result<()> {
        let mut packet = Vec::with_capacity(6);
        packet.extend_from_slice(&[0x05, 0x09]);
        packet.extend_from_slice(&timestamp.to_le_bytes());
        self.write_main(&packet).await
    }

    /// Flashes the display at the given brightness without persisting it.
    /// `value` must already be validated to 0..=100 in steps of 10.
    pub async fn preview_brightness(&mut self, value: u8) -> Result<()> {
        self.write_cfg(&[0x02, 0x03, value / 10]).await
    }

    /// Plays the active ringtone, optionally at an explicit volume.
    pub async fn preview_ringtone(&mut self, volume: Option<u8>) -> Result<()> {
        match volume {
            Some(v) => self.write_cfg(&[0x02, 0x04, v]).await,
            None => self.write_cfg(&CMD_REPLAY_RINGTONE).await,
        }
    }

    /// Uploads raw PCM into the slot named by `signature`.
    pub async fn upload_ringtone(
        &mut self,
        pcm: &[u8],
        signature: [u8; 4],
        on_progress: impl FnMut(f64) + Send,
    ) -> Result<()> {
        ringtone::upload(self, pcm, signature, on_progress).await
    }

    /// Tears the connection down. Safe to call after a failed operation.
    pub async fn close(self) -> Result<()> {
        self.pump.abort();
        if self.device.is_connected().await {
            self.adapter
                .disconnect_device(&self.device)
                .await
                .map_err(|e| Error::Connection(format!("disconnect failed: {e}")))?;
        }
        Ok(())
    }
}

#[async_trait]
impl AudioTransport for Session {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()> {
        self.write_cfg(packet).await
    }

    async fn await_ack(&mut self, opcode: u8) -> Result<()> {
        loop {
            let frame = self.next_notification().await?;
            match ringtone::parse_audio_ack(&frame) {
                Some((op, _status)) if op == opcode => return Ok(()),
                Some((op, _)) => debug!("ignoring audio ack for opcode {op:#04x}"),
                None => debug!("ignoring frame {}", hex::encode(&frame)),
            }
        }
    }
}
