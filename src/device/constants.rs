//! Protocol constants for the Qingping CGD1.
//! UUIDs, command prefixes, frame markers and timeouts used by the session
//! and the wire codecs.

use std::time::Duration;
use uuid::Uuid;

/// Characteristic for the auth handshake and time writes.
pub const UUID_MAIN_CHAR: Uuid = Uuid::from_u128(0x00000001_0000_1000_8000_00805f9b34fb);

/// Characteristic all configuration/alarm/ringtone commands are written to.
pub const UUID_CFG_WRITE_CHAR: Uuid = Uuid::from_u128(0x0000000b_0000_1000_8000_00805f9b34fb);

/// Characteristic the device notifies responses on.
pub const UUID_CFG_READ_CHAR: Uuid = Uuid::from_u128(0x0000000c_0000_1000_8000_00805f9b34fb);

/// Two-step handshake prefixes, each followed by the 16-byte token.
pub const AUTH_PREFIX_1: [u8; 2] = [0x11, 0x01];
pub const AUTH_PREFIX_2: [u8; 2] = [0x11, 0x02];

/// Request the settings record.
pub const CMD_GET_SETTINGS: [u8; 2] = [0x01, 0x02];
/// Request the alarm table.
pub const CMD_GET_ALARMS: [u8; 2] = [0x01, 0x06];
/// Replay the active ringtone at the current volume.
pub const CMD_REPLAY_RINGTONE: [u8; 2] = [0x01, 0x04];

/// Settings notification marker (`13 02` + 18 payload bytes).
pub const SETTINGS_FRAME: [u8; 2] = [0x13, 0x02];
/// Alarm table notification marker (`11 06 <base> <entries>`).
pub const ALARMS_FRAME: [u8; 2] = [0x11, 0x06];

/// Ringtone upload framing.
pub const AUDIO_INIT_PREFIX: [u8; 2] = [0x08, 0x10];
pub const AUDIO_DATA_PREFIX: [u8; 2] = [0x81, 0x08];
pub const AUDIO_ACK_PREFIX: [u8; 2] = [0x04, 0xff];
pub const ACK_OPCODE_INIT: u8 = 0x10;
pub const ACK_OPCODE_BLOCK: u8 = 0x08;

/// Audio data is sent in 128-byte packets, four packets per acknowledged block.
pub const AUDIO_PACKET_SIZE: usize = 128;
pub const AUDIO_BLOCK_PACKETS: usize = 4;
pub const AUDIO_PAD_BYTE: u8 = 0xff;
/// The upload size field is a 24-bit little-endian integer.
pub const AUDIO_MAX_BYTES: usize = 0x00ff_ffff;

pub const ALARM_SLOTS: usize = 16;
pub const TOKEN_LEN: usize = 16;

/// The device stores timezone offsets in 6-minute units.
pub const TZ_GRANULARITY_MIN: i16 = 6;
/// Largest representable offset in minutes (UTC+/-12:00).
pub const TZ_MAX_OFFSET_MIN: i16 = 720;

pub const SCAN_TIMEOUT: Duration = Duration::from_secs(8);
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(10);
