//! Ringtone signatures, slot selection and the chunked audio upload.
//!
//! Audio is raw 8 kHz mono unsigned 8-bit PCM. Custom tones live in one of
//! two storage slots identified by their signature, `deaddead` or `beefbeef`;
//! the companion app alternates between them so an upload never overwrites
//! the tone currently in use. Built-in tones are addressed by signature too.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use log::debug;

use crate::device::constants::{
    ACK_OPCODE_BLOCK, ACK_OPCODE_INIT, AUDIO_ACK_PREFIX, AUDIO_BLOCK_PACKETS, AUDIO_DATA_PREFIX,
    AUDIO_INIT_PREFIX, AUDIO_MAX_BYTES, AUDIO_PACKET_SIZE, AUDIO_PAD_BYTE,
};
use crate::error::{Error, Result};

pub const SLOT_DEAD: [u8; 4] = [0xde, 0xad, 0xde, 0xad];
pub const SLOT_BEEF: [u8; 4] = [0xbe, 0xef, 0xbe, 0xef];

/// Signatures of the tones shipped with the firmware.
pub const BUILTIN_RINGTONES: [(&str, [u8; 4]); 9] = [
    ("beep", [0xfd, 0xc3, 0x66, 0xa5]),
    ("digital_1", [0x09, 0x61, 0xbb, 0x77]),
    ("digital_2", [0xba, 0x2c, 0x2c, 0x8c]),
    ("cuckoo", [0xea, 0x2d, 0x4c, 0x02]),
    ("telephone", [0x79, 0x1b, 0xac, 0xb3]),
    ("exotic_guitar", [0x1d, 0x01, 0x9f, 0xd6]),
    ("lively_piano", [0x6e, 0x70, 0xb6, 0x59]),
    ("story_piano", [0x8f, 0x00, 0x48, 0x86]),
    ("forest_piano", [0x26, 0x52, 0x25, 0x19]),
];

/// Best-effort name for a signature read back from the device.
pub fn signature_name(signature: [u8; 4]) -> Option<&'static str> {
    if signature == SLOT_DEAD {
        return Some("custom (dead)");
    }
    if signature == SLOT_BEEF {
        return Some("custom (beef)");
    }
    BUILTIN_RINGTONES
        .iter()
        .find(|(_, sig)| *sig == signature)
        .map(|(name, _)| *name)
}

/// Parses a `--ringtone` value: a built-in name, `dead`/`beef`, or 8 hex
/// characters naming a signature directly.
pub fn parse_signature(raw: &str) -> Result<[u8; 4]> {
    let s = raw.trim().to_ascii_lowercase();
    if s.is_empty() {
        return Err(Error::Validation(
            "ringtone requires a value (name, dead/beef, or 8 hex chars)".into(),
        ));
    }

    let normalized = s.replace(['-', ' '], "_");
    if let Some((_, sig)) = BUILTIN_RINGTONES.iter().find(|(name, _)| *name == normalized) {
        return Ok(*sig);
    }
    match s.as_str() {
        "dead" | "deaddead" => return Ok(SLOT_DEAD),
        "beef" | "beefbeef" => return Ok(SLOT_BEEF),
        _ => {}
    }

    let cleaned: String = s.chars().filter(char::is_ascii_hexdigit).collect();
    if cleaned.len() != 8 {
        return Err(Error::Validation(
            "ringtone must be a known name, dead/beef, or 8 hex chars (4 bytes)".into(),
        ));
    }
    let bytes = hex::decode(&cleaned)
        .map_err(|e| Error::Validation(format!("invalid ringtone hex: {e}")))?;
    Ok([bytes[0], bytes[1], bytes[2], bytes[3]])
}

/// Upload target selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotSelector {
    /// Pick whichever custom slot is not currently active.
    Auto,
    Dead,
    Beef,
}

impl FromStr for SlotSelector {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(SlotSelector::Auto),
            "dead" => Ok(SlotSelector::Dead),
            "beef" => Ok(SlotSelector::Beef),
            other => Err(Error::Validation(format!(
                "ringtone slot must be auto, dead or beef, got \"{other}\""
            ))),
        }
    }
}

impl fmt::Display for SlotSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SlotSelector::Auto => "auto",
            SlotSelector::Dead => "dead",
            SlotSelector::Beef => "beef",
        })
    }
}

/// Picks the custom slot to upload into, given the signature currently
/// active on the device: the inactive one of the pair, defaulting to "dead"
/// when a built-in or unknown tone is active.
pub fn choose_upload_slot(active: Option<[u8; 4]>) -> [u8; 4] {
    match active {
        Some(sig) if sig == SLOT_DEAD => SLOT_BEEF,
        _ => SLOT_DEAD,
    }
}

/// Loads ringtone PCM from disk. `.wav` files are validated as 8 kHz mono
/// unsigned 8-bit and stripped to their frames; anything else is taken as
/// raw PCM. No transcoding happens here.
pub fn load_pcm(path: &Path) -> Result<Vec<u8>> {
    let data = fs::read(path)?;
    let is_wav = path
        .extension()
        .map_or(false, |ext| ext.eq_ignore_ascii_case("wav"));
    if is_wav {
        wav_frames(&data)
    } else {
        Ok(data)
    }
}

fn wav_frames(data: &[u8]) -> Result<Vec<u8>> {
    if data.len() < 12 || &data[0..4] != b"RIFF" || &data[8..12] != b"WAVE" {
        return Err(Error::Validation("not a RIFF/WAVE file".into()));
    }

    let mut pos = 12;
    let mut format_checked = false;
    while pos + 8 <= data.len() {
        let id = &data[pos..pos + 4];
        let len = u32::from_le_bytes([data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]])
            as usize;
        let body = data
            .get(pos + 8..pos + 8 + len)
            .ok_or_else(|| Error::Validation("truncated WAV chunk".into()))?;

        match id {
            b"fmt " => {
                if body.len() < 16 {
                    return Err(Error::Validation("malformed WAV fmt chunk".into()));
                }
                let audio_format = u16::from_le_bytes([body[0], body[1]]);
                let channels = u16::from_le_bytes([body[2], body[3]]);
                let sample_rate = u32::from_le_bytes([body[4], body[5], body[6], body[7]]);
                let bits = u16::from_le_bytes([body[14], body[15]]);
                if audio_format != 1 {
                    return Err(Error::Validation("WAV must be uncompressed PCM".into()));
                }
                if channels != 1 {
                    return Err(Error::Validation(format!(
                        "WAV must be mono, got {channels} channels"
                    )));
                }
                if sample_rate != 8000 {
                    return Err(Error::Validation(format!(
                        "WAV must be 8000 Hz, got {sample_rate} Hz"
                    )));
                }
                if bits != 8 {
                    return Err(Error::Validation(format!(
                        "WAV must be 8-bit unsigned, got {bits}-bit"
                    )));
                }
                format_checked = true;
            }
            b"data" => {
                if !format_checked {
                    return Err(Error::Validation("WAV data chunk precedes fmt chunk".into()));
                }
                return Ok(body.to_vec());
            }
            _ => {}
        }
        // chunks are word-aligned
        pos += 8 + len + (len & 1);
    }
    Err(Error::Validation("WAV file has no data chunk".into()))
}

/// Extracts `(opcode, status)` from a `04 FF` audio acknowledgment frame.
pub fn parse_audio_ack(frame: &[u8]) -> Option<(u8, Option<u8>)> {
    if frame.len() >= 3 && frame.starts_with(&AUDIO_ACK_PREFIX) {
        Some((frame[2], frame.get(3).copied()))
    } else {
        None
    }
}

/// Write side of the upload sequence, implemented by the live session and by
/// test doubles.
#[async_trait]
pub trait AudioTransport {
    async fn send_packet(&mut self, packet: &[u8]) -> Result<()>;
    async fn await_ack(&mut self, opcode: u8) -> Result<()>;
}

/// Runs the full upload: init packet, init ack, then 128-byte data packets
/// in blocks of four, waiting for the device's block ack after every fourth
/// packet. A failed write or a missed ack aborts the upload; it cannot be
/// resumed and must be restarted from the first packet.
pub async fn upload<T, F>(
    transport: &mut T,
    pcm: &[u8],
    signature: [u8; 4],
    mut on_progress: F,
) -> Result<()>
where
    T: AudioTransport + ?Sized,
    F: FnMut(f64),
{
    if pcm.is_empty() {
        return Err(Error::Validation("ringtone payload is empty".into()));
    }
    if pcm.len() > AUDIO_MAX_BYTES {
        return Err(Error::Validation(format!(
            "ringtone payload too large ({} bytes, max {AUDIO_MAX_BYTES})",
            pcm.len()
        )));
    }

    let size = pcm.len();
    let mut init = Vec::with_capacity(9);
    init.extend_from_slice(&AUDIO_INIT_PREFIX);
    init.extend_from_slice(&[(size & 0xff) as u8, (size >> 8 & 0xff) as u8, (size >> 16 & 0xff) as u8]);
    init.extend_from_slice(&signature);
    debug!("audio init: {}", hex::encode(&init));
    transport.send_packet(&init).await?;
    transport.await_ack(ACK_OPCODE_INIT).await?;

    let block_size = AUDIO_PACKET_SIZE * AUDIO_BLOCK_PACKETS;
    let total_blocks = size.div_ceil(block_size);
    let mut sent = 0usize;

    for block in 0..total_blocks {
        for pkt in 0..AUDIO_BLOCK_PACKETS {
            let offset = block * block_size + pkt * AUDIO_PACKET_SIZE;
            let mut packet = Vec::with_capacity(2 + AUDIO_PACKET_SIZE);
            packet.extend_from_slice(&AUDIO_DATA_PREFIX);
            if offset < size {
                let chunk = &pcm[offset..size.min(offset + AUDIO_PACKET_SIZE)];
                packet.extend_from_slice(chunk);
                sent += chunk.len();
            }
            packet.resize(2 + AUDIO_PACKET_SIZE, AUDIO_PAD_BYTE);

            transport.send_packet(&packet).await?;
            if pkt == AUDIO_BLOCK_PACKETS - 1 {
                transport.await_ack(ACK_OPCODE_BLOCK).await?;
            }
        }
        on_progress((sent as f64 / size as f64).min(1.0));
        debug!(
            "block {}/{} acknowledged ({sent}/{size} bytes)",
            block + 1,
            total_blocks
        );
    }
    Ok(())
}
