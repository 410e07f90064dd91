//! The local credential store: one JSON file holding the clock's MAC address
//! and its 16-byte token. Written only by `--set-config`; device commands
//! read it when `--address`/`--token` are not given explicitly.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::device::constants::TOKEN_LEN;
use crate::error::{Error, Result};

const CONFIG_DIR: &str = "qingping-cgd1";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    /// Colon-separated MAC address, uppercase.
    pub address: String,
    /// 32 lowercase hex characters.
    pub token: String,
}

impl Credentials {
    pub fn new(address: &str, token: &str) -> Result<Self> {
        Ok(Self {
            address: normalize_address(address)?,
            token: normalize_token(token)?,
        })
    }

    pub fn token_bytes(&self) -> Result<[u8; TOKEN_LEN]> {
        let bytes = hex::decode(&self.token)
            .map_err(|e| Error::Validation(format!("invalid token hex: {e}")))?;
        bytes.try_into().map_err(|_| {
            Error::Validation(format!("token must be exactly {TOKEN_LEN} bytes"))
        })
    }

    /// Token rendered for display: first and last four hex chars only.
    pub fn redacted_token(&self) -> String {
        format!(
            "{}...{} (hidden)",
            &self.token[..4],
            &self.token[self.token.len() - 4..]
        )
    }
}

pub fn default_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
        .ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::NotFound,
                "no user configuration directory on this system",
            ))
        })
}

pub fn load(path: &Path) -> Result<Option<Credentials>> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)?;
    let stored: Credentials = serde_json::from_str(&raw).map_err(|e| {
        Error::Validation(format!("credential file {} is invalid: {e}", path.display()))
    })?;
    Credentials::new(&stored.address, &stored.token).map(Some)
}

/// Writes the credential file atomically (tmp + rename) and, on unix, keeps
/// it private to the owner.
pub fn save(path: &Path, credentials: &Credentials) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let body = serde_json::to_string_pretty(credentials)
        .map_err(|e| Error::Io(io::Error::new(io::ErrorKind::InvalidData, e)))?;

    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, body + "\n")?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp, fs::Permissions::from_mode(0o600));
    }
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Explicit command-line credentials win; otherwise the stored file is used.
pub fn resolve(path: &Path, address: Option<&str>, token: Option<&str>) -> Result<Credentials> {
    if let (Some(address), Some(token)) = (address, token) {
        return Credentials::new(address, token);
    }
    match load(path)? {
        Some(credentials) => Ok(credentials),
        None => Err(Error::ConfigMissing(format!(
            "pass --address and --token, or save them once with --set-config (config path: {})",
            path.display()
        ))),
    }
}

fn normalize_token(raw: &str) -> Result<String> {
    let cleaned: String = raw
        .chars()
        .filter(char::is_ascii_hexdigit)
        .collect::<String>()
        .to_ascii_lowercase();
    if cleaned.len() != TOKEN_LEN * 2 {
        return Err(Error::Validation(format!(
            "token must be {TOKEN_LEN} bytes = {} hex chars (separators allowed)",
            TOKEN_LEN * 2
        )));
    }
    Ok(cleaned)
}

fn normalize_address(raw: &str) -> Result<String> {
    let parts: Vec<&str> = raw.trim().split([':', '-']).collect();
    let valid = parts.len() == 6
        && parts
            .iter()
            .all(|p| p.len() == 2 && p.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(Error::Validation(format!(
            "MAC address must be six colon-separated hex pairs (e.g. 58:AB:CD:EF:AB:CD), got \"{raw}\""
        )));
    }
    Ok(parts.join(":").to_uppercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "0e659bab47a6494d96ab11a3367bce6e";

    #[test]
    fn normalizes_address_and_token() {
        let creds = Credentials::new("58-ab-cd-ef-ab-cd", "0E:65:9B:AB:47:A6:49:4D:96:AB:11:A3:36:7B:CE:6E").unwrap();
        assert_eq!(creds.address, "58:AB:CD:EF:AB:CD");
        assert_eq!(creds.token, TOKEN);
        assert_eq!(creds.token_bytes().unwrap()[0], 0x0e);
    }

    #[test]
    fn rejects_bad_input() {
        assert!(Credentials::new("58:AB:CD:EF:AB", TOKEN).is_err());
        assert!(Credentials::new("not a mac", TOKEN).is_err());
        assert!(Credentials::new("58:AB:CD:EF:AB:CD", "abcd").is_err());
        assert!(Credentials::new("58:AB:CD:EF:AB:CD", &TOKEN[..30]).is_err());
    }

    #[test]
    fn redaction_hides_the_middle() {
        let creds = Credentials::new("58:AB:CD:EF:AB:CD", TOKEN).unwrap();
        let shown = creds.redacted_token();
        assert!(shown.starts_with("0e65"));
        assert!(shown.contains("ce6e"));
        assert!(!shown.contains(&TOKEN[4..28]));
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let creds = Credentials::new("58:ab:cd:ef:ab:cd", TOKEN).unwrap();
        save(&path, &creds).unwrap();

        let loaded = load(&path).unwrap().unwrap();
        assert_eq!(loaded.address, "58:AB:CD:EF:AB:CD");
        assert_eq!(loaded.token, TOKEN);
    }

    #[test]
    fn resolve_prefers_explicit_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        save(&path, &Credentials::new("11:11:11:11:11:11", TOKEN).unwrap()).unwrap();

        let explicit = resolve(&path, Some("22:22:22:22:22:22"), Some(TOKEN)).unwrap();
        assert_eq!(explicit.address, "22:22:22:22:22:22");
        let stored = resolve(&path, None, None).unwrap();
        assert_eq!(stored.address, "11:11:11:11:11:11");
    }

    #[test]
    fn resolve_without_any_credentials_is_config_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let err = resolve(&path, None, Some(TOKEN)).unwrap_err();
        assert!(matches!(err, Error::ConfigMissing(_)));
    }

    #[test]
    fn load_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{\"address\": 1}").unwrap();
        assert!(load(&path).is_err());
    }
}
