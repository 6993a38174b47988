use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};
use time::{format_description::well_known::Rfc3339, Date, OffsetDateTime};

pub const ORIGINAL_VALUES_KEY: &str = "ORIGINAL_VALUES";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModKey(String);

impl ModKey {
    pub fn original() -> Self {
        ModKey(ORIGINAL_VALUES_KEY.to_string())
    }

    pub fn is_original(&self) -> bool {
        self.0 == ORIGINAL_VALUES_KEY
    }

    pub fn mint(date: Date, index: u64) -> Self {
        ModKey(format!(
            "{:04}-{:02}-{:02}-{}",
            date.year(),
            date.month() as u8,
            date.day(),
            to_base36(index)
        ))
    }

    pub fn counter_suffix(&self) -> Option<u64> {
        if self.is_original() {
            return None;
        }
        let suffix = self.0.rsplit('-').next()?;
        from_base36(suffix)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for ModKey {
    fn from(raw: String) -> Self {
        ModKey(raw)
    }
}

impl fmt::Display for ModKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn to_base36(mut value: u64) -> String {
    const DIGITS: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while value > 0 {
        out.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    out.reverse();
    String::from_utf8(out).expect("base36 digits are ascii")
}

fn from_base36(raw: &str) -> Option<u64> {
    if raw.is_empty() {
        return None;
    }
    let mut value: u64 = 0;
    for ch in raw.chars() {
        let digit = ch.to_digit(36)?;
        value = value.checked_mul(36)?.checked_add(digit as u64)?;
    }
    Some(value)
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModRegistration {
    pub archive_path: PathBuf,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_version: Option<semver::Version>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<String>,
}

impl ModRegistration {
    pub fn new(archive_path: impl Into<PathBuf>, name: impl Into<String>) -> Self {
        Self {
            archive_path: archive_path.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self.machine_version = parse_version(&self.version);
        self
    }

    pub fn with_mod_id(mut self, id: impl Into<String>) -> Self {
        self.mod_id = Some(id.into());
        self
    }

    pub fn with_download_id(mut self, id: impl Into<String>) -> Self {
        self.download_id = Some(id.into());
        self
    }

    pub fn same_identity(&self, other: &ModEntry) -> bool {
        self.archive_path == other.archive_path && self.version == other.version
    }

    pub fn file_name(&self) -> String {
        self.archive_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

impl fmt::Display for ModRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if !self.version.is_empty() {
            write!(f, " v{}", self.version)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModEntry {
    pub key: ModKey,
    pub archive_path: PathBuf,
    pub name: String,
    pub version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub machine_version: Option<semver::Version>,
    pub install_date: OffsetDateTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_id: Option<String>,
}

impl ModEntry {
    pub fn from_registration(key: ModKey, reg: &ModRegistration, now: OffsetDateTime) -> Self {
        Self {
            key,
            archive_path: reg.archive_path.clone(),
            name: reg.name.clone(),
            version: reg.version.clone(),
            machine_version: reg
                .machine_version
                .clone()
                .or_else(|| parse_version(&reg.version)),
            install_date: now,
            mod_id: reg.mod_id.clone(),
            download_id: reg.download_id.clone(),
        }
    }

    pub fn install_date_rfc3339(&self) -> String {
        self.install_date
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.install_date.to_string())
    }
}

pub fn parse_version(version_str: &str) -> Option<semver::Version> {
    let cleaned: String = version_str
        .chars()
        .filter(|c| c.is_numeric() || *c == '.')
        .collect();
    if cleaned.is_empty() {
        return None;
    }

    let cleaned = cleaned.trim_end_matches('.');
    let cleaned = if cleaned.starts_with('.') {
        format!("0{cleaned}")
    } else {
        cleaned.to_string()
    };

    let parts: Vec<&str> = cleaned.split('.').filter(|s| !s.is_empty()).collect();
    if parts.is_empty() {
        return None;
    }

    let normalized = match parts.len() {
        1 => format!("{}.0.0", parts[0]),
        2 => format!("{}.{}.0", parts[0], parts[1]),
        _ => parts[..3].join("."),
    };

    semver::Version::parse(&normalized).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::date;

    #[test]
    fn minted_keys_carry_date_and_base36_counter() {
        let key = ModKey::mint(date!(2026 - 08 - 02), 71);
        assert_eq!(key.as_str(), "2026-08-02-1Z");
        assert_eq!(key.counter_suffix(), Some(71));
    }

    #[test]
    fn original_key_has_no_counter() {
        assert_eq!(ModKey::original().counter_suffix(), None);
        assert!(ModKey::original().is_original());
    }

    #[test]
    fn base36_zero_and_round_trip() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
        assert_eq!(from_base36("10"), Some(36));
        assert_eq!(from_base36("zz"), Some(35 * 36 + 35));
        assert_eq!(from_base36("not base36!"), None);
    }

    #[test]
    fn lenient_version_parsing() {
        assert_eq!(parse_version("1.2.3").unwrap().to_string(), "1.2.3");
        assert_eq!(parse_version("v1.2").unwrap().to_string(), "1.2.0");
        assert_eq!(parse_version("5").unwrap().to_string(), "5.0.0");
        assert_eq!(parse_version(".5").unwrap().to_string(), "0.5.0");
        assert_eq!(parse_version("1..2").unwrap().to_string(), "1.2.0");
        assert!(parse_version("invalid").is_none());
        assert!(parse_version("").is_none());
    }

    #[test]
    fn registration_identity_is_archive_plus_version() {
        let reg = ModRegistration::new("/downloads/Mod.7z", "Mod").with_version("1.0");
        let entry = ModEntry::from_registration(
            ModKey::mint(date!(2026 - 08 - 02), 1),
            &reg,
            OffsetDateTime::UNIX_EPOCH,
        );
        assert!(reg.same_identity(&entry));

        let newer = ModRegistration::new("/downloads/Mod.7z", "Mod").with_version("2.0");
        assert!(!newer.same_identity(&entry));
    }
}
