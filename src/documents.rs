use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};

pub const LEDGER_FILE_VERSION: &str = "0.5.0.0";
pub const OVERLAY_FILE_VERSION: &str = "0.3.0.0";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "installLog")]
pub struct LedgerDoc {
    #[serde(rename = "@fileVersion")]
    pub file_version: String,
    #[serde(rename = "modList", default)]
    pub mod_list: ModListDoc,
    #[serde(rename = "dataFiles", default)]
    pub data_files: DataFilesDoc,
    #[serde(rename = "iniEdits", default)]
    pub ini_edits: IniEditsDoc,
    #[serde(rename = "gameSpecificEdits", default)]
    pub game_edits: GameEditsDoc,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ModListDoc {
    #[serde(rename = "mod", default)]
    pub mods: Vec<ModDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModDoc {
    #[serde(rename = "@path")]
    pub path: String,
    #[serde(rename = "@key")]
    pub key: String,
    pub version: VersionDoc,
    pub name: String,
    #[serde(rename = "installDate")]
    pub install_date: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VersionDoc {
    #[serde(
        rename = "@machineVersion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub machine_version: Option<String>,
    #[serde(rename = "$text", default)]
    pub human: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct DataFilesDoc {
    #[serde(rename = "file", default)]
    pub files: Vec<FileDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileDoc {
    #[serde(rename = "@path")]
    pub path: String,
    #[serde(rename = "installingMods")]
    pub installing_mods: InstallersDoc,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct InstallersDoc {
    #[serde(rename = "mod", default)]
    pub mods: Vec<InstallerDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct InstallerDoc {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "$text", default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IniEditsDoc {
    #[serde(rename = "ini", default)]
    pub edits: Vec<IniDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct IniDoc {
    #[serde(rename = "@file")]
    pub file: String,
    #[serde(rename = "@section")]
    pub section: String,
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "installingMods")]
    pub installing_mods: InstallersDoc,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct GameEditsDoc {
    #[serde(rename = "edit", default)]
    pub edits: Vec<GameEditDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GameEditDoc {
    #[serde(rename = "@key")]
    pub key: String,
    #[serde(rename = "installingMods")]
    pub installing_mods: InstallersDoc,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "virtualModActivator")]
pub struct OverlayDoc {
    #[serde(rename = "@fileVersion")]
    pub file_version: String,
    #[serde(rename = "modList", default)]
    pub mod_list: OverlayModListDoc,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct OverlayModListDoc {
    #[serde(rename = "modInfo", default)]
    pub mods: Vec<ModInfoDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ModInfoDoc {
    #[serde(rename = "@modId", default, skip_serializing_if = "Option::is_none")]
    pub mod_id: Option<String>,
    #[serde(
        rename = "@downloadId",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub download_id: Option<String>,
    #[serde(rename = "@modName")]
    pub mod_name: String,
    #[serde(rename = "@modFileName")]
    pub mod_file_name: String,
    #[serde(rename = "@modFilePath")]
    pub mod_file_path: String,
    #[serde(rename = "@FileVersion", default)]
    pub file_version: String,
    #[serde(rename = "fileLink", default)]
    pub file_links: Vec<FileLinkDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FileLinkDoc {
    #[serde(rename = "@realPath")]
    pub real_path: String,
    #[serde(rename = "@virtualPath")]
    pub virtual_path: String,
    #[serde(rename = "linkPriority")]
    pub link_priority: i32,
    #[serde(rename = "isActive")]
    pub is_active: bool,
}

pub fn to_xml<T: Serialize>(doc: &T) -> Result<String> {
    let mut xml = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n".to_string();
    let mut ser = quick_xml::se::Serializer::new(&mut xml);
    ser.indent(' ', 2);
    doc.serialize(ser).context("serialize document")?;
    xml.push('\n');
    Ok(xml)
}

pub fn from_xml<T: for<'de> Deserialize<'de>>(raw: &str) -> Result<T> {
    quick_xml::de::from_str(raw).context("parse document")
}

pub fn bak_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

// write to a sibling .tmp, fsync, rotate the previous primary to .bak, then
// atomically rename the .tmp over the primary
pub fn write_atomic(path: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = tmp_path(path);
    let mut file = fs::File::create(&tmp)?;
    file.write_all(content.as_bytes())?;
    file.sync_all()?;
    drop(file);

    if path.exists() {
        let bak = bak_path(path);
        if bak.exists() {
            fs::remove_file(&bak)?;
        }
        fs::rename(path, &bak)?;
    }
    fs::rename(&tmp, path)?;
    debug!(path = %path.display(), "document written");
    Ok(())
}

// read the primary, falling back to the .bak copy if the primary is missing
// or unparseable
pub fn read_with_recovery<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<Option<T>> {
    match fs::read_to_string(path) {
        Ok(raw) => match from_xml(&raw) {
            Ok(doc) => return Ok(Some(doc)),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "document unreadable, trying backup");
            }
        },
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => {
            warn!(path = %path.display(), error = %err, "document unreadable, trying backup");
        }
    }

    let bak = bak_path(path);
    if !bak.exists() {
        if path.exists() {
            anyhow::bail!("document at {} is corrupt and has no backup", path.display());
        }
        return Ok(None);
    }

    let raw = fs::read_to_string(&bak).context("read document backup")?;
    let doc = from_xml(&raw).context("parse document backup")?;
    fs::copy(&bak, path).context("restore document from backup")?;
    warn!(path = %path.display(), "document restored from backup");
    Ok(Some(doc))
}
