use crate::{
    backups::BackupStore,
    documents::{
        self, DataFilesDoc, FileDoc, GameEditDoc, GameEditsDoc, IniDoc, IniEditsDoc,
        InstallerDoc, InstallersDoc, LedgerDoc, ModDoc, ModListDoc, VersionDoc,
        LEDGER_FILE_VERSION,
    },
    error::{CoreError, CoreResult},
    mods::{parse_version, ModEntry, ModKey, ModRegistration},
    paths::{IniKey, VirtualPath},
    settings::Settings,
    stack::InstallerStack,
    transaction::{FsOp, Transaction},
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use time::{format_description::well_known::Rfc3339, OffsetDateTime};
use tracing::{debug, info, warn};

pub const ABSENT_VALUE: &str = "<ABSENT>";

const BACKUP_ROTATION: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileRemoval {
    NotPresent,
    Displaced,
    Owned(ModKey),
    Restored,
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GameValueRemoval {
    NotPresent,
    Displaced,
    Reverted(Vec<u8>),
    Cleared,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDrift {
    pub key: ModKey,
    pub name: String,
    pub recorded: String,
    pub current: String,
}

pub trait OwnershipOracle {
    fn owner_of(&self, path: &VirtualPath) -> Option<ModKey>;
    fn previous_owner_of(&self, path: &VirtualPath) -> Option<ModKey>;
    fn claim_position(&self, path: &VirtualPath, key: &ModKey) -> Option<usize>;
}

#[derive(Debug, Clone)]
pub struct LogState {
    pub(crate) mods: Vec<ModEntry>,
    pub(crate) files: BTreeMap<VirtualPath, InstallerStack<()>>,
    pub(crate) ini: BTreeMap<IniKey, InstallerStack<String>>,
    pub(crate) game_values: BTreeMap<String, InstallerStack<Vec<u8>>>,
    pub(crate) next_index: u64,
}

impl Default for LogState {
    fn default() -> Self {
        Self {
            mods: vec![original_entry()],
            files: BTreeMap::new(),
            ini: BTreeMap::new(),
            game_values: BTreeMap::new(),
            next_index: 1,
        }
    }
}

fn original_entry() -> ModEntry {
    ModEntry {
        key: ModKey::original(),
        archive_path: PathBuf::new(),
        name: "Original Values".to_string(),
        version: String::new(),
        machine_version: None,
        install_date: OffsetDateTime::UNIX_EPOCH,
        mod_id: None,
        download_id: None,
    }
}

impl LogState {
    pub fn mod_entry(&self, key: &ModKey) -> Option<&ModEntry> {
        self.mods.iter().find(|m| &m.key == key)
    }

    pub fn contains_mod(&self, key: &ModKey) -> bool {
        self.mod_entry(key).is_some()
    }

    pub fn active_mods(&self) -> impl Iterator<Item = &ModEntry> {
        self.mods.iter().filter(|m| !m.key.is_original())
    }

    pub fn installers_of(&self, path: &VirtualPath) -> Vec<ModKey> {
        self.files
            .get(path)
            .map(|stack| stack.installers().cloned().collect())
            .unwrap_or_default()
    }

    pub fn files_of(&self, key: &ModKey) -> Vec<VirtualPath> {
        self.files
            .iter()
            .filter(|(_, stack)| stack.contains(key))
            .map(|(path, _)| path.clone())
            .collect()
    }

    pub fn ini_edits_of(&self, key: &ModKey) -> Vec<IniKey> {
        self.ini
            .iter()
            .filter(|(_, stack)| stack.contains(key))
            .map(|(coord, _)| coord.clone())
            .collect()
    }

    pub fn game_values_of(&self, key: &ModKey) -> Vec<String> {
        self.game_values
            .iter()
            .filter(|(_, stack)| stack.contains(key))
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn current_ini_value(&self, coord: &IniKey) -> Option<&str> {
        self.ini
            .get(coord)
            .and_then(|stack| stack.current())
            .map(|(_, value)| value.as_str())
    }

    pub fn current_game_value(&self, name: &str) -> Option<&[u8]> {
        self.game_values
            .get(name)
            .and_then(|stack| stack.current())
            .map(|(_, value)| value.as_slice())
    }

    pub fn tracked_files(&self) -> Vec<VirtualPath> {
        self.files.keys().cloned().collect()
    }

    pub fn tracked_ini_edits(&self) -> Vec<IniKey> {
        self.ini.keys().cloned().collect()
    }

    pub fn tracked_game_values(&self) -> Vec<String> {
        self.game_values.keys().cloned().collect()
    }

    pub fn has_original(&self, path: &VirtualPath) -> bool {
        self.files
            .get(path)
            .map(|stack| stack.bottom_is_original())
            .unwrap_or(false)
    }
}

impl OwnershipOracle for LogState {
    fn owner_of(&self, path: &VirtualPath) -> Option<ModKey> {
        self.files
            .get(path)
            .and_then(|stack| stack.current())
            .map(|(key, _)| key.clone())
    }

    fn previous_owner_of(&self, path: &VirtualPath) -> Option<ModKey> {
        self.files
            .get(path)
            .and_then(|stack| stack.previous())
            .map(|(key, _)| key.clone())
    }

    fn claim_position(&self, path: &VirtualPath, key: &ModKey) -> Option<usize> {
        self.files.get(path).and_then(|stack| stack.position(key))
    }
}

pub struct InstallLog {
    path: PathBuf,
    game_root: PathBuf,
    backups: BackupStore,
    state: LogState,
}

impl InstallLog {
    pub fn load_or_create(settings: &Settings) -> CoreResult<Self> {
        let path = settings.ledger_path();
        let state = match documents::read_with_recovery::<LedgerDoc>(&path)
            .map_err(|err| CoreError::LedgerIo(err.to_string()))?
        {
            Some(doc) => {
                let state = state_from_doc(doc)?;
                info!(
                    mods = state.mods.len() - 1,
                    files = state.files.len(),
                    "installation log loaded"
                );
                state
            }
            None => LogState::default(),
        };
        Ok(Self {
            path,
            game_root: settings.game_root.clone(),
            backups: BackupStore::new(settings.backups_root()),
            state,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn game_root(&self) -> &Path {
        &self.game_root
    }

    pub fn backups(&self) -> &BackupStore {
        &self.backups
    }

    pub fn state(&self) -> &LogState {
        &self.state
    }

    pub(crate) fn snapshot(&self) -> LogState {
        self.state.clone()
    }

    pub(crate) fn adopt(&mut self, state: LogState) {
        self.state = state;
    }

    pub(crate) fn persist(&self, state: &LogState) -> CoreResult<()> {
        let doc = state_to_doc(state);
        let xml = documents::to_xml(&doc).map_err(|err| CoreError::LedgerIo(err.to_string()))?;
        documents::write_atomic(&self.path, &xml)?;
        Ok(())
    }

    pub fn save(&self) -> CoreResult<()> {
        self.persist(&self.state)
    }

    pub fn backup(&self) -> CoreResult<()> {
        if !self.path.exists() {
            return Ok(());
        }
        for n in (1..BACKUP_ROTATION).rev() {
            let from = rotated_backup(&self.path, n);
            if from.exists() {
                let to = rotated_backup(&self.path, n + 1);
                if to.exists() {
                    fs::remove_file(&to)?;
                }
                fs::rename(&from, &to)?;
            }
        }
        fs::copy(&self.path, rotated_backup(&self.path, 1))?;
        debug!(path = %self.path.display(), "ledger backup rotated");
        Ok(())
    }

    // ------------------------------------------------------------------
    // mod tracking
    // ------------------------------------------------------------------

    pub fn activate_mod(
        &self,
        txn: &mut Transaction<'_>,
        reg: &ModRegistration,
    ) -> CoreResult<ModKey> {
        txn.guard()?;
        if txn
            .log
            .mods
            .iter()
            .any(|m| !m.key.is_original() && reg.same_identity(m))
        {
            return Err(txn.fail(CoreError::DuplicateMod {
                path: reg.archive_path.clone(),
                version: reg.version.clone(),
            }));
        }

        let now = OffsetDateTime::now_utc();
        let key = ModKey::mint(now.date(), txn.log.next_index);
        txn.log.next_index += 1;
        txn.log
            .mods
            .push(ModEntry::from_registration(key.clone(), reg, now));
        info!(key = %key, name = %reg.name, "mod activated");
        Ok(key)
    }

    pub fn deactivate_mod(&self, txn: &mut Transaction<'_>, key: &ModKey) -> CoreResult<()> {
        txn.guard()?;
        if key.is_original() {
            return Err(txn.fail(CoreError::InvariantViolation(
                "the original-values pseudo-mod cannot be deactivated".to_string(),
            )));
        }
        if !txn.log.contains_mod(key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }

        for path in txn.log.files_of(key) {
            self.remove_file(txn, key, &path)?;
        }
        for coord in txn.log.ini_edits_of(key) {
            self.remove_ini_edit(txn, key, &coord)?;
        }
        for name in txn.log.game_values_of(key) {
            self.remove_game_value(txn, key, &name)?;
        }
        txn.log.mods.retain(|m| &m.key != key);
        info!(key = %key, "mod deactivated");
        Ok(())
    }

    pub fn replace_mod(
        &self,
        txn: &mut Transaction<'_>,
        old: &ModKey,
        reg: &ModRegistration,
    ) -> CoreResult<ModKey> {
        txn.guard()?;
        if !txn.log.contains_mod(old) {
            return Err(txn.fail(CoreError::UnknownMod(old.to_string())));
        }

        let now = OffsetDateTime::now_utc();
        let new_key = ModKey::mint(now.date(), txn.log.next_index);
        txn.log.next_index += 1;

        txn.log.mods.retain(|m| &m.key != old);
        txn.log
            .mods
            .push(ModEntry::from_registration(new_key.clone(), reg, now));

        for stack in txn.log.files.values_mut() {
            stack.replace_key(old, new_key.clone());
        }
        for stack in txn.log.ini.values_mut() {
            stack.replace_key(old, new_key.clone());
        }
        for stack in txn.log.game_values.values_mut() {
            stack.replace_key(old, new_key.clone());
        }
        info!(old = %old, new = %new_key, "mod replaced");
        Ok(new_key)
    }

    pub fn mismatched_versions(&self, current: &[ModRegistration]) -> Vec<VersionDrift> {
        let mut drift = Vec::new();
        for entry in self.state.active_mods() {
            let Some(reg) = current
                .iter()
                .find(|reg| reg.archive_path == entry.archive_path)
            else {
                continue;
            };
            if reg.version != entry.version {
                drift.push(VersionDrift {
                    key: entry.key.clone(),
                    name: entry.name.clone(),
                    recorded: entry.version.clone(),
                    current: reg.version.clone(),
                });
            }
        }
        drift
    }

    // ------------------------------------------------------------------
    // file ownership
    // ------------------------------------------------------------------

    pub fn add_file(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        path: &VirtualPath,
        switching: bool,
    ) -> CoreResult<()> {
        txn.guard()?;
        if !txn.log.contains_mod(key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }

        let dest = path.to_fs_path(&self.game_root);
        let needs_original = match txn.log.files.get(path) {
            Some(stack) if stack.contains(key) => return Ok(()),
            Some(_) => false,
            None => !switching && dest.exists(),
        };
        if needs_original {
            txn.ops.push(FsOp::CaptureBackup {
                vpath: path.clone(),
                source: dest,
            });
        }

        let stack = txn.log.files.entry(path.clone()).or_default();
        if needs_original {
            stack.push_bottom(ModKey::original(), ());
        }
        stack.push(key.clone(), ());
        debug!(key = %key, path = %path, "file claim recorded");
        Ok(())
    }

    pub fn remove_file(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        path: &VirtualPath,
    ) -> CoreResult<FileRemoval> {
        txn.guard()?;
        if key.is_original() {
            return Err(txn.fail(CoreError::InvariantViolation(format!(
                "cannot remove the original-values entry for {path}"
            ))));
        }

        let Some(stack) = txn.log.files.get_mut(path) else {
            return Ok(FileRemoval::NotPresent);
        };
        if !stack.contains(key) {
            return Ok(FileRemoval::NotPresent);
        }

        let was_current = stack
            .current()
            .map(|(current, _)| current == key)
            .unwrap_or(false);
        stack.remove(key);

        if stack.only_original_left() {
            txn.log.files.remove(path);
            txn.ops.push(FsOp::RestoreBackup {
                vpath: path.clone(),
                dest: path.to_fs_path(&self.game_root),
                discard: true,
            });
            debug!(path = %path, "original file restored");
            return Ok(FileRemoval::Restored);
        }
        if stack.is_empty() {
            txn.log.files.remove(path);
            return Ok(FileRemoval::Cleared);
        }
        if was_current {
            let next = stack
                .current()
                .map(|(next, _)| next.clone())
                .expect("non-empty stack has a tail");
            return Ok(FileRemoval::Owned(next));
        }
        Ok(FileRemoval::Displaced)
    }

    pub fn current_owner(&self, path: &VirtualPath) -> Option<ModKey> {
        self.state.owner_of(path)
    }

    pub fn previous_owner(&self, path: &VirtualPath) -> Option<ModKey> {
        self.state.previous_owner_of(path)
    }

    pub fn installers_of(&self, path: &VirtualPath) -> Vec<ModKey> {
        self.state.installers_of(path)
    }

    pub fn files_of(&self, key: &ModKey) -> Vec<VirtualPath> {
        self.state.files_of(key)
    }

    // ------------------------------------------------------------------
    // ini edits
    // ------------------------------------------------------------------

    pub fn add_ini_edit(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        coord: &IniKey,
        value: &str,
    ) -> CoreResult<()> {
        txn.guard()?;
        if !txn.log.contains_mod(key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }

        let ini_file = VirtualPath::new(&coord.file).to_fs_path(&self.game_root);

        if let Some(stack) = txn.log.ini.get_mut(coord) {
            if stack.contains(key) {
                stack.set_value(key, value.to_string());
                let is_current = stack
                    .current()
                    .map(|(current, _)| current == key)
                    .unwrap_or(false);
                if is_current {
                    txn.ops.push(write_ini_op(&ini_file, coord, Some(value)));
                }
                return Ok(());
            }
            stack.push(key.clone(), value.to_string());
        } else {
            let ini_doc = match crate::ini::IniFile::read(&ini_file) {
                Ok(doc) => doc,
                Err(err) => return Err(txn.fail(err.into())),
            };
            let prior = ini_doc
                .get(&coord.section, &coord.key)
                .map(|v| v.to_string())
                .unwrap_or_else(|| ABSENT_VALUE.to_string());
            let stack = txn.log.ini.entry(coord.clone()).or_default();
            stack.push_bottom(ModKey::original(), prior);
            stack.push(key.clone(), value.to_string());
        }

        txn.ops.push(write_ini_op(&ini_file, coord, Some(value)));
        debug!(key = %key, coord = %coord, value, "ini edit recorded");
        Ok(())
    }

    pub fn remove_ini_edit(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        coord: &IniKey,
    ) -> CoreResult<()> {
        txn.guard()?;
        if key.is_original() {
            return Err(txn.fail(CoreError::InvariantViolation(format!(
                "cannot remove the original-values entry for {coord}"
            ))));
        }

        let ini_file = VirtualPath::new(&coord.file).to_fs_path(&self.game_root);
        let Some(stack) = txn.log.ini.get_mut(coord) else {
            return Ok(());
        };
        if !stack.contains(key) {
            return Ok(());
        }

        let was_current = stack
            .current()
            .map(|(current, _)| current == key)
            .unwrap_or(false);
        stack.remove(key);

        if stack.only_original_left() {
            let original = stack
                .current()
                .map(|(_, value)| value.clone())
                .expect("original entry present");
            txn.log.ini.remove(coord);
            let restored = if original == ABSENT_VALUE {
                None
            } else {
                Some(original.as_str())
            };
            txn.ops.push(write_ini_op(&ini_file, coord, restored));
            debug!(coord = %coord, "original ini value restored");
            return Ok(());
        }
        if stack.is_empty() {
            txn.log.ini.remove(coord);
            return Ok(());
        }
        if was_current {
            let value = stack
                .current()
                .map(|(_, value)| value.clone())
                .expect("non-empty stack has a tail");
            txn.ops
                .push(write_ini_op(&ini_file, coord, Some(value.as_str())));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // game-specific values
    // ------------------------------------------------------------------

    pub fn log_original_game_value(
        &self,
        txn: &mut Transaction<'_>,
        name: &str,
        value: &[u8],
    ) -> CoreResult<()> {
        txn.guard()?;
        let stack = txn
            .log
            .game_values
            .entry(name.to_string())
            .or_default();
        if stack.bottom_is_original() {
            return Ok(());
        }
        stack.push_bottom(ModKey::original(), value.to_vec());
        Ok(())
    }

    pub fn add_game_value(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        name: &str,
        value: &[u8],
    ) -> CoreResult<()> {
        txn.guard()?;
        if !txn.log.contains_mod(key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }
        let stack = txn
            .log
            .game_values
            .entry(name.to_string())
            .or_default();
        if stack.contains(key) {
            stack.set_value(key, value.to_vec());
            return Ok(());
        }
        stack.push(key.clone(), value.to_vec());
        Ok(())
    }

    pub fn remove_game_value(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        name: &str,
    ) -> CoreResult<GameValueRemoval> {
        txn.guard()?;
        if key.is_original() {
            return Err(txn.fail(CoreError::InvariantViolation(format!(
                "cannot remove the original-values entry for {name}"
            ))));
        }

        let Some(stack) = txn.log.game_values.get_mut(name) else {
            return Ok(GameValueRemoval::NotPresent);
        };
        if !stack.contains(key) {
            return Ok(GameValueRemoval::NotPresent);
        }

        let was_current = stack
            .current()
            .map(|(current, _)| current == key)
            .unwrap_or(false);
        stack.remove(key);

        if stack.only_original_left() {
            let value = stack
                .current()
                .map(|(_, value)| value.clone())
                .expect("original entry present");
            txn.log.game_values.remove(name);
            return Ok(GameValueRemoval::Reverted(value));
        }
        if stack.is_empty() {
            txn.log.game_values.remove(name);
            return Ok(GameValueRemoval::Cleared);
        }
        if was_current {
            let value = stack
                .current()
                .map(|(_, value)| value.clone())
                .expect("non-empty stack has a tail");
            return Ok(GameValueRemoval::Reverted(value));
        }
        Ok(GameValueRemoval::Displaced)
    }
}

fn write_ini_op(file: &Path, coord: &IniKey, value: Option<&str>) -> FsOp {
    FsOp::WriteIni {
        file: file.to_path_buf(),
        section: coord.section.clone(),
        key: coord.key.clone(),
        value: value.map(|v| v.to_string()),
    }
}

fn rotated_backup(path: &Path, n: usize) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|f| f.to_os_string())
        .unwrap_or_default();
    name.push(format!(".bak.{n}"));
    path.with_file_name(name)
}

// ----------------------------------------------------------------------
// document conversion
// ----------------------------------------------------------------------

fn state_to_doc(state: &LogState) -> LedgerDoc {
    let mods = state
        .mods
        .iter()
        .map(|entry| ModDoc {
            path: entry.archive_path.to_string_lossy().to_string(),
            key: entry.key.to_string(),
            version: VersionDoc {
                machine_version: entry.machine_version.as_ref().map(|v| v.to_string()),
                human: entry.version.clone(),
            },
            name: entry.name.clone(),
            install_date: entry.install_date_rfc3339(),
        })
        .collect();

    let files = state
        .files
        .iter()
        .map(|(path, stack)| FileDoc {
            path: path.as_key().to_string(),
            installing_mods: InstallersDoc {
                mods: stack
                    .installers()
                    .map(|key| InstallerDoc {
                        key: key.to_string(),
                        value: None,
                    })
                    .collect(),
            },
        })
        .collect();

    let ini_edits = state
        .ini
        .iter()
        .map(|(coord, stack)| IniDoc {
            file: coord.file.clone(),
            section: coord.section.clone(),
            key: coord.key.clone(),
            installing_mods: InstallersDoc {
                mods: stack
                    .entries()
                    .map(|(key, value)| InstallerDoc {
                        key: key.to_string(),
                        value: Some(value.clone()),
                    })
                    .collect(),
            },
        })
        .collect();

    let game_edits = state
        .game_values
        .iter()
        .map(|(name, stack)| GameEditDoc {
            key: name.clone(),
            installing_mods: InstallersDoc {
                mods: stack
                    .entries()
                    .map(|(key, value)| InstallerDoc {
                        key: key.to_string(),
                        value: Some(BASE64.encode(value)),
                    })
                    .collect(),
            },
        })
        .collect();

    LedgerDoc {
        file_version: LEDGER_FILE_VERSION.to_string(),
        mod_list: ModListDoc { mods },
        data_files: DataFilesDoc { files },
        ini_edits: IniEditsDoc { edits: ini_edits },
        game_edits: GameEditsDoc { edits: game_edits },
    }
}

fn state_from_doc(doc: LedgerDoc) -> CoreResult<LogState> {
    if doc.file_version != LEDGER_FILE_VERSION {
        warn!(
            found = %doc.file_version,
            expected = LEDGER_FILE_VERSION,
            "unexpected ledger file version"
        );
    }

    let mut mods = Vec::new();
    let mut next_index = 1;
    for entry in doc.mod_list.mods {
        let key = ModKey::from(entry.key);
        if let Some(counter) = key.counter_suffix() {
            next_index = next_index.max(counter + 1);
        }
        let install_date = OffsetDateTime::parse(&entry.install_date, &Rfc3339)
            .unwrap_or(OffsetDateTime::UNIX_EPOCH);
        let machine_version = entry
            .version
            .machine_version
            .as_deref()
            .and_then(|raw| semver::Version::parse(raw).ok())
            .or_else(|| parse_version(&entry.version.human));
        mods.push(ModEntry {
            key,
            archive_path: PathBuf::from(entry.path),
            name: entry.name,
            version: entry.version.human,
            machine_version,
            install_date,
            mod_id: None,
            download_id: None,
        });
    }
    if !mods.iter().any(|m| m.key.is_original()) {
        mods.insert(0, original_entry());
    }

    let mut files = BTreeMap::new();
    for file in doc.data_files.files {
        let path = VirtualPath::new(&file.path);
        let mut stack = InstallerStack::default();
        for installer in file.installing_mods.mods {
            stack.push(ModKey::from(installer.key), ());
        }
        if stack.is_empty() {
            return Err(CoreError::InvariantViolation(format!(
                "ledger entry for {path} has an empty installer stack"
            )));
        }
        files.insert(path, stack);
    }

    let mut ini = BTreeMap::new();
    for edit in doc.ini_edits.edits {
        let coord = IniKey::new(edit.file, edit.section, edit.key);
        let mut stack = InstallerStack::default();
        for installer in edit.installing_mods.mods {
            stack.push(
                ModKey::from(installer.key),
                installer.value.unwrap_or_default(),
            );
        }
        if stack.is_empty() {
            return Err(CoreError::InvariantViolation(format!(
                "ledger entry for {coord} has an empty installer stack"
            )));
        }
        ini.insert(coord, stack);
    }

    let mut game_values = BTreeMap::new();
    for edit in doc.game_edits.edits {
        let mut stack = InstallerStack::default();
        for installer in edit.installing_mods.mods {
            let bytes = BASE64
                .decode(installer.value.unwrap_or_default())
                .map_err(|err| {
                    CoreError::LedgerIo(format!("invalid base64 in game value: {err}"))
                })?;
            stack.push(ModKey::from(installer.key), bytes);
        }
        if stack.is_empty() {
            return Err(CoreError::InvariantViolation(format!(
                "ledger entry for game value {} has an empty installer stack",
                edit.key
            )));
        }
        game_values.insert(edit.key, stack);
    }

    Ok(LogState {
        mods,
        files,
        ini,
        game_values,
        next_index,
    })
}
