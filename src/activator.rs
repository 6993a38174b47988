use crate::{
    documents::{
        self, FileLinkDoc, ModInfoDoc, OverlayDoc, OverlayModListDoc, OVERLAY_FILE_VERSION,
    },
    error::{CoreError, CoreResult},
    events::{ActivationEvent, EventBus},
    game_mode::GameMode,
    install_log::{FileRemoval, InstallLog, OwnershipOracle},
    link::{self, LinkHints, LinkKind},
    mods::{ModKey, ModRegistration},
    paths::VirtualPath,
    settings::Settings,
    transaction::{CancelToken, FsOp, Transaction},
};
use std::{
    collections::BTreeSet,
    path::{Path, PathBuf},
    sync::mpsc::Receiver,
    sync::Arc,
};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualLink {
    pub mod_key: ModKey,
    pub real_path: PathBuf,
    pub virtual_path: VirtualPath,
    pub priority: i32,
    pub active: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualModInfo {
    pub key: ModKey,
    pub mod_id: Option<String>,
    pub download_id: Option<String>,
    pub mod_name: String,
    pub mod_file_name: String,
    pub mod_file_path: PathBuf,
    pub file_version: String,
}

impl VirtualModInfo {
    fn from_registration(key: ModKey, reg: &ModRegistration) -> Self {
        Self {
            key,
            mod_id: reg.mod_id.clone(),
            download_id: reg.download_id.clone(),
            mod_name: reg.name.clone(),
            mod_file_name: reg.file_name(),
            mod_file_path: reg.archive_path.clone(),
            file_version: reg.version.clone(),
        }
    }
}

pub trait ActiveModSet {
    fn is_active(&self, key: &ModKey) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct OverlayState {
    pub(crate) mods: Vec<VirtualModInfo>,
    pub(crate) links: Vec<VirtualLink>,
    pub(crate) enabled: BTreeSet<ModKey>,
}

impl ActiveModSet for OverlayState {
    fn is_active(&self, key: &ModKey) -> bool {
        self.enabled.contains(key)
    }
}

impl OverlayState {
    pub fn links_of(&self, key: &ModKey) -> Vec<&VirtualLink> {
        self.links.iter().filter(|l| &l.mod_key == key).collect()
    }

    pub fn links_for_path(&self, path: &VirtualPath) -> Vec<&VirtualLink> {
        self.links
            .iter()
            .filter(|l| &l.virtual_path == path)
            .collect()
    }

    fn active_link_key(&self, path: &VirtualPath) -> Option<ModKey> {
        self.links
            .iter()
            .find(|l| &l.virtual_path == path && l.active)
            .map(|l| l.mod_key.clone())
    }
}

// winner for a contested path: highest priority, then latest ledger insertion
fn winner_for(
    state: &OverlayState,
    oracle: &dyn OwnershipOracle,
    path: &VirtualPath,
) -> Option<ModKey> {
    let active: &dyn ActiveModSet = state;
    state
        .links
        .iter()
        .filter(|l| &l.virtual_path == path)
        .filter(|l| active.is_active(&l.mod_key))
        .filter_map(|l| {
            oracle
                .claim_position(path, &l.mod_key)
                .map(|pos| (l.priority, pos, l.mod_key.clone()))
        })
        .max_by_key(|(priority, pos, _)| (*priority, *pos))
        .map(|(_, _, key)| key)
}

pub struct Activator {
    doc_path: PathBuf,
    staging_root: PathBuf,
    game_root: PathBuf,
    mirror_root: Option<PathBuf>,
    game: Arc<dyn GameMode>,
    state: OverlayState,
    events: EventBus,
}

impl Activator {
    pub fn load_or_create(
        settings: &Settings,
        game: Arc<dyn GameMode>,
        log: &InstallLog,
    ) -> CoreResult<Self> {
        let doc_path = settings.overlay_path();
        let state = match documents::read_with_recovery::<OverlayDoc>(&doc_path)
            .map_err(|err| CoreError::LedgerIo(err.to_string()))?
        {
            Some(doc) => {
                let state = state_from_doc(doc, log);
                info!(
                    mods = state.mods.len(),
                    links = state.links.len(),
                    "overlay state loaded"
                );
                state
            }
            None => OverlayState::default(),
        };
        Ok(Self {
            doc_path,
            staging_root: settings.staging_root(),
            game_root: settings.game_root.clone(),
            mirror_root: settings.mirror_root().map(|p| p.to_path_buf()),
            game,
            state,
            events: EventBus::new(),
        })
    }

    pub fn doc_path(&self) -> &Path {
        &self.doc_path
    }

    pub fn staging_dir(&self, key: &ModKey) -> PathBuf {
        self.staging_root.join(key.as_str())
    }

    pub fn staged_path(&self, key: &ModKey, path: &VirtualPath) -> PathBuf {
        path.to_fs_path(&self.staging_dir(key))
    }

    pub fn subscribe(&mut self) -> Receiver<ActivationEvent> {
        self.events.subscribe()
    }

    pub(crate) fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn state(&self) -> &OverlayState {
        &self.state
    }

    pub fn is_active(&self, key: &ModKey) -> bool {
        self.state.is_active(key)
    }

    pub fn probe_host(&self) -> std::io::Result<LinkKind> {
        link::probe(&self.staging_root.join(".probe"))
    }

    pub(crate) fn snapshot(&self) -> OverlayState {
        self.state.clone()
    }

    pub(crate) fn adopt(&mut self, state: OverlayState) {
        self.state = state;
    }

    pub(crate) fn write_doc(&self, state: &OverlayState) -> CoreResult<()> {
        let doc = state_to_doc(state);
        let xml = documents::to_xml(&doc).map_err(|err| CoreError::LedgerIo(err.to_string()))?;
        documents::write_atomic(&self.doc_path, &xml)?;
        Ok(())
    }

    pub fn save(&self) -> CoreResult<()> {
        self.write_doc(&self.state)
    }

    // ------------------------------------------------------------------
    // registration
    // ------------------------------------------------------------------

    pub fn register_mod(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        reg: &ModRegistration,
    ) -> CoreResult<()> {
        txn.guard()?;
        if txn.overlay.mods.iter().any(|m| &m.key == key) {
            return Ok(());
        }
        txn.overlay
            .mods
            .push(VirtualModInfo::from_registration(key.clone(), reg));
        debug!(key = %key, "mod staged in overlay");
        Ok(())
    }

    // ------------------------------------------------------------------
    // link bookkeeping
    // ------------------------------------------------------------------

    pub fn add_file_link(
        &self,
        txn: &mut Transaction<'_>,
        log: &InstallLog,
        key: &ModKey,
        base_file_path: &str,
        switching: bool,
        restoring: bool,
        priority: i32,
    ) -> CoreResult<VirtualPath> {
        txn.guard()?;
        if !txn.log.contains_mod(key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }

        let adjusted = self.game.adjust_mod_path(base_file_path);
        let vpath = VirtualPath::new(&adjusted);
        let real = self.staged_path(key, &vpath);
        if !real.exists() {
            return Err(txn.fail(CoreError::StagingCorrupt { path: real }));
        }

        let existing = txn
            .overlay
            .links
            .iter()
            .position(|l| &l.mod_key == key && l.virtual_path == vpath);
        match existing {
            Some(idx) => {
                let link = &mut txn.overlay.links[idx];
                link.priority = priority;
                link.real_path = real;
            }
            None => txn.overlay.links.push(VirtualLink {
                mod_key: key.clone(),
                real_path: real,
                virtual_path: vpath.clone(),
                priority,
                active: false,
            }),
        }
        txn.overlay.enabled.insert(key.clone());

        // restoring re-materializes only; the ledger already carries the claim
        if !restoring {
            log.add_file(txn, key, &vpath, switching)?;
        }
        self.sync_materialization(txn, &vpath)?;
        Ok(vpath)
    }

    pub fn remove_file_link(
        &self,
        txn: &mut Transaction<'_>,
        log: &InstallLog,
        path: &VirtualPath,
        key: &ModKey,
    ) -> CoreResult<()> {
        txn.guard()?;
        let Some(idx) = txn
            .overlay
            .links
            .iter()
            .position(|l| &l.mod_key == key && &l.virtual_path == path)
        else {
            return Ok(());
        };
        let link = txn.overlay.links.remove(idx);
        let removal = log.remove_file(txn, key, path)?;
        self.settle_after_removal(txn, path, &link, removal)
    }

    fn settle_after_removal(
        &self,
        txn: &mut Transaction<'_>,
        path: &VirtualPath,
        link: &VirtualLink,
        removal: FileRemoval,
    ) -> CoreResult<()> {
        match removal {
            FileRemoval::NotPresent | FileRemoval::Displaced => Ok(()),
            FileRemoval::Restored => {
                // the restore op replaces the materialization in place
                for l in txn
                    .overlay
                    .links
                    .iter_mut()
                    .filter(|l| &l.virtual_path == path)
                {
                    l.active = false;
                }
                Ok(())
            }
            FileRemoval::Cleared => {
                if link.active {
                    txn.ops.push(FsOp::RemoveLink {
                        dst: path.to_fs_path(&self.game_root),
                        staged: Some(link.real_path.clone()),
                        force: false,
                    });
                }
                Ok(())
            }
            FileRemoval::Owned(_) => self.sync_materialization(txn, path),
        }
    }

    // recompute the winning link for a path and rewrite the materialization
    // when the winner changed
    fn sync_materialization(
        &self,
        txn: &mut Transaction<'_>,
        path: &VirtualPath,
    ) -> CoreResult<()> {
        let winner = winner_for(&txn.overlay, &txn.log, path);
        let currently_active = txn.overlay.active_link_key(path);
        if winner == currently_active {
            return Ok(());
        }

        for l in txn
            .overlay
            .links
            .iter_mut()
            .filter(|l| &l.virtual_path == path)
        {
            l.active = false;
        }

        let Some(winner_key) = winner else {
            return Ok(());
        };
        let link = txn
            .overlay
            .links
            .iter()
            .find(|l| l.mod_key == winner_key && &l.virtual_path == path)
            .cloned()
            .expect("winner has a registered link");

        let (src, hints) = self.prepare_link_source(txn, &link);
        txn.ops.push(FsOp::CreateLink {
            src,
            dst: path.to_fs_path(&self.game_root),
            hints,
        });
        for l in txn
            .overlay
            .links
            .iter_mut()
            .filter(|l| l.mod_key == winner_key && &l.virtual_path == path)
        {
            l.active = true;
        }
        debug!(path = %path, winner = %winner_key, "materialization rewritten");
        Ok(())
    }

    // hard-link-required files staged on a foreign volume get mirrored onto
    // the game volume first so the hard link can succeed
    fn prepare_link_source(
        &self,
        txn: &mut Transaction<'_>,
        link: &VirtualLink,
    ) -> (PathBuf, LinkHints) {
        let require_hard = self.game.requires_hard_link(&link.virtual_path);
        if require_hard {
            if let Some(mirror) = &self.mirror_root {
                if !link::same_volume(&self.staging_root, &self.game_root) {
                    let mirror_dst = link
                        .virtual_path
                        .to_fs_path(&mirror.join(link.mod_key.as_str()));
                    txn.ops.push(FsOp::MirrorStage {
                        src: link.real_path.clone(),
                        dst: mirror_dst.clone(),
                    });
                    return (
                        mirror_dst,
                        LinkHints {
                            require_hard: true,
                            restage_on_cross_volume: false,
                        },
                    );
                }
            }
        }
        (
            link.real_path.clone(),
            LinkHints {
                require_hard,
                restage_on_cross_volume: false,
            },
        )
    }

    // ------------------------------------------------------------------
    // bulk operations
    // ------------------------------------------------------------------

    pub fn enable_mod(
        &self,
        txn: &mut Transaction<'_>,
        log: &InstallLog,
        key: &ModKey,
        cancel: &CancelToken,
    ) -> CoreResult<()> {
        txn.guard()?;
        if !txn.overlay.mods.iter().any(|m| &m.key == key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }
        if txn.overlay.enabled.contains(key) {
            return Ok(());
        }

        let staging = self.staging_dir(key);
        if !staging.exists() {
            return Err(txn.fail(CoreError::StagingCorrupt { path: staging }));
        }

        let mut staged_files = Vec::new();
        for entry in WalkDir::new(&staging) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => return Err(txn.fail(CoreError::LedgerIo(err.to_string()))),
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&staging)
                .expect("walkdir yields children of its root");
            staged_files.push(VirtualPath::from_relative(rel));
        }

        for vpath in staged_files {
            if cancel.is_cancelled() {
                return Err(txn.fail(CoreError::Cancelled));
            }
            let priority = txn
                .overlay
                .links
                .iter()
                .find(|l| &l.mod_key == key && l.virtual_path == vpath)
                .map(|l| l.priority)
                .unwrap_or(0);
            self.add_file_link(txn, log, key, vpath.display_path(), false, false, priority)?;
        }

        txn.events.push(ActivationEvent::ModActivationChanged {
            key: key.clone(),
            active: true,
        });
        info!(key = %key, "mod enabled");
        Ok(())
    }

    pub fn disable_mod(
        &self,
        txn: &mut Transaction<'_>,
        log: &InstallLog,
        key: &ModKey,
        cancel: &CancelToken,
    ) -> CoreResult<()> {
        txn.guard()?;
        if !txn.overlay.mods.iter().any(|m| &m.key == key) {
            return Err(txn.fail(CoreError::UnknownMod(key.to_string())));
        }
        if !txn.overlay.enabled.contains(key) {
            return Ok(());
        }

        let links: Vec<VirtualLink> = txn
            .overlay
            .links
            .iter()
            .filter(|l| &l.mod_key == key)
            .cloned()
            .collect();
        for link in links {
            if cancel.is_cancelled() {
                return Err(txn.fail(CoreError::Cancelled));
            }
            let removal = log.remove_file(txn, key, &link.virtual_path)?;
            for l in txn
                .overlay
                .links
                .iter_mut()
                .filter(|l| &l.mod_key == key && l.virtual_path == link.virtual_path)
            {
                l.active = false;
            }
            self.settle_after_removal(txn, &link.virtual_path, &link, removal)?;
        }

        txn.overlay.enabled.remove(key);
        txn.events.push(ActivationEvent::ModActivationChanged {
            key: key.clone(),
            active: false,
        });
        info!(key = %key, "mod disabled");
        Ok(())
    }

    pub fn deactivate_mod(
        &self,
        txn: &mut Transaction<'_>,
        log: &InstallLog,
        key: &ModKey,
    ) -> CoreResult<()> {
        txn.guard()?;
        let was_enabled = txn.overlay.enabled.contains(key);

        let links: Vec<VirtualLink> = txn
            .overlay
            .links
            .iter()
            .filter(|l| &l.mod_key == key)
            .cloned()
            .collect();
        for link in &links {
            self.remove_file_link(txn, log, &link.virtual_path, key)?;
        }

        log.deactivate_mod(txn, key)?;

        txn.overlay.mods.retain(|m| &m.key != key);
        txn.overlay.links.retain(|l| &l.mod_key != key);
        txn.overlay.enabled.remove(key);

        let staging = self.staging_dir(key);
        txn.ops.push(FsOp::RemoveDirTree { path: staging });
        if let Some(mirror) = &self.mirror_root {
            txn.ops.push(FsOp::RemoveDirTree {
                path: mirror.join(key.as_str()),
            });
        }

        if was_enabled {
            txn.events.push(ActivationEvent::ModActivationChanged {
                key: key.clone(),
                active: false,
            });
        }
        info!(key = %key, "mod deactivated and unstaged");
        Ok(())
    }

    pub fn replace_mod(
        &self,
        txn: &mut Transaction<'_>,
        log: &InstallLog,
        old: &ModKey,
        reg: &ModRegistration,
    ) -> CoreResult<ModKey> {
        txn.guard()?;
        let new_key = log.replace_mod(txn, old, reg)?;

        let old_dir = self.staging_dir(old);
        let new_dir = self.staging_dir(&new_key);
        if old_dir.exists() {
            txn.ops.push(FsOp::RenameDir {
                from: old_dir,
                to: new_dir,
            });
        }

        if let Some(info) = txn.overlay.mods.iter_mut().find(|m| &m.key == old) {
            *info = VirtualModInfo::from_registration(new_key.clone(), reg);
        }
        if txn.overlay.enabled.remove(old) {
            txn.overlay.enabled.insert(new_key.clone());
        }

        let mut rewritten = Vec::new();
        for l in txn.overlay.links.iter_mut().filter(|l| &l.mod_key == old) {
            l.mod_key = new_key.clone();
            l.real_path = l.virtual_path.to_fs_path(&self.staging_root.join(new_key.as_str()));
            if l.active {
                rewritten.push(l.clone());
            }
        }
        // symlink materializations point at the old staging folder by name
        for link in rewritten {
            let (src, hints) = self.prepare_link_source(txn, &link);
            txn.ops.push(FsOp::CreateLink {
                src,
                dst: link.virtual_path.to_fs_path(&self.game_root),
                hints,
            });
        }
        Ok(new_key)
    }

    pub fn update_link_priority(
        &self,
        txn: &mut Transaction<'_>,
        key: &ModKey,
        path: &VirtualPath,
        priority: i32,
    ) -> CoreResult<()> {
        txn.guard()?;
        let Some(link) = txn
            .overlay
            .links
            .iter_mut()
            .find(|l| &l.mod_key == key && &l.virtual_path == path)
        else {
            return Ok(());
        };
        if link.priority == priority {
            return Ok(());
        }
        link.priority = priority;
        self.sync_materialization(txn, path)
    }

    pub fn purge_links(&self, txn: &mut Transaction<'_>, cancel: &CancelToken) -> CoreResult<()> {
        txn.guard()?;
        let active: Vec<VirtualLink> = txn
            .overlay
            .links
            .iter()
            .filter(|l| l.active)
            .cloned()
            .collect();

        for link in active {
            if cancel.is_cancelled() {
                return Err(txn.fail(CoreError::Cancelled));
            }
            txn.ops.push(FsOp::RemoveLink {
                dst: link.virtual_path.to_fs_path(&self.game_root),
                staged: Some(link.real_path.clone()),
                force: false,
            });
            if txn.log.has_original(&link.virtual_path) {
                txn.ops.push(FsOp::RestoreBackup {
                    vpath: link.virtual_path.clone(),
                    dest: link.virtual_path.to_fs_path(&self.game_root),
                    discard: false,
                });
            }
            for l in txn
                .overlay
                .links
                .iter_mut()
                .filter(|l| l.virtual_path == link.virtual_path)
            {
                l.active = false;
            }
        }
        info!("game directory purged");
        Ok(())
    }
}

// ----------------------------------------------------------------------
// document conversion
// ----------------------------------------------------------------------

fn state_to_doc(state: &OverlayState) -> OverlayDoc {
    let mods = state
        .mods
        .iter()
        .map(|info| ModInfoDoc {
            mod_id: info.mod_id.clone(),
            download_id: info.download_id.clone(),
            mod_name: info.mod_name.clone(),
            mod_file_name: info.mod_file_name.clone(),
            mod_file_path: info.mod_file_path.to_string_lossy().to_string(),
            file_version: info.file_version.clone(),
            file_links: state
                .links
                .iter()
                .filter(|l| l.mod_key == info.key)
                .map(|l| FileLinkDoc {
                    real_path: l.real_path.to_string_lossy().to_string(),
                    virtual_path: l.virtual_path.display_path().to_string(),
                    link_priority: l.priority,
                    is_active: l.active,
                })
                .collect(),
        })
        .collect();
    OverlayDoc {
        file_version: OVERLAY_FILE_VERSION.to_string(),
        mod_list: OverlayModListDoc { mods },
    }
}

fn state_from_doc(doc: OverlayDoc, log: &InstallLog) -> OverlayState {
    let mut state = OverlayState::default();
    for info in doc.mod_list.mods {
        let archive = PathBuf::from(&info.mod_file_path);
        let Some(entry) = log
            .state()
            .active_mods()
            .find(|m| m.archive_path == archive)
        else {
            warn!(
                archive = %archive.display(),
                "overlay entry references a mod missing from the ledger, skipping"
            );
            continue;
        };
        let key = entry.key.clone();
        state.mods.push(VirtualModInfo {
            key: key.clone(),
            mod_id: info.mod_id,
            download_id: info.download_id,
            mod_name: info.mod_name,
            mod_file_name: info.mod_file_name,
            mod_file_path: archive,
            file_version: info.file_version,
        });
        for l in info.file_links {
            let vpath = VirtualPath::new(&l.virtual_path);
            // a mod is active exactly when its links are claimed in the ledger
            if log.state().claim_position(&vpath, &key).is_some() {
                state.enabled.insert(key.clone());
            }
            state.links.push(VirtualLink {
                mod_key: key.clone(),
                real_path: PathBuf::from(l.real_path),
                virtual_path: vpath,
                priority: l.link_priority,
                active: l.is_active,
            });
        }
    }
    state
}
