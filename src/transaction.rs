use crate::{
    activator::{Activator, OverlayState},
    backups::BackupStore,
    error::{CoreError, CoreResult},
    events::ActivationEvent,
    ini::IniFile,
    install_log::{InstallLog, LogState},
    link::{self, LinkHints},
    paths::VirtualPath,
    settings::{LockPolicy, Settings},
};
use fs4::FileExt;
use parking_lot::{Mutex, MutexGuard};
use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, warn};

#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug)]
pub(crate) enum FsOp {
    CaptureBackup {
        vpath: VirtualPath,
        source: PathBuf,
    },
    RestoreBackup {
        vpath: VirtualPath,
        dest: PathBuf,
        discard: bool,
    },
    CreateLink {
        src: PathBuf,
        dst: PathBuf,
        hints: LinkHints,
    },
    RemoveLink {
        dst: PathBuf,
        staged: Option<PathBuf>,
        force: bool,
    },
    MirrorStage {
        src: PathBuf,
        dst: PathBuf,
    },
    RenameDir {
        from: PathBuf,
        to: PathBuf,
    },
    RemoveDirTree {
        path: PathBuf,
    },
    WriteIni {
        file: PathBuf,
        section: String,
        key: String,
        value: Option<String>,
    },
}

enum UndoRecord {
    MoveBack { aside: PathBuf, original: PathBuf },
    RemoveFile { path: PathBuf },
    RenameBack { from: PathBuf, to: PathBuf },
    RestoreIni {
        file: PathBuf,
        section: String,
        key: String,
        prior: Option<String>,
    },
    RestoreOverlayDoc { path: PathBuf },
}

#[derive(Debug)]
pub struct Transaction<'a> {
    _serial: MutexGuard<'a, ()>,
    lock_file: fs::File,
    pub(crate) log: LogState,
    pub(crate) overlay: OverlayState,
    pub(crate) ops: Vec<FsOp>,
    pub(crate) events: Vec<ActivationEvent>,
    pub(crate) failure: Option<CoreError>,
}

impl Transaction<'_> {
    pub(crate) fn guard(&self) -> CoreResult<()> {
        match &self.failure {
            Some(err) => Err(CoreError::aborted(err.clone())),
            None => Ok(()),
        }
    }

    pub(crate) fn fail(&mut self, err: CoreError) -> CoreError {
        if self.failure.is_none() {
            self.failure = Some(err.clone());
        }
        err
    }

    pub fn is_poisoned(&self) -> bool {
        self.failure.is_some()
    }

    pub fn log_view(&self) -> &LogState {
        &self.log
    }

    pub fn overlay_view(&self) -> &OverlayState {
        &self.overlay
    }
}

pub struct Coordinator {
    gate: Mutex<()>,
    lock_path: PathBuf,
    scratch_root: PathBuf,
    policy: LockPolicy,
}

impl Coordinator {
    pub fn new(settings: &Settings) -> Self {
        let mut lock_name = settings
            .ledger_path()
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        lock_name.push(".lock");
        Self {
            gate: Mutex::new(()),
            lock_path: settings.ledger_path().with_file_name(lock_name),
            scratch_root: settings.scratch_root(),
            policy: settings.lock_policy,
        }
    }

    pub fn begin<'a>(
        &'a self,
        log: &InstallLog,
        activator: &Activator,
    ) -> CoreResult<Transaction<'a>> {
        let serial = self.gate.lock();

        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock_file = fs::OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(&self.lock_path)?;
        match self.policy {
            LockPolicy::Block => lock_file.lock_exclusive()?,
            LockPolicy::FailFast => {
                if lock_file.try_lock_exclusive().is_err() {
                    return Err(CoreError::LedgerBusy);
                }
            }
        }

        if self.scratch_root.exists() {
            fs::remove_dir_all(&self.scratch_root)?;
        }
        fs::create_dir_all(&self.scratch_root)?;

        debug!("transaction begun");
        Ok(Transaction {
            _serial: serial,
            lock_file,
            log: log.snapshot(),
            overlay: activator.snapshot(),
            ops: Vec::new(),
            events: Vec::new(),
            failure: None,
        })
    }

    pub fn commit(
        &self,
        mut txn: Transaction<'_>,
        log: &mut InstallLog,
        activator: &mut Activator,
    ) -> CoreResult<()> {
        if let Some(err) = txn.failure.take() {
            self.discard(&txn);
            return Err(CoreError::aborted(err));
        }

        let mut undo: Vec<UndoRecord> = Vec::new();
        let mut deferred_deletes: Vec<PathBuf> = Vec::new();
        let mut aside_seq = 0usize;

        for op in std::mem::take(&mut txn.ops) {
            if let Err(err) = self.execute(
                &op,
                log.backups(),
                &mut undo,
                &mut deferred_deletes,
                &mut aside_seq,
            ) {
                warn!(error = %err, "transaction prepare failed, rolling back");
                self.replay_undo(&mut undo);
                self.discard(&txn);
                return Err(CoreError::aborted(err));
            }
        }

        if let Err(err) = activator.write_doc(&txn.overlay) {
            warn!(error = %err, "overlay document write failed, rolling back");
            self.replay_undo(&mut undo);
            self.discard(&txn);
            return Err(CoreError::aborted(err));
        }
        undo.push(UndoRecord::RestoreOverlayDoc {
            path: activator.doc_path().to_path_buf(),
        });

        // the ledger save is the commit point
        if let Err(err) = log.persist(&txn.log) {
            warn!(error = %err, "ledger save failed, rolling back");
            self.replay_undo(&mut undo);
            self.discard(&txn);
            return Err(CoreError::aborted(err));
        }

        log.adopt(std::mem::take(&mut txn.log));
        activator.adopt(std::mem::take(&mut txn.overlay));

        for path in deferred_deletes {
            if let Err(err) = fs::remove_dir_all(&path) {
                warn!(path = %path.display(), error = %err, "deferred staging cleanup failed");
            }
        }
        self.discard(&txn);

        for event in std::mem::take(&mut txn.events) {
            activator.events().emit(event);
        }

        debug!("transaction committed");
        Ok(())
    }

    pub fn rollback(&self, txn: Transaction<'_>) -> CoreResult<()> {
        // forward ops are executed only inside commit, so rollback before
        // commit just discards the journal and the shadows
        self.discard(&txn);
        debug!("transaction rolled back");
        Ok(())
    }

    fn discard(&self, txn: &Transaction<'_>) {
        if self.scratch_root.exists() {
            if let Err(err) = fs::remove_dir_all(&self.scratch_root) {
                warn!(error = %err, "failed to clear transaction scratch dir");
            }
        }
        let _ = txn.lock_file.unlock();
    }

    fn aside(&self, seq: &mut usize) -> PathBuf {
        *seq += 1;
        self.scratch_root.join(format!("aside-{seq}", seq = *seq))
    }

    fn execute(
        &self,
        op: &FsOp,
        backups: &BackupStore,
        undo: &mut Vec<UndoRecord>,
        deferred_deletes: &mut Vec<PathBuf>,
        aside_seq: &mut usize,
    ) -> CoreResult<()> {
        match op {
            FsOp::CaptureBackup { vpath, source } => {
                backups.capture(vpath, source)?;
                undo.push(UndoRecord::RemoveFile {
                    path: backups.file_for(vpath),
                });
            }
            FsOp::RestoreBackup {
                vpath,
                dest,
                discard,
            } => {
                if fs::symlink_metadata(dest).is_ok() {
                    let aside = self.aside(aside_seq);
                    fs::rename(dest, &aside)?;
                    undo.push(UndoRecord::MoveBack {
                        aside,
                        original: dest.clone(),
                    });
                }
                backups.restore(vpath, dest)?;
                undo.push(UndoRecord::RemoveFile { path: dest.clone() });
                if *discard {
                    let backup_file = backups.file_for(vpath);
                    let aside = self.aside(aside_seq);
                    fs::rename(&backup_file, &aside)?;
                    undo.push(UndoRecord::MoveBack {
                        aside,
                        original: backup_file,
                    });
                }
            }
            FsOp::CreateLink { src, dst, hints } => {
                if !src.exists() {
                    return Err(CoreError::StagingCorrupt { path: src.clone() });
                }
                if fs::symlink_metadata(dst).is_ok() {
                    let aside = self.aside(aside_seq);
                    fs::rename(dst, &aside)?;
                    undo.push(UndoRecord::MoveBack {
                        aside,
                        original: dst.clone(),
                    });
                }
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                link::create_link(src, dst, *hints).map_err(|err| {
                    CoreError::LinkCreationFailed {
                        path: dst.clone(),
                        reason: err.to_string(),
                    }
                })?;
                undo.push(UndoRecord::RemoveFile { path: dst.clone() });
            }
            FsOp::RemoveLink { dst, staged, force } => {
                let meta = match fs::symlink_metadata(dst) {
                    Ok(meta) => meta,
                    Err(_) => return Ok(()),
                };
                if !meta.file_type().is_symlink() && !*force {
                    let matches = match staged {
                        Some(src) => link::same_content(src, dst)
                            .map_err(|_| CoreError::LinkRemovalFailed { path: dst.clone() })?,
                        None => false,
                    };
                    if !matches {
                        return Err(CoreError::LinkRemovalFailed { path: dst.clone() });
                    }
                }
                let aside = self.aside(aside_seq);
                fs::rename(dst, &aside)?;
                undo.push(UndoRecord::MoveBack {
                    aside,
                    original: dst.clone(),
                });
            }
            FsOp::MirrorStage { src, dst } => {
                if !src.exists() {
                    return Err(CoreError::StagingCorrupt { path: src.clone() });
                }
                if let Some(parent) = dst.parent() {
                    fs::create_dir_all(parent)?;
                }
                fs::copy(src, dst)?;
                undo.push(UndoRecord::RemoveFile { path: dst.clone() });
            }
            FsOp::RenameDir { from, to } => {
                fs::rename(from, to)?;
                undo.push(UndoRecord::RenameBack {
                    from: to.clone(),
                    to: from.clone(),
                });
            }
            FsOp::RemoveDirTree { path } => {
                if !path.exists() {
                    return Ok(());
                }
                let aside = self.aside(aside_seq);
                match fs::rename(path, &aside) {
                    Ok(()) => undo.push(UndoRecord::MoveBack {
                        aside,
                        original: path.clone(),
                    }),
                    // cross-volume staging cannot be moved into the journal;
                    // defer the delete until after the commit point
                    Err(_) => deferred_deletes.push(path.clone()),
                }
            }
            FsOp::WriteIni {
                file,
                section,
                key,
                value,
            } => {
                let mut ini = IniFile::read(file)?;
                let prior = ini.get(section, key).map(|v| v.to_string());
                match value {
                    Some(v) => ini.set(section, key, v),
                    None => {
                        ini.remove(section, key);
                    }
                }
                ini.write(file)?;
                undo.push(UndoRecord::RestoreIni {
                    file: file.clone(),
                    section: section.clone(),
                    key: key.clone(),
                    prior,
                });
            }
        }
        Ok(())
    }

    fn replay_undo(&self, undo: &mut Vec<UndoRecord>) {
        for record in undo.drain(..).rev() {
            let outcome = match record {
                UndoRecord::MoveBack { aside, original } => {
                    let _ = fs::remove_file(&original);
                    fs::rename(&aside, &original)
                }
                UndoRecord::RemoveFile { path } => match fs::remove_file(&path) {
                    Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
                    _ => Ok(()),
                },
                UndoRecord::RenameBack { from, to } => fs::rename(&from, &to),
                UndoRecord::RestoreIni {
                    file,
                    section,
                    key,
                    prior,
                } => restore_ini(&file, &section, &key, prior.as_deref()),
                UndoRecord::RestoreOverlayDoc { path } => restore_document(&path),
            };
            if let Err(err) = outcome {
                warn!(error = %err, "undo replay step failed");
            }
        }
    }
}

fn restore_ini(file: &Path, section: &str, key: &str, prior: Option<&str>) -> std::io::Result<()> {
    let mut ini = IniFile::read(file)?;
    match prior {
        Some(v) => ini.set(section, key, v),
        None => {
            ini.remove(section, key);
        }
    }
    ini.write(file)
}

fn restore_document(path: &Path) -> std::io::Result<()> {
    let bak = crate::documents::bak_path(path);
    if bak.exists() {
        fs::copy(&bak, path).map(|_| ())
    } else {
        match fs::remove_file(path) {
            Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
            _ => Ok(()),
        }
    }
}
