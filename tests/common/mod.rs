#![allow(dead_code)]

use modweave::{
    Activator, Coordinator, GameMode, GenericGameMode, InstallLog, ModKey, ModRegistration,
    Settings, VirtualPath,
};
use std::{collections::BTreeMap, fs, path::PathBuf, sync::Arc};
use tempfile::TempDir;
use walkdir::WalkDir;

pub struct Rig {
    pub tmp: TempDir,
    pub settings: Settings,
    pub game: Arc<dyn GameMode>,
    pub log: InstallLog,
    pub vma: Activator,
    pub coord: Coordinator,
}

pub fn init_tracing() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

pub fn rig() -> Rig {
    init_tracing();
    let tmp = tempfile::tempdir().expect("tempdir");
    let game_root = tmp.path().join("game");
    fs::create_dir_all(game_root.join("Data")).expect("create game dirs");
    let settings = Settings::new(&game_root, tmp.path().join("manager"));
    let game: Arc<dyn GameMode> = Arc::new(
        GenericGameMode::new(&game_root)
            .with_stop_folders(&["Data"])
            .with_hard_link_extensions(&[".esp", ".esm", ".esl", ".bsa"]),
    );
    let log = InstallLog::load_or_create(&settings).expect("load ledger");
    let vma = Activator::load_or_create(&settings, game.clone(), &log).expect("load overlay");
    let coord = Coordinator::new(&settings);
    Rig {
        tmp,
        settings,
        game,
        log,
        vma,
        coord,
    }
}

pub fn reopen(rig: &Rig) -> (InstallLog, Activator) {
    let log = InstallLog::load_or_create(&rig.settings).expect("reload ledger");
    let vma =
        Activator::load_or_create(&rig.settings, rig.game.clone(), &log).expect("reload overlay");
    (log, vma)
}

pub fn registration(rig: &Rig, name: &str, version: &str) -> ModRegistration {
    ModRegistration::new(
        rig.tmp.path().join("downloads").join(format!("{name}.7z")),
        name,
    )
    .with_version(version)
}

pub fn stage(rig: &Rig, key: &ModKey, rel: &str, contents: &str) {
    let path = rig.vma.staged_path(key, &VirtualPath::new(rel));
    fs::create_dir_all(path.parent().expect("staged file has a parent")).expect("staging dirs");
    fs::write(path, contents).expect("stage file");
}

pub fn game_file(rig: &Rig, rel: &str) -> PathBuf {
    VirtualPath::new(rel).to_fs_path(&rig.settings.game_root)
}

pub fn read_game_file(rig: &Rig, rel: &str) -> Option<String> {
    fs::read_to_string(game_file(rig, rel)).ok()
}

pub fn install_mod(rig: &mut Rig, name: &str, version: &str, files: &[(&str, &str)]) -> ModKey {
    let reg = registration(rig, name, version);
    let mut txn = rig.coord.begin(&rig.log, &rig.vma).expect("begin");
    let key = rig.log.activate_mod(&mut txn, &reg).expect("activate");
    rig.vma
        .register_mod(&mut txn, &key, &reg)
        .expect("register");
    for (rel, contents) in files {
        stage(rig, &key, rel, contents);
        rig.vma
            .add_file_link(&mut txn, &rig.log, &key, rel, false, false, 0)
            .expect("add link");
    }
    rig.coord
        .commit(txn, &mut rig.log, &mut rig.vma)
        .expect("commit install");
    key
}

pub fn snapshot_game_dir(rig: &Rig) -> BTreeMap<PathBuf, Vec<u8>> {
    let mut snapshot = BTreeMap::new();
    for entry in WalkDir::new(&rig.settings.game_root) {
        let entry = entry.expect("walk game dir");
        if entry.file_type().is_file() {
            let rel = entry
                .path()
                .strip_prefix(&rig.settings.game_root)
                .expect("game file under root")
                .to_path_buf();
            snapshot.insert(rel, fs::read(entry.path()).expect("read game file"));
        }
    }
    snapshot
}
