mod common;

use common::*;
use modweave::{CoreError, IniKey, LinkKind, VirtualPath};
use std::fs;

#[test]
fn s1_simple_install_and_uninstall() {
    let mut rig = rig();
    let key = install_mod(&mut rig, "ModA", "1.0", &[("Data/textures/x.dds", "AAAA")]);
    let vpath = VirtualPath::new("Data/textures/x.dds");

    assert_eq!(rig.log.installers_of(&vpath), vec![key.clone()]);
    assert_eq!(rig.log.current_owner(&vpath), Some(key.clone()));
    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("AAAA")
    );

    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    rig.vma.deactivate_mod(&mut txn, &rig.log, &key).unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert!(rig.log.installers_of(&vpath).is_empty());
    assert!(!game_file(&rig, "Data/textures/x.dds").exists());
    assert!(rig.log.backups().is_empty().unwrap());
    assert_eq!(rig.log.state().active_mods().count(), 0);
    assert!(!rig.vma.staging_dir(&key).exists());
}

#[test]
fn s2_conflicting_claims_stack_in_order() {
    let mut rig = rig();
    let a = install_mod(&mut rig, "ModA", "1.0", &[("Data/textures/x.dds", "AAAA")]);
    let b = install_mod(&mut rig, "ModB", "1.0", &[("Data/textures/x.dds", "BBBB")]);
    let vpath = VirtualPath::new("Data/textures/x.dds");

    assert_eq!(rig.log.installers_of(&vpath), vec![a.clone(), b.clone()]);
    assert_eq!(rig.log.current_owner(&vpath), Some(b.clone()));
    assert_eq!(rig.log.previous_owner(&vpath), Some(a.clone()));
    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("BBBB")
    );

    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    rig.vma
        .remove_file_link(&mut txn, &rig.log, &vpath, &b)
        .unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert_eq!(rig.log.installers_of(&vpath), vec![a.clone()]);
    assert_eq!(rig.log.current_owner(&vpath), Some(a));
    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("AAAA")
    );
}

#[test]
fn s3_ini_edit_preserves_and_restores_original() {
    let mut rig = rig();
    fs::write(
        rig.settings.game_root.join("Skyrim.ini"),
        "[Display]\nfShadowDistance=3000\n",
    )
    .unwrap();
    let coord = IniKey::new("Skyrim.ini", "Display", "fShadowDistance");

    let reg = registration(&rig, "ShadowBoost", "1.0");
    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    let key = rig.log.activate_mod(&mut txn, &reg).unwrap();
    rig.log
        .add_ini_edit(&mut txn, &key, &coord, "8000")
        .unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert_eq!(rig.log.state().current_ini_value(&coord), Some("8000"));
    let on_disk = fs::read_to_string(rig.settings.game_root.join("Skyrim.ini")).unwrap();
    assert!(on_disk.contains("fShadowDistance=8000"));

    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    rig.log.deactivate_mod(&mut txn, &key).unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert!(rig.log.state().tracked_ini_edits().is_empty());
    let on_disk = fs::read_to_string(rig.settings.game_root.join("Skyrim.ini")).unwrap();
    assert!(on_disk.contains("fShadowDistance=3000"));
}

#[test]
fn s3b_ini_edit_on_absent_key_removes_it_on_uninstall() {
    let mut rig = rig();
    let coord = IniKey::new("Skyrim.ini", "Display", "bBrandNew");

    let reg = registration(&rig, "NewSetting", "1.0");
    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    let key = rig.log.activate_mod(&mut txn, &reg).unwrap();
    rig.log.add_ini_edit(&mut txn, &key, &coord, "1").unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    let on_disk = fs::read_to_string(rig.settings.game_root.join("Skyrim.ini")).unwrap();
    assert!(on_disk.contains("bBrandNew=1"));

    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    rig.log.remove_ini_edit(&mut txn, &key, &coord).unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    let on_disk = fs::read_to_string(rig.settings.game_root.join("Skyrim.ini")).unwrap();
    assert!(!on_disk.contains("bBrandNew"));
}

#[test]
fn s4_hard_link_extensions_never_symlink() {
    let mut rig = rig();
    install_mod(&mut rig, "PluginMod", "1.0", &[("Data/plugin.esp", "TES4")]);

    let meta = fs::symlink_metadata(game_file(&rig, "Data/plugin.esp")).unwrap();
    assert!(
        !meta.file_type().is_symlink(),
        "plugin files must not be symlinked"
    );
    assert_eq!(
        read_game_file(&rig, "Data/plugin.esp").as_deref(),
        Some("TES4")
    );

    // host capability probe still reports something usable
    let kind = rig.vma.probe_host().unwrap();
    assert!(matches!(
        kind,
        LinkKind::Symbolic | LinkKind::Hard | LinkKind::Copy
    ));
}

#[test]
fn s5_failure_mid_transaction_rolls_everything_back() {
    let mut rig = rig();
    let reg = registration(&rig, "Broken", "1.0");
    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    let key = rig.log.activate_mod(&mut txn, &reg).unwrap();
    rig.vma.register_mod(&mut txn, &key, &reg).unwrap();

    stage(&rig, &key, "Data/good.dds", "GOOD");
    rig.vma
        .add_file_link(&mut txn, &rig.log, &key, "Data/good.dds", false, false, 0)
        .unwrap();

    // never staged: the add must fail and poison the transaction
    let err = rig
        .vma
        .add_file_link(&mut txn, &rig.log, &key, "Data/missing.dds", false, false, 0)
        .unwrap_err();
    assert!(matches!(err, CoreError::StagingCorrupt { .. }));

    let err = rig
        .log
        .add_file(&mut txn, &key, &VirtualPath::new("Data/other.dds"), false)
        .unwrap_err();
    assert!(matches!(err, CoreError::TransactionAborted(_)));

    let err = rig
        .coord
        .commit(txn, &mut rig.log, &mut rig.vma)
        .unwrap_err();
    assert!(matches!(err, CoreError::TransactionAborted(_)));

    assert!(!game_file(&rig, "Data/good.dds").exists());
    assert!(!rig.settings.ledger_path().exists());
    assert_eq!(rig.log.state().active_mods().count(), 0);
}

#[test]
fn s6_priority_reassignment_changes_winner() {
    let mut rig = rig();
    let a = install_mod(&mut rig, "ModA", "1.0", &[("Data/textures/x.dds", "AAAA")]);
    let b = install_mod(&mut rig, "ModB", "1.0", &[("Data/textures/x.dds", "BBBB")]);
    let vpath = VirtualPath::new("Data/textures/x.dds");

    // equal priority: latest insertion wins
    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("BBBB")
    );

    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    rig.vma
        .update_link_priority(&mut txn, &a, &vpath, 1)
        .unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("AAAA")
    );
    let active: Vec<_> = rig
        .vma
        .state()
        .links_for_path(&vpath)
        .into_iter()
        .filter(|l| l.active)
        .map(|l| l.mod_key.clone())
        .collect();
    assert_eq!(active, vec![a]);
    assert!(rig.vma.is_active(&b));
}

#[test]
fn original_file_is_backed_up_and_restored() {
    let mut rig = rig();
    let vanilla_path = game_file(&rig, "Data/textures/x.dds");
    fs::create_dir_all(vanilla_path.parent().unwrap()).unwrap();
    fs::write(vanilla_path, "VANILLA").unwrap();

    let key = install_mod(&mut rig, "Retex", "1.0", &[("Data/textures/x.dds", "MODDED")]);
    let vpath = VirtualPath::new("Data/textures/x.dds");

    assert_eq!(
        rig.log.installers_of(&vpath),
        vec![modweave::ModKey::original(), key.clone()]
    );
    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("MODDED")
    );
    assert!(!rig.log.backups().is_empty().unwrap());

    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    rig.vma.deactivate_mod(&mut txn, &rig.log, &key).unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert_eq!(
        read_game_file(&rig, "Data/textures/x.dds").as_deref(),
        Some("VANILLA")
    );
    assert!(rig.log.installers_of(&vpath).is_empty());
    assert!(rig.log.backups().is_empty().unwrap());
}

#[test]
fn duplicate_activation_is_rejected() {
    let mut rig = rig();
    install_mod(&mut rig, "ModA", "1.0", &[("Data/a.dds", "A")]);

    let reg = registration(&rig, "ModA", "1.0");
    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    let err = rig.log.activate_mod(&mut txn, &reg).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateMod { .. }));
    rig.coord.rollback(txn).unwrap();
}

#[test]
fn version_drift_is_reported() {
    let mut rig = rig();
    install_mod(&mut rig, "ModA", "1.0", &[("Data/a.dds", "A")]);

    let current = vec![registration(&rig, "ModA", "2.0")];
    let drift = rig.log.mismatched_versions(&current);
    assert_eq!(drift.len(), 1);
    assert_eq!(drift[0].recorded, "1.0");
    assert_eq!(drift[0].current, "2.0");

    let unchanged = vec![registration(&rig, "ModA", "1.0")];
    assert!(rig.log.mismatched_versions(&unchanged).is_empty());
}

#[test]
fn replace_mod_preserves_stack_positions() {
    let mut rig = rig();
    let a = install_mod(&mut rig, "ModA", "1.0", &[("Data/textures/x.dds", "A1")]);
    let b = install_mod(&mut rig, "ModB", "1.0", &[("Data/textures/x.dds", "B1")]);
    let vpath = VirtualPath::new("Data/textures/x.dds");

    let upgrade = registration(&rig, "ModA", "2.0");
    let mut txn = rig.coord.begin(&rig.log, &rig.vma).unwrap();
    let a2 = rig
        .vma
        .replace_mod(&mut txn, &rig.log, &a, &upgrade)
        .unwrap();
    rig.coord.commit(txn, &mut rig.log, &mut rig.vma).unwrap();

    assert_ne!(a, a2);
    // position preserved: upgraded mod is still below B in the stack
    assert_eq!(rig.log.installers_of(&vpath), vec![a2.clone(), b]);
    assert!(rig.vma.staging_dir(&a2).exists());
    assert!(!rig.vma.staging_dir(&a).exists());
    assert_eq!(rig.log.state().mod_entry(&a2).unwrap().version, "2.0");
}
