use crate::paths::VirtualPath;
use std::path::{Path, PathBuf};

pub trait GameMode: Send + Sync {
    fn installation_root(&self) -> &Path;

    fn stop_folders(&self) -> &[String];

    fn hard_link_extensions(&self) -> &[String];

    // legacy archives often omit the top-level data folder; prefix it when
    // the first path segment is not a known stop folder
    fn adjust_mod_path(&self, path: &str) -> String {
        let stops = self.stop_folders();
        if stops.is_empty() {
            return path.to_string();
        }
        let first = path
            .replace('\\', "/")
            .split('/')
            .next()
            .unwrap_or("")
            .to_string();
        if stops.iter().any(|s| s.eq_ignore_ascii_case(&first)) {
            path.to_string()
        } else {
            format!("{}/{}", stops[0], path)
        }
    }

    fn requires_hard_link(&self, path: &VirtualPath) -> bool {
        let key = path.as_key();
        self.hard_link_extensions()
            .iter()
            .any(|ext| key.ends_with(&ext.to_lowercase()))
    }
}

#[derive(Debug, Clone)]
pub struct GenericGameMode {
    root: PathBuf,
    stop_folders: Vec<String>,
    hard_link_extensions: Vec<String>,
}

impl GenericGameMode {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            stop_folders: Vec::new(),
            hard_link_extensions: Vec::new(),
        }
    }

    pub fn with_stop_folders(mut self, folders: &[&str]) -> Self {
        self.stop_folders = folders.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn with_hard_link_extensions(mut self, exts: &[&str]) -> Self {
        self.hard_link_extensions = exts.iter().map(|s| s.to_string()).collect();
        self
    }
}

impl GameMode for GenericGameMode {
    fn installation_root(&self) -> &Path {
        &self.root
    }

    fn stop_folders(&self) -> &[String] {
        &self.stop_folders
    }

    fn hard_link_extensions(&self) -> &[String] {
        &self.hard_link_extensions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mode() -> GenericGameMode {
        GenericGameMode::new("/game")
            .with_stop_folders(&["Data", "Textures", "Meshes"])
            .with_hard_link_extensions(&[".esp", ".esm", ".bsa"])
    }

    #[test]
    fn adjust_prefixes_missing_data_folder() {
        let mode = mode();
        assert_eq!(
            mode.adjust_mod_path("textures/armor/x.dds"),
            "textures/armor/x.dds"
        );
        assert_eq!(mode.adjust_mod_path("armor/x.dds"), "Data/armor/x.dds");
        assert_eq!(mode.adjust_mod_path("DATA/x.esp"), "DATA/x.esp");
    }

    #[test]
    fn hard_link_classification_ignores_case() {
        let mode = mode();
        assert!(mode.requires_hard_link(&VirtualPath::new("Data/Plugin.ESP")));
        assert!(mode.requires_hard_link(&VirtualPath::new("Data/archive.bsa")));
        assert!(!mode.requires_hard_link(&VirtualPath::new("Data/readme.txt")));
    }

    #[test]
    fn no_stop_folders_means_no_adjustment() {
        let mode = GenericGameMode::new("/game");
        assert_eq!(mode.adjust_mod_path("anything/x.dds"), "anything/x.dds");
    }
}
