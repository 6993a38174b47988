use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    fmt,
    hash::{Hash, Hasher},
    path::{Path, PathBuf},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VirtualPath {
    key: String,
    display: String,
}

impl VirtualPath {
    pub fn new(raw: &str) -> Self {
        let display = normalize_separators(raw);
        let key = display.to_lowercase();
        Self { key, display }
    }

    pub fn as_key(&self) -> &str {
        &self.key
    }

    pub fn display_path(&self) -> &str {
        &self.display
    }

    pub fn to_fs_path(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for part in self.display.split('/') {
            out.push(part);
        }
        out
    }

    pub fn from_relative(path: &Path) -> Self {
        let joined = path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        Self::new(&joined)
    }
}

fn normalize_separators(raw: &str) -> String {
    let mut parts = Vec::new();
    for segment in raw.replace('\\', "/").split('/') {
        match segment {
            "" | "." => continue,
            other => parts.push(other.to_string()),
        }
    }
    parts.join("/")
}

impl PartialEq for VirtualPath {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for VirtualPath {}

impl Hash for VirtualPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key.hash(state);
    }
}

impl PartialOrd for VirtualPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VirtualPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key.cmp(&other.key)
    }
}

impl fmt::Display for VirtualPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IniKey {
    pub file: String,
    pub section: String,
    pub key: String,
}

impl IniKey {
    pub fn new(file: impl Into<String>, section: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            section: section.into(),
            key: key.into(),
        }
    }

    fn folded(&self) -> (String, String, String) {
        (
            self.file.to_lowercase(),
            self.section.to_lowercase(),
            self.key.to_lowercase(),
        )
    }
}

impl PartialEq for IniKey {
    fn eq(&self, other: &Self) -> bool {
        self.file.eq_ignore_ascii_case(&other.file)
            && self.section.eq_ignore_ascii_case(&other.section)
            && self.key.eq_ignore_ascii_case(&other.key)
    }
}

impl Eq for IniKey {}

impl Hash for IniKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.folded().hash(state);
    }
}

impl PartialOrd for IniKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for IniKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.folded().cmp(&other.folded())
    }
}

impl fmt::Display for IniKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.file, self.section, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn virtual_path_folds_case_and_separators() {
        let a = VirtualPath::new("Data\\Textures\\Armor.DDS");
        let b = VirtualPath::new("data/textures/armor.dds");
        assert_eq!(a, b);
        assert_eq!(a.as_key(), "data/textures/armor.dds");
        assert_eq!(a.display_path(), "Data/Textures/Armor.DDS");
    }

    #[test]
    fn virtual_path_strips_dot_and_empty_segments() {
        let p = VirtualPath::new("./Data//meshes/./chair.nif");
        assert_eq!(p.as_key(), "data/meshes/chair.nif");
    }

    #[test]
    fn virtual_path_fs_join() {
        let p = VirtualPath::new("Data/Textures/x.dds");
        let joined = p.to_fs_path(Path::new("/game"));
        assert_eq!(joined, PathBuf::from("/game/Data/Textures/x.dds"));
    }

    #[test]
    fn ini_key_case_insensitive() {
        let a = IniKey::new("Skyrim.ini", "Display", "fShadowDistance");
        let b = IniKey::new("SKYRIM.INI", "display", "FSHADOWDISTANCE");
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        set.insert(b);
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn ini_key_display() {
        let k = IniKey::new("Skyrim.ini", "Display", "fShadowDistance");
        assert_eq!(k.to_string(), "Skyrim.ini[Display].fShadowDistance");
    }
}
