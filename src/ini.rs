use std::{fs, io, path::Path};

// Line-preserving INI editor: comments and unrelated lines survive edits.
#[derive(Debug, Clone, Default)]
pub struct IniFile {
    lines: Vec<String>,
}

impl IniFile {
    pub fn parse(content: &str) -> Self {
        Self {
            lines: content.lines().map(|l| l.to_string()).collect(),
        }
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(Self::parse(&content)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err),
        }
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.write_to_string())
    }

    pub fn write_to_string(&self) -> String {
        let mut out = self.lines.join("\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&str> {
        let mut in_section = false;
        for line in &self.lines {
            let trimmed = line.trim();
            if let Some(name) = section_header(trimmed) {
                in_section = name.eq_ignore_ascii_case(section);
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((k, v)) = key_value(trimmed) {
                if k.eq_ignore_ascii_case(key) {
                    return Some(v);
                }
            }
        }
        None
    }

    pub fn set(&mut self, section: &str, key: &str, value: &str) {
        let mut in_section = false;
        let mut section_end = self.lines.len();
        let mut section_found = false;

        for (idx, line) in self.lines.iter().enumerate() {
            let trimmed = line.trim();
            if let Some(name) = section_header(trimmed) {
                if in_section {
                    section_end = idx;
                    break;
                }
                if name.eq_ignore_ascii_case(section) {
                    in_section = true;
                    section_found = true;
                }
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((k, _)) = key_value(trimmed) {
                if k.eq_ignore_ascii_case(key) {
                    self.lines[idx] = format!("{key}={value}");
                    return;
                }
            }
        }

        if section_found {
            // insert before trailing blank lines of the section
            let mut insert_at = section_end;
            while insert_at > 0 && self.lines[insert_at - 1].trim().is_empty() {
                insert_at -= 1;
            }
            self.lines.insert(insert_at, format!("{key}={value}"));
        } else {
            if !self.lines.is_empty() && !self.lines.last().map(|l| l.is_empty()).unwrap_or(true) {
                self.lines.push(String::new());
            }
            self.lines.push(format!("[{section}]"));
            self.lines.push(format!("{key}={value}"));
        }
    }

    pub fn remove(&mut self, section: &str, key: &str) -> Option<String> {
        let mut in_section = false;
        for (idx, line) in self.lines.iter().enumerate() {
            let trimmed = line.trim();
            if let Some(name) = section_header(trimmed) {
                in_section = name.eq_ignore_ascii_case(section);
                continue;
            }
            if !in_section {
                continue;
            }
            if let Some((k, v)) = key_value(trimmed) {
                if k.eq_ignore_ascii_case(key) {
                    let value = v.to_string();
                    self.lines.remove(idx);
                    return Some(value);
                }
            }
        }
        None
    }
}

fn section_header(line: &str) -> Option<&str> {
    line.strip_prefix('[')?.strip_suffix(']')
}

fn key_value(line: &str) -> Option<(&str, &str)> {
    if line.starts_with(';') || line.starts_with('#') {
        return None;
    }
    let (k, v) = line.split_once('=')?;
    Some((k.trim(), v.trim()))
}
