use serde::{Deserialize, Serialize};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkKind {
    Symbolic,
    Hard,
    Copy,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkHints {
    pub require_hard: bool,
    pub restage_on_cross_volume: bool,
}

#[derive(Debug)]
pub enum LinkError {
    // hard link refused because src and dst live on different volumes and
    // the caller configured a mirror staging area to re-stage into
    CrossVolume,
    ContentDiverged(PathBuf),
    Io(io::Error),
}

impl std::fmt::Display for LinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LinkError::CrossVolume => write!(f, "source and destination are on different volumes"),
            LinkError::ContentDiverged(path) => {
                write!(f, "content at {} diverged from staged copy", path.display())
            }
            LinkError::Io(err) => write!(f, "{err}"),
        }
    }
}

impl From<io::Error> for LinkError {
    fn from(err: io::Error) -> Self {
        LinkError::Io(err)
    }
}

pub fn create_link(src: &Path, dst: &Path, hints: LinkHints) -> Result<LinkKind, LinkError> {
    if !hints.require_hard {
        match symlink_file(src, dst) {
            Ok(()) => {
                debug!(src = %src.display(), dst = %dst.display(), "symbolic link created");
                return Ok(LinkKind::Symbolic);
            }
            Err(err) if is_permission_error(&err) => {
                debug!(dst = %dst.display(), "symlink denied, falling back to hard link");
            }
            Err(err) => return Err(LinkError::Io(err)),
        }
    }

    match fs::hard_link(src, dst) {
        Ok(()) => {
            debug!(src = %src.display(), dst = %dst.display(), "hard link created");
            return Ok(LinkKind::Hard);
        }
        Err(err) if is_cross_device(&err) => {
            if hints.restage_on_cross_volume {
                return Err(LinkError::CrossVolume);
            }
            debug!(dst = %dst.display(), "hard link crosses volumes, falling back to copy");
        }
        Err(err) => {
            debug!(dst = %dst.display(), error = %err, "hard link failed, falling back to copy");
        }
    }

    fs::copy(src, dst)?;
    debug!(src = %src.display(), dst = %dst.display(), "byte copy created");
    Ok(LinkKind::Copy)
}

pub fn remove_link(dst: &Path, staged_src: Option<&Path>, force: bool) -> Result<(), LinkError> {
    let meta = match fs::symlink_metadata(dst) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(LinkError::Io(err)),
    };

    if meta.file_type().is_symlink() {
        fs::remove_file(dst)?;
        return Ok(());
    }

    if !force {
        let matches_staged = match staged_src {
            Some(src) => same_content(src, dst)?,
            None => false,
        };
        if !matches_staged {
            return Err(LinkError::ContentDiverged(dst.to_path_buf()));
        }
    }

    fs::remove_file(dst)?;
    Ok(())
}

pub fn probe(scratch: &Path) -> io::Result<LinkKind> {
    fs::create_dir_all(scratch)?;
    let src = scratch.join("probe.src");
    fs::write(&src, b"probe")?;

    let sym = scratch.join("probe.sym");
    let _ = fs::remove_file(&sym);
    if symlink_file(&src, &sym).is_ok() {
        let _ = fs::remove_file(&sym);
        let _ = fs::remove_file(&src);
        return Ok(LinkKind::Symbolic);
    }

    let hard = scratch.join("probe.hard");
    let _ = fs::remove_file(&hard);
    if fs::hard_link(&src, &hard).is_ok() {
        let _ = fs::remove_file(&hard);
        let _ = fs::remove_file(&src);
        return Ok(LinkKind::Hard);
    }

    let _ = fs::remove_file(&src);
    Ok(LinkKind::Copy)
}

pub fn same_volume(a: &Path, b: &Path) -> bool {
    match (volume_of(a), volume_of(b)) {
        (Some(va), Some(vb)) => va == vb,
        _ => false,
    }
}

pub(crate) fn same_content(a: &Path, b: &Path) -> Result<bool, LinkError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if let (Ok(ma), Ok(mb)) = (fs::metadata(a), fs::metadata(b)) {
            if ma.dev() == mb.dev() && ma.ino() == mb.ino() {
                return Ok(true);
            }
        }
    }
    let left = fs::read(a)?;
    let right = fs::read(b)?;
    Ok(left == right)
}

fn symlink_file(src: &Path, dst: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(src, dst)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(src, dst)
    }
}

fn is_permission_error(err: &io::Error) -> bool {
    if err.kind() == io::ErrorKind::PermissionDenied {
        return true;
    }
    // ERROR_PRIVILEGE_NOT_HELD: symlink creation without Developer Mode
    #[cfg(windows)]
    if err.raw_os_error() == Some(1314) {
        return true;
    }
    false
}

fn is_cross_device(err: &io::Error) -> bool {
    #[cfg(unix)]
    {
        err.raw_os_error() == Some(18)
    }
    #[cfg(windows)]
    {
        err.raw_os_error() == Some(17)
    }
}

#[cfg(unix)]
fn volume_of(path: &Path) -> Option<u64> {
    use std::os::unix::fs::MetadataExt;
    let mut probe = path;
    loop {
        match fs::metadata(probe) {
            Ok(meta) => return Some(meta.dev()),
            Err(_) => probe = probe.parent()?,
        }
    }
}

#[cfg(windows)]
fn volume_of(path: &Path) -> Option<u64> {
    use std::path::Component;
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().ok()?.join(path)
    };
    match absolute.components().next()? {
        Component::Prefix(prefix) => {
            let mut hash = 0u64;
            for b in prefix.as_os_str().to_string_lossy().to_lowercase().bytes() {
                hash = hash.wrapping_mul(31).wrapping_add(b as u64);
            }
            Some(hash)
        }
        _ => None,
    }
}
