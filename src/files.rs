use std::fs;
use std::io::{self, Write};
use std::path::Path;

use log::trace;
use tempfile::NamedTempFile;

/// Replaces `path` with `contents` through a sibling temp file, readable by
/// the owner only. Readers never observe a partially written file.
pub(crate) fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut file = NamedTempFile::new_in(parent)?;
    file.write_all(contents)?;
    file.as_file().sync_all()?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        file.as_file()
            .set_permissions(fs::Permissions::from_mode(0o600))?;
    }

    file.persist(path).map_err(|e| e.error)?;
    trace!("Wrote {} bytes to '{}'", contents.len(), path.display());

    Ok(())
}

/// Creates `dir` and its parents; on Unix a newly created leaf is owner-only.
pub(crate) fn create_private_dir(dir: &Path) -> io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }

    fs::create_dir_all(dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dir, fs::Permissions::from_mode(0o700))?;
    }

    Ok(())
}
