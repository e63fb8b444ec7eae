//! Blocking filesystem helpers. Callers on the runtime wrap these in
//! `spawn_blocking`.

use std::{
    fs,
    io::{self, Write as _},
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use crate::MAX_FILE_BYTES;
use crate::error::PersistenceError;

const STABLE_READ_RETRIES: usize = 3;
const STABLE_READ_RETRY_SLEEP: Duration = Duration::from_millis(5);

/// Whether `path` has a `.md` or `.markdown` extension, in any case.
pub fn is_markdown_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("md") || ext.eq_ignore_ascii_case("markdown"))
}

/// Make `path` absolute against the current directory.
pub fn resolve_path(path: &Path) -> io::Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    Ok(std::env::current_dir()?.join(path))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Revision {
    modified: SystemTime,
    len: u64,
}

fn revision(path: &Path) -> io::Result<Revision> {
    let meta = fs::metadata(path)?;
    Ok(Revision {
        modified: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        len: meta.len(),
    })
}

/// Read a UTF-8 file, retrying if it changes underneath us mid-read.
fn read_stable_utf8(path: &Path) -> io::Result<String> {
    let mut last_err = None;
    for _ in 0..STABLE_READ_RETRIES {
        let before = revision(path)?;

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                last_err = Some(err);
                std::thread::sleep(STABLE_READ_RETRY_SLEEP);
                continue;
            }
        };

        match revision(path) {
            Ok(after) if after == before => return Ok(text),
            Ok(_) => {}
            Err(err) => last_err = Some(err),
        }
        std::thread::sleep(STABLE_READ_RETRY_SLEEP);
    }

    Err(last_err.unwrap_or_else(|| io::Error::other("file changed while reading")))
}

/// Read a document from disk, refusing missing and oversized files.
pub fn read_document(path: &Path) -> Result<String, PersistenceError> {
    let meta = fs::metadata(path).map_err(|err| PersistenceError::io("read", path, err))?;
    if !meta.is_file() {
        return Err(PersistenceError::NotFound(path.to_path_buf()));
    }
    if meta.len() > MAX_FILE_BYTES {
        return Err(PersistenceError::TooLarge {
            path: path.to_path_buf(),
            size: meta.len(),
            limit: MAX_FILE_BYTES,
        });
    }
    read_stable_utf8(path).map_err(|err| PersistenceError::io("read", path, err))
}

/// Replace `path` with `contents` via a temp file and rename, so readers
/// never see a half-written document.
pub fn atomic_write_utf8(path: &Path, contents: &str) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let file_name = path.file_name().ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "path is missing a file name")
    })?;

    let file_name = file_name.to_string_lossy();
    let pid = u128::from(std::process::id());
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map_or(0, |d| d.as_nanos());

    for attempt in 0..10u128 {
        let suffix = pid ^ nanos ^ attempt;
        let tmp_path = dir.join(format!(".mdsync-tmp-{file_name}-{suffix}"));

        let open = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp_path);
        let mut file = match open {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => continue,
            Err(err) => return Err(err),
        };

        let result = file
            .write_all(contents.as_bytes())
            .and_then(|()| file.sync_all())
            .and_then(|()| replace_with(&tmp_path, path, dir, &file_name, suffix));

        if let Err(err) = result {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }
        return Ok(());
    }

    Err(io::Error::new(
        io::ErrorKind::AlreadyExists,
        "failed to create a temporary file",
    ))
}

fn replace_with(
    tmp_path: &Path,
    path: &Path,
    dir: &Path,
    file_name: &str,
    suffix: u128,
) -> io::Result<()> {
    if fs::rename(tmp_path, path).is_ok() {
        return Ok(());
    }
    if !path.exists() {
        return fs::rename(tmp_path, path);
    }

    // Move the original aside first so it can be restored if the second
    // rename fails.
    let backup_path = dir.join(format!(".mdsync-backup-{file_name}-{suffix}"));
    fs::rename(path, &backup_path)?;
    match fs::rename(tmp_path, path) {
        Ok(()) => {
            let _ = fs::remove_file(&backup_path);
            Ok(())
        }
        Err(err) => {
            let _ = fs::rename(&backup_path, path);
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_extensions_are_case_insensitive() {
        for (path, expected) in [
            ("notes.md", true),
            ("NOTES.MD", true),
            ("a/b/readme.Markdown", true),
            ("notes.txt", false),
            ("md", false),
            ("archive.md.bak", false),
        ] {
            assert_eq!(is_markdown_file(Path::new(path)), expected, "{path}");
        }
    }

    #[test]
    fn relative_paths_resolve_against_current_dir() {
        let resolved = resolve_path(Path::new("docs/a.md")).ok();
        let expected = std::env::current_dir().ok().map(|cwd| cwd.join("docs/a.md"));
        assert_eq!(resolved, expected);

        let absolute = resolve_path(Path::new("/tmp/a.md")).ok();
        assert_eq!(absolute, Some(PathBuf::from("/tmp/a.md")));
    }

    #[test]
    fn read_document_reads_content() {
        let dir = tempfile::tempdir();
        assert!(dir.is_ok());
        let Ok(dir) = dir else { return };
        let path = dir.path().join("test.md");
        fs::write(&path, "content").ok();

        let result = read_document(&path);
        assert!(result.is_ok(), "read_document failed: {result:?}");
        assert_eq!(result.ok().as_deref(), Some("content"));
    }

    #[test]
    fn read_document_missing_file_is_not_found() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { return };
        let result = read_document(&dir.path().join("missing.md"));
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
    }

    #[test]
    fn read_document_rejects_directories() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { return };
        let result = read_document(dir.path());
        assert!(matches!(result, Err(PersistenceError::NotFound(_))));
    }

    #[test]
    fn atomic_write_creates_and_overwrites() {
        let dir = tempfile::tempdir();
        let Ok(dir) = dir else { return };
        let path = dir.path().join("test.md");

        assert!(atomic_write_utf8(&path, "first").is_ok());
        assert_eq!(fs::read_to_string(&path).unwrap_or_default(), "first");

        assert!(atomic_write_utf8(&path, "second").is_ok());
        assert_eq!(fs::read_to_string(&path).unwrap_or_default(), "second");

        let leftovers = fs::read_dir(dir.path())
            .map(|entries| entries.filter_map(Result::ok).count())
            .unwrap_or_default();
        assert_eq!(leftovers, 1, "temp files left behind");
    }

    #[test]
    fn atomic_write_rejects_missing_filename() {
        let result = atomic_write_utf8(Path::new("/"), "data");
        assert!(result.is_err());
    }
}
