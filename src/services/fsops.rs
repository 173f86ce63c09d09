use camino::{Utf8Path, Utf8PathBuf};
use std::fs;
use std::io;
use std::thread;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors from the resilient filesystem operations.
///
/// Invalid arguments and non-transient I/O failures surface here immediately.
/// Running out of the retry budget is not an error: the operations report it
/// as `Ok(false)` and the caller decides whether that is fatal.
#[derive(Error, Debug)]
pub enum FsOpError {
    #[error("Path cannot be empty or consist only of whitespace")]
    EmptyPath,

    #[error("Retry interval {interval:?} must not exceed the timeout {timeout:?}")]
    IntervalExceedsTimeout {
        interval: Duration,
        timeout: Duration,
    },

    #[error("Path exists but is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    #[error("Source entry not found: {0}")]
    SourceMissing(Utf8PathBuf),

    #[error("Timed out retrying filesystem operation on '{0}'")]
    Timeout(Utf8PathBuf),

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Create a directory, retrying on transient contention.
///
/// Idempotent: an already existing directory succeeds immediately. Failed
/// creation attempts are retried with `retry_interval` sleeps until `timeout`
/// elapses, which covers antivirus scanners and slow handle release holding
/// the parent busy.
///
/// # Returns
/// - `Ok(true)` once the directory exists
/// - `Ok(false)` only when the retry budget ran out
/// - `Err(_)` for invalid arguments, a plain file squatting on the path, or
///   any non-retryable I/O failure
pub fn ensure_directory(
    path: &Utf8Path,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<bool, FsOpError> {
    validate_args(path, timeout, retry_interval)?;

    if let Ok(meta) = fs::symlink_metadata(path) {
        if !meta.is_dir() {
            return Err(FsOpError::NotADirectory(path.to_path_buf()));
        }
    }

    let started = Instant::now();
    while started.elapsed() <= timeout {
        if path.is_dir() {
            return Ok(true);
        }

        match fs::create_dir_all(path) {
            Ok(()) => return Ok(true),
            Err(e) if is_retryable(&e) => thread::sleep(retry_interval),
            Err(e) => return Err(e.into()),
        }
    }

    Ok(false)
}

/// Delete a directory (tree), retrying on transient contention.
///
/// Idempotent: a missing directory succeeds immediately, including when a
/// concurrent actor removes it mid-loop. With `clear_readonly`, the read-only
/// attribute is stripped from the target first - and from every descendant
/// when `recursive` is set. After the first failed attempt, every contained
/// file is pre-deleted individually before the directory removal is retried,
/// which dislodges most lock contention.
///
/// The timeout bounds the retry budget, not the deletion itself.
///
/// # Returns
/// - `Ok(true)` once the directory is gone
/// - `Ok(false)` only when the retry budget ran out
/// - `Err(_)` for invalid arguments or any non-retryable I/O failure
pub fn remove_directory_tree(
    path: &Utf8Path,
    recursive: bool,
    clear_readonly: bool,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<bool, FsOpError> {
    validate_args(path, timeout, retry_interval)?;

    if clear_readonly && path.is_dir() {
        clear_readonly_flags(path, recursive)?;
    }

    let started = Instant::now();
    let mut failed_before = false;
    while started.elapsed() <= timeout {
        if !path.exists() {
            return Ok(true);
        }

        let attempt = remove_attempt(path, recursive, failed_before);
        match attempt {
            Ok(()) => return Ok(true),
            // Lost a race with another remover - the goal state is reached.
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(true),
            Err(e) if is_retryable(&e) => {
                failed_before = true;
                thread::sleep(retry_interval);
            }
            Err(e) => return Err(e.into()),
        }
    }

    Ok(false)
}

fn remove_attempt(path: &Utf8Path, recursive: bool, delete_files_first: bool) -> io::Result<()> {
    if delete_files_first {
        delete_contained_files(path)?;
    }

    if recursive {
        fs::remove_dir_all(path)
    } else {
        fs::remove_dir(path)
    }
}

/// Delete every file under `path`, leaving the directory skeleton in place.
fn delete_contained_files(path: &Utf8Path) -> io::Result<()> {
    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        let entry_path = entry.path();
        if entry.file_type()?.is_dir() {
            delete_contained_files(entry_path)?;
        } else {
            match fs::remove_file(entry_path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e),
            }
        }
    }
    Ok(())
}

/// Strip the read-only attribute from `path`, and from every descendant when
/// `recursive` is set.
fn clear_readonly_flags(path: &Utf8Path, recursive: bool) -> io::Result<()> {
    let meta = fs::symlink_metadata(path)?;
    let mut perms = meta.permissions();
    if perms.readonly() {
        #[allow(clippy::permissions_set_readonly_false)]
        perms.set_readonly(false);
        fs::set_permissions(path, perms)?;
    }

    if !recursive || !meta.is_dir() {
        return Ok(());
    }

    for entry in path.read_dir_utf8()? {
        let entry = entry?;
        clear_readonly_flags(entry.path(), recursive)?;
    }
    Ok(())
}

/// Copy a file or directory entry from the pristine source tree into the
/// target tree. Directories are created through [`ensure_directory`] so the
/// copy inherits the same retry discipline.
///
/// # Returns
/// The number of files copied.
pub fn copy_entry(
    source: &Utf8Path,
    target: &Utf8Path,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<u64, FsOpError> {
    if source.is_file() {
        if let Some(parent) = target.parent() {
            create_or_timeout(parent, timeout, retry_interval)?;
        }
        fs::copy(source, target)?;
        return Ok(1);
    }

    if !source.is_dir() {
        return Err(FsOpError::SourceMissing(source.to_path_buf()));
    }

    create_or_timeout(target, timeout, retry_interval)?;
    copy_dir_contents(source, target, timeout, retry_interval)
}

fn copy_dir_contents(
    source: &Utf8Path,
    target: &Utf8Path,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<u64, FsOpError> {
    let mut copied = 0;
    for entry in source.read_dir_utf8().map_err(FsOpError::Io)? {
        let entry = entry.map_err(FsOpError::Io)?;
        let entry_target = target.join(entry.file_name());
        if entry.file_type().map_err(FsOpError::Io)?.is_dir() {
            create_or_timeout(&entry_target, timeout, retry_interval)?;
            copied += copy_dir_contents(entry.path(), &entry_target, timeout, retry_interval)?;
        } else {
            fs::copy(entry.path(), &entry_target)?;
            copied += 1;
        }
    }
    Ok(copied)
}

fn create_or_timeout(
    path: &Utf8Path,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<(), FsOpError> {
    if ensure_directory(path, timeout, retry_interval)? {
        Ok(())
    } else {
        Err(FsOpError::Timeout(path.to_path_buf()))
    }
}

fn validate_args(
    path: &Utf8Path,
    timeout: Duration,
    retry_interval: Duration,
) -> Result<(), FsOpError> {
    if path.as_str().trim().is_empty() {
        return Err(FsOpError::EmptyPath);
    }
    if retry_interval > timeout {
        return Err(FsOpError::IntervalExceedsTimeout {
            interval: retry_interval,
            timeout,
        });
    }
    Ok(())
}

/// Lock contention and transient access denial are worth retrying; anything
/// else propagates immediately. `DirectoryNotEmpty` is included because a
/// contested non-recursive delete surfaces lingering handles that way.
fn is_retryable(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied
            | io::ErrorKind::ResourceBusy
            | io::ErrorKind::DirectoryNotEmpty
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use tempfile::TempDir;

    const TIMEOUT: Duration = Duration::from_millis(500);
    const INTERVAL: Duration = Duration::from_millis(10);

    fn utf8_temp_dir() -> (TempDir, Utf8PathBuf) {
        let temp = TempDir::new().unwrap();
        let path = Utf8PathBuf::try_from(temp.path().to_path_buf()).unwrap();
        (temp, path)
    }

    #[test]
    fn test_empty_path_rejected() {
        let result = ensure_directory(Utf8Path::new("   "), TIMEOUT, INTERVAL);
        assert!(matches!(result, Err(FsOpError::EmptyPath)));
    }

    #[test]
    fn test_interval_exceeding_timeout_rejected() {
        let result = ensure_directory(
            Utf8Path::new("somewhere"),
            Duration::from_millis(10),
            Duration::from_millis(50),
        );
        assert!(matches!(
            result,
            Err(FsOpError::IntervalExceedsTimeout { .. })
        ));
    }

    #[test]
    fn test_ensure_directory_rejects_plain_file() {
        let (_temp, root) = utf8_temp_dir();
        let file = root.join("occupied");
        fs::write(&file, "not a directory").unwrap();

        let result = ensure_directory(&file, TIMEOUT, INTERVAL);
        assert!(matches!(result, Err(FsOpError::NotADirectory(_))));
    }

    #[test]
    fn test_ensure_directory_creates_nested() {
        let (_temp, root) = utf8_temp_dir();
        let nested = root.join("a/b/c");

        assert!(ensure_directory(&nested, TIMEOUT, INTERVAL).unwrap());
        assert!(nested.is_dir());
    }

    #[test]
    fn test_remove_missing_directory_succeeds() {
        let (_temp, root) = utf8_temp_dir();
        let missing = root.join("never_existed");

        assert!(remove_directory_tree(&missing, true, false, TIMEOUT, INTERVAL).unwrap());
    }

    #[test]
    fn test_remove_recursive_tree() {
        let (_temp, root) = utf8_temp_dir();
        let tree = root.join("tree");
        fs::create_dir_all(tree.join("nested")).unwrap();
        fs::write(tree.join("nested/file.txt"), "x").unwrap();

        assert!(remove_directory_tree(&tree, true, false, TIMEOUT, INTERVAL).unwrap());
        assert!(!tree.exists());
    }

    #[test]
    fn test_copy_entry_counts_files() {
        let (_temp, root) = utf8_temp_dir();
        let source = root.join("src_tree");
        fs::create_dir_all(source.join("inner")).unwrap();
        fs::write(source.join("a.pnml"), "a").unwrap();
        fs::write(source.join("inner/b.pnml"), "b").unwrap();

        let target = root.join("dst_tree");
        let copied = copy_entry(&source, &target, TIMEOUT, INTERVAL).unwrap();

        assert_eq!(copied, 2);
        assert_eq!(fs::read_to_string(target.join("inner/b.pnml")).unwrap(), "b");
    }

    #[test]
    fn test_copy_entry_missing_source() {
        let (_temp, root) = utf8_temp_dir();
        let result = copy_entry(&root.join("nope"), &root.join("out"), TIMEOUT, INTERVAL);
        assert!(matches!(result, Err(FsOpError::SourceMissing(_))));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(is_retryable(&io::Error::from(
            io::ErrorKind::PermissionDenied
        )));
        assert!(is_retryable(&io::Error::from(
            io::ErrorKind::DirectoryNotEmpty
        )));
        assert!(!is_retryable(&io::Error::from(io::ErrorKind::NotFound)));
        assert!(!is_retryable(&io::Error::from(
            io::ErrorKind::InvalidInput
        )));
    }
}
