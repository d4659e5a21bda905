//! Executable lookup following the shell's `PATH` rules.

use std::env;
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Resolves `name` to an executable file.
///
/// Names containing a path separator are checked as given (relative to the
/// current directory); bare names are searched in every `PATH` entry.
pub(super) fn look_path(name: &str) -> io::Result<PathBuf> {
    if name.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            "executable file not found in $PATH",
        ));
    }

    if Path::new(name).components().count() > 1 || name.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(name);
        check_executable(&path)?;
        return Ok(path);
    }

    let search_path = env::var_os("PATH").unwrap_or_default();
    search_in(name, &search_path)
}

fn search_in(name: &str, search_path: &OsStr) -> io::Result<PathBuf> {
    for dir in env::split_paths(search_path) {
        // An empty entry means the current directory.
        let dir = if dir.as_os_str().is_empty() {
            PathBuf::from(".")
        } else {
            dir
        };
        let candidate = dir.join(name);
        if check_executable(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    Err(io::Error::new(
        io::ErrorKind::NotFound,
        "executable file not found in $PATH",
    ))
}

fn check_executable(path: &Path) -> io::Result<()> {
    let metadata = fs::metadata(path)?;
    if metadata.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "is a directory",
        ));
    }
    if !is_executable(&metadata) {
        return Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "permission denied",
        ));
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(metadata: &fs::Metadata) -> bool {
    metadata.is_file()
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_look_path_bare_name_in_path() {
        let path = search_in("sh", OsStr::new("/nonexistent:/bin:/usr/bin")).unwrap();
        assert!(path.ends_with("sh"));
    }

    #[test]
    fn test_look_path_bare_name_not_found() {
        let err = search_in("definitely-not-a-helper", OsStr::new("/nonexistent")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_look_path_with_separator() {
        assert_eq!(look_path("/bin/sh").unwrap(), PathBuf::from("/bin/sh"));
    }

    #[test]
    fn test_look_path_missing_file() {
        let err = look_path("./testdata/does-definitely-not-exist").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_look_path_directory() {
        let err = look_path("/").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
    }

    #[test]
    fn test_look_path_empty() {
        assert!(look_path("").is_err());
    }
}
