//! Filesystem access checks, recursive listings and whole-file read/write helpers.

use crate::error::{CoreError, CoreErrorExt};
use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// Options shared by the recursive directory scans.
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Extensions to keep, dot included (`.json`). Empty keeps every file.
    pub extensions: Vec<String>,
    pub ignore_extn_case: bool,
    pub follow_symlinks: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self { extensions: Vec::new(), ignore_extn_case: true, follow_symlinks: true }
    }
}

impl ScanOptions {
    pub fn extensions<S: Into<String>>(mut self, extensions: impl IntoIterator<Item = S>) -> Self {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn ignore_extn_case(mut self, ignore: bool) -> Self {
        self.ignore_extn_case = ignore;
        self
    }

    #[must_use]
    pub const fn follow_symlinks(mut self, follow: bool) -> Self {
        self.follow_symlinks = follow;
        self
    }

    fn matches(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        let ext = format!(".{ext}");
        self.extensions.iter().any(|wanted| {
            if self.ignore_extn_case { wanted.eq_ignore_ascii_case(&ext) } else { *wanted == ext }
        })
    }

    fn walk(&self, base: &Path) -> impl Iterator<Item = walkdir::DirEntry> {
        WalkDir::new(base)
            .min_depth(1)
            .follow_links(self.follow_symlinks)
            .into_iter()
            .filter_map(Result::ok)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~")
        && let Some(home) = std::env::var_os("HOME")
    {
        return PathBuf::from(home).join(rest);
    }
    path.to_path_buf()
}

fn parent_is_writable(path: &Path) -> bool {
    let path = expand_home(path);
    let absolute = std::path::absolute(&path).unwrap_or(path);
    absolute
        .parent()
        .and_then(|p| fs::metadata(p).ok())
        .is_some_and(|m| m.is_dir() && !m.permissions().readonly())
}

fn compile(pattern: Option<&str>) -> Result<Option<Regex>, CoreError> {
    pattern
        .map(|p| {
            Regex::new(p).map_err(|e| CoreError::Validation {
                message: e.to_string().into(),
                context: Some(format!("Invalid pattern '{p}'").into()),
            })
        })
        .transpose()
}

fn not_accessible(kind: &str, path: &Path, access: &str) -> CoreError {
    CoreError::validation(format!("{kind} '{}' is not {access}", path.display()))
}

#[derive(Debug, Clone, Copy)]
pub struct FilesConv;

impl FilesConv {
    #[must_use]
    pub fn file_exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().is_file()
    }

    #[must_use]
    pub fn dir_exists(path: impl AsRef<Path>) -> bool {
        path.as_ref().is_dir()
    }

    #[must_use]
    pub fn is_file_readable(path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        path.is_file() && fs::File::open(path).is_ok()
    }

    #[must_use]
    pub fn is_dir_readable(path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        path.is_dir() && fs::read_dir(path).is_ok()
    }

    /// With `check_creatable`, a missing file counts as writable when its parent directory is.
    #[must_use]
    pub fn is_file_writable(path: impl AsRef<Path>, check_creatable: bool) -> bool {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return false;
        }
        match fs::metadata(path) {
            Ok(meta) => meta.is_file() && !meta.permissions().readonly(),
            Err(_) => check_creatable && parent_is_writable(path),
        }
    }

    /// With `check_creatable`, a missing directory counts as writable when its parent is.
    #[must_use]
    pub fn is_dir_writable(path: impl AsRef<Path>, check_creatable: bool) -> bool {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return false;
        }
        match fs::metadata(path) {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => check_creatable && parent_is_writable(path),
        }
    }

    /// All directories and matching files below `base`, as `(dirs, files)`.
    pub fn recursive_dir_content(
        base: impl AsRef<Path>,
        options: &ScanOptions,
    ) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        for entry in options.walk(base.as_ref()) {
            if entry.file_type().is_dir() {
                dirs.push(entry.into_path());
            } else if entry.file_type().is_file() && options.matches(entry.path()) {
                files.push(entry.into_path());
            }
        }
        (dirs, files)
    }

    /// Number of matching files below `base`, `None` when `base` is not a readable directory.
    #[must_use]
    pub fn total_files_in_dir(base: impl AsRef<Path>, options: &ScanOptions) -> Option<usize> {
        let base = base.as_ref();
        if !Self::is_dir_readable(base) {
            return None;
        }
        Some(
            options
                .walk(base)
                .filter(|e| !e.file_type().is_dir() && options.matches(e.path()))
                .count(),
        )
    }

    /// Matching file paths below `base`, optionally filtered by a regex searched in the path.
    pub fn file_paths_from_dir(
        base: impl AsRef<Path>,
        options: &ScanOptions,
        pattern: Option<&str>,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let base = base.as_ref();
        if !Self::is_dir_readable(base) {
            return Ok(Vec::new());
        }
        let regex = compile(pattern)?;
        Ok(options
            .walk(base)
            .filter(|e| !e.file_type().is_dir() && options.matches(e.path()))
            .map(walkdir::DirEntry::into_path)
            .filter(|p| regex.as_ref().is_none_or(|r| r.is_match(&p.to_string_lossy())))
            .collect())
    }

    /// Directory paths below `base`, optionally filtered by a regex searched in the path.
    pub fn dir_paths_from_dir(
        base: impl AsRef<Path>,
        options: &ScanOptions,
        pattern: Option<&str>,
    ) -> Result<Vec<PathBuf>, CoreError> {
        let base = base.as_ref();
        if !Self::is_dir_readable(base) {
            return Ok(Vec::new());
        }
        let regex = compile(pattern)?;
        Ok(options
            .walk(base)
            .filter(|e| e.file_type().is_dir())
            .map(walkdir::DirEntry::into_path)
            .filter(|p| regex.as_ref().is_none_or(|r| r.is_match(&p.to_string_lossy())))
            .collect())
    }

    pub fn read_bytes(path: impl AsRef<Path>) -> Result<Vec<u8>, CoreError> {
        let path = path.as_ref();
        if !Self::is_file_readable(path) {
            return Err(not_accessible("File", path, "readable"));
        }
        Ok(fs::read(path).context(path.display().to_string())?)
    }

    pub fn read_text(path: impl AsRef<Path>) -> Result<String, CoreError> {
        let path = path.as_ref();
        if !Self::is_file_readable(path) {
            return Err(not_accessible("Text file", path, "readable"));
        }
        Ok(fs::read_to_string(path).context(path.display().to_string())?)
    }

    pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, CoreError> {
        let path = path.as_ref();
        if !Self::is_file_readable(path) {
            return Err(not_accessible("Json file", path, "readable"));
        }
        let bytes = fs::read(path).context(path.display().to_string())?;
        Ok(serde_json::from_slice::<T>(&bytes).context(path.display().to_string())?)
    }

    pub fn read_toml<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, CoreError> {
        let path = path.as_ref();
        if !Self::is_file_readable(path) {
            return Err(not_accessible("Toml file", path, "readable"));
        }
        let text = fs::read_to_string(path).context(path.display().to_string())?;
        Ok(toml::from_str::<T>(&text).context(path.display().to_string())?)
    }

    /// Writes `data`, creating parent directories.
    ///
    /// Returns `Ok(None)` without touching the file when it exists and `overwrite` is off,
    /// otherwise the number of bytes written.
    pub fn write_bytes(
        path: impl AsRef<Path>,
        data: impl AsRef<[u8]>,
        overwrite: bool,
    ) -> Result<Option<usize>, CoreError> {
        let path = path.as_ref();
        if !Self::is_file_writable(path, true) && !Self::creatable_with_parents(path) {
            return Err(not_accessible("File", path, "writable"));
        }
        if !overwrite && Self::file_exists(path) {
            debug!(path = %path.display(), "Refusing to overwrite existing file");
            return Ok(None);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).context(parent.display().to_string())?;
        }
        let data = data.as_ref();
        fs::write(path, data).context(path.display().to_string())?;
        Ok(Some(data.len()))
    }

    pub fn write_text(
        path: impl AsRef<Path>,
        data: &str,
        overwrite: bool,
    ) -> Result<Option<usize>, CoreError> {
        Self::write_bytes(path, data.as_bytes(), overwrite)
    }

    pub fn write_json<T: Serialize + ?Sized>(
        path: impl AsRef<Path>,
        data: &T,
        overwrite: bool,
    ) -> Result<Option<usize>, CoreError> {
        Self::write_bytes(path, serde_json::to_vec(data)?, overwrite)
    }

    pub fn delete_file(path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        if !Self::is_file_writable(path, false) {
            return Err(not_accessible("File", path, "writable"));
        }
        Ok(fs::remove_file(path).context(path.display().to_string())?)
    }

    /// Removes an empty directory.
    pub fn delete_dir(path: impl AsRef<Path>) -> Result<(), CoreError> {
        let path = path.as_ref();
        if !Self::is_dir_writable(path, false) {
            return Err(not_accessible("Directory", path, "writable"));
        }
        Ok(fs::remove_dir(path).context(path.display().to_string())?)
    }

    /// The nearest existing ancestor is a writable directory.
    fn creatable_with_parents(path: &Path) -> bool {
        let path = expand_home(path);
        let absolute = std::path::absolute(&path).unwrap_or(path);
        absolute
            .ancestors()
            .skip(1)
            .find_map(|p| fs::metadata(p).ok())
            .is_some_and(|m| m.is_dir() && !m.permissions().readonly())
    }
}
