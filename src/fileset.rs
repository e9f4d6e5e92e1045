//! In-memory file sets.
//!
//! A [`FileSet`] is what flows through an adapter: a list of files, each
//! identified by its path relative to some root, with its full contents.
//! Tasks read a source selection into a set, hand it to an adapter, and
//! write the resulting set under a destination root.
//!
//! Every I/O error carries the path that caused it.

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum FileSetError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("walking {}: {source}", .root.display())]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },
}

impl FileSetError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// One file in a set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    /// Path relative to the set's root.
    pub path: PathBuf,
    pub contents: Vec<u8>,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            contents: contents.into(),
        }
    }

    /// Contents as UTF-8, if they are valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.contents).ok()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileSet {
    files: Vec<SourceFile>,
}

impl FileSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, file: SourceFile) {
        self.files.push(file);
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SourceFile> {
        self.files.iter()
    }

    /// Look up a file by its relative path.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<&SourceFile> {
        let path = path.as_ref();
        self.files.iter().find(|f| f.path == path)
    }

    /// Read every file under `root` whose relative path satisfies `filter`.
    ///
    /// A missing root yields an empty set.
    pub fn read(root: &Path, filter: impl Fn(&Path) -> bool) -> Result<Self, FileSetError> {
        let mut set = Self::new();
        for relative in collect_files(root, filter)? {
            let absolute = root.join(&relative);
            let contents = fs::read(&absolute).map_err(|e| FileSetError::io(&absolute, e))?;
            set.push(SourceFile::new(relative, contents));
        }
        Ok(set)
    }

    /// Read a single file that must exist, keyed by its file name.
    pub fn read_single(path: &Path) -> Result<Self, FileSetError> {
        let contents = fs::read(path).map_err(|e| FileSetError::io(path, e))?;
        let name = path.file_name().map(PathBuf::from).unwrap_or_default();
        Ok(Self::from(vec![SourceFile::new(name, contents)]))
    }

    /// Write every file under `dest`, creating directories as needed.
    ///
    /// Existing files are overwritten. Returns the absolute paths written.
    pub fn write_to(&self, dest: &Path) -> Result<Vec<PathBuf>, FileSetError> {
        let mut written = Vec::with_capacity(self.files.len());
        for file in &self.files {
            let target = dest.join(&file.path);
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| FileSetError::io(parent, e))?;
            }
            fs::write(&target, &file.contents).map_err(|e| FileSetError::io(&target, e))?;
            written.push(target);
        }
        Ok(written)
    }
}

impl From<Vec<SourceFile>> for FileSet {
    fn from(files: Vec<SourceFile>) -> Self {
        Self { files }
    }
}

impl IntoIterator for FileSet {
    type Item = SourceFile;
    type IntoIter = std::vec::IntoIter<SourceFile>;

    fn into_iter(self) -> Self::IntoIter {
        self.files.into_iter()
    }
}

impl FromIterator<SourceFile> for FileSet {
    fn from_iter<I: IntoIterator<Item = SourceFile>>(iter: I) -> Self {
        Self {
            files: iter.into_iter().collect(),
        }
    }
}

/// List files under `root` (recursively) whose relative path satisfies
/// `filter`. Paths are returned relative to `root`, sorted.
///
/// A missing root yields an empty list.
pub fn collect_files(
    root: &Path,
    filter: impl Fn(&Path) -> bool,
) -> Result<Vec<PathBuf>, FileSetError> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(|source| FileSetError::Walk {
            root: root.to_path_buf(),
            source,
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        if filter(relative) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(files)
}

/// Copy every file under `src` whose relative path satisfies `filter` to the
/// same relative path under `dst`. Returns the number of files copied.
pub fn copy_tree(
    src: &Path,
    dst: &Path,
    filter: impl Fn(&Path) -> bool,
) -> Result<usize, FileSetError> {
    let files = collect_files(src, filter)?;
    for relative in &files {
        let from = src.join(relative);
        let to = dst.join(relative);
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).map_err(|e| FileSetError::io(parent, e))?;
        }
        fs::copy(&from, &to).map_err(|e| FileSetError::io(&from, e))?;
    }
    Ok(files.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn read_returns_relative_sorted_paths() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "b/two.html", "2");
        touch(tmp.path(), "a.html", "1");
        touch(tmp.path(), "b/skip.txt", "x");

        let set = FileSet::read(tmp.path(), |p| {
            p.extension().is_some_and(|e| e == "html")
        })
        .unwrap();

        let paths: Vec<_> = set.iter().map(|f| f.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("a.html"), PathBuf::from("b/two.html")]);
        assert_eq!(set.get("a.html").unwrap().text(), Some("1"));
    }

    #[test]
    fn read_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let set = FileSet::read(&tmp.path().join("nope"), |_| true).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn read_single_missing_file_names_path() {
        let tmp = TempDir::new().unwrap();
        let missing = tmp.path().join("entry.js");
        let err = FileSet::read_single(&missing).unwrap_err();
        assert!(err.to_string().contains("entry.js"));
    }

    #[test]
    fn write_creates_directories() {
        let tmp = TempDir::new().unwrap();
        let set = FileSet::from(vec![SourceFile::new("deep/er/x.css", "body{}")]);
        let written = set.write_to(tmp.path()).unwrap();
        assert_eq!(written, vec![tmp.path().join("deep/er/x.css")]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("deep/er/x.css")).unwrap(),
            "body{}"
        );
    }

    #[test]
    fn copy_tree_respects_filter() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("src");
        let dst = tmp.path().join("dst");
        touch(&src, "index.html", "i");
        touch(&src, "imgs/a.png", "png");

        let copied = copy_tree(&src, &dst, |p| !p.starts_with("imgs")).unwrap();
        assert_eq!(copied, 1);
        assert!(dst.join("index.html").exists());
        assert!(!dst.join("imgs").exists());
    }
}
