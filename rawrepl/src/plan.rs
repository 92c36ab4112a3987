//! Upload plans: which remote directories to create and which files to
//! write, built from a local tree or by hand.

use std::collections::{HashMap, HashSet};
use std::io;
use std::path::{Component, Path};

use walkdir::WalkDir;

use crate::error::Result;

/// Remote directories in creation order. Every ancestor precedes its
/// children and no path appears twice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectoryPlan {
    /// Creation order.
    paths: Vec<String>,
    /// Dedup set over `paths`.
    seen: HashSet<String>,
}

impl DirectoryPlan {
    /// Empty plan.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `path` after any of its ancestors not yet planned.
    pub fn push(&mut self, path: &str) {
        let absolute = path.starts_with('/');
        if absolute {
            self.insert("/");
        }
        let mut prefix = String::new();
        for part in path.split('/').filter(|p| !p.is_empty() && *p != ".") {
            if absolute || !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(part);
            self.insert(&prefix);
        }
    }

    /// Appends `path` unless already planned.
    fn insert(&mut self, path: &str) {
        if self.seen.insert(path.to_owned()) {
            self.paths.push(path.to_owned());
        }
    }

    /// Planned paths, parents first.
    pub fn paths(&self) -> &[String] {
        &self.paths
    }

    /// Number of planned directories.
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    /// `true` if nothing is planned.
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

/// Remote path to file contents, kept in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileManifest {
    /// `(remote path, contents)` in insertion order.
    entries: Vec<(String, Vec<u8>)>,
    /// Position of each path in `entries`.
    index: HashMap<String, usize>,
}

impl FileManifest {
    /// Empty manifest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a file. An existing entry for `path` is replaced in place and
    /// its old contents returned.
    pub fn insert(&mut self, path: impl Into<String>, data: Vec<u8>) -> Option<Vec<u8>> {
        let path = path.into();
        if let Some(&i) = self.index.get(&path) {
            return Some(std::mem::replace(&mut self.entries[i].1, data));
        }
        self.index.insert(path.clone(), self.entries.len());
        self.entries.push((path, data));
        None
    }

    /// Contents planned for `path`.
    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.index.get(path).map(|&i| self.entries[i].1.as_slice())
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = (&str, &[u8])> {
        self.entries.iter().map(|(p, d)| (p.as_str(), d.as_slice()))
    }

    /// Number of files.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if there are no files.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of all file sizes.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|(_, d)| d.len()).sum()
    }
}

impl<P: Into<String>> FromIterator<(P, Vec<u8>)> for FileManifest {
    fn from_iter<I: IntoIterator<Item = (P, Vec<u8>)>>(iter: I) -> Self {
        let mut manifest = Self::new();
        for (path, data) in iter {
            manifest.insert(path, data);
        }
        manifest
    }
}

/// Everything needed to mirror a local tree onto a board.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct UploadPlan {
    /// Directories to ensure before uploading.
    pub directories: DirectoryPlan,
    /// Files to write.
    pub files: FileManifest,
}

impl UploadPlan {
    /// Plans an upload of every file under `local_root` to `remote_root`.
    ///
    /// Entries are visited in file-name order. Only directories that
    /// contain files are planned; `remote_root` always comes first.
    pub fn from_dir(local_root: impl AsRef<Path>, remote_root: &str) -> Result<Self> {
        let local_root = local_root.as_ref();
        let remote_root = remote_root.trim_end_matches('/');
        let mut plan = Self::default();
        plan.directories
            .push(if remote_root.is_empty() { "/" } else { remote_root });

        for entry in WalkDir::new(local_root).sort_by_file_name() {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(local_root)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
            let remote = remote_path(remote_root, relative)?;
            if let Some((dir, _)) = remote.rsplit_once('/')
                && !dir.is_empty()
            {
                plan.directories.push(dir);
            }
            let data = std::fs::read(entry.path())?;
            tracing::trace!(local = %entry.path().display(), %remote, bytes = data.len(), "planned");
            plan.files.insert(remote, data);
        }

        tracing::debug!(
            directories = plan.directories.len(),
            files = plan.files.len(),
            bytes = plan.files.total_bytes(),
            "upload planned"
        );
        Ok(plan)
    }
}

/// Joins a local relative path onto `remote_root` with `/` separators.
fn remote_path(remote_root: &str, relative: &Path) -> Result<String> {
    let mut remote = remote_root.to_owned();
    for component in relative.components() {
        let Component::Normal(part) = component else {
            continue;
        };
        let part = part.to_str().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("non UTF-8 file name: {}", relative.display()),
            )
        })?;
        remote.push('/');
        remote.push_str(part);
    }
    Ok(remote)
}
