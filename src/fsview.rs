//! Symlink-aware filesystem view.
//!
//! Every downstream stage (tar writer, ELF scanner, control builder) walks
//! the staged package tree through this view instead of touching `std::fs`
//! directly, so that symlinks are always treated as symlinks: a regular
//! `Path::metadata` call follows them, which would silently turn a dangling
//! or cross-package symlink into "file not found" or the wrong file's bytes.

use std::fs;
use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// The kind of filesystem object at an entry, without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Regular,
    Directory,
    Symlink,
    Fifo,
    CharDevice,
    BlockDevice,
}

/// One entry in a package tree, relative to the view's root.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Path relative to the view root, using `/` separators.
    pub path: String,
    pub kind: EntryKind,
    pub mode: u32,
    pub size: u64,
}

/// A read-only view over a staged package directory.
#[derive(Debug, Clone)]
pub struct FsView {
    root: PathBuf,
}

impl FsView {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a view-relative path to an absolute filesystem path.
    pub fn resolve(&self, relative: &str) -> PathBuf {
        self.root.join(relative.trim_start_matches('/'))
    }

    /// `lstat` an entry by its view-relative path.
    pub fn stat(&self, relative: &str) -> io::Result<Entry> {
        let abs = self.resolve(relative);
        let meta = fs::symlink_metadata(&abs)?;
        Ok(Entry {
            path: relative.trim_start_matches('/').to_string(),
            kind: kind_of(&meta),
            mode: meta.permissions().mode(),
            size: meta.len(),
        })
    }

    /// Read a symlink's target, relative to `relative`'s own directory.
    pub fn readlink(&self, relative: &str) -> io::Result<PathBuf> {
        fs::read_link(self.resolve(relative))
    }

    /// Open a regular file for reading.
    pub fn open(&self, relative: &str) -> io::Result<fs::File> {
        fs::File::open(self.resolve(relative))
    }

    /// Walk every entry under the view root in deterministic lexicographic
    /// order by relative path. Symlinks are yielded as `EntryKind::Symlink`
    /// and never descended into as directories.
    pub fn walk(&self) -> io::Result<Vec<Entry>> {
        let mut entries = Vec::new();
        for dirent in WalkDir::new(&self.root)
            .follow_links(false)
            .min_depth(1)
            .into_iter()
        {
            let dirent = dirent.map_err(io::Error::from)?;
            let relative = dirent
                .path()
                .strip_prefix(&self.root)
                .expect("walkdir yields paths under its root")
                .to_string_lossy()
                .replace(std::path::MAIN_SEPARATOR, "/");
            let meta = dirent.path().symlink_metadata()?;
            entries.push(Entry {
                path: relative,
                kind: kind_of(&meta),
                mode: meta.permissions().mode(),
                size: meta.len(),
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Sum of `Info.Size()` (the raw `stat(2)` byte size) over every entry,
    /// including directories and symlinks, the same quantity `.PKGINFO`'s
    /// `size` field records.
    pub fn installed_size(&self) -> io::Result<u64> {
        let mut total = 0u64;
        for entry in self.walk()? {
            total += entry.size;
        }
        Ok(total)
    }
}

fn kind_of(meta: &fs::Metadata) -> EntryKind {
    let ft = meta.file_type();
    if ft.is_symlink() {
        EntryKind::Symlink
    } else if ft.is_dir() {
        EntryKind::Directory
    } else if ft.is_fifo() {
        EntryKind::Fifo
    } else if ft.is_char_device() {
        EntryKind::CharDevice
    } else if ft.is_block_device() {
        EntryKind::BlockDevice
    } else {
        EntryKind::Regular
    }
}
