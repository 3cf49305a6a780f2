//! Directory capability.
//!
//! [`Root`] owns an open descriptor for the served directory. Every lookup
//! walks the cleaned path one segment at a time with `openat`, starting from
//! that descriptor and refusing to follow symbolic links, so no operation can
//! reach a file outside the directory even if the tree changes underneath.

use rustix::fs::{
    AtFlags, Dir, FileType, Mode, OFlags, fsync, mkdirat, open, openat, statat, unlinkat,
};
use rustix::io::Errno;
use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::path::{Path, PathBuf};

use crate::path::RelativePath;

const DIR_FLAGS: OFlags = OFlags::RDONLY
    .union(OFlags::DIRECTORY)
    .union(OFlags::NOFOLLOW)
    .union(OFlags::CLOEXEC);
const CREATE_FLAGS: OFlags = OFlags::WRONLY
    .union(OFlags::CREATE)
    .union(OFlags::TRUNC)
    .union(OFlags::NOFOLLOW)
    .union(OFlags::CLOEXEC);
const DIR_MODE: u32 = 0o755;
const FILE_MODE: u32 = 0o666;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

#[derive(Debug)]
pub struct Root {
    dir: OwnedFd,
    path: PathBuf,
}

impl Root {
    /// Opens `path` as the root. Fails unless it is an existing directory.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let dir = open(
            path,
            OFlags::RDONLY | OFlags::DIRECTORY | OFlags::CLOEXEC,
            Mode::empty(),
        )?;
        Ok(Self {
            dir,
            path: path.to_path_buf(),
        })
    }

    /// Path the root was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self, path: &RelativePath) -> io::Result<EntryKind> {
        let Some((parents, name)) = path.split_last() else {
            return Ok(EntryKind::Directory);
        };
        let parent = self.open_dir(parents)?;
        kind_at(&parent, name)
    }

    /// Lists a directory. Symbolic links are left out.
    pub fn list(&self, path: &RelativePath) -> io::Result<Vec<Entry>> {
        let dir_fd = self.open_dir(path.segments())?;
        let mut dir = Dir::read_from(&dir_fd)?;
        let mut entries = Vec::new();
        while let Some(entry) = dir.read() {
            let entry = entry?;
            let raw_name = entry.file_name();
            let name = raw_name.to_string_lossy().into_owned();
            if name == "." || name == ".." {
                continue;
            }
            let file_type = match entry.file_type() {
                FileType::Unknown => {
                    let stat = statat(&dir_fd, raw_name, AtFlags::SYMLINK_NOFOLLOW)?;
                    FileType::from_raw_mode(stat.st_mode)
                }
                known => known,
            };
            let kind = match file_type {
                FileType::Directory => EntryKind::Directory,
                FileType::Symlink => continue,
                _ => EntryKind::File,
            };
            entries.push(Entry { name, kind });
        }
        Ok(entries)
    }

    /// Creates or truncates a file, creating missing parent directories.
    pub fn create(&self, path: &RelativePath) -> io::Result<File> {
        let (parents, name) = path.split_last().ok_or_else(root_is_not_a_file)?;
        let parent = self.make_dirs(parents)?;
        let fd = openat(&parent, name, CREATE_FLAGS, Mode::from_raw_mode(FILE_MODE))?;
        Ok(File::from(fd))
    }

    /// Removes a file or an empty directory.
    pub fn remove(&self, path: &RelativePath) -> io::Result<()> {
        let (parents, name) = path.split_last().ok_or_else(root_is_not_a_file)?;
        let parent = self.open_dir(parents)?;
        let flags = match kind_at(&parent, name)? {
            EntryKind::Directory => AtFlags::REMOVEDIR,
            EntryKind::File => AtFlags::empty(),
        };
        unlinkat(&parent, name, flags)?;
        Ok(())
    }

    /// Flushes directory metadata and releases the descriptor.
    pub fn close(self) -> io::Result<()> {
        fsync(&self.dir)?;
        Ok(())
    }

    fn open_dir(&self, segments: &[String]) -> io::Result<OwnedFd> {
        let mut current = openat(&self.dir, ".", DIR_FLAGS, Mode::empty())?;
        for segment in segments {
            current = openat(&current, segment.as_str(), DIR_FLAGS, Mode::empty())?;
        }
        Ok(current)
    }

    fn make_dirs(&self, segments: &[String]) -> io::Result<OwnedFd> {
        let mut current = openat(&self.dir, ".", DIR_FLAGS, Mode::empty())?;
        for segment in segments {
            let segment = segment.as_str();
            current = match openat(&current, segment, DIR_FLAGS, Mode::empty()) {
                Ok(fd) => fd,
                Err(err) if err == Errno::NOENT => {
                    // Another request may create the same directory first.
                    match mkdirat(&current, segment, Mode::from_raw_mode(DIR_MODE)) {
                        Ok(()) => {}
                        Err(err) if err == Errno::EXIST => {}
                        Err(err) => return Err(err.into()),
                    }
                    openat(&current, segment, DIR_FLAGS, Mode::empty())?
                }
                Err(err) => return Err(err.into()),
            };
        }
        Ok(current)
    }
}

fn kind_at(parent: &OwnedFd, name: &str) -> io::Result<EntryKind> {
    let stat = statat(parent, name, AtFlags::SYMLINK_NOFOLLOW)?;
    match FileType::from_raw_mode(stat.st_mode) {
        FileType::Directory => Ok(EntryKind::Directory),
        FileType::Symlink => Err(Errno::LOOP.into()),
        _ => Ok(EntryKind::File),
    }
}

fn root_is_not_a_file() -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, "path refers to the root directory")
}

/// Whether an error came from refusing to follow a symbolic link.
pub fn is_symlink_refusal(err: &io::Error) -> bool {
    err.raw_os_error() == Some(Errno::LOOP.raw_os_error())
}
