use std::io;
use std::path::Path;
use std::pin::pin;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWriteExt};

use crate::path::RelativePath;
use crate::root::{Entry, EntryKind, Root, is_symlink_refusal};

/// Async front of the rooted directory. Cheap to clone; all clones share one
/// [`Root`].
#[derive(Clone, Debug)]
pub struct Storage {
    root: Arc<Root>,
}

impl Storage {
    pub fn open(dir: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self {
            root: Arc::new(Root::open(dir)?),
        })
    }

    pub fn root_path(&self) -> &Path {
        self.root.path()
    }

    /// Cleans a request path into a file path below the root.
    pub fn normalize(raw: &str) -> Result<RelativePath, StorageError> {
        RelativePath::file_path(raw).ok_or(StorageError::InvalidPath)
    }

    pub async fn stat(&self, path: &RelativePath) -> Result<EntryKind, StorageError> {
        let path = path.clone();
        self.blocking(move |root| root.metadata(&path)).await
    }

    pub async fn list_dir(&self, path: &RelativePath) -> Result<Vec<Entry>, StorageError> {
        let path = path.clone();
        let mut entries = self.blocking(move |root| root.list(&path)).await?;
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    /// Creates (or truncates) `path` and streams `content` into it. Returns
    /// the number of bytes written.
    pub async fn create_file<R>(&self, path: &RelativePath, content: R) -> Result<u64, StorageError>
    where
        R: AsyncRead,
    {
        let target = path.clone();
        let file = self.blocking(move |root| root.create(&target)).await?;
        let mut file = tokio::fs::File::from_std(file);
        let mut content = pin!(content);
        let written = tokio::io::copy(&mut content, &mut file).await?;
        file.flush().await?;
        Ok(written)
    }

    pub async fn delete_path(&self, path: &RelativePath) -> Result<(), StorageError> {
        let path = path.clone();
        self.blocking(move |root| root.remove(&path)).await
    }

    /// Releases the root. Fails if other clones are still alive.
    pub fn close(self) -> io::Result<()> {
        match Arc::try_unwrap(self.root) {
            Ok(root) => root.close(),
            Err(_) => Err(io::Error::other("root directory is still in use")),
        }
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T, StorageError>
    where
        F: FnOnce(&Root) -> io::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let root = Arc::clone(&self.root);
        let result = tokio::task::spawn_blocking(move || op(&root))
            .await
            .map_err(io::Error::other)?;
        Ok(result?)
    }
}

#[derive(Debug)]
pub enum StorageError {
    InvalidPath,
    Io(io::Error),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::Io(err) if err.kind() == io::ErrorKind::NotFound)
    }
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        if is_symlink_refusal(&err) {
            return StorageError::InvalidPath;
        }
        StorageError::Io(err)
    }
}
