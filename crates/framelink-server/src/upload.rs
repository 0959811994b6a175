//! Destinations for uploaded files.
//!
//! The session engine only needs to open a writable sink by name and, if
//! the transfer fails halfway, throw the partial result away. Everything
//! about where the bytes end up lives behind [`UploadStore`].

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;

use tokio::io::AsyncWrite;
use tracing::debug;

/// A boxed future for async trait methods.
///
/// Boxed so that the trait stays object-safe and the handler can hold an
/// `Arc<dyn UploadStore>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Writable sink for one uploaded file.
pub type UploadSink = Box<dyn AsyncWrite + Send + Unpin>;

/// Where uploaded files are written.
pub trait UploadStore: Send + Sync {
    /// Opens a new sink for `name`, replacing anything stored under it.
    fn create<'a>(&'a self, name: &'a [u8]) -> BoxFuture<'a, io::Result<UploadSink>>;

    /// Removes whatever was written for `name` by an aborted transfer.
    fn discard<'a>(&'a self, name: &'a [u8]) -> BoxFuture<'a, io::Result<()>>;
}

/// Stores uploads as plain files in a single directory.
///
/// Names must be a single path component; anything that could escape the
/// directory is rejected with [`io::ErrorKind::InvalidInput`].
#[derive(Debug, Clone)]
pub struct UploadDir {
    root: PathBuf,
}

impl UploadDir {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Maps an uploaded name to its destination path.
    ///
    /// Names are raw bytes and need not be valid UTF-8 on Unix.
    pub fn resolve(&self, name: &[u8]) -> io::Result<PathBuf> {
        if name.is_empty() {
            return Err(invalid_name("file name is empty"));
        }
        if name == b"." || name == b".." {
            return Err(invalid_name("file name refers to a directory"));
        }
        if name.iter().any(|b| matches!(b, b'/' | b'\\' | b'\0')) {
            return Err(invalid_name("file name contains a path separator or NUL"));
        }

        Ok(self.root.join(name_to_os(name)?))
    }
}

#[cfg(unix)]
fn name_to_os(name: &[u8]) -> io::Result<&std::ffi::OsStr> {
    use std::os::unix::ffi::OsStrExt;
    Ok(std::ffi::OsStr::from_bytes(name))
}

#[cfg(not(unix))]
fn name_to_os(name: &[u8]) -> io::Result<&std::ffi::OsStr> {
    std::str::from_utf8(name)
        .map(std::ffi::OsStr::new)
        .map_err(|_| invalid_name("file name is not valid UTF-8"))
}

fn invalid_name(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, message.to_string())
}

impl UploadStore for UploadDir {
    fn create<'a>(&'a self, name: &'a [u8]) -> BoxFuture<'a, io::Result<UploadSink>> {
        Box::pin(async move {
            let path = self.resolve(name)?;
            tokio::fs::create_dir_all(&self.root).await?;
            let file = tokio::fs::File::create(&path).await?;
            debug!(path = %path.display(), "Created upload file");
            Ok(Box::new(file) as UploadSink)
        })
    }

    fn discard<'a>(&'a self, name: &'a [u8]) -> BoxFuture<'a, io::Result<()>> {
        Box::pin(async move {
            let path = self.resolve(name)?;
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    debug!(path = %path.display(), "Removed partial upload");
                    Ok(())
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e),
            }
        })
    }
}
