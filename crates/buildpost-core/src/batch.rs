use std::path::{Path, PathBuf};

use crate::{errors::Error, Result};

/// Ordered set of artifacts to upload.
///
/// Only paths that exist as regular files are kept; order follows the command
/// line.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileBatch {
    files: Vec<PathBuf>,
}

impl FileBatch {
    /// Build a batch from command-line arguments, dropping anything that is not
    /// an existing file.
    pub fn from_args<I, S>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let cwd = std::env::current_dir()?;
        Ok(Self::from_args_in(args, &cwd))
    }

    /// Like [`FileBatch::from_args`] with relative paths resolved against `base`.
    pub fn from_args_in<I, S>(args: I, base: &Path) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<Path>,
    {
        let mut files = Vec::new();
        for arg in args {
            let arg = arg.as_ref();
            let abs = if arg.is_absolute() {
                arg.to_path_buf()
            } else {
                base.join(arg)
            };
            if abs.is_file() {
                files.push(abs);
            } else {
                tracing::debug!(path = %arg.display(), "skipping missing artifact");
            }
        }
        Self { files }
    }

    /// Wrap already-validated paths. Every path must be absolute.
    pub fn from_paths(files: Vec<PathBuf>) -> Result<Self> {
        if let Some(bad) = files.iter().find(|p| !p.is_absolute()) {
            return Err(Error::InvalidPath {
                path: bad.clone(),
                reason: "artifact paths must be absolute".to_string(),
            });
        }
        Ok(Self { files })
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Split into consecutive groups of at most `size` files.
    pub fn chunks(&self, size: usize) -> impl Iterator<Item = &[PathBuf]> {
        self.files.chunks(size.max(1))
    }
}
