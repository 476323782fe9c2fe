use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::path::PathBuf;

#[derive(thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] hashfs_core::Error),

    #[error("{context}{}", path.as_ref().map(|p| format!(": {}", p.display())).unwrap_or_default())]
    Io {
        source: io::Error,
        path: Option<PathBuf>,
        context: &'static str,
    },

    #[error("No entry for {path:?}")]
    NotFound { path: String },

    #[error("{path:?} is not a directory")]
    NotADirectory { path: String },

    #[error("Invalid component {component:?} in {path:?}")]
    UnsafePath { path: String, component: PathBuf },
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{self}")?;

        let mut source = self.source();
        while let Some(err) = source {
            writeln!(f, "\tCaused by: {err}")?;
            source = err.source();
        }

        Ok(())
    }
}

/// Builds a closure mapping an [`io::Error`] to [`Error::Io`], with an
/// optional path for context
#[macro_export]
macro_rules! wrap_io_err {
    ($context:expr) => {
        |source| $crate::Error::Io {
            source,
            path: None,
            context: $context,
        }
    };
    ($path:expr, $context:expr) => {
        |source| $crate::Error::Io {
            source,
            path: Some(::std::path::Path::new(&$path).to_path_buf()),
            context: $context,
        }
    };
}
