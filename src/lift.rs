//! The machine-code lifter interface.
//!
//! Lifting raw bytes into a circuit is delegated to an external
//! semantics provider; this crate only defines the seam. A [`Lifter`]
//! must produce a circuit satisfying the IR invariants (a single root,
//! coherent user lists, one length-delimiting decode condition per
//! context).

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::ir::Circuit;

/// Errors a lifter can surface.
#[derive(Debug, Error)]
pub enum LiftError {
    /// No lifter implementation is wired into this build.
    #[error("no machine-code lifter is available in this build")]
    Unavailable,
    /// The architecture tag is not supported by the lifter.
    #[error("unsupported architecture {0}")]
    UnsupportedArch(String),
    /// The OS tag is not supported by the lifter.
    #[error("unsupported os {0}")]
    UnsupportedOs(String),
    /// The binary could not be read.
    #[error("reading {path}: {source}")]
    Io {
        /// The path that failed.
        path: PathBuf,
        /// The underlying error.
        source: std::io::Error,
    },
    /// The lifter rejected the input bytes.
    #[error("lifter rejected input: {0}")]
    Rejected(String),
}

/// Lifts a file of machine-code instructions into a [`Circuit`].
pub trait Lifter {
    /// Lifts `binary` for the given architecture and OS tags.
    fn lift(&self, arch: &str, os: &str, binary: &Path) -> Result<Circuit, LiftError>;
}
