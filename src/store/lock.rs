//! Exclusive ownership of a memx root.
//!
//! Every engine keeps whole-file state (`registry.json`, `graph.json`) and the
//! next interaction id in memory, so only one engine may own a root at a time.
//! The lock is an advisory `flock` on `<root>/LOCK`, released when the file
//! handle closes, including on process exit.

use std::fs::{File, OpenOptions};
use std::io::Write;

use fs2::FileExt;

use super::layout::StoreLayout;
use crate::types::{MemxError, MemxResult};

/// Held for the lifetime of an engine.
#[derive(Debug)]
pub struct RootLock {
    _file: File,
}

impl RootLock {
    /// Take the root lock without waiting. Another holder, in this process or
    /// another, yields `ConcurrencyConflict`.
    pub fn acquire(layout: &StoreLayout) -> MemxResult<Self> {
        let path = layout.lock_path();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = file.try_lock_exclusive() {
            let contended = e.kind() == std::io::ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error();
            if contended {
                return Err(MemxError::ConcurrencyConflict(format!(
                    "memory root {} is already open in another engine",
                    layout.root().display()
                )));
            }
            return Err(e.into());
        }

        // Holder pid, for whoever finds the root busy.
        file.set_len(0)?;
        writeln!(file, "{}", std::process::id())?;
        log::debug!("Acquired root lock {}", path.display());
        Ok(Self { _file: file })
    }
}
