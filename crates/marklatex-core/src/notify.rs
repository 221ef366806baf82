//! Status notifications
//!
//! Non-fatal outcomes such as saves, failed saves and exports are reported
//! through a [`Notifier`] handed to the session rather than raised as
//! errors.

use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    Saved(PathBuf),
    SaveFailed { path: PathBuf, error: String },
    /// An unreadable sidecar was renamed to `backup` instead of overwritten.
    SetAside { path: PathBuf, backup: PathBuf },
    Undone,
    Exported(PathBuf),
    ExportFailed { path: PathBuf, error: String },
}

pub trait Notifier {
    fn notify(&self, notice: Notice);
}

/// Forwards notices to the `tracing` log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, notice: Notice) {
        match notice {
            Notice::Saved(path) => tracing::debug!("Saved {}", path.display()),
            Notice::SaveFailed { path, error } => {
                tracing::warn!("Could not save {}: {}", path.display(), error)
            }
            Notice::SetAside { path, backup } => {
                tracing::warn!("Moved unreadable {} to {}", path.display(), backup.display())
            }
            Notice::Undone => tracing::info!("Undo applied"),
            Notice::Exported(path) => tracing::info!("Exported {}", path.display()),
            Notice::ExportFailed { path, error } => {
                tracing::warn!("Export to {} failed: {}", path.display(), error)
            }
        }
    }
}

/// Keeps every notice in memory. Useful for callers that render their own
/// status line, and for tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    notices: std::sync::Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.notices
            .lock()
            .map(|n| n.clone())
            .unwrap_or_default()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        if let Ok(mut notices) = self.notices.lock() {
            notices.push(notice);
        }
    }
}

impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    fn notify(&self, notice: Notice) {
        (**self).notify(notice)
    }
}
