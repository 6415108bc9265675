// The layout application the control server drives.
//
// Everything the server needs from the application goes through
// `LayoutHost`; how a layout file is actually read or written is up to the
// implementation.

pub mod geometry;
pub mod memory;

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::sync::mpsc;

use self::geometry::{fingerprint_selection, SelectedShape};

pub use self::memory::MemoryHost;

/// Cellview slots a host accepts; valid indices are `0..MAX_CELLVIEWS`.
pub const MAX_CELLVIEWS: usize = 256;

/// Receives one message per native "selection changed" notification.
pub type SelectionSignal = mpsc::UnboundedReceiver<()>;

#[derive(Debug, Error)]
pub enum HostError {
    #[error("No main window (GUI required)")]
    NoMainWindow,

    #[error("No active view")]
    NoView,

    #[error("No active cellview")]
    NoDocument,

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Directory not found: {}", .0.display())]
    DirectoryNotFound(PathBuf),

    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid layout data: {0}")]
    Format(String),

    #[error("cellview_index {0} is out of range (0..{MAX_CELLVIEWS})")]
    CellviewOutOfRange(usize),
}

impl HostError {
    /// Whether the error means a referenced resource does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::NoMainWindow
                | Self::NoView
                | Self::NoDocument
                | Self::FileNotFound(_)
                | Self::DirectoryNotFound(_)
        )
    }
}

/// Capability interface over the running layout application.
///
/// Calls are made from a single task, one at a time.
pub trait LayoutHost: Send + 'static {
    /// Open `path` into cellview slot `cellview_index` and make it active.
    /// Returns the cell names of the opened layout.
    fn open_layout(&mut self, path: &Path, cellview_index: usize) -> Result<Vec<String>, HostError>;

    /// Read `path` into the active layout. Returns the merged cell names.
    fn load_layout(&mut self, path: &Path) -> Result<Vec<String>, HostError>;

    /// Cell names of the active layout, in application order.
    fn cell_names(&self) -> Result<Vec<String>, HostError>;

    /// Write the active layout to `path`.
    fn export_layout(&self, path: &Path) -> Result<(), HostError>;

    /// The current object selection of the active view.
    fn current_selection(&self) -> Result<Vec<SelectedShape>, HostError>;

    /// Hook into the application's native selection-changed notification.
    /// Hosts without one return `None` and are polled instead.
    fn bind_selection_signal(&mut self) -> Option<SelectionSignal> {
        None
    }

    /// Release a hook handed out by `bind_selection_signal`.
    fn unbind_selection_signal(&mut self) {}
}

/// Fingerprint of the current selection; `None` when nothing usable is
/// selected or the selection cannot be read.
pub fn selection_fingerprint<H: LayoutHost + ?Sized>(host: &H) -> Option<String> {
    match host.current_selection() {
        Ok(selection) => fingerprint_selection(&selection),
        Err(error) => {
            tracing::trace!(%error, "selection unavailable");
            None
        }
    }
}
