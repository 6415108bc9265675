// In-process layout application used by the standalone daemon and tests.
//
// Layout files are JSON snapshots (`{"cells": [...], "shapes": [...]}`),
// the same format `export_layout` writes. Any other file opens as a
// document whose single cell is named after the file stem.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::geometry::{LayerInfo, SelectedShape, ShapeGeometry};
use super::{HostError, LayoutHost, SelectionSignal, MAX_CELLVIEWS};

/// A shape stored in a layout document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacedShape {
    pub cell: String,
    pub layer: LayerInfo,
    pub geometry: ShapeGeometry,
}

/// Contents of one cellview.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutDocument {
    #[serde(default)]
    pub cells: Vec<String>,
    #[serde(default)]
    pub shapes: Vec<PlacedShape>,
}

impl LayoutDocument {
    pub fn with_cells<I, S>(cells: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { cells: cells.into_iter().map(Into::into).collect(), shapes: Vec::new() }
    }

    fn read(path: &Path) -> Result<Self, HostError> {
        let bytes = fs::read(path).map_err(|source| HostError::Io { path: path.to_path_buf(), source })?;
        if let Ok(document) = serde_json::from_slice::<Self>(&bytes) {
            return Ok(document);
        }
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| HostError::Format(format!("cannot name a cell after {}", path.display())))?;
        Ok(Self::with_cells([stem]))
    }

    fn merge(&mut self, other: Self) {
        self.cells.extend(other.cells);
        self.shapes.extend(other.shapes);
    }
}

#[derive(Debug, Default)]
struct View {
    cellviews: Vec<Option<LayoutDocument>>,
    active: usize,
    selection: Vec<SelectedShape>,
}

impl View {
    fn active_document(&self) -> Option<&LayoutDocument> {
        self.cellviews.get(self.active).and_then(Option::as_ref)
    }

    fn active_document_mut(&mut self) -> Option<&mut LayoutDocument> {
        self.cellviews.get_mut(self.active).and_then(Option::as_mut)
    }
}

#[derive(Debug)]
struct MemoryState {
    has_main_window: bool,
    view: Option<View>,
    signal: Option<mpsc::UnboundedSender<()>>,
}

/// Cloneable handle to an in-memory layout application. Clones share state,
/// so a test can keep one handle while the server owns another.
#[derive(Debug, Clone)]
pub struct MemoryHost {
    inner: Arc<Mutex<MemoryState>>,
}

impl Default for MemoryHost {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryHost {
    /// An application with a main window but no open view.
    pub fn new() -> Self {
        Self::from_state(MemoryState { has_main_window: true, view: None, signal: None })
    }

    /// An application running without a GUI.
    pub fn headless() -> Self {
        Self::from_state(MemoryState { has_main_window: false, view: None, signal: None })
    }

    /// An application with `document` open in cellview 0.
    pub fn with_document(document: LayoutDocument) -> Self {
        let host = Self::new();
        host.state().view =
            Some(View { cellviews: vec![Some(document)], active: 0, selection: Vec::new() });
        host
    }

    fn from_state(state: MemoryState) -> Self {
        Self { inner: Arc::new(Mutex::new(state)) }
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the object selection and fire the native notification.
    pub fn set_selection(&self, selection: Vec<SelectedShape>) {
        let mut state = self.state();
        if let Some(view) = state.view.as_mut() {
            view.selection = selection;
        }
        if let Some(signal) = &state.signal {
            let _ = signal.send(());
        }
    }

    /// Close the view, as if the user closed the layout window.
    pub fn close_view(&self) {
        let mut state = self.state();
        state.view = None;
        if let Some(signal) = &state.signal {
            let _ = signal.send(());
        }
    }

    /// Snapshot of the active document.
    pub fn active_document(&self) -> Option<LayoutDocument> {
        self.state().view.as_ref().and_then(View::active_document).cloned()
    }

    pub fn is_signal_bound(&self) -> bool {
        self.state().signal.is_some()
    }
}

impl LayoutHost for MemoryHost {
    fn open_layout(&mut self, path: &Path, cellview_index: usize) -> Result<Vec<String>, HostError> {
        let document = LayoutDocument::read(path)?;
        let cells = document.cells.clone();

        let mut state = self.state();
        if !state.has_main_window {
            return Err(HostError::NoMainWindow);
        }
        let slots = cellview_index
            .checked_add(1)
            .filter(|&slots| slots <= MAX_CELLVIEWS)
            .ok_or(HostError::CellviewOutOfRange(cellview_index))?;
        let view = state.view.get_or_insert_with(View::default);
        if view.cellviews.len() < slots {
            view.cellviews.resize_with(slots, || None);
        }
        view.cellviews[cellview_index] = Some(document);
        view.active = cellview_index;
        view.selection.clear();

        debug!(path = %path.display(), cellview_index, "opened layout");
        Ok(cells)
    }

    fn load_layout(&mut self, path: &Path) -> Result<Vec<String>, HostError> {
        let incoming = LayoutDocument::read(path)?;
        let mut state = self.state();
        let view = state.view.as_mut().ok_or(HostError::NoView)?;
        let document = view.active_document_mut().ok_or(HostError::NoDocument)?;
        document.merge(incoming);
        Ok(document.cells.clone())
    }

    fn cell_names(&self) -> Result<Vec<String>, HostError> {
        let state = self.state();
        let view = state.view.as_ref().ok_or(HostError::NoView)?;
        let document = view.active_document().ok_or(HostError::NoDocument)?;
        Ok(document.cells.clone())
    }

    fn export_layout(&self, path: &Path) -> Result<(), HostError> {
        let document = {
            let state = self.state();
            let view = state.view.as_ref().ok_or(HostError::NoView)?;
            view.active_document().ok_or(HostError::NoDocument)?.clone()
        };

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        if !parent.is_dir() {
            return Err(HostError::DirectoryNotFound(parent));
        }

        let encoded = serde_json::to_vec_pretty(&document)
            .map_err(|error| HostError::Format(error.to_string()))?;
        write_atomically(path, &parent, &encoded)
    }

    fn current_selection(&self) -> Result<Vec<SelectedShape>, HostError> {
        let state = self.state();
        let view = state.view.as_ref().ok_or(HostError::NoView)?;
        if view.active_document().is_none() {
            return Ok(Vec::new());
        }
        Ok(view.selection.clone())
    }

    fn bind_selection_signal(&mut self) -> Option<SelectionSignal> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state().signal = Some(tx);
        Some(rx)
    }

    fn unbind_selection_signal(&mut self) {
        self.state().signal = None;
    }
}

/// Write through a temporary sibling and rename, so readers never see a
/// half-written file.
fn write_atomically(path: &Path, dir: &Path, contents: &[u8]) -> Result<(), HostError> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| HostError::Format(format!("invalid export path {}", path.display())))?;
    let temp_path = dir.join(format!(".{file_name}.{}.tmp", std::process::id()));
    let io_error = |source| HostError::Io { path: path.to_path_buf(), source };

    let result = fs::File::create(&temp_path)
        .and_then(|mut file| {
            file.write_all(contents)?;
            file.sync_all()
        })
        .and_then(|()| fs::rename(&temp_path, path));

    if let Err(source) = result {
        let _ = fs::remove_file(&temp_path);
        return Err(io_error(source));
    }
    Ok(())
}
