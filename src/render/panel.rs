//! E-ink panel capability

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::frame::{Frame, RefreshMode, PANEL_HEIGHT, PANEL_WIDTH};

/// Panel errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PanelError {
    /// BUSY line never released
    #[error("panel busy")]
    Busy,
    #[error("panel I/O error: {0}")]
    Io(String),
}

/// An electrophoretic panel
pub trait EinkPanel: Send {
    /// Size in pixels (width, height)
    fn size(&self) -> (u16, u16);

    /// Draw `frame` and run the waveform for `mode` over `frame.window`
    fn refresh(&mut self, mode: RefreshMode, frame: &Frame) -> Result<(), PanelError>;

    /// Put the controller into deep sleep
    fn hibernate(&mut self) -> Result<(), PanelError>;
}

#[derive(Debug, Default)]
struct Recording {
    frames: Vec<(RefreshMode, Frame)>,
    failures: usize,
    hibernated: bool,
}

/// Panel that keeps every frame it is given.
///
/// Clones share the recording, so a test can keep one handle while the
/// renderer owns another.
#[derive(Debug, Clone, Default)]
pub struct RecordingPanel {
    inner: Arc<Mutex<Recording>>,
}

impl RecordingPanel {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recording> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Frames refreshed so far
    pub fn frames(&self) -> Vec<(RefreshMode, Frame)> {
        self.lock().frames.clone()
    }

    pub fn last(&self) -> Option<(RefreshMode, Frame)> {
        self.lock().frames.last().cloned()
    }

    pub fn count(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn clear(&self) {
        self.lock().frames.clear();
    }

    /// Make the next `n` refreshes fail with `Busy`
    pub fn fail_next(&self, n: usize) {
        self.lock().failures = n;
    }

    pub fn is_hibernated(&self) -> bool {
        self.lock().hibernated
    }
}

impl EinkPanel for RecordingPanel {
    fn size(&self) -> (u16, u16) {
        (PANEL_WIDTH, PANEL_HEIGHT)
    }

    fn refresh(&mut self, mode: RefreshMode, frame: &Frame) -> Result<(), PanelError> {
        let mut recording = self.lock();
        if recording.failures > 0 {
            recording.failures -= 1;
            return Err(PanelError::Busy);
        }
        recording.hibernated = false;
        recording.frames.push((mode, frame.clone()));
        Ok(())
    }

    fn hibernate(&mut self) -> Result<(), PanelError> {
        self.lock().hibernated = true;
        Ok(())
    }
}
