//! Presentation thread
//!
//! Ticks at `presentation_fps`, takes the newest decoded frame and the current
//! overlay snapshot, composites them and hands the result to the host window.
//! Ticks where nothing visible changed are skipped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{select, Sender};
use parking_lot::Mutex;

use crate::compositor::{CompositedFrame, Compositor};
use crate::error::{PlayerError, Result};
use crate::host::HostWindow;
use crate::overlay::OverlayStore;
use crate::slot::FrameSlot;
use crate::types::{VideoFrame, WindowRegion};

/// Layout inputs the caller thread may change while the presenter runs
#[derive(Debug, Clone, PartialEq)]
pub struct ViewState {
    pub region: WindowRegion,
    pub background: [u8; 3],
    /// Statistics box text, `None` when hidden
    pub stats: Option<Arc<str>>,
    /// Bumped on every change; a new epoch forces the next tick to present
    pub epoch: u64,
}

impl ViewState {
    pub fn new(region: WindowRegion, background: [u8; 3]) -> Self {
        Self {
            region,
            background,
            stats: None,
            epoch: 0,
        }
    }

    pub fn invalidate(&mut self) {
        self.epoch += 1;
    }
}

/// Everything the presentation thread reads
pub struct PresenterInputs {
    pub slot: Arc<FrameSlot>,
    pub overlay: Arc<OverlayStore>,
    pub view: Arc<Mutex<ViewState>>,
    pub host: Arc<dyn HostWindow>,
}

#[derive(Default)]
struct PresenterShared {
    /// Distinct video frames that reached the host
    frames_presented: AtomicU64,
    latest: Mutex<Option<CompositedFrame>>,
}

pub struct Presenter {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
    shared: Arc<PresenterShared>,
}

impl Presenter {
    pub fn start(inputs: PresenterInputs, compositor: Compositor, interval: Duration) -> Result<Self> {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
        let shared = Arc::new(PresenterShared::default());

        let mut worker = PresentWorker {
            inputs,
            compositor,
            shared: Arc::clone(&shared),
            current: None,
            last_presented: None,
        };
        let thread = thread::Builder::new()
            .name("vidview-present".to_string())
            .spawn(move || {
                let ticker = crossbeam_channel::tick(interval);
                loop {
                    select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => worker.tick(),
                    }
                }
            })
            .map_err(|e| {
                PlayerError::CreationFailed(format!("failed to spawn presentation thread: {}", e))
            })?;

        Ok(Self {
            stop: Some(stop_tx),
            thread: Some(thread),
            shared,
        })
    }

    pub fn frames_presented(&self) -> u64 {
        self.shared.frames_presented.load(Ordering::Relaxed)
    }

    /// Most recent composited surface, if any tick has presented yet.
    pub fn latest(&self) -> Option<CompositedFrame> {
        self.shared.latest.lock().clone()
    }

    /// Stop ticking and wait for the thread. No `present` happens after this returns.
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("presentation thread panicked");
            }
        }
    }
}

impl Drop for Presenter {
    fn drop(&mut self) {
        self.stop();
    }
}

/// What was on screen after the last present
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PresentKey {
    frame_sequence: u64,
    overlay_version: u64,
    epoch: u64,
}

struct PresentWorker {
    inputs: PresenterInputs,
    compositor: Compositor,
    shared: Arc<PresenterShared>,
    current: Option<VideoFrame>,
    last_presented: Option<PresentKey>,
}

impl PresentWorker {
    fn tick(&mut self) {
        if let Some(frame) = self.inputs.slot.take() {
            self.current = Some(frame);
        }
        let overlay = self.inputs.overlay.current_snapshot();
        let view = self.inputs.view.lock().clone();

        let key = PresentKey {
            frame_sequence: self.current.as_ref().map_or(0, |f| f.sequence),
            overlay_version: overlay.version,
            epoch: view.epoch,
        };
        if self.last_presented == Some(key) {
            return;
        }

        self.compositor.set_stats(view.stats);
        let composited = self.compositor.compose(
            view.region.pixel_size(),
            view.background,
            self.current.as_ref(),
            &overlay,
        );
        self.inputs.host.present(&composited);

        let new_frame = self
            .last_presented
            .map_or(key.frame_sequence != 0, |last| last.frame_sequence != key.frame_sequence);
        if new_frame {
            self.shared.frames_presented.fetch_add(1, Ordering::Relaxed);
        }
        *self.shared.latest.lock() = Some(composited);
        self.last_presented = Some(key);
    }
}
