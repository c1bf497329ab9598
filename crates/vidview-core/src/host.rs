//! Host window boundary
//!
//! The core never touches a native window. It hands every composited surface to a
//! [`HostWindow`], which owns whatever platform work is needed to show it.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::compositor::CompositedFrame;
use crate::error::Result;
use crate::types::WindowRegion;

/// A window region able to display composited frames.
///
/// `present` is called from the session's presentation thread only; `attach` and
/// `detach` from the caller's thread.
pub trait HostWindow: Send + Sync {
    /// Bind to the region. Failing here fails session creation.
    fn attach(&self, region: &WindowRegion) -> Result<()>;

    fn present(&self, frame: &CompositedFrame);

    /// Unbind. No `present` call follows.
    fn detach(&self) {}
}

#[derive(Default)]
struct FrameBufferState {
    region: Option<WindowRegion>,
    latest: Option<CompositedFrame>,
    presents: u64,
    attached: bool,
}

/// Host that keeps the most recent composited frame in memory
#[derive(Default)]
pub struct FrameBufferHost {
    state: Mutex<FrameBufferState>,
}

impl FrameBufferHost {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn latest(&self) -> Option<CompositedFrame> {
        self.state.lock().latest.clone()
    }

    pub fn present_count(&self) -> u64 {
        self.state.lock().presents
    }

    pub fn is_attached(&self) -> bool {
        self.state.lock().attached
    }

    pub fn region(&self) -> Option<WindowRegion> {
        self.state.lock().region
    }
}

impl HostWindow for FrameBufferHost {
    fn attach(&self, region: &WindowRegion) -> Result<()> {
        let mut state = self.state.lock();
        state.region = Some(*region);
        state.attached = true;
        Ok(())
    }

    fn present(&self, frame: &CompositedFrame) {
        let mut state = self.state.lock();
        if !state.attached {
            return;
        }
        state.latest = Some(frame.clone());
        state.presents += 1;
    }

    fn detach(&self) {
        self.state.lock().attached = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compositor::Placement;
    use image::RgbaImage;

    fn composited() -> CompositedFrame {
        CompositedFrame {
            image: Arc::new(RgbaImage::new(2, 2)),
            placement: Placement::full((2, 2)),
            frame_sequence: 1,
            overlay_version: 0,
        }
    }

    #[test]
    fn test_frame_buffer_ignores_presents_after_detach() {
        let host = FrameBufferHost::new();
        let region = WindowRegion::new(0x10, 0.0, 0.0, 2.0, 2.0).unwrap();
        host.attach(&region).unwrap();
        host.present(&composited());
        assert_eq!(host.present_count(), 1);

        host.detach();
        host.present(&composited());
        assert_eq!(host.present_count(), 1);
        assert!(!host.is_attached());
        assert_eq!(host.region(), Some(region));
    }
}
