//! Host window that forwards composited frames to a C callback

use std::os::raw::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

use vidview_core::{CompositedFrame, HostWindow, Result, WindowRegion};

/// Receives tightly packed RGBA8 pixels (`width * height * 4` bytes).
///
/// Called on the session's presentation thread. The pixel pointer is only valid
/// for the duration of the call.
pub type FrameCallback =
    extern "C" fn(user_data: *mut c_void, pixels: *const u8, width: u32, height: u32);

pub struct CallbackHost {
    callback: FrameCallback,
    // Stored as an address so the host stays Send + Sync; never dereferenced here.
    user_data: usize,
    attached: AtomicBool,
}

impl CallbackHost {
    pub fn new(callback: FrameCallback, user_data: *mut c_void) -> Self {
        Self {
            callback,
            user_data: user_data as usize,
            attached: AtomicBool::new(false),
        }
    }
}

impl HostWindow for CallbackHost {
    fn attach(&self, region: &WindowRegion) -> Result<()> {
        tracing::debug!(
            "callback host attached to {:?} at {}x{}",
            region.window,
            region.width,
            region.height
        );
        self.attached.store(true, Ordering::Release);
        Ok(())
    }

    fn present(&self, frame: &CompositedFrame) {
        if !self.attached.load(Ordering::Acquire) {
            return;
        }
        (self.callback)(
            self.user_data as *mut c_void,
            frame.image.as_raw().as_ptr(),
            frame.width(),
            frame.height(),
        );
    }

    fn detach(&self) {
        self.attached.store(false, Ordering::Release);
    }
}
