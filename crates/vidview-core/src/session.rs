//! Player session
//!
//! A session binds one window region to one playback pipeline: a decode thread
//! (`FrameSource`), an overlay store and a presentation thread. It owns the
//! playback state machine:
//!
//! ```text
//! Idle ──play──▶ (opening) ──opened──▶ Playing ◀──resume── Paused
//!                                        │  └────pause────▶  │
//!                                        └──stop / eos──▶ Stopped
//! any ──release──▶ Released
//! ```
//!
//! While a source is opening the state keeps its previous value, except that
//! replacing a playing or paused source moves to Stopped first. Pause, resume
//! and stop outside their valid states are no-ops.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Weak};

use chrono::{DateTime, Utc};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::compositor::{CompositedFrame, Compositor};
use crate::config::PlayerConfig;
use crate::engine::DecodeEngine;
use crate::error::{PlayerError, Result};
use crate::host::HostWindow;
use crate::overlay::{OverlaySnapshot, OverlayStore};
use crate::presenter::{Presenter, PresenterInputs, ViewState};
use crate::slot::FrameSlot;
use crate::source::{FrameSource, SourceCounters, SourceEvent};
use crate::types::{
    Color, MediaSource, PlaybackState, PlaybackStats, PlayerEvent, Rect, VideoFrame,
    WindowRegion,
};

struct SessionCore {
    state: PlaybackState,
    /// Bumped whenever the current source is replaced or torn down; events from
    /// older decode threads are ignored.
    generation: u64,
    opening: bool,
    source: Option<FrameSource>,
    source_name: Option<String>,
    counters: Option<Arc<SourceCounters>>,
    started_at: Option<DateTime<Utc>>,
    last_error: Option<PlayerError>,
    subscribers: Vec<Sender<PlayerEvent>>,
}

impl SessionCore {
    fn emit(&mut self, event: PlayerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn transition(&mut self, to: PlaybackState) {
        let from = self.state;
        if from == to {
            return;
        }
        self.state = to;
        tracing::debug!("state {} -> {}", from, to);
        self.emit(PlayerEvent::StateChanged { from, to });
    }

    fn fail(&mut self, err: PlayerError) {
        let source = self.source_name.clone().unwrap_or_default();
        self.emit(PlayerEvent::SourceUnavailable {
            source,
            reason: err.to_string(),
        });
        self.last_error = Some(err);
    }

    /// Detach the current source for the caller to stop outside the lock.
    fn take_source(&mut self) -> Option<FrameSource> {
        self.generation += 1;
        self.opening = false;
        self.source.take()
    }
}

struct Shared {
    handle: u64,
    core: Mutex<SessionCore>,
}

impl Shared {
    fn on_source_event(&self, generation: u64, event: SourceEvent) {
        let mut core = self.core.lock();
        if core.generation != generation || core.state == PlaybackState::Released {
            return;
        }
        let source = core.source_name.clone().unwrap_or_default();

        match event {
            SourceEvent::Opened { width, height } => {
                core.opening = false;
                core.started_at = Some(Utc::now());
                tracing::info!(
                    "player {} opened {} ({}x{})",
                    self.handle,
                    source,
                    width,
                    height
                );
                core.emit(PlayerEvent::Opened {
                    source,
                    width,
                    height,
                });
                core.transition(PlaybackState::Playing);
            }
            SourceEvent::Failed(err) => {
                tracing::warn!("player {}: {}", self.handle, err);
                if core.opening {
                    core.opening = false;
                } else if matches!(core.state, PlaybackState::Playing | PlaybackState::Paused) {
                    core.transition(PlaybackState::Stopped);
                }
                core.fail(err);
            }
            SourceEvent::EndOfStream => {
                if matches!(core.state, PlaybackState::Playing | PlaybackState::Paused) {
                    core.transition(PlaybackState::Stopped);
                }
                core.emit(PlayerEvent::EndOfStream { source });
            }
        }
    }
}

/// One playback session bound to a window region
pub struct PlayerSession {
    shared: Arc<Shared>,
    /// Serializes play/stop/release, which join threads
    control: Mutex<()>,
    config: PlayerConfig,
    engine: Arc<dyn DecodeEngine>,
    host: Arc<dyn HostWindow>,
    slot: Arc<FrameSlot>,
    overlay: Arc<OverlayStore>,
    view: Arc<Mutex<ViewState>>,
    presenter: Mutex<Option<Presenter>>,
}

impl PlayerSession {
    /// Validate the region, attach the host and start the presentation thread.
    pub fn create(
        handle: u64,
        region: WindowRegion,
        engine: Arc<dyn DecodeEngine>,
        host: Arc<dyn HostWindow>,
        config: PlayerConfig,
    ) -> Result<Self> {
        region.validate()?;
        reserve_surface(&region)?;
        config
            .validate()
            .map_err(|e| PlayerError::CreationFailed(e.to_string()))?;
        host.attach(&region).map_err(|e| match e {
            PlayerError::CreationFailed(_) => e,
            other => PlayerError::CreationFailed(other.to_string()),
        })?;

        let slot = Arc::new(FrameSlot::new());
        let overlay = Arc::new(OverlayStore::new(
            config.default_line_width,
            config.default_color(),
        ));
        let view = Arc::new(Mutex::new(ViewState::new(region, config.background)));

        let presenter = Presenter::start(
            PresenterInputs {
                slot: Arc::clone(&slot),
                overlay: Arc::clone(&overlay),
                view: Arc::clone(&view),
                host: Arc::clone(&host),
            },
            Compositor::new(region.pixel_size()).with_stats_font(config.stats_font.clone()),
            config.tick_interval(),
        );
        let presenter = match presenter {
            Ok(presenter) => presenter,
            Err(err) => {
                host.detach();
                return Err(err);
            }
        };

        tracing::info!(
            "player {} created for {:?} at ({}, {}) {}x{}",
            handle,
            region.window,
            region.x,
            region.y,
            region.width,
            region.height
        );

        Ok(Self {
            shared: Arc::new(Shared {
                handle,
                core: Mutex::new(SessionCore {
                    state: PlaybackState::Idle,
                    generation: 0,
                    opening: false,
                    source: None,
                    source_name: None,
                    counters: None,
                    started_at: None,
                    last_error: None,
                    subscribers: Vec::new(),
                }),
            }),
            control: Mutex::new(()),
            config,
            engine,
            host,
            slot,
            overlay,
            view,
            presenter: Mutex::new(Some(presenter)),
        })
    }

    pub fn handle(&self) -> u64 {
        self.shared.handle
    }

    fn ensure_live(&self) -> Result<()> {
        if self.shared.core.lock().state == PlaybackState::Released {
            return Err(PlayerError::InvalidHandle);
        }
        Ok(())
    }

    /// Start playing `source`. Returns once the decode thread is spawned; the
    /// open itself completes asynchronously.
    pub fn play(&self, source: &str) -> Result<()> {
        let _control = self.control.lock();
        self.ensure_live()?;

        let media = match probe(source) {
            Ok(media) => media,
            Err(err) => {
                let mut core = self.shared.core.lock();
                core.source_name = Some(source.trim().to_string());
                core.fail(err.clone());
                tracing::warn!("player {}: {}", self.shared.handle, err);
                return Err(err);
            }
        };

        let (previous, generation) = {
            let mut core = self.shared.core.lock();
            let previous = core.take_source();
            if previous.is_some()
                && matches!(core.state, PlaybackState::Playing | PlaybackState::Paused)
            {
                core.transition(PlaybackState::Stopped);
            }
            core.opening = true;
            core.source_name = Some(media.describe());
            core.last_error = None;
            (previous, core.generation)
        };
        drop(previous);

        let weak: Weak<Shared> = Arc::downgrade(&self.shared);
        let started = FrameSource::start(
            media.clone(),
            Arc::clone(&self.engine),
            self.config.clone(),
            Arc::clone(&self.slot),
            Box::new(move |event| {
                if let Some(shared) = weak.upgrade() {
                    shared.on_source_event(generation, event);
                }
            }),
        );

        let mut core = self.shared.core.lock();
        match started {
            Ok(frame_source) => {
                tracing::info!("player {} opening {}", self.shared.handle, media.describe());
                core.counters = Some(Arc::clone(frame_source.counters()));
                core.source = Some(frame_source);
                Ok(())
            }
            Err(err) => {
                core.opening = false;
                core.fail(err.clone());
                Err(err)
            }
        }
    }

    /// Playing → Paused. A no-op in any other state or while opening.
    pub fn pause(&self) -> Result<()> {
        let mut core = self.shared.core.lock();
        match core.state {
            PlaybackState::Released => Err(PlayerError::InvalidHandle),
            PlaybackState::Playing if !core.opening => {
                if let Some(source) = &core.source {
                    source.pause();
                }
                core.transition(PlaybackState::Paused);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Paused → Playing. A no-op in any other state or while opening.
    pub fn resume(&self) -> Result<()> {
        let mut core = self.shared.core.lock();
        match core.state {
            PlaybackState::Released => Err(PlayerError::InvalidHandle),
            PlaybackState::Paused if !core.opening => {
                if let Some(source) = &core.source {
                    source.resume();
                }
                core.transition(PlaybackState::Playing);
                Ok(())
            }
            _ => Ok(()),
        }
    }

    /// Tear down the decode pipeline, keeping the window binding and overlay.
    /// Cancels an in-flight open.
    pub fn stop(&self) -> Result<()> {
        let _control = self.control.lock();
        let previous = {
            let mut core = self.shared.core.lock();
            match core.state {
                PlaybackState::Released => return Err(PlayerError::InvalidHandle),
                PlaybackState::Playing | PlaybackState::Paused => {
                    core.transition(PlaybackState::Stopped)
                }
                _ => {}
            }
            core.take_source()
        };
        if previous.is_some() {
            tracing::debug!("player {} stopping decode", self.shared.handle);
        }
        drop(previous);
        Ok(())
    }

    /// Stop every thread and detach from the host. Returns `false` if the
    /// session was already released. No frame is presented after this returns.
    pub fn release(&self) -> bool {
        let _control = self.control.lock();
        let previous = {
            let mut core = self.shared.core.lock();
            if core.state == PlaybackState::Released {
                return false;
            }
            core.transition(PlaybackState::Released);
            core.subscribers.clear();
            core.take_source()
        };
        drop(previous);

        let presenter = self.presenter.lock().take();
        if let Some(mut presenter) = presenter {
            presenter.stop();
        }
        self.host.detach();
        tracing::info!("player {} released", self.shared.handle);
        true
    }

    /// Atomically replace the overlay rectangles and stroke style.
    pub fn update_rectangles(&self, rectangles: Vec<Rect>, line_width: f32, color: Color) -> Result<()> {
        self.ensure_live()?;
        let count = rectangles.len();
        self.overlay.replace(rectangles, line_width, color)?;
        tracing::debug!("player {} overlay updated: {} rectangles", self.shared.handle, count);
        Ok(())
    }

    pub fn clear_rectangles(&self) -> Result<()> {
        self.ensure_live()?;
        self.overlay.clear();
        Ok(())
    }

    pub fn overlay(&self) -> Arc<OverlaySnapshot> {
        self.overlay.current_snapshot()
    }

    /// Fill color around the video; each channel is clamped into 0..=255.
    pub fn set_background_color(&self, r: i32, g: i32, b: i32) -> Result<()> {
        self.ensure_live()?;
        let clamp = |v: i32| v.clamp(0, 255) as u8;
        let mut view = self.view.lock();
        view.background = [clamp(r), clamp(g), clamp(b)];
        view.invalidate();
        Ok(())
    }

    /// Move or resize the bound region within the same window.
    pub fn set_region(&self, x: f32, y: f32, width: f32, height: f32) -> Result<()> {
        self.ensure_live()?;
        let mut view = self.view.lock();
        let region = WindowRegion {
            window: view.region.window,
            x,
            y,
            width,
            height,
        };
        region
            .validate()
            .and_then(|()| reserve_surface(&region))
            .map_err(|e| PlayerError::InvalidArgument(e.to_string()))?;
        view.region = region;
        view.invalidate();
        tracing::debug!("player {} region now {}x{}", self.shared.handle, width, height);
        Ok(())
    }

    /// Force the next presentation tick to re-fit and re-present.
    pub fn recalculate_layout(&self) -> Result<()> {
        self.ensure_live()?;
        self.view.lock().invalidate();
        Ok(())
    }

    /// Show `text` in a box in the top-right corner of the surface, or hide the
    /// box when `show` is false or the text is empty.
    pub fn set_stats_display(&self, text: &str, show: bool) -> Result<()> {
        self.ensure_live()?;
        if text.len() > MAX_STATS_TEXT {
            return Err(PlayerError::InvalidArgument(format!(
                "statistics text longer than {} bytes",
                MAX_STATS_TEXT
            )));
        }
        let mut view = self.view.lock();
        view.stats = (show && !text.is_empty()).then(|| Arc::from(text));
        view.invalidate();
        Ok(())
    }

    /// Text currently shown in the statistics box.
    pub fn stats_display(&self) -> Option<Arc<str>> {
        self.view.lock().stats.clone()
    }

    pub fn region(&self) -> WindowRegion {
        self.view.lock().region
    }

    pub fn background_color(&self) -> [u8; 3] {
        self.view.lock().background
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.core.lock().state
    }

    /// True between `play` and the source's open outcome.
    pub fn is_opening(&self) -> bool {
        self.shared.core.lock().opening
    }

    pub fn last_error(&self) -> Option<PlayerError> {
        self.shared.core.lock().last_error.clone()
    }

    /// Receive lifecycle events from now on. The channel closes on release.
    pub fn subscribe(&self) -> Receiver<PlayerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut core = self.shared.core.lock();
        if core.state != PlaybackState::Released {
            core.subscribers.push(tx);
        }
        rx
    }

    pub fn stats(&self) -> PlaybackStats {
        let (counters, started_at) = {
            let core = self.shared.core.lock();
            (core.counters.clone(), core.started_at)
        };
        let frames_presented = self
            .presenter
            .lock()
            .as_ref()
            .map_or(0, |p| p.frames_presented());

        let mut stats = PlaybackStats {
            frames_presented,
            frames_dropped: self.slot.dropped(),
            started_at,
            ..Default::default()
        };
        if let Some(counters) = counters {
            stats.frames_decoded = counters.frames_decoded.load(Ordering::Relaxed);
            stats.bytes_read = counters.bytes_read.load(Ordering::Relaxed);
            stats.input_bitrate_kbps = counters.input_bitrate_kbps();
            stats.video_width = counters.width.load(Ordering::Relaxed);
            stats.video_height = counters.height.load(Ordering::Relaxed);
        }
        stats
    }

    /// Human-readable statistics block.
    pub fn stats_text(&self) -> String {
        self.stats().to_text()
    }

    /// The most recently presented surface.
    pub fn latest_frame(&self) -> Option<CompositedFrame> {
        self.presenter.lock().as_ref().and_then(|p| p.latest())
    }
}

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.release();
    }
}

const MAX_STATS_TEXT: usize = 4096;

/// Make sure a frame buffer for `region` can be allocated at all.
fn reserve_surface(region: &WindowRegion) -> Result<()> {
    let (width, height) = region.pixel_size();
    let mut surface: Vec<u8> = Vec::new();
    surface
        .try_reserve_exact(VideoFrame::expected_size(width, height))
        .map_err(|e| {
            PlayerError::CreationFailed(format!(
                "cannot allocate a {}x{} surface: {}",
                width, height, e
            ))
        })
}

/// Synchronous checks done before any thread is spawned.
fn probe(source: &str) -> Result<MediaSource> {
    let media = MediaSource::parse(source)?;
    if let MediaSource::Local(path) = &media {
        if !path.exists() {
            return Err(PlayerError::SourceUnavailable(format!(
                "{}: file does not exist",
                path.display()
            )));
        }
    }
    Ok(media)
}
