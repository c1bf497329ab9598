//! Decode thread
//!
//! A `FrameSource` owns one thread that opens a source through the decode engine
//! and publishes frames into the session's [`FrameSlot`], paced by presentation
//! timestamp. The caller only ever enqueues commands; stopping cancels the
//! engine and joins the thread.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use parking_lot::Mutex;

use crate::config::PlayerConfig;
use crate::engine::{CancelToken, DecodeEngine, MediaStream, StreamPoll};
use crate::error::{PlayerError, Result};
use crate::slot::FrameSlot;
use crate::types::{MediaSource, VideoFrame};

/// How often a paused or stalled source rechecks for commands
const IDLE_POLL: Duration = Duration::from_millis(20);

/// Timestamp gaps larger than this re-anchor the playback clock
const MAX_FRAME_WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Pause,
    Resume,
}

/// Reported from the decode thread
#[derive(Debug)]
pub enum SourceEvent {
    Opened { width: u32, height: u32 },
    Failed(PlayerError),
    EndOfStream,
}

/// Counters updated by the decode thread, read by `PlayerSession::stats`
#[derive(Debug, Default)]
pub struct SourceCounters {
    pub frames_decoded: AtomicU64,
    pub bytes_read: AtomicU64,
    pub width: AtomicU32,
    pub height: AtomicU32,
    opened_at: Mutex<Option<Instant>>,
}

impl SourceCounters {
    /// Average input bitrate since the source opened, in kb/s.
    pub fn input_bitrate_kbps(&self) -> f64 {
        let Some(opened_at) = *self.opened_at.lock() else {
            return 0.0;
        };
        let elapsed = opened_at.elapsed().as_secs_f64();
        if elapsed <= 0.0 {
            return 0.0;
        }
        self.bytes_read.load(Ordering::Relaxed) as f64 * 8.0 / 1000.0 / elapsed
    }
}

pub type EventSink = Box<dyn FnMut(SourceEvent) + Send>;

/// A running decode thread for one source
pub struct FrameSource {
    source: MediaSource,
    commands: Option<Sender<Command>>,
    cancel: CancelToken,
    counters: Arc<SourceCounters>,
    thread: Option<JoinHandle<()>>,
}

impl FrameSource {
    /// Spawn the decode thread. Opening happens on that thread; the outcome
    /// arrives through `events`.
    pub fn start(
        source: MediaSource,
        engine: Arc<dyn DecodeEngine>,
        config: PlayerConfig,
        slot: Arc<FrameSlot>,
        events: EventSink,
    ) -> Result<Self> {
        let (tx, rx) = crossbeam_channel::unbounded();
        let cancel = CancelToken::new();
        let counters = Arc::new(SourceCounters::default());

        let worker = DecodeWorker {
            source: source.clone(),
            engine,
            config,
            slot,
            commands: rx,
            cancel: cancel.clone(),
            counters: Arc::clone(&counters),
            events,
        };
        let thread = thread::Builder::new()
            .name("vidview-decode".to_string())
            .spawn(move || worker.run())
            .map_err(|e| {
                PlayerError::SourceUnavailable(format!("failed to spawn decode thread: {}", e))
            })?;

        Ok(Self {
            source,
            commands: Some(tx),
            cancel,
            counters,
            thread: Some(thread),
        })
    }

    pub fn source(&self) -> &MediaSource {
        &self.source
    }

    pub fn counters(&self) -> &Arc<SourceCounters> {
        &self.counters
    }

    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    fn send(&self, command: Command) {
        if let Some(tx) = &self.commands {
            let _ = tx.send(command);
        }
    }

    /// Cancel any in-flight open or read and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.commands.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("decode thread for {} panicked", self.source.describe());
            }
        }
    }
}

impl Drop for FrameSource {
    fn drop(&mut self) {
        self.stop();
    }
}

struct DecodeWorker {
    source: MediaSource,
    engine: Arc<dyn DecodeEngine>,
    config: PlayerConfig,
    slot: Arc<FrameSlot>,
    commands: Receiver<Command>,
    cancel: CancelToken,
    counters: Arc<SourceCounters>,
    events: EventSink,
}

enum Step {
    Continue,
    Exit,
}

impl DecodeWorker {
    fn run(mut self) {
        tracing::debug!(
            "opening {} with {} engine",
            self.source.describe(),
            self.engine.name()
        );

        let mut stream = match self.engine.open(&self.source, &self.config, &self.cancel) {
            Ok(stream) => stream,
            Err(err) => {
                if !self.cancel.is_cancelled() {
                    tracing::warn!("{}", err);
                    (self.events)(SourceEvent::Failed(err));
                }
                return;
            }
        };

        if self.cancel.is_cancelled() {
            stream.close();
            return;
        }

        let (width, height) = stream.dimensions();
        self.counters.width.store(width, Ordering::Relaxed);
        self.counters.height.store(height, Ordering::Relaxed);
        *self.counters.opened_at.lock() = Some(Instant::now());
        (self.events)(SourceEvent::Opened { width, height });

        let ended = self.pump(stream.as_mut());
        stream.close();

        if ended && !self.cancel.is_cancelled() {
            tracing::info!("end of stream: {}", self.source.describe());
            (self.events)(SourceEvent::EndOfStream);
        }
    }

    /// Decode and publish until end of stream (returns `true`), failure or stop.
    fn pump(&mut self, stream: &mut dyn MediaStream) -> bool {
        let mut paused = false;
        let mut held: Option<VideoFrame> = None;
        let mut clock: Option<(Instant, u64)> = None;

        loop {
            if self.cancel.is_cancelled() {
                return false;
            }

            if paused {
                match self.commands.recv_timeout(IDLE_POLL) {
                    Ok(Command::Resume) => {
                        paused = false;
                        clock = None;
                    }
                    Ok(Command::Pause) | Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => return false,
                }
                continue;
            }

            match self.commands.try_recv() {
                Ok(Command::Pause) => {
                    paused = true;
                    continue;
                }
                Ok(Command::Resume) | Err(TryRecvError::Empty) => {}
                Err(TryRecvError::Disconnected) => return false,
            }

            let frame = match held.take() {
                Some(frame) => frame,
                None => match stream.next_frame() {
                    Ok(StreamPoll::Frame(frame)) => {
                        self.counters.frames_decoded.fetch_add(1, Ordering::Relaxed);
                        self.counters
                            .bytes_read
                            .store(stream.bytes_read(), Ordering::Relaxed);
                        frame
                    }
                    Ok(StreamPoll::Pending) => {
                        if let Step::Exit = self.idle(&mut paused) {
                            return false;
                        }
                        continue;
                    }
                    Ok(StreamPoll::EndOfStream) => return true,
                    Err(err) => {
                        if !self.cancel.is_cancelled() {
                            tracing::warn!("decode failed: {}", err);
                            (self.events)(SourceEvent::Failed(err));
                        }
                        return false;
                    }
                },
            };

            // Wait until the frame is due, staying responsive to commands.
            let (anchor, base_pts) = *clock.get_or_insert((Instant::now(), frame.pts_us));
            let due = anchor + Duration::from_micros(frame.pts_us.saturating_sub(base_pts));
            let now = Instant::now();
            if due > now {
                let wait = due - now;
                if wait > MAX_FRAME_WAIT {
                    clock = Some((now, frame.pts_us));
                } else {
                    match self.commands.recv_timeout(wait) {
                        Ok(Command::Pause) => {
                            paused = true;
                            held = Some(frame);
                            continue;
                        }
                        Ok(Command::Resume) | Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => return false,
                    }
                }
            }

            if self.cancel.is_cancelled() {
                return false;
            }
            let mut frame = frame;
            frame.sequence = self.slot.next_sequence();
            self.slot.publish(frame);
        }
    }

    fn idle(&self, paused: &mut bool) -> Step {
        match self.commands.recv_timeout(IDLE_POLL) {
            Ok(Command::Pause) => *paused = true,
            Ok(Command::Resume) | Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => return Step::Exit,
        }
        Step::Continue
    }
}
