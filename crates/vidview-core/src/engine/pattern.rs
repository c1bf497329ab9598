//! Synthetic color-bar source
//!
//! Produces frames without touching disk or network, which keeps session and
//! bridge tests deterministic. Opening can be delayed or made to fail to
//! exercise the asynchronous open path.

use std::thread;
use std::time::{Duration, Instant};

use crate::config::PlayerConfig;
use crate::engine::{CancelToken, DecodeEngine, MediaStream, StreamPoll};
use crate::error::{PlayerError, Result};
use crate::types::{MediaSource, VideoFrame};

const BARS: [[u8; 4]; 7] = [
    [192, 192, 192, 255],
    [192, 192, 0, 255],
    [0, 192, 192, 255],
    [0, 192, 0, 255],
    [192, 0, 192, 255],
    [192, 0, 0, 255],
    [0, 0, 192, 255],
];

const CANCEL_POLL: Duration = Duration::from_millis(5);

#[derive(Debug, Clone)]
pub struct PatternEngine {
    width: u32,
    height: u32,
    fps: f32,
    open_latency: Duration,
    frame_limit: Option<u64>,
    open_failure: Option<String>,
}

impl PatternEngine {
    pub fn new(width: u32, height: u32, fps: f32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
            fps: if fps.is_finite() && fps > 0.0 { fps } else { 25.0 },
            open_latency: Duration::ZERO,
            frame_limit: None,
            open_failure: None,
        }
    }

    /// Delay every open by `latency`, still honouring cancellation.
    pub fn with_open_latency(mut self, latency: Duration) -> Self {
        self.open_latency = latency;
        self
    }

    /// End the stream after `frames` frames.
    pub fn with_frame_limit(mut self, frames: u64) -> Self {
        self.frame_limit = Some(frames);
        self
    }

    /// Fail every open (after the latency) with `reason`.
    pub fn with_open_failure(mut self, reason: impl Into<String>) -> Self {
        self.open_failure = Some(reason.into());
        self
    }
}

impl Default for PatternEngine {
    fn default() -> Self {
        Self::new(320, 180, 25.0)
    }
}

impl DecodeEngine for PatternEngine {
    fn name(&self) -> &'static str {
        "pattern"
    }

    fn open(
        &self,
        source: &MediaSource,
        _config: &PlayerConfig,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaStream>> {
        let deadline = Instant::now() + self.open_latency;
        loop {
            if cancel.is_cancelled() {
                return Err(PlayerError::SourceUnavailable(format!(
                    "{}: open cancelled",
                    source.describe()
                )));
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }

        if let Some(reason) = &self.open_failure {
            return Err(PlayerError::SourceUnavailable(format!(
                "{}: {}",
                source.describe(),
                reason
            )));
        }

        Ok(Box::new(PatternStream {
            width: self.width,
            height: self.height,
            frame_interval_us: (1_000_000.0 / self.fps as f64) as u64,
            frame_limit: self.frame_limit,
            produced: 0,
        }))
    }
}

struct PatternStream {
    width: u32,
    height: u32,
    frame_interval_us: u64,
    frame_limit: Option<u64>,
    produced: u64,
}

impl PatternStream {
    fn render(&self) -> Vec<u8> {
        let offset = self.produced as usize;
        let mut pixels = Vec::with_capacity(VideoFrame::expected_size(self.width, self.height));
        for _ in 0..self.height {
            for x in 0..self.width {
                let bar = (x as usize * BARS.len() / self.width as usize + offset) % BARS.len();
                pixels.extend_from_slice(&BARS[bar]);
            }
        }
        pixels
    }
}

impl MediaStream for PatternStream {
    fn next_frame(&mut self) -> Result<StreamPoll> {
        if self.frame_limit.is_some_and(|limit| self.produced >= limit) {
            return Ok(StreamPoll::EndOfStream);
        }
        let frame = VideoFrame::new(
            self.render(),
            self.width,
            self.height,
            self.produced * self.frame_interval_us,
        );
        self.produced += 1;
        Ok(StreamPoll::Frame(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn bytes_read(&self) -> u64 {
        self.produced * VideoFrame::expected_size(self.width, self.height) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> MediaSource {
        MediaSource::Network("rtsp://pattern.test/bars".to_string())
    }

    #[test]
    fn test_frames_advance_and_end_at_limit() {
        let engine = PatternEngine::new(14, 2, 10.0).with_frame_limit(2);
        let mut stream = engine
            .open(&source(), &PlayerConfig::default(), &CancelToken::new())
            .unwrap();

        let StreamPoll::Frame(first) = stream.next_frame().unwrap() else {
            panic!("expected first frame");
        };
        let StreamPoll::Frame(second) = stream.next_frame().unwrap() else {
            panic!("expected second frame");
        };
        assert!(first.is_well_formed());
        assert_eq!(first.pts_us, 0);
        assert_eq!(second.pts_us, 100_000);
        assert_ne!(first.pixels[..4], second.pixels[..4]);
        assert!(matches!(stream.next_frame().unwrap(), StreamPoll::EndOfStream));
    }

    #[test]
    fn test_cancel_interrupts_slow_open() {
        let engine = PatternEngine::default().with_open_latency(Duration::from_secs(30));
        let cancel = CancelToken::new();
        let trigger = cancel.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            trigger.cancel();
        });

        let started = Instant::now();
        let result = engine.open(&source(), &PlayerConfig::default(), &cancel);
        canceller.join().unwrap();

        assert!(matches!(result, Err(PlayerError::SourceUnavailable(_))));
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_open_failure() {
        let engine = PatternEngine::default().with_open_failure("connection refused");
        let err = engine
            .open(&source(), &PlayerConfig::default(), &CancelToken::new())
            .err()
            .unwrap();
        assert_eq!(
            err,
            PlayerError::SourceUnavailable(
                "rtsp://pattern.test/bars: connection refused".to_string()
            )
        );
    }
}
