//! Files and network streams decoded with ffmpeg-next
//!
//! The input is opened with an interrupt callback bound to the session's
//! [`CancelToken`] and the configured open timeout, so a stalled network open or
//! read is abandoned as soon as the session stops or releases.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;

use crate::config::PlayerConfig;
use crate::engine::{CancelToken, DecodeEngine, MediaStream, StreamPoll};
use crate::error::{PlayerError, Result};
use crate::types::{MediaSource, VideoFrame};

#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegEngine;

impl DecodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    fn open(
        &self,
        source: &MediaSource,
        config: &PlayerConfig,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaStream>> {
        ffmpeg_next::init().map_err(|e| unavailable(source, e))?;

        let target = match source {
            MediaSource::Local(path) => path.to_string_lossy().to_string(),
            MediaSource::Network(url) => url.clone(),
        };

        // Only the open is bounded by the timeout; reads are bounded by cancel.
        let opening_deadline = Instant::now() + config.open_timeout();
        let token = cancel.clone();
        let opened = Arc::new(AtomicBool::new(false));
        let opened_flag = opened.clone();
        let input = ffmpeg_next::format::input_with_interrupt(&target, move || {
            token.is_cancelled()
                || (!opened_flag.load(Ordering::Acquire)
                    && Instant::now() >= opening_deadline)
        })
        .map_err(|e| {
            if cancel.is_cancelled() {
                PlayerError::SourceUnavailable(format!("{}: open cancelled", source.describe()))
            } else {
                unavailable(source, e)
            }
        })?;
        opened.store(true, Ordering::Release);

        let stream = input
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or_else(|| {
                PlayerError::SourceUnavailable(format!("{}: no video stream", source.describe()))
            })?;
        let stream_index = stream.index();
        let time_base = stream.time_base();
        let time_base = if time_base.denominator() > 0 {
            time_base.numerator() as f64 / time_base.denominator() as f64
        } else {
            0.0
        };

        let context = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())
            .map_err(|e| unavailable(source, e))?;
        let decoder = context
            .decoder()
            .video()
            .map_err(|e| unavailable(source, e))?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = scaling::Context::get(
            decoder.format(),
            width,
            height,
            Pixel::RGBA,
            width,
            height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| unavailable(source, e))?;

        tracing::info!(
            "opened {} ({}x{}, codec {:?})",
            source.describe(),
            width,
            height,
            decoder.id()
        );

        Ok(Box::new(FfmpegStream {
            input,
            stream_index,
            decoder,
            scaler,
            width,
            height,
            time_base,
            bytes_read: 0,
            draining: false,
        }))
    }
}

fn unavailable(source: &MediaSource, err: ffmpeg_next::Error) -> PlayerError {
    PlayerError::SourceUnavailable(format!("{}: {}", source.describe(), err))
}

#[derive(Debug, PartialEq)]
enum ReadOutcome {
    Packet,
    /// Nothing available yet
    Retry,
    EndOfInput,
    /// Interrupted by cancel, or a hard demux error
    Failed(String),
}

fn read_outcome(result: std::result::Result<(), ffmpeg_next::Error>) -> ReadOutcome {
    match result {
        Ok(()) => ReadOutcome::Packet,
        Err(ffmpeg_next::Error::Other {
            errno: ffmpeg_next::error::EAGAIN,
        }) => ReadOutcome::Retry,
        Err(ffmpeg_next::Error::Eof) => ReadOutcome::EndOfInput,
        Err(ffmpeg_next::Error::Exit) => ReadOutcome::Failed("interrupted".to_string()),
        Err(e) => ReadOutcome::Failed(e.to_string()),
    }
}

struct FfmpegStream {
    input: ffmpeg_next::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg_next::decoder::Video,
    scaler: scaling::Context,
    width: u32,
    height: u32,
    time_base: f64,
    bytes_read: u64,
    draining: bool,
}

// The ffmpeg contexts are only ever touched from the decode thread that owns the stream.
unsafe impl Send for FfmpegStream {}

impl FfmpegStream {
    fn convert(&mut self, decoded: &ffmpeg_next::frame::Video) -> Result<VideoFrame> {
        if decoded.format() != self.scaler.input().format
            || decoded.width() != self.width
            || decoded.height() != self.height
        {
            self.width = decoded.width();
            self.height = decoded.height();
            self.scaler = scaling::Context::get(
                decoded.format(),
                self.width,
                self.height,
                Pixel::RGBA,
                self.width,
                self.height,
                scaling::Flags::BILINEAR,
            )
            .map_err(|e| PlayerError::SourceUnavailable(format!("scaler: {}", e)))?;
        }

        let mut rgba = ffmpeg_next::frame::Video::empty();
        self.scaler
            .run(decoded, &mut rgba)
            .map_err(|e| PlayerError::SourceUnavailable(format!("scaler: {}", e)))?;

        let data = rgba.data(0);
        let stride = rgba.stride(0);
        let row = self.width as usize * 4;
        let pixels = if stride == row {
            data[..VideoFrame::expected_size(self.width, self.height)].to_vec()
        } else {
            let mut packed = Vec::with_capacity(VideoFrame::expected_size(self.width, self.height));
            for y in 0..self.height as usize {
                packed.extend_from_slice(&data[y * stride..y * stride + row]);
            }
            packed
        };

        let pts_seconds = decoded.pts().unwrap_or(0).max(0) as f64 * self.time_base;
        Ok(VideoFrame::new(
            pixels,
            self.width,
            self.height,
            (pts_seconds * 1_000_000.0) as u64,
        ))
    }
}

impl MediaStream for FfmpegStream {
    fn next_frame(&mut self) -> Result<StreamPoll> {
        let mut decoded = ffmpeg_next::frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert(&decoded).map(StreamPoll::Frame),
                Err(ffmpeg_next::Error::Other {
                    errno: ffmpeg_next::error::EAGAIN,
                }) => {}
                Err(ffmpeg_next::Error::Eof) => return Ok(StreamPoll::EndOfStream),
                Err(e) => {
                    return Err(PlayerError::SourceUnavailable(format!("decode: {}", e)));
                }
            }

            if self.draining {
                return Ok(StreamPoll::EndOfStream);
            }

            // Feed the next video packet, or flush the decoder at end of input.
            loop {
                let mut packet = ffmpeg_next::Packet::empty();
                match read_outcome(packet.read(&mut self.input)) {
                    ReadOutcome::Packet => {
                        self.bytes_read += packet.size() as u64;
                        if packet.stream() == self.stream_index {
                            self.decoder
                                .send_packet(&packet)
                                .map_err(|e| PlayerError::SourceUnavailable(format!("decode: {}", e)))?;
                            break;
                        }
                    }
                    ReadOutcome::Retry => return Ok(StreamPoll::Pending),
                    ReadOutcome::EndOfInput => {
                        self.draining = true;
                        let _ = self.decoder.send_eof();
                        break;
                    }
                    ReadOutcome::Failed(reason) => {
                        return Err(PlayerError::SourceUnavailable(format!("read: {}", reason)));
                    }
                }
            }
        }
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    fn close(&mut self) {
        let _ = self.decoder.send_eof();
    }
}
