//! Still images and image sequences decoded with the `image` crate
//!
//! A single image is presented once and then held. A directory is played as a
//! sequence of its image files in name order at `PlayerConfig::still_fps`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::PlayerConfig;
use crate::engine::{CancelToken, DecodeEngine, MediaStream, StreamPoll};
use crate::error::{PlayerError, Result};
use crate::types::{MediaSource, VideoFrame};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp"];

/// Decodes local images and image-sequence directories
#[derive(Debug, Default, Clone, Copy)]
pub struct StillImageEngine;

impl StillImageEngine {
    /// True for local image files and directories.
    pub fn handles(source: &MediaSource) -> bool {
        match source {
            MediaSource::Local(path) => path.is_dir() || is_image_path(path),
            MediaSource::Network(_) => false,
        }
    }
}

impl DecodeEngine for StillImageEngine {
    fn name(&self) -> &'static str {
        "still-image"
    }

    fn open(
        &self,
        source: &MediaSource,
        config: &PlayerConfig,
        cancel: &CancelToken,
    ) -> Result<Box<dyn MediaStream>> {
        let path = match source {
            MediaSource::Local(path) => path,
            MediaSource::Network(url) => {
                return Err(PlayerError::SourceUnavailable(format!(
                    "{}: network streams are not image sources",
                    url
                )))
            }
        };

        let files = if path.is_dir() {
            list_sequence(path)?
        } else if path.is_file() {
            vec![path.clone()]
        } else {
            return Err(PlayerError::SourceUnavailable(format!(
                "{}: file does not exist",
                path.display()
            )));
        };

        if cancel.is_cancelled() {
            return Err(PlayerError::SourceUnavailable("open cancelled".to_string()));
        }

        // Decode the first frame eagerly so a corrupt file fails the open.
        let first = decode_file(&files[0])?;
        let dimensions = (first.0.width, first.0.height);
        let frame_interval_us = (1_000_000.0 / config.still_fps as f64) as u64;

        tracing::debug!(
            "opened {} image(s) at {} ({}x{})",
            files.len(),
            path.display(),
            dimensions.0,
            dimensions.1
        );

        Ok(Box::new(StillStream {
            files,
            next_index: 1,
            first: Some(first.0),
            bytes_read: first.1,
            dimensions,
            frame_interval_us,
        }))
    }
}

struct StillStream {
    files: Vec<PathBuf>,
    next_index: usize,
    first: Option<VideoFrame>,
    bytes_read: u64,
    dimensions: (u32, u32),
    frame_interval_us: u64,
}

impl MediaStream for StillStream {
    fn next_frame(&mut self) -> Result<StreamPoll> {
        if let Some(frame) = self.first.take() {
            return Ok(StreamPoll::Frame(frame));
        }

        // A single image is held on screen until stopped.
        if self.files.len() == 1 {
            return Ok(StreamPoll::Pending);
        }

        let Some(path) = self.files.get(self.next_index) else {
            return Ok(StreamPoll::EndOfStream);
        };
        let (mut frame, bytes) = decode_file(path)?;
        frame.pts_us = self.next_index as u64 * self.frame_interval_us;
        self.next_index += 1;
        self.bytes_read += bytes;
        Ok(StreamPoll::Frame(frame))
    }

    fn dimensions(&self) -> (u32, u32) {
        self.dimensions
    }

    fn bytes_read(&self) -> u64 {
        self.bytes_read
    }
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

fn list_sequence(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).map_err(|e| {
        PlayerError::SourceUnavailable(format!("{}: {}", dir.display(), e))
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && is_image_path(path))
        .collect();
    files.sort();

    if files.is_empty() {
        return Err(PlayerError::SourceUnavailable(format!(
            "{}: directory contains no images",
            dir.display()
        )));
    }
    Ok(files)
}

fn decode_file(path: &Path) -> Result<(VideoFrame, u64)> {
    let bytes = fs::metadata(path).map(|m| m.len()).unwrap_or(0);
    let image = image::open(path)
        .map_err(|e| PlayerError::SourceUnavailable(format!("{}: {}", path.display(), e)))?
        .into_rgba8();
    let (width, height) = image.dimensions();
    Ok((VideoFrame::new(image.into_raw(), width, height, 0), bytes))
}
