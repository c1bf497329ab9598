//! Frame composition
//!
//! Each presentation tick produces one RGBA surface the size of the bound region:
//! background fill, the latest frame aspect-fitted and centered, then the overlay
//! rectangles stroked on top.
//!
//! Rectangles are given in the coordinate space of the region as it was when the
//! session was created. They are mapped from the video placement in that reference
//! region into the current placement, so they stay on the same video content after
//! a resize.
//!
//! An optional statistics box is drawn last, anchored to the top-right corner.

use std::path::PathBuf;
use std::sync::Arc;

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut, text_size, Blend};

use crate::font;
use crate::overlay::OverlaySnapshot;
use crate::types::{Rect, VideoFrame};

/// Where the video lands inside a surface, in whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Placement {
    pub fn full(surface: (u32, u32)) -> Self {
        Self {
            x: 0,
            y: 0,
            width: surface.0,
            height: surface.1,
        }
    }
}

/// Aspect-fit `content` into `surface`: uniform scale by the smaller axis ratio,
/// centered, truncated to whole pixels.
pub fn fit_rect(content: (u32, u32), surface: (u32, u32)) -> Placement {
    let (cw, ch) = content;
    let (sw, sh) = surface;
    if cw == 0 || ch == 0 || sw == 0 || sh == 0 {
        return Placement::full(surface);
    }

    let scale = (sw as f64 / cw as f64).min(sh as f64 / ch as f64);
    let width = ((cw as f64 * scale) as u32).clamp(1, sw);
    let height = ((ch as f64 * scale) as u32).clamp(1, sh);
    Placement {
        x: (sw - width) / 2,
        y: (sh - height) / 2,
        width,
        height,
    }
}

/// Map a rectangle from one video placement into another.
pub fn map_rect(rect: &Rect, from: Placement, to: Placement) -> Rect {
    if from == to {
        return *rect;
    }
    let sx = to.width as f32 / from.width.max(1) as f32;
    let sy = to.height as f32 / from.height.max(1) as f32;
    Rect::new(
        to.x as f32 + (rect.x - from.x as f32) * sx,
        to.y as f32 + (rect.y - from.y as f32) * sy,
        rect.width * sx,
        rect.height * sy,
    )
}

/// One composited surface, ready for the host window
#[derive(Debug, Clone)]
pub struct CompositedFrame {
    pub image: Arc<RgbaImage>,
    /// Video placement inside `image`
    pub placement: Placement,
    /// Sequence of the video frame drawn, 0 when no frame has arrived yet
    pub frame_sequence: u64,
    pub overlay_version: u64,
}

impl CompositedFrame {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

struct ScaledFrame {
    sequence: u64,
    image: RgbaImage,
}

enum FontState {
    /// Not looked up yet; holds the configured path
    Pending(Option<PathBuf>),
    Ready(Option<FontVec>),
}

/// Stateful compositor for one session
pub struct Compositor {
    reference: (u32, u32),
    scaled: Option<ScaledFrame>,
    stats: Option<Arc<str>>,
    font: FontState,
}

impl Compositor {
    /// `reference` is the region size rectangles are expressed in.
    pub fn new(reference: (u32, u32)) -> Self {
        Self {
            reference,
            scaled: None,
            stats: None,
            font: FontState::Pending(None),
        }
    }

    /// Font for the statistics box, loaded the first time the box is shown.
    pub fn with_stats_font(mut self, path: Option<PathBuf>) -> Self {
        self.font = FontState::Pending(path);
        self
    }

    pub fn reference(&self) -> (u32, u32) {
        self.reference
    }

    /// Text for the statistics box; `None` hides it.
    pub fn set_stats(&mut self, text: Option<Arc<str>>) {
        self.stats = text;
    }

    fn stats_font(&mut self) -> Option<&FontVec> {
        if let FontState::Pending(path) = &self.font {
            self.font = FontState::Ready(font::load(path.as_deref()));
        }
        match &self.font {
            FontState::Ready(font) => font.as_ref(),
            FontState::Pending(_) => None,
        }
    }

    pub fn compose(
        &mut self,
        surface: (u32, u32),
        background: [u8; 3],
        frame: Option<&VideoFrame>,
        overlay: &OverlaySnapshot,
    ) -> CompositedFrame {
        let surface = (surface.0.max(1), surface.1.max(1));
        let [r, g, b] = background;
        let mut canvas = RgbaImage::from_pixel(surface.0, surface.1, Rgba([r, g, b, 255]));

        let frame = frame.filter(|f| f.is_well_formed());
        let content = frame.map(|f| (f.width, f.height));
        let placement = content.map_or(Placement::full(surface), |c| fit_rect(c, surface));

        if let Some(frame) = frame {
            let scaled = self.scaled_frame(frame, placement);
            imageops::replace(&mut canvas, scaled, placement.x as i64, placement.y as i64);
        }

        if !overlay.is_empty() {
            let reference_placement = content
                .map_or(Placement::full(self.reference), |c| fit_rect(c, self.reference));
            let color = Rgba(overlay.color.to_rgba8());
            let mut target = Blend(canvas);
            for rect in &overlay.rectangles {
                let mapped = map_rect(rect, reference_placement, placement);
                stroke_rect(&mut target, &mapped, overlay.line_width, color);
            }
            canvas = target.0;
        }

        if let Some(text) = self.stats.clone() {
            canvas = draw_stats(canvas, &text, self.stats_font());
        }

        CompositedFrame {
            image: Arc::new(canvas),
            placement,
            frame_sequence: frame.map_or(0, |f| f.sequence),
            overlay_version: overlay.version,
        }
    }

    /// Scale `frame` to the placement size, reusing the last result when neither
    /// the frame nor the size changed.
    fn scaled_frame(&mut self, frame: &VideoFrame, placement: Placement) -> &RgbaImage {
        let reusable = self.scaled.as_ref().is_some_and(|s| {
            s.sequence == frame.sequence
                && s.image.dimensions() == (placement.width, placement.height)
        });

        if !reusable {
            self.scaled = None;
        }
        let scaled = self.scaled.get_or_insert_with(|| {
            let len = VideoFrame::expected_size(frame.width, frame.height);
            let source = RgbaImage::from_raw(frame.width, frame.height, frame.pixels[..len].to_vec())
                .unwrap_or_else(|| RgbaImage::new(frame.width, frame.height));
            let image = if source.dimensions() == (placement.width, placement.height) {
                source
            } else {
                imageops::resize(&source, placement.width, placement.height, FilterType::Triangle)
            };
            ScaledFrame {
                sequence: frame.sequence,
                image,
            }
        });
        &scaled.image
    }
}

/// Stroke the outline of `rect`, the pen centered on its edges. The side strips
/// skip the rows covered by the top and bottom strips so translucent corners are
/// blended once.
///
/// Edges are clamped to just outside the canvas before conversion, so any
/// finite rectangle is safe to draw.
fn stroke_rect(canvas: &mut Blend<RgbaImage>, rect: &Rect, line_width: f32, color: Rgba<u8>) {
    if !rect.is_finite() || rect.width <= 0.0 || rect.height <= 0.0 {
        return;
    }
    let (cw, ch) = canvas.0.dimensions();
    let (cw, ch) = (cw as f32, ch as f32);
    let pen = line_width.round().clamp(1.0, cw.max(ch));
    let margin = pen + 1.0;
    let edge = |v: f32, limit: f32| v.round().clamp(-margin, limit + margin) as i64;

    let pen = pen as i64;
    let half = pen / 2;
    let left = edge(rect.x, cw) - half;
    let top = edge(rect.y, ch) - half;
    let right = edge(rect.x + rect.width, cw) - half;
    let bottom = edge(rect.y + rect.height, ch) - half;

    if right + pen <= 0 || bottom + pen <= 0 || left >= cw as i64 || top >= ch as i64 {
        return;
    }
    let outer_width = (right - left + pen).max(1);

    let strip = |x: i64, y: i64, w: i64, h: i64| {
        imageproc::rect::Rect::at(x as i32, y as i32).of_size(w as u32, h as u32)
    };

    draw_filled_rect_mut(canvas, strip(left, top, outer_width, pen), color);
    if bottom > top {
        draw_filled_rect_mut(canvas, strip(left, bottom, outer_width, pen), color);
    }

    let side_height = bottom - top - pen;
    if side_height > 0 {
        let side_top = top + pen;
        draw_filled_rect_mut(canvas, strip(left, side_top, pen, side_height), color);
        if right > left {
            draw_filled_rect_mut(canvas, strip(right, side_top, pen, side_height), color);
        }
    }
}

const STATS_SCALE: f32 = 14.0;
const STATS_LINE_HEIGHT: i32 = 17;
/// Glyph advance assumed when no font could be loaded
const STATS_FALLBACK_ADVANCE: u32 = 8;
const STATS_RIGHT: i32 = 15;
const STATS_TOP: i32 = 10;
const STATS_PAD_X: i32 = 5;
const STATS_PAD_Y: i32 = 3;
const STATS_BACKDROP: Rgba<u8> = Rgba([0, 0, 0, 180]);
const STATS_TEXT: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Draw `text` in bright green on a translucent black box in the top-right corner.
fn draw_stats(canvas: RgbaImage, text: &str, font: Option<&FontVec>) -> RgbaImage {
    let lines: Vec<&str> = text.lines().collect();
    if lines.is_empty() {
        return canvas;
    }
    let scale = PxScale::from(STATS_SCALE);
    let text_width = lines
        .iter()
        .map(|line| match font {
            Some(font) => text_size(scale, font, line).0,
            None => line.chars().count() as u32 * STATS_FALLBACK_ADVANCE,
        })
        .max()
        .unwrap_or(0) as i32;
    let text_height = lines.len() as i32 * STATS_LINE_HEIGHT;

    let text_x = canvas.width() as i32 - text_width - STATS_RIGHT;
    let backdrop = imageproc::rect::Rect::at(text_x - STATS_PAD_X, STATS_TOP - STATS_PAD_Y)
        .of_size(
            (text_width + 2 * STATS_PAD_X) as u32,
            (text_height + 2 * STATS_PAD_Y) as u32,
        );
    let mut blend = Blend(canvas);
    draw_filled_rect_mut(&mut blend, backdrop, STATS_BACKDROP);
    let mut canvas = blend.0;

    if let Some(font) = font {
        for (i, line) in lines.iter().enumerate() {
            let y = STATS_TOP + i as i32 * STATS_LINE_HEIGHT;
            draw_text_mut(&mut canvas, STATS_TEXT, text_x, y, scale, font, line);
        }
    }
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Color;
    use pretty_assertions::assert_eq;

    fn solid_frame(width: u32, height: u32, rgba: [u8; 4], sequence: u64) -> VideoFrame {
        let pixels: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(VideoFrame::expected_size(width, height))
            .collect();
        let mut frame = VideoFrame::new(pixels, width, height, 0);
        frame.sequence = sequence;
        frame
    }

    fn overlay(rects: Vec<Rect>, line_width: f32, color: Color) -> OverlaySnapshot {
        OverlaySnapshot {
            rectangles: rects,
            line_width,
            color,
            version: 1,
        }
    }

    fn empty_overlay() -> OverlaySnapshot {
        overlay(Vec::new(), 2.0, Color::default())
    }

    #[test]
    fn test_fit_letterbox() {
        assert_eq!(
            fit_rect((1920, 1080), (800, 600)),
            Placement { x: 0, y: 75, width: 800, height: 450 }
        );
    }

    #[test]
    fn test_fit_pillarbox() {
        assert_eq!(
            fit_rect((640, 480), (800, 300)),
            Placement { x: 200, y: 0, width: 400, height: 300 }
        );
    }

    #[test]
    fn test_fit_degenerate_content_fills_surface() {
        assert_eq!(fit_rect((0, 0), (320, 240)), Placement::full((320, 240)));
    }

    #[test]
    fn test_map_rect_identity_and_scale() {
        let rect = Rect::new(100.0, 100.0, 200.0, 150.0);
        let placement = Placement { x: 0, y: 75, width: 800, height: 450 };
        assert_eq!(map_rect(&rect, placement, placement), rect);

        let doubled = Placement { x: 0, y: 150, width: 1600, height: 900 };
        assert_eq!(
            map_rect(&rect, placement, doubled),
            Rect::new(200.0, 200.0, 400.0, 300.0)
        );
    }

    #[test]
    fn test_background_fills_bars() {
        let mut compositor = Compositor::new((8, 8));
        let frame = solid_frame(8, 4, [200, 0, 0, 255], 1);
        let out = compositor.compose((8, 8), [30, 30, 30], Some(&frame), &empty_overlay());

        assert_eq!(out.placement, Placement { x: 0, y: 2, width: 8, height: 4 });
        assert_eq!(out.image.get_pixel(0, 0).0, [30, 30, 30, 255]);
        assert_eq!(out.image.get_pixel(0, 7).0, [30, 30, 30, 255]);
        assert_eq!(out.image.get_pixel(4, 4).0, [200, 0, 0, 255]);
        assert_eq!(out.frame_sequence, 1);
    }

    #[test]
    fn test_no_frame_draws_background_only() {
        let mut compositor = Compositor::new((4, 4));
        let out = compositor.compose((4, 4), [1, 2, 3], None, &empty_overlay());
        assert!(out.image.pixels().all(|p| p.0 == [1, 2, 3, 255]));
        assert_eq!(out.frame_sequence, 0);
    }

    #[test]
    fn test_stroke_outline_only() {
        let mut compositor = Compositor::new((20, 20));
        let snapshot = overlay(
            vec![Rect::new(5.0, 5.0, 10.0, 10.0)],
            1.0,
            Color::new(0.0, 1.0, 0.0, 1.0),
        );
        let out = compositor.compose((20, 20), [0, 0, 0], None, &snapshot);

        let green = [0, 255, 0, 255];
        assert_eq!(out.image.get_pixel(5, 5).0, green);
        assert_eq!(out.image.get_pixel(10, 5).0, green);
        assert_eq!(out.image.get_pixel(15, 10).0, green);
        assert_eq!(out.image.get_pixel(10, 15).0, green);
        assert_eq!(out.image.get_pixel(5, 10).0, green);
        assert_eq!(out.image.get_pixel(10, 10).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_translucent_corners_blend_once() {
        let mut compositor = Compositor::new((20, 20));
        let snapshot = overlay(
            vec![Rect::new(4.0, 4.0, 10.0, 10.0)],
            2.0,
            Color::new(1.0, 1.0, 1.0, 0.5),
        );
        let out = compositor.compose((20, 20), [0, 0, 0], None, &snapshot);

        let corner = out.image.get_pixel(3, 3).0;
        let edge = out.image.get_pixel(9, 3).0;
        let side = out.image.get_pixel(3, 9).0;
        assert_eq!(corner, edge);
        assert_eq!(side, edge);
        assert!(edge[0] > 0 && edge[0] < 255);
    }

    #[test]
    fn test_extreme_finite_rectangles_are_clipped() {
        let mut compositor = Compositor::new((64, 48));
        let snapshot = overlay(
            vec![
                Rect::new(0.0, 0.0, 1e10, 10.0),
                Rect::new(-1e10, 5.0, 20.0, 10.0),
                Rect::new(-1e10, -1e10, 3e10, 3e10),
                Rect::new(1e30, 1e30, 5.0, 5.0),
                Rect::new(f32::MAX, 0.0, f32::MAX, 10.0),
            ],
            1e9,
            Color::new(1.0, 0.0, 0.0, 1.0),
        );
        let out = compositor.compose((64, 48), [0, 0, 0], None, &snapshot);
        assert_eq!(out.image.dimensions(), (64, 48));

        // A rectangle running off to the right still shows its left edge.
        let thin = overlay(
            vec![Rect::new(10.0, 10.0, 1e10, 20.0)],
            2.0,
            Color::new(1.0, 0.0, 0.0, 1.0),
        );
        let out = compositor.compose((64, 48), [0, 0, 0], None, &thin);
        assert_eq!(out.image.get_pixel(10, 20).0, [255, 0, 0, 255]);
        assert_eq!(out.image.get_pixel(40, 10).0, [255, 0, 0, 255]);
        assert_eq!(out.image.get_pixel(40, 20).0, [0, 0, 0, 255]);
    }

    #[test]
    fn test_stats_box_in_top_right_corner() {
        let mut compositor = Compositor::new((200, 100));
        compositor.set_stats(Some(Arc::from("Bitrate: 0.00 kb/s\nLost frames: 0")));
        let out = compositor.compose((200, 100), [255, 255, 255], None, &empty_overlay());

        // Right padding of the backdrop, clear of any glyph
        let backdrop = out.image.get_pixel(188, 8).0;
        assert!(backdrop[0] < 100 && backdrop[0] == backdrop[2], "{:?}", backdrop);
        // Outside the box: right margin, above it, and the far left
        assert_eq!(out.image.get_pixel(195, 8).0, [255, 255, 255, 255]);
        assert_eq!(out.image.get_pixel(188, 3).0, [255, 255, 255, 255]);
        assert_eq!(out.image.get_pixel(2, 50).0, [255, 255, 255, 255]);

        compositor.set_stats(None);
        let hidden = compositor.compose((200, 100), [255, 255, 255], None, &empty_overlay());
        assert_eq!(hidden.image.get_pixel(188, 8).0, [255, 255, 255, 255]);
    }

    #[test]
    fn test_rectangles_follow_video_on_resize() {
        // 16x9 video in a 160x120 reference region: placement (0, 15, 160, 90).
        let frame = solid_frame(16, 9, [0, 0, 255, 255], 3);
        let mut compositor = Compositor::new((160, 120));
        let snapshot = overlay(
            vec![Rect::new(40.0, 30.0, 40.0, 30.0)],
            1.0,
            Color::new(1.0, 0.0, 0.0, 1.0),
        );

        // Doubled region: placement (0, 30, 320, 180); top-left maps to (80, 60).
        let out = compositor.compose((320, 240), [0, 0, 0], Some(&frame), &snapshot);
        assert_eq!(out.placement, Placement { x: 0, y: 30, width: 320, height: 180 });
        assert_eq!(out.image.get_pixel(80, 60).0, [255, 0, 0, 255]);
        assert_eq!(out.image.get_pixel(160, 120).0, [255, 0, 0, 255]);
        let inside = out.image.get_pixel(120, 90).0;
        assert!(inside[2] > 200 && inside[0] < 50, "{:?}", inside);
    }

    #[test]
    fn test_scaled_frame_is_cached_per_sequence() {
        let mut compositor = Compositor::new((8, 8));
        let first = solid_frame(8, 8, [10, 10, 10, 255], 1);
        compositor.compose((8, 8), [0, 0, 0], Some(&first), &empty_overlay());

        let second = solid_frame(8, 8, [90, 90, 90, 255], 2);
        let out = compositor.compose((8, 8), [0, 0, 0], Some(&second), &empty_overlay());
        assert_eq!(out.image.get_pixel(4, 4).0, [90, 90, 90, 255]);
    }
}
