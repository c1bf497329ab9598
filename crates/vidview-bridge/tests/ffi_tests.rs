//! C ABI tests
//!
//! These drive the exported functions exactly as a C caller would. Every test
//! creates its own sessions in the process-wide registry and releases them
//! before returning.

use std::ffi::{CStr, CString};
use std::os::raw::{c_char, c_void};
use std::path::Path;
use std::ptr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgba, RgbaImage};
use pretty_assertions::assert_eq;
use vidview_bridge::ffi::*;

const WINDOW: *mut c_void = 0x1000 as *mut c_void;

const OK: i32 = 0;
const INVALID_HANDLE: i32 = -1;
const SOURCE_UNAVAILABLE: i32 = -3;
const DOUBLE_RELEASE: i32 = -4;
const INVALID_ARGUMENT: i32 = -5;

const IDLE: i32 = 0;
const STOPPED: i32 = 3;

fn create(width: f32, height: f32) -> u64 {
    let handle = vv_create_player_for_view(WINDOW, 0.0, 0.0, width, height);
    assert_ne!(handle, 0);
    handle
}

fn play(handle: u64, source: &Path) -> i32 {
    let source = CString::new(source.to_str().unwrap()).unwrap();
    vv_player_play(handle, source.as_ptr())
}

fn write_sequence(dir: &Path, colors: &[[u8; 4]]) {
    for (i, color) in colors.iter().enumerate() {
        RgbaImage::from_pixel(8, 6, Rgba(*color))
            .save(dir.join(format!("frame_{:03}.png", i)))
            .unwrap();
    }
}

fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(10));
    }
}

fn frame_size(handle: u64) -> (u32, u32) {
    let (mut width, mut height) = (0u32, 0u32);
    vv_player_copy_frame(handle, ptr::null_mut(), 0, &mut width, &mut height);
    (width, height)
}

#[test]
fn test_lifecycle_status_codes() {
    let handle = create(64.0, 48.0);
    assert_eq!(vv_player_get_state(handle), IDLE);

    // Permissive no-ops on an idle player
    assert_eq!(vv_player_pause(handle), OK);
    assert_eq!(vv_player_resume(handle), OK);
    assert_eq!(vv_player_stop(handle), OK);
    assert_eq!(vv_player_get_state(handle), IDLE);

    assert_eq!(vv_player_release(handle), OK);
    assert_eq!(vv_player_release(handle), DOUBLE_RELEASE);

    assert_eq!(vv_player_get_state(handle), INVALID_HANDLE);
    assert_eq!(vv_player_pause(handle), INVALID_HANDLE);
    assert_eq!(vv_player_clear_rectangles(handle), INVALID_HANDLE);
    assert_eq!(vv_player_set_background_color(handle, 1, 2, 3), INVALID_HANDLE);
    assert!(!vv_player_recalculate_video_center(handle));
}

#[test]
fn test_invalid_regions_fail_creation() {
    assert_eq!(vv_create_player_for_view(WINDOW, 0.0, 0.0, 0.0, 48.0), 0);
    assert_eq!(vv_create_player_for_view(WINDOW, 0.0, 0.0, 64.0, f32::NAN), 0);
    assert_eq!(vv_create_player_for_view(ptr::null_mut(), 0.0, 0.0, 64.0, 48.0), 0);
}

#[test]
fn test_update_rectangles_argument_checks() {
    let handle = create(320.0, 240.0);
    let rects = [10.0f32, 20.0, 100.0, 50.0, 200.0, 100.0, 40.0, 40.0];

    assert_eq!(
        vv_player_update_rectangles(handle, rects.as_ptr(), 2, 3.0, 0.0, 1.0, 0.0, 1.0),
        OK
    );
    assert_eq!(
        vv_player_update_rectangles(handle, rects.as_ptr(), -1, 3.0, 0.0, 1.0, 0.0, 1.0),
        INVALID_ARGUMENT
    );
    assert_eq!(
        vv_player_update_rectangles(handle, ptr::null(), 1, 3.0, 0.0, 1.0, 0.0, 1.0),
        INVALID_ARGUMENT
    );
    assert_eq!(
        vv_player_update_rectangles(handle, rects.as_ptr(), 1, 0.0, 0.0, 1.0, 0.0, 1.0),
        INVALID_ARGUMENT
    );

    let bad = [f32::INFINITY, 0.0, 10.0, 10.0];
    assert_eq!(
        vv_player_update_rectangles(handle, bad.as_ptr(), 1, 2.0, 1.0, 0.0, 0.0, 1.0),
        INVALID_ARGUMENT
    );

    // An empty replace is allowed, with or without a buffer.
    assert_eq!(
        vv_player_update_rectangles(handle, ptr::null(), 0, 2.0, 1.0, 0.0, 0.0, 1.0),
        OK
    );
    assert_eq!(vv_player_clear_rectangles(handle), OK);

    assert_eq!(vv_player_release(handle), OK);
    assert_eq!(
        vv_player_update_rectangles(handle, rects.as_ptr(), 1, 3.0, 0.0, 1.0, 0.0, 1.0),
        INVALID_HANDLE
    );
}

#[test]
fn test_play_rejects_missing_and_null_sources() {
    let handle = create(64.0, 48.0);

    assert_eq!(vv_player_play(handle, ptr::null()), INVALID_ARGUMENT);
    assert_eq!(
        play(handle, Path::new("/definitely/not/here/clip.mp4")),
        SOURCE_UNAVAILABLE
    );
    assert_eq!(vv_player_get_state(handle), IDLE);

    let mut buf = [0 as c_char; 128];
    assert!(!vv_player_get_stats(handle, buf.as_mut_ptr(), buf.len() as i32));

    assert_eq!(vv_player_release(handle), OK);
}

#[test]
fn test_corrupt_file_reports_last_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.png");
    std::fs::write(&path, b"not an image").unwrap();

    let handle = create(64.0, 48.0);
    assert!(vv_player_last_error(handle).is_null());

    // The file exists, so the open is accepted and fails in the background.
    assert_eq!(play(handle, &path), OK);
    let mut message = ptr::null_mut();
    wait_until("open failure", || {
        message = vv_player_last_error(handle);
        !message.is_null()
    });
    let text = unsafe { CStr::from_ptr(message) }.to_str().unwrap().to_string();
    vv_string_free(message);

    assert!(text.starts_with("source unavailable"), "got {:?}", text);
    assert_eq!(vv_player_get_state(handle), IDLE);
    assert_eq!(vv_player_release(handle), OK);
}

#[test]
fn test_image_sequence_stats_and_frame_copy() {
    let dir = tempfile::tempdir().unwrap();
    write_sequence(dir.path(), &[[255, 0, 0, 255], [0, 0, 255, 255]]);

    let handle = create(80.0, 60.0);
    assert_eq!(vv_player_set_background_color(handle, 300, -20, 12), OK);
    assert_eq!(play(handle, dir.path()), OK);
    wait_until("end of stream", || vv_player_get_state(handle) == STOPPED);

    let mut stats = [0 as c_char; 256];
    assert!(vv_player_get_stats(handle, stats.as_mut_ptr(), stats.len() as i32));
    let text = unsafe { CStr::from_ptr(stats.as_ptr()) }.to_str().unwrap();
    assert!(text.starts_with("Bitrate: "), "got {:?}", text);
    assert!(text.contains("Decoded frames: 2"), "got {:?}", text);

    // Too small a buffer still gets a terminated prefix.
    let mut tiny = [0x7f as c_char; 8];
    assert!(vv_player_get_stats(handle, tiny.as_mut_ptr(), tiny.len() as i32));
    assert_eq!(unsafe { CStr::from_ptr(tiny.as_ptr()) }.to_str().unwrap(), "Bitrate");

    wait_until("surface", || frame_size(handle) == (80, 60));
    let (mut width, mut height) = (0u32, 0u32);
    let mut small = vec![0u8; 16];
    assert_eq!(
        vv_player_copy_frame(handle, small.as_mut_ptr(), small.len(), &mut width, &mut height),
        INVALID_ARGUMENT
    );
    assert_eq!((width, height), (80, 60));

    let mut pixels = vec![0u8; (width * height * 4) as usize];
    wait_until("last image", || {
        assert_eq!(
            vv_player_copy_frame(handle, pixels.as_mut_ptr(), pixels.len(), &mut width, &mut height),
            OK
        );
        let center = ((30 * width + 40) * 4) as usize;
        pixels[center + 2] > 200 && pixels[center] < 50
    });

    // 8x6 fits 80x60 exactly, so no background shows; the clamp is checked
    // by a resize that letterboxes.
    assert_eq!(vv_player_set_region(handle, 0.0, 0.0, 160.0, 60.0), OK);
    wait_until("resized surface", || frame_size(handle) == (160, 60));
    let mut wide = vec![0u8; 160 * 60 * 4];
    wait_until("pillarbox", || {
        vv_player_copy_frame(handle, wide.as_mut_ptr(), wide.len(), &mut width, &mut height);
        wide[..4] == [255, 0, 12, 255]
    });

    assert_eq!(vv_player_set_region(handle, 0.0, 0.0, 0.0, 60.0), INVALID_ARGUMENT);
    assert!(vv_player_recalculate_video_center(handle));
    assert_eq!(vv_player_release(handle), OK);
}

#[test]
fn test_stats_display_box() {
    let handle = create(200.0, 100.0);
    assert_eq!(vv_player_set_background_color(handle, 255, 255, 255), OK);

    assert_eq!(vv_player_update_stats_display(handle, ptr::null(), true), INVALID_ARGUMENT);
    let text = CString::new("FPS: 25\nBitrate: 512 kb/s").unwrap();
    assert_eq!(vv_player_update_stats_display(handle, text.as_ptr(), true), OK);

    let (mut width, mut height) = (0u32, 0u32);
    let mut pixels = vec![0u8; 200 * 100 * 4];
    let pixel = |pixels: &[u8], x: usize, y: usize| {
        let at = (y * 200 + x) * 4;
        [pixels[at], pixels[at + 1], pixels[at + 2]]
    };
    wait_until("statistics box", || {
        vv_player_copy_frame(handle, pixels.as_mut_ptr(), pixels.len(), &mut width, &mut height)
            == OK
            && (width, height) == (200, 100)
            && pixel(&pixels, 188, 8)[0] < 100
    });
    assert_eq!(pixel(&pixels, 2, 50), [255, 255, 255]);

    // Hiding ignores the text pointer.
    assert_eq!(vv_player_update_stats_display(handle, ptr::null(), false), OK);
    wait_until("hidden statistics box", || {
        vv_player_copy_frame(handle, pixels.as_mut_ptr(), pixels.len(), &mut width, &mut height);
        pixel(&pixels, 188, 8) == [255, 255, 255]
    });

    assert_eq!(vv_player_release(handle), OK);
    assert_eq!(vv_player_update_stats_display(handle, text.as_ptr(), true), INVALID_HANDLE);
}

static CALLBACK_FRAMES: AtomicU64 = AtomicU64::new(0);

extern "C" fn count_frames(user_data: *mut c_void, pixels: *const u8, width: u32, height: u32) {
    assert!(!pixels.is_null());
    assert_eq!((width, height), (32, 24));
    let counter = unsafe { &*(user_data as *const AtomicU64) };
    counter.fetch_add(1, Ordering::SeqCst);
}

#[test]
fn test_callback_receives_frames_until_release() {
    let user_data = &CALLBACK_FRAMES as *const AtomicU64 as *mut c_void;
    let handle = vv_create_player_with_callback(
        WINDOW,
        10.0,
        10.0,
        32.0,
        24.0,
        Some(count_frames),
        user_data,
    );
    assert_ne!(handle, 0);

    let rects = [4.0f32, 4.0, 8.0, 8.0];
    assert_eq!(
        vv_player_update_rectangles(handle, rects.as_ptr(), 1, 2.0, 1.0, 0.0, 0.0, 1.0),
        OK
    );
    wait_until("callback", || CALLBACK_FRAMES.load(Ordering::SeqCst) > 0);

    assert_eq!(vv_player_release(handle), OK);
    let after_release = CALLBACK_FRAMES.load(Ordering::SeqCst);
    assert_eq!(
        vv_player_update_rectangles(handle, rects.as_ptr(), 1, 2.0, 0.0, 1.0, 0.0, 1.0),
        INVALID_HANDLE
    );
    thread::sleep(Duration::from_millis(150));
    assert_eq!(CALLBACK_FRAMES.load(Ordering::SeqCst), after_release);
}

#[test]
fn test_create_with_config() {
    let bad = CString::new(r#"{"presentation_fps": -1}"#).unwrap();
    assert_eq!(
        vv_create_player_with_config(WINDOW, 0.0, 0.0, 64.0, 48.0, bad.as_ptr()),
        0
    );
    let unknown = CString::new(r#"{"volume": 3}"#).unwrap();
    assert_eq!(
        vv_create_player_with_config(WINDOW, 0.0, 0.0, 64.0, 48.0, unknown.as_ptr()),
        0
    );

    let config = CString::new(r#"{"background": [0, 0, 255], "presentation_fps": 60}"#).unwrap();
    let handle = vv_create_player_with_config(WINDOW, 0.0, 0.0, 16.0, 8.0, config.as_ptr());
    assert_ne!(handle, 0);

    let (mut width, mut height) = (0u32, 0u32);
    let mut pixels = vec![0u8; 16 * 8 * 4];
    wait_until("background", || {
        vv_player_copy_frame(handle, pixels.as_mut_ptr(), pixels.len(), &mut width, &mut height)
            == OK
            && (width, height) == (16, 8)
    });
    assert_eq!(&pixels[..4], &[0, 0, 255, 255]);
    assert_eq!(vv_player_release(handle), OK);

    let defaults = vv_create_player_with_config(WINDOW, 0.0, 0.0, 16.0, 8.0, ptr::null());
    assert_ne!(defaults, 0);
    assert_eq!(vv_player_release(defaults), OK);
}

#[test]
fn test_logging_init_is_repeatable() {
    vv_init_logging();
    vv_init_logging();
}
