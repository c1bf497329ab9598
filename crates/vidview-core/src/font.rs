//! Font lookup for the statistics box

use std::path::{Path, PathBuf};

use ab_glyph::FontVec;

/// Monospace fonts tried in order when none is configured
const SYSTEM_FONTS: &[&str] = &[
    "C:/Windows/Fonts/consolab.ttf",
    "C:/Windows/Fonts/consola.ttf",
    "/System/Library/Fonts/Menlo.ttc",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono-Bold.ttf",
    "/usr/share/fonts/truetype/dejavu/DejaVuSansMono.ttf",
    "/usr/share/fonts/TTF/DejaVuSansMono.ttf",
    "/usr/share/fonts/dejavu-sans-mono-fonts/DejaVuSansMono.ttf",
];

/// Load the configured font, falling back to the system list.
///
/// Returns `None` when nothing usable is found; the caller then draws the
/// backdrop without glyphs.
pub fn load(configured: Option<&Path>) -> Option<FontVec> {
    let candidates = configured
        .map(Path::to_path_buf)
        .into_iter()
        .chain(SYSTEM_FONTS.iter().map(PathBuf::from));

    for path in candidates {
        let Ok(bytes) = std::fs::read(&path) else {
            continue;
        };
        match FontVec::try_from_vec(bytes) {
            Ok(font) => {
                tracing::debug!("statistics font {}", path.display());
                return Some(font);
            }
            Err(e) => tracing::warn!("unusable font {}: {}", path.display(), e),
        }
    }
    tracing::warn!("no font found for the statistics box, drawing it without text");
    None
}
