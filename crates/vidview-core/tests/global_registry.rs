//! Process-wide registry: init on first use, teardown on last release.
//!
//! Kept to a single test so nothing else in this binary touches the global state.

use std::sync::Arc;

use vidview_core::registry;
use vidview_core::{FrameBufferHost, PatternEngine, PlayerConfig, PlayerError, WindowRegion};

fn create() -> u64 {
    registry::create_player(
        WindowRegion::new(0x42, 0.0, 0.0, 64.0, 48.0).unwrap(),
        Arc::new(PatternEngine::default()),
        FrameBufferHost::new(),
        PlayerConfig::default(),
    )
    .unwrap()
}

#[test]
fn test_global_registry_lifecycle() {
    assert!(!registry::is_initialized());
    assert!(matches!(registry::resolve(1), Err(PlayerError::InvalidHandle)));

    let first = create();
    let second = create();
    assert!(registry::is_initialized());
    assert_eq!(registry::global().live_count(), 2);

    registry::release_player(first).unwrap();
    assert!(registry::is_initialized());
    assert_eq!(registry::release_player(first), Err(PlayerError::DoubleRelease));

    registry::release_player(second).unwrap();
    assert!(!registry::is_initialized());

    // Tombstones survive the teardown.
    assert_eq!(registry::release_player(second), Err(PlayerError::DoubleRelease));
    assert_eq!(registry::release_player(first), Err(PlayerError::DoubleRelease));
    assert!(matches!(registry::resolve(second), Err(PlayerError::InvalidHandle)));
    assert_eq!(registry::release_player(0), Err(PlayerError::InvalidHandle));
    assert_eq!(registry::release_player(u64::MAX), Err(PlayerError::InvalidHandle));

    // A fresh registry hands out new handles.
    let third = create();
    assert!(third > second);
    assert!(registry::is_initialized());
    registry::release_player(third).unwrap();
    assert!(!registry::is_initialized());
}
