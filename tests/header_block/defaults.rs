//! Process-wide compression default

use spdy_sans_io::{compression_default, set_compression_default, Framer, FramerConfig};

// The only test in this binary that touches the global default, so it
// cannot race with other tests reading it.
#[test]
fn test_compression_default_applies_to_new_configs() {
    assert!(compression_default());
    let before = Framer::new();

    set_compression_default(false);
    assert!(!FramerConfig::default().compression);
    assert!(!Framer::new().config().compression);
    assert!(before.config().compression);

    set_compression_default(true);
    assert!(FramerConfig::default().compression);
}
