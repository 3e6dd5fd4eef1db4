//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the media store (which decides which downloads get
//! optimized) and the [`backend`](super::backend) (which does the pixel work),
//! so tests can swap in a mock backend without touching download logic.
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100, default 85). Clamped on construction.
//! - [`OptimizeParams`]: one optimize pass (paths, width bound, quality, background).

use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(85)
    }
}

/// Parameters for an optimize pass: flatten transparency, bound the width,
/// re-encode as JPEG.
///
/// `source` and `output` may be the same path; the image is fully decoded
/// before the output is written.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeParams {
    pub source: PathBuf,
    pub output: PathBuf,
    /// Images wider than this are downscaled. `0` disables resizing.
    pub max_width: u32,
    pub quality: Quality,
    /// RGB color transparent pixels are composited onto.
    pub background: [u8; 3],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_85() {
        assert_eq!(Quality::default().value(), 85);
    }
}
