//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Dimensions after bounding the width to `max_width`, keeping aspect ratio.
///
/// Returns `None` when the image already fits and no resize is needed.
///
/// # Examples
/// ```
/// # use notion_hugo::imaging::calculate_bounded_dimensions;
/// assert_eq!(calculate_bounded_dimensions((3840, 2160), 1920), Some((1920, 1080)));
/// assert_eq!(calculate_bounded_dimensions((800, 600), 1920), None);
/// ```
pub fn calculate_bounded_dimensions(source: (u32, u32), max_width: u32) -> Option<(u32, u32)> {
    let (src_w, src_h) = source;
    if max_width == 0 || src_w <= max_width {
        return None;
    }
    let ratio = max_width as f64 / src_w as f64;
    let height = ((src_h as f64 * ratio).round() as u32).max(1);
    Some((max_width, height))
}
