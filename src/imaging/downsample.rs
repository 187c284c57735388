//! Downsample factor and fit computations

/// Largest power-of-two reduction that still covers the target bounds
///
/// Returns 1 when the source already fits. The result keeps
/// `source / factor >= target` on both axes so the final resize never
/// has to upscale.
pub fn compute_downsample_factor(
    source_width: u32,
    source_height: u32,
    target_width: u32,
    target_height: u32,
) -> u32 {
    let target_width = target_width.max(1);
    let target_height = target_height.max(1);
    let mut factor = 1u32;

    if source_height > target_height || source_width > target_width {
        let half_height = source_height / 2;
        let half_width = source_width / 2;

        while half_height / factor >= target_height
            && half_width / factor >= target_width
            && factor < (1 << 16)
        {
            factor *= 2;
        }
    }

    factor
}

/// Dimensions of `width x height` scaled to fit inside the target,
/// preserving aspect ratio and never upscaling
pub fn fit_within(width: u32, height: u32, target_width: u32, target_height: u32) -> (u32, u32) {
    if width <= target_width && height <= target_height {
        return (width, height);
    }

    let scale = f64::min(
        target_width as f64 / width as f64,
        target_height as f64 / height as f64,
    );
    let w = ((width as f64 * scale).round() as u32).clamp(1, target_width.max(1));
    let h = ((height as f64 * scale).round() as u32).clamp(1, target_height.max(1));
    (w, h)
}
