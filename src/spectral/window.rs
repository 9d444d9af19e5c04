//! Segment tapering.

use std::f64::consts::PI;

/// Periodic Tukey window of length `n`.
///
/// `alpha` is the tapered fraction: 0 gives a rectangle, 1 a Hann window.
pub fn tukey(n: usize, alpha: f64) -> Vec<f64> {
    if n == 0 {
        return Vec::new();
    }
    if alpha <= 0.0 {
        return vec![1.0; n];
    }
    // periodic: build n + 1 symmetric points and drop the last
    let m = n + 1;
    let alpha = alpha.min(1.0);
    let width = alpha * (m - 1) as f64 / 2.0;
    let last = (m - 1) as f64;
    (0..n)
        .map(|i| {
            let x = i as f64;
            if x < width {
                0.5 * (1.0 + (PI * (x / width - 1.0)).cos())
            } else if x > last - width {
                0.5 * (1.0 + (PI * ((x - last) / width + 1.0)).cos())
            } else {
                1.0
            }
        })
        .collect()
}
