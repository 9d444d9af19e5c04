//! Separable Gaussian smoothing with mirrored edges.

/// Normalized kernel, truncated at four standard deviations.
fn kernel(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as usize;
    let denom = 2.0 * sigma * sigma;
    let raw: Vec<f64> = (0..=2 * radius)
        .map(|i| {
            let d = i as f64 - radius as f64;
            (-d * d / denom).exp()
        })
        .collect();
    let total: f64 = raw.iter().sum();
    raw.into_iter().map(|v| v / total).collect()
}

/// Index into `0..len` mirroring about the edges, the edge sample repeated
/// (`d c b a | a b c d | d c b a`).
fn reflect(index: isize, len: usize) -> usize {
    let len = len as isize;
    let period = 2 * len;
    let mut i = index.rem_euclid(period);
    if i >= len {
        i = period - 1 - i;
    }
    i as usize
}

fn smooth_line(line: &[f64], kernel: &[f64]) -> Vec<f64> {
    let radius = (kernel.len() / 2) as isize;
    (0..line.len())
        .map(|i| {
            kernel
                .iter()
                .enumerate()
                .map(|(k, w)| w * line[reflect(i as isize + k as isize - radius, line.len())])
                .sum()
        })
        .collect()
}

/// Smooth a `[row][column]` grid along both axes. A non-positive sigma
/// leaves the grid unchanged.
pub fn gaussian_2d(grid: &mut [Vec<f64>], sigma: f64) {
    if sigma <= 0.0 || grid.is_empty() {
        return;
    }
    let kernel = kernel(sigma);
    let cols = grid[0].len();

    for row in grid.iter_mut() {
        *row = smooth_line(row, &kernel);
    }
    for c in 0..cols {
        let column: Vec<f64> = grid.iter().map(|row| row[c]).collect();
        for (row, v) in grid.iter_mut().zip(smooth_line(&column, &kernel)) {
            row[c] = v;
        }
    }
}
