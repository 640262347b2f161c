//! Spectrum analysis helpers: bin reordering, band averages and signal runs.

/// Reorder unshifted FFT output so index 0 is the lowest frequency.
///
/// Bin `j` of the result sits at `(j - n/2)` bins from the centre.
pub fn fft_shift(input: &[f32], output: &mut Vec<f32>) {
    let split = input.len() - input.len() / 2;
    output.clear();
    output.extend_from_slice(&input[split..]);
    output.extend_from_slice(&input[..split]);
}

/// Moving mean over `width` bins centred on each bin.
///
/// Near either edge the window is shifted inward so it always spans `width`
/// bins (or the whole spectrum when that is shorter).
#[must_use]
pub fn band_average(spectrum: &[f32], width: usize) -> Vec<f32> {
    let n = spectrum.len();
    let width = width.max(1);

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0.0f64);
    let mut total = 0.0f64;
    for &x in spectrum {
        total += f64::from(x);
        prefix.push(total);
    }

    (0..n)
        .map(|j| {
            let lo = j.saturating_sub(width / 2).min(n.saturating_sub(width));
            let hi = (lo + width).min(n);
            ((prefix[hi] - prefix[lo]) / (hi - lo) as f64) as f32
        })
        .collect()
}

/// Contiguous bins where the narrow band exceeds the coarse band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HotRun {
    /// First bin of the run
    pub start: usize,
    /// Number of bins in the run
    pub len: usize,
    /// Bin of the run with the highest `levels` value
    pub peak: usize,
}

/// Find runs of bins in `range` where `narrow - coarse > threshold`.
///
/// The peak of each run is picked on `levels`, normally the unsmoothed
/// spectrum, since the narrow average is flat across its own width.
#[must_use]
pub fn hot_runs(
    narrow: &[f32],
    coarse: &[f32],
    levels: &[f32],
    threshold: f32,
    range: std::ops::Range<usize>,
) -> Vec<HotRun> {
    let mut runs = Vec::new();
    let mut current: Option<HotRun> = None;

    for j in range {
        if narrow[j] - coarse[j] > threshold {
            match current.as_mut() {
                Some(run) => {
                    run.len += 1;
                    if levels[j] > levels[run.peak] {
                        run.peak = j;
                    }
                }
                None => current = Some(HotRun { start: j, len: 1, peak: j }),
            }
        } else if let Some(run) = current.take() {
            runs.push(run);
        }
    }
    runs.extend(current);
    runs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fft_shift_even_and_odd() {
        let mut out = Vec::new();
        fft_shift(&[0.0, 1.0, 2.0, 3.0], &mut out);
        assert_eq!(out, [2.0, 3.0, 0.0, 1.0]);

        // Odd length: bins 0..=2 positive, 3..=4 negative
        fft_shift(&[0.0, 1.0, 2.0, 3.0, 4.0], &mut out);
        assert_eq!(out, [3.0, 4.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_band_average_centred_and_clamped() {
        let spectrum = [0.0, 0.0, 9.0, 0.0, 0.0, 0.0];
        let avg = band_average(&spectrum, 3);
        assert_eq!(avg[2], 3.0);
        assert_eq!(avg[1], 3.0);
        assert_eq!(avg[3], 3.0);
        assert_eq!(avg[4], 0.0);
        // Left edge window is [0, 3)
        assert_eq!(avg[0], 3.0);
        // Right edge window is [3, 6)
        assert_eq!(avg[5], 0.0);

        let spectrum = [0.0, 0.0, 0.0, 0.0, 0.0, 9.0];
        let avg = band_average(&spectrum, 3);
        assert_eq!(avg[5], 3.0);
        assert_eq!(avg[4], 3.0);
        assert_eq!(avg[3], 0.0);
        assert_eq!(avg[0], 0.0);
    }

    #[test]
    fn test_band_average_edges_are_symmetric() {
        let left = [8.0, 4.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let right: Vec<f32> = left.iter().rev().copied().collect();
        let avg_left = band_average(&left, 4);
        let mut avg_right = band_average(&right, 4);
        avg_right.reverse();
        assert_eq!(avg_left[0], avg_right[0]);
        assert_eq!(avg_left[1], avg_right[1]);
        assert_eq!(avg_left[0], 3.0);
    }

    #[test]
    fn test_band_average_wider_than_spectrum() {
        let spectrum = [1.0, 2.0, 3.0];
        assert_eq!(band_average(&spectrum, 10), vec![2.0; 3]);
    }

    #[test]
    fn test_band_average_width_one_is_identity() {
        let spectrum = [1.0, -2.0, 5.5];
        assert_eq!(band_average(&spectrum, 1), spectrum.to_vec());
        assert_eq!(band_average(&spectrum, 0), spectrum.to_vec());
    }

    #[test]
    fn test_hot_runs() {
        let narrow = [0.0, 5.0, 7.0, 6.0, 0.0, 0.0, 9.0, 9.5];
        let coarse = [0.0; 8];
        let runs = hot_runs(&narrow, &coarse, &narrow, 3.0, 0..8);
        assert_eq!(
            runs,
            vec![
                HotRun { start: 1, len: 3, peak: 2 },
                HotRun { start: 6, len: 2, peak: 7 },
            ]
        );

        // Restricting the range truncates runs at its edge
        let runs = hot_runs(&narrow, &coarse, &narrow, 3.0, 2..7);
        assert_eq!(
            runs,
            vec![
                HotRun { start: 2, len: 2, peak: 2 },
                HotRun { start: 6, len: 1, peak: 6 },
            ]
        );
    }
}
