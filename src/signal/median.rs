//! Trailing running median with the legacy lag and padding behavior.

use std::collections::VecDeque;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum MedianError {
    #[error("median window must be odd and non-zero, got {0}")]
    EvenWindow(usize),
    #[error("need more than {window} samples to compute a running median, have {available}")]
    InsufficientSamples { window: usize, available: usize },
}

/// Trailing running median of `values` over a `window` of odd length.
///
/// This reproduces the historical implementation exactly rather than a
/// textbook centred median, and downstream dropout thresholds are calibrated
/// against it:
///
/// - the first median is emitted one sample *after* the buffer has seen
///   `window` values, so the output lags the input by one sample;
/// - the oldest buffered value is dropped only after the following emission,
///   so the steady-state buffer holds `window + 2` values while the sorted
///   rank stays at `(window - 1) / 2`;
/// - the output is padded back to the input length with `(window - 1) / 2`
///   copies of the first median in front and one more copy than that of the
///   last median at the back.
///
/// Non-finite values are the caller's problem; they sort to the high end and
/// will skew ranks if present.
pub fn running_median(values: &[f64], window: usize) -> Result<Vec<f64>, MedianError> {
    if window == 0 || window % 2 == 0 {
        return Err(MedianError::EvenWindow(window));
    }
    if values.len() <= window {
        return Err(MedianError::InsufficientSamples {
            window,
            available: values.len(),
        });
    }

    let mid = (window - 1) / 2;
    let mut buffer: VecDeque<f64> = VecDeque::with_capacity(window + 2);
    let mut medians: Vec<f64> = Vec::with_capacity(values.len() - window);

    for (i, &v) in values.iter().enumerate() {
        buffer.push_back(v);
        if i >= window {
            let mut sorted: Vec<f64> = buffer.iter().copied().collect();
            sorted.sort_by(f64::total_cmp);
            medians.push(sorted[mid]);
        }
        if i > window {
            buffer.pop_front();
        }
    }

    let first = medians[0];
    let last = medians[medians.len() - 1];
    let mut out = Vec::with_capacity(values.len());
    out.extend(std::iter::repeat(first).take(mid));
    out.extend_from_slice(&medians);
    out.extend(std::iter::repeat(last).take(mid + 1));
    debug_assert_eq!(out.len(), values.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_length_matches_input() {
        for n in [7usize, 10, 25, 100] {
            for w in [3usize, 5] {
                if w < n {
                    let values: Vec<f64> = (0..n).map(|i| i as f64).collect();
                    let m = running_median(&values, w).expect("valid input");
                    assert_eq!(m.len(), n, "n={n} w={w}");
                }
            }
        }
    }

    #[test]
    fn ramp_reproduces_legacy_lag_and_padding() {
        // Pinned reference output for an ascending ramp 0..20 with window 5.
        // The front is padded with the
        // first median, the tail with the last, and the interior lags the
        // centred median by two samples.
        let values: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let m = running_median(&values, 5).expect("valid input");
        let expected = vec![
            2.0, 2.0, 2.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0, 11.0, 12.0, 13.0, 14.0,
            15.0, 15.0, 15.0, 15.0,
        ];
        assert_eq!(m, expected);
    }

    #[test]
    fn shuffled_sequence_matches_legacy_reference() {
        // Same fixture as above, irregular values.
        let values = vec![5.0, 1.0, 9.0, 3.0, 7.0, 2.0, 8.0, 4.0, 6.0, 0.0, 5.0, 5.0, 5.0];
        let m = running_median(&values, 5).expect("valid input");
        let expected = vec![
            3.0, 3.0, 3.0, 3.0, 3.0, 4.0, 3.0, 4.0, 4.0, 5.0, 5.0, 5.0, 5.0,
        ];
        assert_eq!(m, expected);
    }

    #[test]
    fn constant_input_is_preserved() {
        let values = vec![7.5; 30];
        let m = running_median(&values, 9).expect("valid input");
        assert!(m.iter().all(|&v| v == 7.5));
    }

    #[test]
    fn even_window_is_rejected() {
        let values = vec![0.0; 10];
        assert_eq!(running_median(&values, 4), Err(MedianError::EvenWindow(4)));
        assert_eq!(running_median(&values, 0), Err(MedianError::EvenWindow(0)));
    }

    #[test]
    fn window_not_smaller_than_input_is_rejected() {
        let values = vec![0.0; 5];
        assert_eq!(
            running_median(&values, 5),
            Err(MedianError::InsufficientSamples {
                window: 5,
                available: 5
            })
        );
    }
}
