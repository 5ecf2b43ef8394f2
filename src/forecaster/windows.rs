//! Supervised example construction from telemetry windows.
//!
//! A feature vector is the channel-major concatenation of the last 6
//! samples over 5 channels (temperature 1-3, acid flow, current): 30
//! scalars. The label is the primary temperature at the following
//! sample. Missing values inside the window are fed as 0; a missing
//! label skips the example entirely rather than imputing it.

use crate::config::defaults::{FORECAST_CHANNELS, FORECAST_WINDOW};
use crate::types::ProcessSample;

/// Channel values of one sample, in feature order.
fn channels(sample: &ProcessSample) -> [Option<f64>; FORECAST_CHANNELS] {
    [
        sample.temperature_1,
        sample.temperature_2,
        sample.temperature_3,
        sample.acid_flow,
        sample.current_value,
    ]
}

/// Feature vector for one window of exactly [`FORECAST_WINDOW`] samples.
///
/// Channel-major: all six values of channel 1, then channel 2, and so on.
pub fn window_features(window: &[ProcessSample]) -> Vec<f64> {
    debug_assert_eq!(window.len(), FORECAST_WINDOW);
    let mut features = Vec::with_capacity(FORECAST_WINDOW * FORECAST_CHANNELS);
    for channel in 0..FORECAST_CHANNELS {
        for sample in window {
            features.push(channels(sample)[channel].unwrap_or(0.0));
        }
    }
    features
}

/// Build the supervised training set from an ordered telemetry slice.
///
/// A slice of length n with every label present yields n − 7 examples.
pub fn build_examples(samples: &[ProcessSample]) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut features = Vec::new();
    let mut labels = Vec::new();

    for i in FORECAST_WINDOW..samples.len() {
        let Some(next) = samples.get(i + 1) else {
            break;
        };
        let Some(label) = next.temperature_1 else {
            continue;
        };
        features.push(window_features(&samples[i + 1 - FORECAST_WINDOW..=i]));
        labels.push(label);
    }

    (features, labels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;

    fn sample(minute: u32, temp1: Option<f64>) -> ProcessSample {
        let ts = NaiveDateTime::parse_from_str("2024-03-15 08:00:00", "%Y-%m-%d %H:%M:%S")
            .unwrap()
            + chrono::Duration::minutes(minute as i64);
        let mut s = ProcessSample::empty(ts);
        s.temperature_1 = temp1;
        s.temperature_2 = temp1.map(|t| t - 1.0);
        s.acid_flow = Some(1.0);
        s
    }

    fn full_series(len: u32) -> Vec<ProcessSample> {
        (0..len).map(|i| sample(i, Some(80.0 + i as f64))).collect()
    }

    #[test]
    fn test_example_count_is_len_minus_seven() {
        assert_eq!(build_examples(&full_series(8)).0.len(), 1);
        assert_eq!(build_examples(&full_series(20)).0.len(), 13);
        assert_eq!(build_examples(&full_series(107)).0.len(), 100);
    }

    #[test]
    fn test_too_short_series_yields_nothing() {
        let (x, y) = build_examples(&full_series(7));
        assert!(x.is_empty());
        assert!(y.is_empty());
    }

    #[test]
    fn test_feature_vector_is_channel_major() {
        let series = full_series(8);
        let (x, y) = build_examples(&series);
        assert_eq!(x[0].len(), 30);

        // Window covers samples 1..=6 (temp1 = 81..=86), label is sample 7
        assert_eq!(&x[0][0..6], &[81.0, 82.0, 83.0, 84.0, 85.0, 86.0]);
        // Second channel (temperature_2) follows in one block
        assert_eq!(&x[0][6..12], &[80.0, 81.0, 82.0, 83.0, 84.0, 85.0]);
        assert_eq!(y[0], 87.0);
    }

    #[test]
    fn test_missing_window_values_become_zero() {
        let mut series = full_series(8);
        series[3].temperature_1 = None;
        let (x, _) = build_examples(&series);
        // temperature_3 was never set: its whole block is zeros
        assert_eq!(&x[0][12..18], &[0.0; 6]);
        // The gap inside temperature_1 is zero-filled, not imputed
        assert_eq!(x[0][2], 0.0);
    }

    #[test]
    fn test_missing_label_skips_example() {
        let mut series = full_series(20);
        series[10].temperature_1 = None;
        let (x, y) = build_examples(&series);
        // One label lost; windows that merely contain the gap survive
        assert_eq!(x.len(), 12);
        assert!(y.iter().all(|l| *l != 0.0));
    }
}
