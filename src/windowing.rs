//! Windowing engine
//!
//! Resamples one activity's raw stream into fixed-duration windows, applying
//! per-stream unit conversion and validity filtering. This is the primitive
//! the pooled GAP pipeline is built on: every window is either a mean scalar
//! or `None`, and the chunk grid is what keeps heart rate, gradient and speed
//! windows of one activity chronologically aligned with each other.

use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::debug;

use crate::database::Database;
use crate::error::{Result, RunTrendError};
use crate::models::{Sample, StreamType};

/// Default window duration in seconds
pub const DEFAULT_WINDOW_DURATION_SECS: f64 = 60.0;
/// Default within-window standard deviation threshold
pub const DEFAULT_STD_THRESHOLD: f64 = 5.0;
/// Heart rate validity range in bpm (exclusive bounds)
pub const HEART_RATE_RANGE: (f64, f64) = (130.0, 185.0);
/// Gradient validity range in percent (exclusive bounds)
pub const GRADIENT_RANGE: (f64, f64) = (-20.0, 20.0);
/// Speed validity range in km/h (exclusive bounds)
pub const SPEED_RANGE: (f64, f64) = (8.0, 20.0);
/// |gradient| below this counts as flat terrain, in percent
pub const DEFAULT_FLAT_GRADIENT_LIMIT: f64 = 5.0;
/// Mean within-window acceleration above this rejects a speed window,
/// in km/h per sample step
pub const DEFAULT_ACCELERATION_LIMIT: f64 = 0.5;

/// Tunable constants of the windowing/normalization pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Window duration in seconds
    pub window_duration_secs: f64,
    /// Within-window standard deviation threshold
    pub std_threshold: f64,
    /// Heart rate validity range in bpm
    pub heart_rate_min: f64,
    pub heart_rate_max: f64,
    /// Gradient validity range in percent
    pub gradient_min: f64,
    pub gradient_max: f64,
    /// Speed validity range in km/h
    pub speed_min: f64,
    pub speed_max: f64,
    /// |gradient| below this counts as flat terrain
    pub flat_gradient_limit: f64,
    /// Mean acceleration rejection threshold for speed windows
    pub acceleration_limit: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_duration_secs: DEFAULT_WINDOW_DURATION_SECS,
            std_threshold: DEFAULT_STD_THRESHOLD,
            heart_rate_min: HEART_RATE_RANGE.0,
            heart_rate_max: HEART_RATE_RANGE.1,
            gradient_min: GRADIENT_RANGE.0,
            gradient_max: GRADIENT_RANGE.1,
            speed_min: SPEED_RANGE.0,
            speed_max: SPEED_RANGE.1,
            flat_gradient_limit: DEFAULT_FLAT_GRADIENT_LIMIT,
            acceleration_limit: DEFAULT_ACCELERATION_LIMIT,
        }
    }
}

impl PipelineConfig {
    /// Window parameters for one of the three analysis streams
    pub fn params_for(&self, stream_type: StreamType) -> Option<WindowParams> {
        let (value_min, value_max) = match stream_type {
            StreamType::Heartrate => (self.heart_rate_min, self.heart_rate_max),
            StreamType::GradeSmooth => (self.gradient_min, self.gradient_max),
            StreamType::VelocitySmooth => (self.speed_min, self.speed_max),
            _ => return None,
        };
        Some(WindowParams {
            value_min,
            value_max,
            std_threshold: self.std_threshold,
            window_duration_secs: self.window_duration_secs,
            acceleration_limit: self.acceleration_limit,
        })
    }
}

/// Validity parameters for one `windowed_average` call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowParams {
    /// Minimum acceptable window mean (exclusive)
    pub value_min: f64,
    /// Maximum acceptable window mean (exclusive)
    pub value_max: f64,
    /// Maximum allowed population standard deviation within a window
    pub std_threshold: f64,
    /// Window duration in seconds
    pub window_duration_secs: f64,
    /// Mean acceleration rejection threshold (speed stream only)
    pub acceleration_limit: f64,
}

impl WindowParams {
    pub fn new(value_min: f64, value_max: f64) -> Self {
        Self {
            value_min,
            value_max,
            std_threshold: DEFAULT_STD_THRESHOLD,
            window_duration_secs: DEFAULT_WINDOW_DURATION_SECS,
            acceleration_limit: DEFAULT_ACCELERATION_LIMIT,
        }
    }
}

/// Resample one activity's stream into fixed-duration window means.
///
/// Output holds one entry per chunk in chronological order; rejected windows
/// and the trailing short chunk are `None`, so the output length is always
/// `ceil(samples / window_size)` and stays index-aligned with the other
/// streams' window sequences for the same activity.
///
/// An activity whose time stream cannot yield a sampling period (fewer than
/// two distinct timestamps), or whose streams are absent, undecodable or
/// misaligned, produces an empty result: the caller treats it as "activity
/// excluded from this metric", never as zero.
pub fn windowed_average(
    db: &Database,
    activity_id: i64,
    stream_type: StreamType,
    params: &WindowParams,
) -> Result<Vec<Option<f64>>> {
    let set = match db.get_stream_set(activity_id, &[stream_type, StreamType::Time]) {
        Ok(Some(set)) => set,
        Ok(None) => return Ok(Vec::new()),
        Err(RunTrendError::Stream(err)) => {
            debug!(activity_id, %stream_type, %err, "stream unusable, excluding activity");
            return Ok(Vec::new());
        }
        Err(err) => return Err(err),
    };
    // unwraps cannot fail: both members were just fetched into the set
    let time = set.column(StreamType::Time).unwrap();
    let data = set.column(stream_type).unwrap();

    let Some(window_size) = window_size_in_samples(time, params.window_duration_secs) else {
        debug!(activity_id, %stream_type, "no derivable sampling period");
        return Ok(Vec::new());
    };

    // Speed arrives in m/s; all validity bounds are expressed in km/h
    let converted: Vec<Sample>;
    let data = if stream_type == StreamType::VelocitySmooth {
        converted = data.iter().map(|s| s.map(|v| v * 3.6)).collect();
        converted.as_slice()
    } else {
        data
    };

    let mut windows = Vec::with_capacity(data.len().div_ceil(window_size));
    for chunk in data.chunks(window_size) {
        windows.push(window_mean(chunk, window_size, stream_type, params));
    }
    Ok(windows)
}

/// Window size in samples, from the duration and the derived sampling period.
///
/// The period is `time[k] - time[0]` for the first `k` with `time[k] >
/// time[0]`, which tolerates duplicated timestamps at the head of the
/// recording. Returns `None` when no period can be derived or the period
/// exceeds the window duration.
fn window_size_in_samples(time: &[Sample], window_duration_secs: f64) -> Option<usize> {
    let t0 = time.first().copied().flatten()?;
    let period = time
        .iter()
        .flatten()
        .find(|&&t| t > t0)
        .map(|&t| t - t0)?;
    let size = (window_duration_secs / period).floor() as usize;
    (size > 0).then_some(size)
}

fn window_mean(
    chunk: &[Sample],
    window_size: usize,
    stream_type: StreamType,
    params: &WindowParams,
) -> Option<f64> {
    // trailing short chunk keeps its slot but is never averaged
    if chunk.len() != window_size {
        return None;
    }
    // a null sample anywhere in the chunk makes the mean undefined; invalid
    // rather than coerced to zero
    let values: Vec<f64> = chunk.iter().copied().collect::<Option<Vec<f64>>>()?;

    let mean = Statistics::mean(&values);
    let std = Statistics::population_std_dev(&values);
    if std >= params.std_threshold || mean <= params.value_min || mean >= params.value_max {
        return None;
    }

    // Speed only: reject windows dominated by sustained acceleration
    // (downhill sprints, GPS glitches) that would bias efficiency
    if stream_type == StreamType::VelocitySmooth {
        let acceleration = discrete_gradient(&values);
        if Statistics::mean(&acceleration) > params.acceleration_limit {
            return None;
        }
    }
    Some(mean)
}

/// Discrete gradient at unit spacing: central differences in the interior,
/// one-sided at the edges
fn discrete_gradient(values: &[f64]) -> Vec<f64> {
    let n = values.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            if i == 0 {
                values[1] - values[0]
            } else if i == n - 1 {
                values[n - 1] - values[n - 2]
            } else {
                (values[i + 1] - values[i - 1]) / 2.0
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, SportType};
    use chrono::NaiveDate;

    fn test_db() -> Database {
        let db = Database::open_in_memory().unwrap();
        db.upsert_activity(&Activity::new(
            1,
            NaiveDate::from_ymd_opt(2025, 6, 29)
                .unwrap()
                .and_hms_opt(9, 0, 0)
                .unwrap(),
            SportType::Run,
        ))
        .unwrap();
        db
    }

    fn seed(db: &Database, stream_type: StreamType, values: &[f64]) {
        let samples: Vec<Sample> = values.iter().copied().map(Some).collect();
        db.insert_stream(1, stream_type, &samples).unwrap();
    }

    fn seed_time_1hz(db: &Database, len: usize) {
        seed(
            db,
            StreamType::Time,
            &(0..len).map(|t| t as f64).collect::<Vec<_>>(),
        );
    }

    #[test]
    fn test_window_count_invariant() {
        // 150 samples at 1 Hz, 60 s windows: ceil(150/60) = 3 chunks, the
        // trailing 30-sample chunk invalid
        let db = test_db();
        seed_time_1hz(&db, 150);
        seed(&db, StreamType::Heartrate, &[150.0; 150]);

        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert_eq!(windows.len(), 3);
        assert_eq!(windows[0], Some(150.0));
        assert_eq!(windows[1], Some(150.0));
        assert_eq!(windows[2], None);
    }

    #[test]
    fn test_speed_unit_conversion() {
        let db = test_db();
        seed_time_1hz(&db, 60);
        seed(&db, StreamType::VelocitySmooth, &[3.0; 60]);

        let params = WindowParams::new(8.0, 20.0);
        let windows = windowed_average(&db, 1, StreamType::VelocitySmooth, &params).unwrap();
        assert_eq!(windows.len(), 1);
        assert!((windows[0].unwrap() - 10.8).abs() < 1e-9);
    }

    #[test]
    fn test_exclusive_validity_bounds() {
        let db = test_db();
        seed_time_1hz(&db, 60);
        seed(&db, StreamType::Heartrate, &[130.0; 60]);

        // mean exactly at value_min is invalid
        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert_eq!(windows, vec![None]);

        // strictly inside the bounds with zero std is valid
        let params = WindowParams::new(129.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert_eq!(windows, vec![Some(130.0)]);
    }

    #[test]
    fn test_high_std_rejected() {
        let db = test_db();
        seed_time_1hz(&db, 60);
        // alternate 140/160: mean 150, population std 10 >= threshold 5
        let noisy: Vec<f64> = (0..60).map(|i| if i % 2 == 0 { 140.0 } else { 160.0 }).collect();
        seed(&db, StreamType::Heartrate, &noisy);

        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert_eq!(windows, vec![None]);
    }

    #[test]
    fn test_sustained_acceleration_rejected() {
        let db = test_db();
        seed_time_1hz(&db, 60);
        // steady ramp of 0.1 km/h per sample; mean and std stay inside the
        // plain validity bounds so only the acceleration rule can reject it
        let ramp: Vec<f64> = (0..60).map(|i| (12.0 + 0.1 * i as f64) / 3.6).collect();
        seed(&db, StreamType::VelocitySmooth, &ramp);

        let mut params = WindowParams::new(8.0, 20.0);
        params.acceleration_limit = 0.05;
        let windows = windowed_average(&db, 1, StreamType::VelocitySmooth, &params).unwrap();
        assert_eq!(windows, vec![None]);

        // same ramp passes with the default 0.5 km/h limit
        params.acceleration_limit = DEFAULT_ACCELERATION_LIMIT;
        let windows = windowed_average(&db, 1, StreamType::VelocitySmooth, &params).unwrap();
        assert!(windows[0].is_some());
    }

    #[test]
    fn test_null_sample_invalidates_chunk() {
        let db = test_db();
        seed_time_1hz(&db, 120);
        let mut samples: Vec<Sample> = vec![Some(150.0); 120];
        samples[10] = None; // dropout inside the first chunk only
        db.insert_stream(1, StreamType::Heartrate, &samples).unwrap();

        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert_eq!(windows, vec![None, Some(150.0)]);
    }

    #[test]
    fn test_short_time_stream_yields_no_windows() {
        let db = test_db();
        // all timestamps identical: no sampling period can be derived
        seed(&db, StreamType::Time, &[7.0; 30]);
        seed(&db, StreamType::Heartrate, &[150.0; 30]);

        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_duplicate_leading_timestamps() {
        let db = test_db();
        // period must come from the first strictly-later timestamp (2 s here,
        // so 60 s windows hold 30 samples)
        let time: Vec<f64> = std::iter::once(0.0)
            .chain(std::iter::once(0.0))
            .chain((1..59).map(|t| t as f64 * 2.0))
            .collect();
        seed(&db, StreamType::Time, &time);
        seed(&db, StreamType::Heartrate, &[150.0; 60]);

        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert_eq!(windows, vec![Some(150.0), Some(150.0)]);
    }

    #[test]
    fn test_missing_stream_yields_no_windows() {
        let db = test_db();
        seed_time_1hz(&db, 60);

        let params = WindowParams::new(130.0, 185.0);
        let windows = windowed_average(&db, 1, StreamType::Heartrate, &params).unwrap();
        assert!(windows.is_empty());
    }

    #[test]
    fn test_discrete_gradient_matches_central_differences() {
        let grad = discrete_gradient(&[1.0, 2.0, 4.0, 7.0]);
        assert_eq!(grad, vec![1.0, 1.5, 2.5, 3.0]);
    }

    #[test]
    fn test_config_params_for() {
        let cfg = PipelineConfig::default();
        let hr = cfg.params_for(StreamType::Heartrate).unwrap();
        assert_eq!((hr.value_min, hr.value_max), HEART_RATE_RANGE);
        assert!(cfg.params_for(StreamType::Altitude).is_none());
    }
}
