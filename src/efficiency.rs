//! Per-activity efficiency normalization
//!
//! Converts pooled (heart rate, speed) windows into a unitless efficiency
//! ratio. Raw efficiency is heart rate over speed (effort per unit speed,
//! lower is better); each activity is normalized against its own
//! flat-terrain baseline, which makes the ratio comparable across activities
//! and across fitness levels over time.

use statrs::statistics::Statistics;
use tracing::{debug, warn};

use crate::aggregate::{activity_windows, REQUIRED_STREAMS};
use crate::database::Database;
use crate::error::Result;
use crate::windowing::PipelineConfig;

/// Normalized efficiency for every jointly-valid window of every eligible
/// activity, concatenated in activity order.
///
/// An activity with zero flat-terrain windows has an undefined baseline; its
/// windows contribute NaN entries, which callers must filter before pooling
/// into any fit. The array is index-aligned with the output of
/// [`crate::aggregate::global_windowed_average`].
pub fn windowed_normalized_average_efficiency(
    db: &Database,
    config: &PipelineConfig,
) -> Result<Vec<f64>> {
    let activity_ids = db.activity_ids_with_streams(&REQUIRED_STREAMS)?;
    let mut normalized = Vec::new();

    for activity_id in activity_ids {
        let Some(windows) = activity_windows(db, activity_id, config)? else {
            continue;
        };

        // joint mask: a window counts only when valid in all three streams
        let mut efficiency = Vec::new();
        let mut gradient = Vec::new();
        for i in 0..windows.heart_rate.len() {
            if let (Some(hr), Some(grad), Some(spd)) =
                (windows.heart_rate[i], windows.gradient[i], windows.speed[i])
            {
                efficiency.push(hr / spd);
                gradient.push(grad);
            }
        }

        let flat: Vec<f64> = efficiency
            .iter()
            .zip(&gradient)
            .filter(|(_, &grad)| grad.abs() < config.flat_gradient_limit)
            .map(|(&eff, _)| eff)
            .collect();
        // empty flat set gives a NaN baseline; kept as NaN rather than
        // silently dropping the activity so array alignment with the pooled
        // gradient windows survives
        let baseline = Statistics::mean(&flat);
        if !baseline.is_finite() {
            warn!(activity_id, "no flat-terrain windows, baseline undefined");
        } else {
            debug!(activity_id, baseline, windows = efficiency.len(), "normalized activity");
        }
        normalized.extend(efficiency.iter().map(|eff| eff / baseline));
    }
    Ok(normalized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Activity, Sample, SportType, StreamType};
    use chrono::NaiveDate;

    fn test_db(ids: &[i64]) -> Database {
        let db = Database::open_in_memory().unwrap();
        for &id in ids {
            db.upsert_activity(&Activity::new(
                id,
                NaiveDate::from_ymd_opt(2025, 6, 29)
                    .unwrap()
                    .and_hms_opt(9, 0, 0)
                    .unwrap(),
                SportType::Run,
            ))
            .unwrap();
        }
        db
    }

    fn seed_activity(db: &Database, id: i64, hr: &[f64], grade: &[f64], speed_ms: &[f64]) {
        let time: Vec<Sample> = (0..hr.len()).map(|t| Some(t as f64)).collect();
        let wrap = |v: &[f64]| v.iter().copied().map(Some).collect::<Vec<Sample>>();
        db.insert_stream(id, StreamType::Time, &time).unwrap();
        db.insert_stream(id, StreamType::Heartrate, &wrap(hr)).unwrap();
        db.insert_stream(id, StreamType::GradeSmooth, &wrap(grade)).unwrap();
        db.insert_stream(id, StreamType::VelocitySmooth, &wrap(speed_ms)).unwrap();
    }

    #[test]
    fn test_flat_activity_normalizes_to_unity() {
        let db = test_db(&[1]);
        // uniformly flat activity: every window equals its own baseline
        seed_activity(&db, 1, &[150.0; 180], &[0.0; 180], &[3.0; 180]);

        let normalized =
            windowed_normalized_average_efficiency(&db, &PipelineConfig::default()).unwrap();
        assert_eq!(normalized.len(), 3);
        for value in normalized {
            assert!((value - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_normalization_is_per_activity() {
        let db = test_db(&[1, 2]);
        // same terrain, very different absolute efficiency; both normalize
        // onto the same scale because each supplies its own baseline
        seed_activity(&db, 1, &[150.0; 120], &[0.0; 120], &[3.0; 120]);
        seed_activity(&db, 2, &[170.0; 120], &[0.0; 120], &[3.4; 120]);

        let normalized =
            windowed_normalized_average_efficiency(&db, &PipelineConfig::default()).unwrap();
        assert_eq!(normalized.len(), 4);
        for value in normalized {
            assert!((value - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_uphill_windows_scale_against_flat_baseline() {
        let db = test_db(&[1]);
        // chunk 0 flat, chunk 1 uphill at the same speed but +10% HR
        let hr: Vec<f64> = (0..120)
            .map(|i| if i < 60 { 150.0 } else { 165.0 })
            .collect();
        let grade: Vec<f64> = (0..120).map(|i| if i < 60 { 0.0 } else { 8.0 }).collect();
        seed_activity(&db, 1, &hr, &grade, &[3.0; 120]);

        let normalized =
            windowed_normalized_average_efficiency(&db, &PipelineConfig::default()).unwrap();
        assert_eq!(normalized.len(), 2);
        assert!((normalized[0] - 1.0).abs() < 1e-12);
        assert!((normalized[1] - 1.1).abs() < 1e-12);
    }

    #[test]
    fn test_degenerate_baseline_yields_nan_entries() {
        let db = test_db(&[1]);
        // every window is steep: no flat baseline exists
        seed_activity(&db, 1, &[150.0; 120], &[10.0; 120], &[3.0; 120]);

        let normalized =
            windowed_normalized_average_efficiency(&db, &PipelineConfig::default()).unwrap();
        assert_eq!(normalized.len(), 2);
        assert!(normalized.iter().all(|value| value.is_nan()));
    }

    #[test]
    fn test_alignment_with_pooled_gradient() {
        let db = test_db(&[1, 2]);
        seed_activity(&db, 1, &[150.0; 120], &[0.0; 120], &[3.0; 120]);
        seed_activity(&db, 2, &[160.0; 60], &[10.0; 60], &[3.2; 60]);

        let config = PipelineConfig::default();
        let pooled = crate::aggregate::global_windowed_average(&db, &config).unwrap();
        let normalized = windowed_normalized_average_efficiency(&db, &config).unwrap();
        assert_eq!(pooled.len(), normalized.len());
        // activity 2 has no flat windows: its slot is NaN at the index whose
        // pooled gradient is the steep one
        assert_eq!(pooled.gradient[2], 10.0);
        assert!(normalized[2].is_nan());
        assert!(normalized[0].is_finite());
    }
}
