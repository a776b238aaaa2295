//! Cross-activity aggregation
//!
//! Runs the windowing engine over every eligible activity for three parallel
//! streams (heart rate, gradient, speed), concatenates the window sequences
//! across activities and applies one joint validity mask, so an index
//! retained in any pooled array refers to the same activity and the same
//! chunk in all three.

use tracing::{debug, warn};

use crate::database::Database;
use crate::error::Result;
use crate::models::StreamType;
use crate::windowing::{windowed_average, PipelineConfig};

/// Stream types an activity must carry to take part in pooled analysis
pub const REQUIRED_STREAMS: [StreamType; 3] = [
    StreamType::Heartrate,
    StreamType::GradeSmooth,
    StreamType::VelocitySmooth,
];

/// Pooled valid windows across all eligible activities; the three arrays are
/// equal-length and index-aligned
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PooledWindows {
    /// Window-mean heart rate in bpm
    pub heart_rate: Vec<f64>,
    /// Window-mean gradient in percent
    pub gradient: Vec<f64>,
    /// Window-mean speed in km/h
    pub speed: Vec<f64>,
}

impl PooledWindows {
    pub fn len(&self) -> usize {
        self.gradient.len()
    }

    pub fn is_empty(&self) -> bool {
        self.gradient.is_empty()
    }
}

/// Per-activity window triple before masking, shared with the normalizer
pub(crate) struct ActivityWindows {
    pub heart_rate: Vec<Option<f64>>,
    pub gradient: Vec<Option<f64>>,
    pub speed: Vec<Option<f64>>,
}

/// Window the three analysis streams of one activity.
///
/// Returns `None` (activity skipped, never fatal) when any stream yields no
/// windows or the three window sequences disagree in length; a disagreement
/// means the raw streams were not fetched together and cannot be aligned.
pub(crate) fn activity_windows(
    db: &Database,
    activity_id: i64,
    config: &PipelineConfig,
) -> Result<Option<ActivityWindows>> {
    let window = |stream_type: StreamType| -> Result<Vec<Option<f64>>> {
        // params_for covers exactly the required streams
        let params = config.params_for(stream_type).unwrap();
        windowed_average(db, activity_id, stream_type, &params)
    };
    let heart_rate = window(StreamType::Heartrate)?;
    let gradient = window(StreamType::GradeSmooth)?;
    let speed = window(StreamType::VelocitySmooth)?;

    if heart_rate.is_empty() || heart_rate.len() != gradient.len() || gradient.len() != speed.len()
    {
        warn!(
            activity_id,
            hr_windows = heart_rate.len(),
            gradient_windows = gradient.len(),
            speed_windows = speed.len(),
            "skipping activity with unusable window sequences"
        );
        return Ok(None);
    }
    Ok(Some(ActivityWindows {
        heart_rate,
        gradient,
        speed,
    }))
}

/// Pool windowed heart rate, gradient and speed across every eligible
/// activity.
///
/// Windows are concatenated in activity order, then chronological order
/// within an activity; the joint mask then drops every index at which any of
/// the three held an invalid window, preserving index-wise correspondence.
pub fn global_windowed_average(db: &Database, config: &PipelineConfig) -> Result<PooledWindows> {
    let activity_ids = db.activity_ids_with_streams(&REQUIRED_STREAMS)?;
    debug!(eligible = activity_ids.len(), "pooling windowed streams");

    let mut heart_rate = Vec::new();
    let mut gradient = Vec::new();
    let mut speed = Vec::new();
    for activity_id in activity_ids {
        let Some(windows) = activity_windows(db, activity_id, config)? else {
            continue;
        };
        heart_rate.extend(windows.heart_rate);
        gradient.extend(windows.gradient);
        speed.extend(windows.speed);
    }

    let mut pooled = PooledWindows::default();
    for i in 0..heart_rate.len() {
        if let (Some(hr), Some(grad), Some(spd)) = (heart_rate[i], gradient[i], speed[i]) {
            pooled.heart_rate.push(hr);
            pooled.gradient.push(grad);
            pooled.speed.push(spd);
        }
    }
    Ok(pooled)
}
