use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Sport types the cache tracks; only running sports are imported
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SportType {
    Run,
    TrailRun,
    Other(String),
}

impl SportType {
    /// True for activities the analysis pipeline operates on
    pub fn is_running(&self) -> bool {
        matches!(self, SportType::Run | SportType::TrailRun)
    }

    pub fn as_str(&self) -> &str {
        match self {
            SportType::Run => "Run",
            SportType::TrailRun => "TrailRun",
            SportType::Other(s) => s.as_str(),
        }
    }
}

impl From<&str> for SportType {
    fn from(s: &str) -> Self {
        match s {
            "Run" => SportType::Run,
            "TrailRun" => SportType::TrailRun,
            other => SportType::Other(other.to_string()),
        }
    }
}

impl fmt::Display for SportType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The known time-series stream types, index-aligned per activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamType {
    Time,
    Distance,
    Heartrate,
    Altitude,
    Cadence,
    GradeSmooth,
    VelocitySmooth,
    Watts,
}

impl StreamType {
    /// All stream types fetched and cached per activity
    pub const ALL: [StreamType; 8] = [
        StreamType::Time,
        StreamType::Distance,
        StreamType::Heartrate,
        StreamType::Altitude,
        StreamType::Cadence,
        StreamType::GradeSmooth,
        StreamType::VelocitySmooth,
        StreamType::Watts,
    ];

    /// Tag used in the streams table and API payloads
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamType::Time => "time",
            StreamType::Distance => "distance",
            StreamType::Heartrate => "heartrate",
            StreamType::Altitude => "altitude",
            StreamType::Cadence => "cadence",
            StreamType::GradeSmooth => "grade_smooth",
            StreamType::VelocitySmooth => "velocity_smooth",
            StreamType::Watts => "watts",
        }
    }
}

impl FromStr for StreamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "time" => Ok(StreamType::Time),
            "distance" => Ok(StreamType::Distance),
            "heartrate" => Ok(StreamType::Heartrate),
            "altitude" => Ok(StreamType::Altitude),
            "cadence" => Ok(StreamType::Cadence),
            "grade_smooth" => Ok(StreamType::GradeSmooth),
            "velocity_smooth" => Ok(StreamType::VelocitySmooth),
            "watts" => Ok(StreamType::Watts),
            other => Err(format!("unknown stream type: {other}")),
        }
    }
}

impl fmt::Display for StreamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sensor sample; the upstream API emits nulls for sensor dropouts
pub type Sample = Option<f64>;

/// Cached activity record with summary metrics from the fitness API
///
/// Created once when first observed; summary fields are only ever backfilled
/// from a later detailed fetch, never overwritten; never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Upstream activity identifier, globally unique and stable across syncs
    pub id: i64,

    /// Local start date and time of the activity
    pub start_date: NaiveDateTime,

    /// Sport type label from the API
    pub sport_type: SportType,

    /// Total distance in meters
    pub distance: Option<f64>,

    /// Moving time in seconds
    pub moving_time: Option<f64>,

    /// Total elevation gain in meters
    pub total_elevation_gain: Option<f64>,

    /// Average speed in m/s
    pub average_speed: Option<f64>,

    /// Maximum speed in m/s
    pub max_speed: Option<f64>,

    /// Average cadence in steps per minute
    pub average_cadence: Option<f64>,

    /// Average power in watts
    pub average_watts: Option<f64>,

    /// Total work in kilojoules
    pub kilojoules: Option<f64>,

    /// Whether the activity carries heart-rate data
    pub has_heartrate: Option<bool>,

    /// Average heart rate in bpm
    pub average_heartrate: Option<f64>,

    /// Maximum heart rate in bpm
    pub max_heartrate: Option<f64>,

    /// Highest elevation in meters
    pub elev_high: Option<f64>,

    /// Lowest elevation in meters
    pub elev_low: Option<f64>,
}

impl Activity {
    /// Minimal record carrying only the identity fields
    pub fn new(id: i64, start_date: NaiveDateTime, sport_type: SportType) -> Self {
        Self {
            id,
            start_date,
            sport_type,
            distance: None,
            moving_time: None,
            total_elevation_gain: None,
            average_speed: None,
            max_speed: None,
            average_cadence: None,
            average_watts: None,
            kilojoules: None,
            has_heartrate: None,
            average_heartrate: None,
            max_heartrate: None,
            elev_high: None,
            elev_low: None,
        }
    }

    /// Average speed converted to km/h, if known
    pub fn average_speed_kmh(&self) -> Option<f64> {
        self.average_speed.map(|v| v * 3.6)
    }

    /// Average pace in minutes per kilometer, if speed is known and positive
    pub fn average_pace_min_per_km(&self) -> Option<f64> {
        match self.average_speed {
            Some(v) if v > 0.0 => Some(1000.0 / v / 60.0),
            _ => None,
        }
    }
}

/// A set of streams for one activity returned as a single aligned structure
///
/// All member streams share one length; sample i of every column refers to
/// the same instant. Construction fails on any length mismatch, so alignment
/// is an invariant of the type rather than a convention callers must uphold.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedStreams {
    activity_id: i64,
    len: usize,
    columns: HashMap<StreamType, Vec<Sample>>,
}

impl AlignedStreams {
    /// Build from per-type sample columns; returns the offending lengths on
    /// mismatch so the caller can report them.
    pub fn new(
        activity_id: i64,
        columns: HashMap<StreamType, Vec<Sample>>,
    ) -> Result<Self, Vec<usize>> {
        let mut lengths: Vec<usize> = columns.values().map(Vec::len).collect();
        lengths.sort_unstable();
        lengths.dedup();
        match lengths.as_slice() {
            [] | [_] => Ok(Self {
                activity_id,
                len: lengths.first().copied().unwrap_or(0),
                columns,
            }),
            _ => Err(lengths),
        }
    }

    pub fn activity_id(&self) -> i64 {
        self.activity_id
    }

    /// Shared sample count of every column
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Samples for one stream type, if it was part of the requested set
    pub fn column(&self, stream_type: StreamType) -> Option<&[Sample]> {
        self.columns.get(&stream_type).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_type_round_trip() {
        for stream_type in StreamType::ALL {
            assert_eq!(stream_type.as_str().parse::<StreamType>(), Ok(stream_type));
        }
        assert!("power_smooth".parse::<StreamType>().is_err());
    }

    #[test]
    fn test_sport_type_running_filter() {
        assert!(SportType::Run.is_running());
        assert!(SportType::TrailRun.is_running());
        assert!(!SportType::from("Ride").is_running());
    }

    #[test]
    fn test_pace_conversion() {
        let mut activity = Activity::new(
            1,
            NaiveDateTime::parse_from_str("2025-06-29 09:00:00", "%Y-%m-%d %H:%M:%S").unwrap(),
            SportType::Run,
        );
        activity.average_speed = Some(10.0 / 3.6); // 10 km/h
        assert!((activity.average_speed_kmh().unwrap() - 10.0).abs() < 1e-9);
        assert!((activity.average_pace_min_per_km().unwrap() - 6.0).abs() < 1e-9);

        activity.average_speed = Some(0.0);
        assert_eq!(activity.average_pace_min_per_km(), None);
    }

    #[test]
    fn test_aligned_streams_rejects_mismatch() {
        let mut columns = HashMap::new();
        columns.insert(StreamType::Heartrate, vec![Some(150.0), Some(151.0)]);
        columns.insert(StreamType::Time, vec![Some(0.0), Some(1.0), Some(2.0)]);
        assert_eq!(AlignedStreams::new(1, columns).unwrap_err(), vec![2, 3]);
    }

    #[test]
    fn test_aligned_streams_shared_length() {
        let mut columns = HashMap::new();
        columns.insert(StreamType::Heartrate, vec![Some(150.0), None]);
        columns.insert(StreamType::Time, vec![Some(0.0), Some(1.0)]);
        let set = AlignedStreams::new(7, columns).unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.column(StreamType::Heartrate).unwrap()[1], None);
        assert!(set.column(StreamType::Watts).is_none());
    }
}
