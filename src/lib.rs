// Library interface for the runtrend modules
// This allows integration tests to access the core pipeline

pub mod aggregate;
pub mod config;
pub mod database;
pub mod efficiency;
pub mod error;
pub mod gap;
pub mod import;
pub mod logging;
pub mod models;
pub mod regression;
pub mod trends;
pub mod windowing;

// Re-export commonly used types for convenience
pub use aggregate::{global_windowed_average, PooledWindows};
pub use config::AppConfig;
pub use database::Database;
pub use efficiency::windowed_normalized_average_efficiency;
pub use error::{Result, RunTrendError};
pub use gap::{fit_gap_model, GapFit, GapMethod, GapModel};
pub use logging::{LogConfig, LogFormat, LogLevel};
pub use models::{Activity, SportType, StreamType};
pub use windowing::{windowed_average, PipelineConfig, WindowParams};
