use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use tabled::{Table, Tabled};

use runtrend::config::AppConfig;
use runtrend::database::Database;
use runtrend::gap::{fit_gap_model, format_pace, grade_adjusted_summary, GapMethod};
use runtrend::import::import_json;
use runtrend::logging::{init_logging, LogLevel};
use runtrend::trends::{
    hr_speed_correlation, linear_trend, monthly_distance, trend_series, GlobalStats, TrendMetric,
};

/// runtrend - Running trend and grade-adjusted pace analysis
///
/// Analyzes a local cache of running activities: global statistics, trend
/// metrics over time, and a grade-adjusted pace model fitted from raw
/// heart-rate, gradient and speed streams.
#[derive(Parser)]
#[command(name = "runtrend")]
#[command(version = "0.1.0")]
#[command(about = "Running trend and GAP analysis CLI", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the activity cache path
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an activity export file (JSON) into the cache
    Import {
        /// Export file path
        #[arg(short, long)]
        file: PathBuf,
    },

    /// Show global statistics of the cached history
    Stats,

    /// Show distance totals per calendar month
    Monthly,

    /// Show the trend of a summary metric over time
    Trends {
        /// Metric (hr, speed, pace, efficiency, elevation)
        #[arg(short, long, default_value = "speed")]
        metric: String,

        /// Elevation-gain cutoff (m) for the HR/speed correlation
        #[arg(short, long)]
        elevation_limit: Option<f64>,
    },

    /// Fit the grade-adjusted pace model
    Gap {
        /// Regression method (polynomial, spline)
        #[arg(short, long, default_value = "polynomial")]
        method: String,

        /// Polynomial degree
        #[arg(long, default_value = "2")]
        degree: usize,

        /// Spline smoothing factor (0 interpolates)
        #[arg(long, default_value = "0.0")]
        smoothing: f64,

        /// Also report raw vs grade-adjusted pace for one activity
        #[arg(short, long)]
        activity: Option<i64>,
    },
}

#[derive(Tabled)]
struct KeyValueRow {
    name: String,
    value: String,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    if cli.verbose > 0 {
        config.logging.level = LogLevel::from_verbosity(cli.verbose);
    }
    init_logging(&config.logging)?;
    if let Some(path) = cli.database {
        config.database.path = path;
    }
    if let Some(parent) = config.database.path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::new(&config.database.path)
        .with_context(|| format!("opening cache {}", config.database.path.display()))?;

    match cli.command {
        Commands::Import { file } => {
            println!("{}", "Importing activity export...".green().bold());
            let summary = import_json(&db, &file)?;
            println!(
                "  imported: {}  skipped (sport): {}  failed: {}",
                summary.imported, summary.skipped_sport, summary.failed
            );
            println!("{}", "✓ Import completed".green());
        }

        Commands::Stats => {
            let stats = GlobalStats::collect(&db)?;
            let date = |d: Option<chrono::NaiveDate>| {
                d.map_or_else(|| "-".to_string(), |d| d.to_string())
            };
            let rows = vec![
                KeyValueRow {
                    name: "Activities".to_string(),
                    value: stats.activity_count.to_string(),
                },
                KeyValueRow {
                    name: "Total time (h)".to_string(),
                    value: stats.total_time_hours.to_string(),
                },
                KeyValueRow {
                    name: "Total distance (km)".to_string(),
                    value: stats.total_distance_km.to_string(),
                },
                KeyValueRow {
                    name: "First activity".to_string(),
                    value: date(stats.first_activity_date),
                },
                KeyValueRow {
                    name: "Last activity".to_string(),
                    value: date(stats.last_activity_date),
                },
            ];
            println!("{}", "Global statistics".blue().bold());
            println!("{}", Table::new(rows));
        }

        Commands::Monthly => {
            let activities = db.list_activities()?;
            let rows: Vec<KeyValueRow> = monthly_distance(&activities)
                .into_iter()
                .map(|(month, km)| KeyValueRow {
                    name: month,
                    value: format!("{km:.1}"),
                })
                .collect();
            println!("{}", "Monthly distance (km)".blue().bold());
            println!("{}", Table::new(rows));
        }

        Commands::Trends {
            metric,
            elevation_limit,
        } => {
            let metric = parse_metric(&metric)?;
            let series = trend_series(&db, metric)?;
            if series.is_empty() {
                bail!("no activities with complete summaries in the cache");
            }
            let trend = linear_trend(&series)?;
            println!("{}", format!("Trend: {}", metric.label()).cyan().bold());
            println!("  activities: {}", series.len());
            println!(
                "  {} .. {}",
                series.dates.first().unwrap(),
                series.dates.last().unwrap()
            );
            println!(
                "  slope: {:+.4} per activity (intercept {:.2})",
                trend.slope, trend.intercept
            );
            let correlation = hr_speed_correlation(&db, elevation_limit)?;
            match elevation_limit {
                Some(limit) => println!(
                    "  HR/speed correlation (elevation gain < {limit} m): {correlation:.3}"
                ),
                None => println!("  HR/speed correlation: {correlation:.3}"),
            }
        }

        Commands::Gap {
            method,
            degree,
            smoothing,
            activity,
        } => {
            let method = match method.as_str() {
                "polynomial" => GapMethod::Polynomial { degree },
                "spline" => GapMethod::Spline { smoothing },
                other => bail!("unknown method: {other} (use polynomial or spline)"),
            };
            println!("{}", "Fitting GAP model...".cyan().bold());
            let fit = fit_gap_model(&db, &config.pipeline, method)?;
            println!("  samples: {}", fit.sample_count);
            println!("  r²: {:.4}", fit.r_squared);

            let rows: Vec<KeyValueRow> = [-15.0, -10.0, -5.0, 0.0, 5.0, 10.0, 15.0]
                .iter()
                .map(|&gradient| KeyValueRow {
                    name: format!("{gradient:+.0} %"),
                    value: format!("{:+.1} %", fit.model.gap_factor(gradient) * 100.0),
                })
                .collect();
            println!("{}", "Pace adjustment by gradient".cyan());
            println!("{}", Table::new(rows));

            if let Some(activity_id) = activity {
                let summary = grade_adjusted_summary(&db, &fit.model, activity_id)?;
                let date = summary
                    .date
                    .map_or_else(|| "unknown date".to_string(), |d| d.to_string());
                println!("{}", format!("Activity {activity_id} ({date})").cyan());
                println!(
                    "  pace: {} /km   grade-adjusted: {} /km",
                    format_pace(summary.mean_pace_min_per_km()),
                    format_pace(summary.mean_adjusted_pace_min_per_km())
                );
            }
            println!("{}", "✓ GAP model fitted".cyan());
        }
    }

    Ok(())
}

fn parse_metric(name: &str) -> Result<TrendMetric> {
    Ok(match name {
        "hr" | "heartrate" => TrendMetric::HeartRate,
        "speed" => TrendMetric::Speed,
        "pace" => TrendMetric::Pace,
        "efficiency" => TrendMetric::Efficiency,
        "elevation" => TrendMetric::ElevationGain,
        other => bail!("unknown metric: {other} (use hr, speed, pace, efficiency, elevation)"),
    })
}
