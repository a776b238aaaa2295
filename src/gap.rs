//! Grade-adjusted pace model
//!
//! Ties the pooled windows and normalized efficiency together into a fitted
//! gradient → efficiency curve, and derives from it the pace-adjustment
//! factor used to compare efforts across terrain. Flat terrain adjusts by
//! zero; positive factors mean the gradient costs more effort than flat.

use chrono::NaiveDate;
use tracing::{debug, info};

use crate::aggregate::global_windowed_average;
use crate::database::Database;
use crate::efficiency::windowed_normalized_average_efficiency;
use crate::error::{CalculationError, Result, RunTrendError};
use crate::models::StreamType;
use crate::regression::{
    fit_polynomial, fit_spline, r_squared, sort_dedup_by_abscissa, Polynomial, SmoothingSpline,
};
use crate::windowing::PipelineConfig;

/// Regression method for the gradient → efficiency curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GapMethod {
    /// Ordinary least-squares polynomial of the given degree
    Polynomial { degree: usize },
    /// Natural cubic smoothing spline; 0.0 interpolates
    Spline { smoothing: f64 },
}

impl Default for GapMethod {
    fn default() -> Self {
        GapMethod::Polynomial { degree: 2 }
    }
}

/// Fitted gradient → normalized-efficiency function
#[derive(Debug, Clone, PartialEq)]
pub enum GapModel {
    Polynomial(Polynomial),
    Spline(SmoothingSpline),
}

impl GapModel {
    /// Predicted normalized efficiency at a gradient (percent)
    pub fn evaluate(&self, gradient: f64) -> f64 {
        match self {
            GapModel::Polynomial(poly) => poly.evaluate(gradient),
            GapModel::Spline(spline) => spline.evaluate(gradient),
        }
    }

    /// Pace-adjustment factor: `model(g) / model(0) − 1`.
    ///
    /// Zero at zero gradient by definition; positive where the terrain costs
    /// more effort than flat.
    pub fn gap_factor(&self, gradient: f64) -> f64 {
        self.evaluate(gradient) / self.evaluate(0.0) - 1.0
    }
}

/// A fitted GAP model with its in-sample fit quality
#[derive(Debug, Clone, PartialEq)]
pub struct GapFit {
    pub model: GapModel,
    /// In-sample R² over the sample set the model was fitted on; no
    /// cross-validation, not a generalization guarantee
    pub r_squared: f64,
    /// Number of (gradient, efficiency) samples used for the fit
    pub sample_count: usize,
}

/// Fit the gradient → normalized-efficiency curve over the whole cache.
///
/// Pools windowed gradients and per-activity normalized efficiency, jointly
/// drops non-finite samples (degenerate baselines), and fits with the chosen
/// method. Spline mode sorts the samples by gradient and keeps the first
/// efficiency value per distinct gradient before fitting.
pub fn fit_gap_model(db: &Database, config: &PipelineConfig, method: GapMethod) -> Result<GapFit> {
    let pooled = global_windowed_average(db, config)?;
    let efficiency = windowed_normalized_average_efficiency(db, config)?;
    if pooled.len() != efficiency.len() {
        return Err(RunTrendError::Internal(format!(
            "pooled gradient and efficiency arrays disagree: {} vs {}",
            pooled.len(),
            efficiency.len()
        )));
    }

    let mut gradient = Vec::with_capacity(pooled.len());
    let mut target = Vec::with_capacity(pooled.len());
    for (grad, eff) in pooled.gradient.iter().zip(&efficiency) {
        if grad.is_finite() && eff.is_finite() {
            gradient.push(*grad);
            target.push(*eff);
        }
    }
    if gradient.is_empty() {
        return Err(CalculationError::InsufficientData {
            calculation: "GAP model fit".to_string(),
            reason: "no valid pooled windows".to_string(),
        }
        .into());
    }
    debug!(samples = gradient.len(), ?method, "fitting GAP model");

    let (model, fit_x, fit_y) = match method {
        GapMethod::Polynomial { degree } => {
            let poly = fit_polynomial(&gradient, &target, degree)?;
            (GapModel::Polynomial(poly), gradient, target)
        }
        GapMethod::Spline { smoothing } => {
            let (x, y) = sort_dedup_by_abscissa(&gradient, &target);
            let spline = fit_spline(&x, &y, smoothing)?;
            (GapModel::Spline(spline), x, y)
        }
    };

    let predictions: Vec<f64> = fit_x.iter().map(|&x| model.evaluate(x)).collect();
    let score = r_squared(&fit_y, &predictions)?;
    info!(samples = fit_x.len(), r_squared = score, "GAP model fitted");

    Ok(GapFit {
        model,
        r_squared: score,
        sample_count: fit_x.len(),
    })
}

/// Raw vs grade-adjusted pace for one activity
#[derive(Debug, Clone, PartialEq)]
pub struct GapSummary {
    pub activity_id: i64,
    /// Start date, for labeling only
    pub date: Option<NaiveDate>,
    pub mean_speed_kmh: f64,
    pub mean_adjusted_speed_kmh: f64,
}

impl GapSummary {
    pub fn mean_pace_min_per_km(&self) -> f64 {
        60.0 / self.mean_speed_kmh
    }

    pub fn mean_adjusted_pace_min_per_km(&self) -> f64 {
        60.0 / self.mean_adjusted_speed_kmh
    }
}

/// Format a decimal pace as `M:SS`
pub fn format_pace(minutes_per_km: f64) -> String {
    let whole = minutes_per_km.floor();
    let seconds = ((minutes_per_km - whole) * 60.0).round() as u32;
    if seconds == 60 {
        format!("{}:00", whole as u32 + 1)
    } else {
        format!("{}:{:02}", whole as u32, seconds)
    }
}

/// Apply a fitted model to one activity's raw samples: each speed sample is
/// scaled by the gap factor at its gradient, then both raw and adjusted
/// speeds are averaged to paces.
pub fn grade_adjusted_summary(
    db: &Database,
    model: &GapModel,
    activity_id: i64,
) -> Result<GapSummary> {
    let set = db
        .get_stream_set(
            activity_id,
            &[StreamType::VelocitySmooth, StreamType::GradeSmooth],
        )?
        .ok_or_else(|| CalculationError::InsufficientData {
            calculation: "grade-adjusted pace".to_string(),
            reason: format!("activity {activity_id} has no speed/gradient streams"),
        })?;
    let speed = set.column(StreamType::VelocitySmooth).unwrap();
    let grade = set.column(StreamType::GradeSmooth).unwrap();

    let mut speed_sum = 0.0;
    let mut adjusted_sum = 0.0;
    let mut count = 0usize;
    for (v, g) in speed.iter().zip(grade) {
        if let (Some(v), Some(g)) = (v, g) {
            let v_kmh = v * 3.6;
            speed_sum += v_kmh;
            adjusted_sum += v_kmh * (1.0 + model.gap_factor(*g));
            count += 1;
        }
    }
    if count == 0 || speed_sum <= 0.0 {
        return Err(CalculationError::InsufficientData {
            calculation: "grade-adjusted pace".to_string(),
            reason: format!("activity {activity_id} has no usable samples"),
        }
        .into());
    }

    Ok(GapSummary {
        activity_id,
        date: db.get_start_date(activity_id)?,
        mean_speed_kmh: speed_sum / count as f64,
        mean_adjusted_speed_kmh: adjusted_sum / count as f64,
    })
}
