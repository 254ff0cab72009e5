//! Descriptive analysis of a trend frame
//!
//! Caloric efficiency, monthly body-composition changes, metric correlations
//! and a latest-value summary. These helpers read a frame produced by the
//! trend engine and never modify it.

use crate::error::ComputeError;
use crate::frame::DailyFrame;
use crate::stats::{self, Series};
use crate::types::{Column, Metric};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// Pounds per kilogram
pub const KG_TO_LBS: f64 = 2.20462;

/// Window for rolling caloric efficiency in days
pub const EFFICIENCY_WINDOW: usize = 7;

/// Plausible |kcal per lb| band for rolling ratios (exclusive)
pub const ROLLING_EFFICIENCY_BAND: (f64, f64) = (500.0, 10_000.0);

/// Plausible |kcal per lb| band for monthly ratios (inclusive)
pub const MONTHLY_EFFICIENCY_BAND: (f64, f64) = (500.0, 20_000.0);

/// One rolling caloric-efficiency observation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyPoint {
    pub date: NaiveDate,
    pub calories_per_lb: f64,
    pub net_calories: f64,
    pub weight_change_lbs: f64,
}

/// Monthly caloric efficiency
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEfficiency {
    pub year: i32,
    pub month: u32,
    pub net_calories: f64,
    pub start_weight: f64,
    pub end_weight: f64,
    pub weight_change_lbs: f64,
    pub calories_per_lb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyReport {
    /// Mean of the rolling ratios, `None` when all were filtered out
    pub avg_calories_per_lb: Option<f64>,
    pub rolling: Vec<EfficiencyPoint>,
    pub monthly: Vec<MonthlyEfficiency>,
}

/// Calories of net intake per pound of trend-weight change
pub fn caloric_efficiency(frame: &DailyFrame) -> Result<EfficiencyReport, ComputeError> {
    let weight = frame.require(Column::Trend(Metric::Weight))?;
    let net = frame.require(Column::Trend(Metric::NetCalories))?;
    let dates = frame.dates();

    let mut rolling = Vec::new();
    let mut dropped = 0usize;
    for end in EFFICIENCY_WINDOW.saturating_sub(1)..frame.len() {
        let start = end + 1 - EFFICIENCY_WINDOW;
        let window_net: Option<Vec<f64>> = net[start..=end].iter().copied().collect();
        let (Some(first), Some(last), Some(window_net)) = (weight[start], weight[end], window_net)
        else {
            continue;
        };
        if weight[start..=end].iter().any(Option::is_none) {
            continue;
        }
        let change_lbs = (last - first) * KG_TO_LBS;
        if change_lbs == 0.0 {
            continue;
        }
        let total: f64 = window_net.iter().sum();
        let ratio = total / change_lbs;
        let (lo, hi) = ROLLING_EFFICIENCY_BAND;
        if ratio.abs() > lo && ratio.abs() < hi {
            rolling.push(EfficiencyPoint {
                date: dates[end],
                calories_per_lb: ratio,
                net_calories: total,
                weight_change_lbs: change_lbs,
            });
        } else {
            dropped += 1;
        }
    }
    if dropped > 0 {
        tracing::debug!(dropped, "filtered implausible rolling efficiency ratios");
    }

    let mut monthly = Vec::new();
    for (year, month, rows) in month_groups(dates) {
        let net_total: f64 = rows.iter().filter_map(|&i| net[i]).sum();
        let weights: Vec<f64> = rows.iter().filter_map(|&i| weight[i]).collect();
        let (Some(&start_weight), Some(&end_weight)) = (weights.first(), weights.last()) else {
            continue;
        };
        let change_lbs = (end_weight - start_weight) * KG_TO_LBS;
        if change_lbs == 0.0 {
            continue;
        }
        let ratio = net_total / change_lbs;
        let (lo, hi) = MONTHLY_EFFICIENCY_BAND;
        if (lo..=hi).contains(&ratio.abs()) {
            monthly.push(MonthlyEfficiency {
                year,
                month,
                net_calories: net_total,
                start_weight,
                end_weight,
                weight_change_lbs: change_lbs,
                calories_per_lb: ratio,
            });
        }
    }

    Ok(EfficiencyReport {
        avg_calories_per_lb: stats::mean(rolling.iter().map(|p| p.calories_per_lb)),
        rolling,
        monthly,
    })
}

/// Month-over-month change in trend weight, fat mass and lean mass
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionChange {
    pub year: i32,
    pub month: u32,
    pub weight_change_kg: f64,
    pub fat_mass_change_kg: f64,
    pub lean_mass_change_kg: f64,
    /// Share of the weight change that was fat, undefined for zero change
    pub fat_ratio: Option<f64>,
    pub lean_ratio: Option<f64>,
}

/// Differences of month-end trend composition
pub fn body_composition_changes(frame: &DailyFrame) -> Result<Vec<CompositionChange>, ComputeError> {
    let weight = frame.require(Column::Trend(Metric::Weight))?;
    let fat = frame.require(Column::Trend(Metric::FatMass))?;
    let lean = frame.require(Column::Trend(Metric::LeanBodyMass))?;

    let last_in = |series: &[Option<f64>], rows: &[usize]| rows.iter().rev().find_map(|&i| series[i]);
    let month_ends: Vec<(i32, u32, Option<f64>, Option<f64>, Option<f64>)> = month_groups(frame.dates())
        .into_iter()
        .map(|(y, m, rows)| (y, m, last_in(weight, &rows), last_in(fat, &rows), last_in(lean, &rows)))
        .collect();

    let changes = month_ends
        .windows(2)
        .filter_map(|pair| {
            let (_, _, w0, f0, l0) = pair[0];
            let (year, month, w1, f1, l1) = pair[1];
            let dw = w1? - w0?;
            let df = f1? - f0?;
            let dl = l1? - l0?;
            let share = |part: f64| (dw != 0.0).then(|| part / dw);
            Some(CompositionChange {
                year,
                month,
                weight_change_kg: dw,
                fat_mass_change_kg: df,
                lean_mass_change_kg: dl,
                fat_ratio: share(df),
                lean_ratio: share(dl),
            })
        })
        .collect();
    Ok(changes)
}

fn month_groups(dates: &[NaiveDate]) -> Vec<(i32, u32, Vec<usize>)> {
    let mut groups: Vec<(i32, u32, Vec<usize>)> = Vec::new();
    for (i, date) in dates.iter().enumerate() {
        let key = (date.year(), date.month());
        if let Some((y, m, rows)) = groups.last_mut() {
            if (*y, *m) == key {
                rows.push(i);
                continue;
            }
        }
        groups.push((key.0, key.1, vec![i]));
    }
    groups
}

/// Pearson correlation between two columns with an interpretation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correlation {
    pub first: String,
    pub second: String,
    pub r: Option<f64>,
    pub interpretation: String,
}

/// Describe a correlation coefficient in words
pub fn interpret_correlation(r: Option<f64>) -> String {
    let Some(r) = r else {
        return "insufficient data".to_string();
    };
    let strength = match r.abs() {
        a if a >= 0.9 => "very strong",
        a if a >= 0.7 => "strong",
        a if a >= 0.5 => "moderate",
        a if a >= 0.3 => "weak",
        a if a >= 0.1 => "very weak",
        _ => "negligible",
    };
    let direction = if r > 0.0 {
        "positive"
    } else if r < 0.0 {
        "negative"
    } else {
        "no"
    };
    format!("{strength} {direction} correlation")
}

/// Correlate two metrics, resolving each to its trend when present
pub fn correlate(frame: &DailyFrame, first: Metric, second: Metric) -> Result<Correlation, ComputeError> {
    let a = frame
        .resolve(first)
        .ok_or_else(|| ComputeError::MissingColumn(first.to_string()))?;
    let b = frame
        .resolve(second)
        .ok_or_else(|| ComputeError::MissingColumn(second.to_string()))?;
    let r = stats::pearson(a, b);
    Ok(Correlation {
        first: first.to_string(),
        second: second.to_string(),
        r,
        interpretation: interpret_correlation(r),
    })
}

/// Standard energy-balance and composition pairs; missing columns are skipped
pub fn correlation_report(frame: &DailyFrame) -> Vec<Correlation> {
    const PAIRS: [(Metric, Metric); 7] = [
        (Metric::NetCalories, Metric::Weight),
        (Metric::CaloriesIn, Metric::Tdee),
        (Metric::Weight, Metric::FatMass),
        (Metric::Weight, Metric::LeanBodyMass),
        (Metric::FatMass, Metric::LeanBodyMass),
        (Metric::StepCount, Metric::ActiveCaloriesBurned),
        (Metric::CaloriesIn, Metric::ActiveCaloriesBurned),
    ];
    PAIRS
        .iter()
        .filter_map(|(a, b)| correlate(frame, *a, *b).ok())
        .collect()
}

/// Latest value and recent change of one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub metric: String,
    pub latest: Option<f64>,
    pub change_1d: Option<f64>,
    pub change_7d: Option<f64>,
    pub mean_90d: Option<f64>,
    pub min_90d: Option<f64>,
    pub max_90d: Option<f64>,
}

/// Summaries for the main metrics present in the frame
pub fn summarize(frame: &DailyFrame) -> Vec<MetricSummary> {
    const METRICS: [Metric; 8] = [
        Metric::Weight,
        Metric::BodyFatPercentage,
        Metric::LeanBodyMass,
        Metric::CaloriesIn,
        Metric::BasalCaloriesBurned,
        Metric::ActiveCaloriesBurned,
        Metric::NetCalories,
        Metric::Tdee,
    ];
    METRICS
        .iter()
        .filter_map(|m| {
            let values = frame.resolve(*m)?;
            let last = values.len().checked_sub(1)?;
            let at = |series: &Series| series.get(last).copied().flatten();
            let recent: Vec<f64> = values[values.len().saturating_sub(90)..]
                .iter()
                .flatten()
                .copied()
                .collect();
            Some(MetricSummary {
                metric: m.to_string(),
                latest: values[last],
                change_1d: at(&stats::diff(values, 1)),
                change_7d: at(&stats::diff(values, 7)),
                mean_90d: stats::mean(recent.iter().copied()),
                min_90d: recent.iter().copied().reduce(f64::min),
                max_90d: recent.iter().copied().reduce(f64::max),
            })
        })
        .collect()
}
