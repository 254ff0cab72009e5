//! Weekly aggregation
//!
//! Collapses a trend frame into ISO-week aggregates used by the compliance
//! classifier and the watchdog. Only days with at least one tracked value
//! count toward a week, and weeks without such days are omitted.

use crate::energy::metabolic_adaptation;
use crate::frame::DailyFrame;
use crate::stats::{self, Series};
use crate::types::{Column, Metric, WeeklyAggregate};
use chrono::{Datelike, NaiveDate};

/// Default number of recent weeks considered
pub const DEFAULT_WEEKS_CONSIDERED: usize = 12;

/// Per-day inputs resolved from a frame
struct DailyInputs {
    cal_in: Series,
    net: Series,
    pa: Series,
    weight: Series,
    rmr: Series,
    adaptation: Series,
}

impl DailyInputs {
    fn resolve(frame: &DailyFrame) -> Self {
        let n = frame.len();
        let empty = || vec![None; n];
        let cal_in = frame
            .resolve(Metric::CaloriesIn)
            .map_or_else(empty, <[_]>::to_vec);

        let net = if let Some(net) = frame.column(Column::Trend(Metric::NetCalories)) {
            net.to_vec()
        } else if let Some(tdee) = frame.column(Column::Raw(Metric::Tdee)) {
            stats::zip_with(&cal_in, tdee, |c, t| c - t)
        } else if let (Some(basal), Some(active)) = (
            frame.resolve(Metric::BasalCaloriesBurned),
            frame.resolve(Metric::ActiveCaloriesBurned),
        ) {
            let burned = stats::zip_with(basal, active, |b, a| b + a);
            stats::zip_with(&cal_in, &burned, |c, b| c - b)
        } else {
            empty()
        };

        let pa = frame
            .column(Column::Trend(Metric::ActiveCaloriesBurned))
            .or_else(|| frame.column(Column::Raw(Metric::PhysicalActivity)))
            .map_or_else(empty, <[_]>::to_vec);

        let weight = frame
            .resolve(Metric::Weight)
            .map_or_else(empty, <[_]>::to_vec);

        let rmr = frame
            .column(Column::Raw(Metric::Rmr))
            .map_or_else(empty, <[_]>::to_vec);
        let peak_rmr = rmr.iter().flatten().copied().reduce(f64::max);
        let adaptation = rmr
            .iter()
            .map(|r| Some(metabolic_adaptation(peak_rmr?, (*r)?)))
            .collect();

        Self {
            cal_in,
            net,
            pa,
            weight,
            rmr,
            adaptation,
        }
    }

    fn has_any(&self, i: usize) -> bool {
        [&self.cal_in, &self.net, &self.pa, &self.weight, &self.rmr]
            .iter()
            .any(|s| s[i].is_some())
    }
}

/// Every populated ISO week in chronological order
pub fn build_weekly_aggregates(frame: &DailyFrame) -> Vec<WeeklyAggregate> {
    let inputs = DailyInputs::resolve(frame);
    let mut groups: Vec<((i32, u32), Vec<usize>)> = Vec::new();

    for (i, date) in frame.dates().iter().enumerate() {
        if !inputs.has_any(i) {
            continue;
        }
        let key = iso_key(*date);
        if let Some((last, rows)) = groups.last_mut() {
            if *last == key {
                rows.push(i);
                continue;
            }
        }
        groups.push((key, vec![i]));
    }

    let dates = frame.dates();
    groups
        .into_iter()
        .map(|((iso_year, iso_week), rows)| {
            let values = |s: &Series| -> Vec<f64> { rows.iter().filter_map(|&i| s[i]).collect() };
            let weights = values(&inputs.weight);
            let start_wt = weights.first().copied();
            let end_wt = weights.last().copied();

            WeeklyAggregate {
                iso_year,
                iso_week,
                week_start: dates[rows[0]],
                week_end: dates[rows[rows.len() - 1]],
                days: rows.len(),
                mean_cal_in: stats::mean(values(&inputs.cal_in)),
                mean_net_cal: stats::mean(values(&inputs.net)),
                mean_pa: stats::mean(values(&inputs.pa)),
                start_wt,
                end_wt,
                wt_change: start_wt.zip(end_wt).map(|(s, e)| e - s),
                mean_rmr: stats::mean(values(&inputs.rmr)),
                mean_adaptation: stats::mean(values(&inputs.adaptation)),
            }
        })
        .collect()
}

/// The most recent `max_weeks` populated weeks
pub fn recent_weeks(frame: &DailyFrame, max_weeks: usize) -> Vec<WeeklyAggregate> {
    let weeks = build_weekly_aggregates(frame);
    let skip = weeks.len().saturating_sub(max_weeks);
    weeks.into_iter().skip(skip).collect()
}

fn iso_key(date: NaiveDate) -> (i32, u32) {
    let week = date.iso_week();
    (week.year(), week.week())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn frame_from(start: NaiveDate, columns: Vec<(Column, Series)>) -> DailyFrame {
        let n = columns.first().map(|(_, s)| s.len()).unwrap_or(0);
        let dates = (0..n).map(|i| start + Duration::days(i as i64)).collect();
        DailyFrame::from_columns(dates, columns).unwrap()
    }

    #[test]
    fn test_groups_by_iso_week() {
        // 2024-01-01 is a Monday
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let weight: Series = (0..14).map(|i| Some(80.0 - 0.1 * i as f64)).collect();
        let net: Series = vec![Some(-500.0); 14];
        let frame = frame_from(
            start,
            vec![
                (Column::Trend(Metric::Weight), weight),
                (Column::Trend(Metric::NetCalories), net),
                (Column::Trend(Metric::ActiveCaloriesBurned), vec![Some(400.0); 14]),
            ],
        );

        let weeks = build_weekly_aggregates(&frame);
        assert_eq!(weeks.len(), 2);
        assert_eq!((weeks[0].iso_year, weeks[0].iso_week), (2024, 1));
        assert_eq!(weeks[0].days, 7);
        assert_eq!(weeks[0].week_end, NaiveDate::from_ymd_opt(2024, 1, 7).unwrap());
        assert!((weeks[0].wt_change.unwrap() + 0.6).abs() < 1e-9);
        assert_eq!(weeks[1].mean_net_cal, Some(-500.0));
        assert_eq!(weeks[1].mean_pa, Some(400.0));
    }

    #[test]
    fn test_year_boundary_uses_iso_year() {
        // 2024-12-30 belongs to ISO week 1 of 2025
        let start = NaiveDate::from_ymd_opt(2024, 12, 28).unwrap();
        let frame = frame_from(start, vec![(Column::Trend(Metric::Weight), vec![Some(70.0); 5])]);
        let weeks = build_weekly_aggregates(&frame);
        assert_eq!(weeks.len(), 2);
        assert_eq!((weeks[0].iso_year, weeks[0].iso_week), (2024, 52));
        assert_eq!((weeks[1].iso_year, weeks[1].iso_week), (2025, 1));
    }

    #[test]
    fn test_empty_weeks_skipped_and_tail_taken() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let weight: Series = (0..140)
            .map(|i| if (14..28).contains(&i) { None } else { Some(80.0) })
            .collect();
        let frame = frame_from(start, vec![(Column::Trend(Metric::Weight), weight)]);

        let all = build_weekly_aggregates(&frame);
        assert_eq!(all.len(), 18);
        assert!(all.iter().all(|w| w.iso_week != 3 && w.iso_week != 4));

        let recent = recent_weeks(&frame, DEFAULT_WEEKS_CONSIDERED);
        assert_eq!(recent.len(), 12);
        assert_eq!(recent.last(), all.last());
    }

    #[test]
    fn test_net_calories_fallback_to_tdee() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let frame = frame_from(
            start,
            vec![
                (Column::Trend(Metric::CaloriesIn), vec![Some(2000.0); 7]),
                (Column::Raw(Metric::Tdee), vec![Some(2400.0); 7]),
                (Column::Raw(Metric::PhysicalActivity), vec![Some(600.0); 7]),
            ],
        );
        let weeks = build_weekly_aggregates(&frame);
        assert_eq!(weeks[0].mean_net_cal, Some(-400.0));
        assert_eq!(weeks[0].mean_pa, Some(600.0));
        assert!(weeks[0].wt_change.is_none());
        assert!(weeks[0].feature_vector().is_none());
    }

    #[test]
    fn test_adaptation_relative_to_peak() {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let rmr: Series = (0..14)
            .map(|i| Some(if i < 7 { 2000.0 } else { 1800.0 }))
            .collect();
        let frame = frame_from(start, vec![(Column::Raw(Metric::Rmr), rmr)]);
        let weeks = build_weekly_aggregates(&frame);
        assert_eq!(weeks[0].mean_adaptation, Some(0.0));
        assert!((weeks[1].mean_adaptation.unwrap() - 0.1).abs() < 1e-12);
        assert_eq!(weeks[1].mean_rmr, Some(1800.0));
    }
}
