//! Series statistics
//!
//! Small numeric helpers over daily series where `None` marks an undefined day.
//! Windows count rows, and rows are calendar days in a [`DailyFrame`](crate::DailyFrame).

use chrono::NaiveDate;

/// Daily series aligned with a frame's dates
pub type Series = Vec<Option<f64>>;

/// Mean of the defined values, `None` when there are none
pub fn mean<I: IntoIterator<Item = f64>>(values: I) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Pearson correlation over the rows where both series are defined
///
/// Returns `None` for fewer than three pairs or zero variance in either series.
pub fn pearson(xs: &[Option<f64>], ys: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = xs
        .iter()
        .zip(ys)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 3 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_x = pairs.iter().map(|p| p.0).sum::<f64>() / n;
    let mean_y = pairs.iter().map(|p| p.1).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in &pairs {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov = dx.mul_add(dy, cov);
        var_x = dx.mul_add(dx, var_x);
        var_y = dy.mul_add(dy, var_y);
    }

    let denominator = (var_x * var_y).sqrt();
    if denominator < f64::EPSILON {
        return None;
    }
    let r = cov / denominator;
    r.is_finite().then(|| r.clamp(-1.0, 1.0))
}

/// Coefficient of determination of `predicted` against `actual`
///
/// A constant target scores 1.0 when matched exactly and 0.0 otherwise.
pub fn r_squared(actual: &[f64], predicted: &[f64]) -> f64 {
    let Some(mean_y) = mean(actual.iter().copied()) else {
        return 0.0;
    };
    let ss_tot: f64 = actual.iter().map(|y| (y - mean_y).powi(2)).sum();
    let ss_res: f64 = actual
        .iter()
        .zip(predicted)
        .map(|(y, p)| (y - p).powi(2))
        .sum();

    if ss_tot < f64::EPSILON {
        return if ss_res < f64::EPSILON { 1.0 } else { 0.0 };
    }
    1.0 - ss_res / ss_tot
}

/// Root mean squared error
pub fn rmse(actual: &[f64], predicted: &[f64]) -> f64 {
    mean(actual.iter().zip(predicted).map(|(y, p)| (y - p).powi(2)))
        .map(f64::sqrt)
        .unwrap_or(0.0)
}

/// Trailing rolling mean over `window` rows with at least `min_periods` defined
pub fn rolling_mean(values: &[Option<f64>], window: usize, min_periods: usize) -> Series {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            window_mean(&values[start..=i], min_periods)
        })
        .collect()
}

/// Centered rolling mean over `window` rows with at least `min_periods` defined
pub fn centered_rolling_mean(values: &[Option<f64>], window: usize, min_periods: usize) -> Series {
    let window = window.max(1);
    let before = window / 2;
    let after = (window - 1) / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(before);
            let end = (i + after + 1).min(values.len());
            window_mean(&values[start..end], min_periods)
        })
        .collect()
}

fn window_mean(window: &[Option<f64>], min_periods: usize) -> Option<f64> {
    let defined: Vec<f64> = window.iter().flatten().copied().collect();
    if defined.len() < min_periods.max(1) {
        return None;
    }
    mean(defined)
}

/// Exponentially weighted mean with `alpha = 2 / (span + 1)`
///
/// Undefined inputs stay undefined and restart the recursion.
pub fn ewm(values: &[Option<f64>], span: usize) -> Series {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut state: Option<f64> = None;
    values
        .iter()
        .map(|value| match value {
            Some(x) => {
                let next = match state {
                    Some(prev) => alpha.mul_add(*x, (1.0 - alpha) * prev),
                    None => *x,
                };
                state = Some(next);
                Some(next)
            }
            None => {
                state = None;
                None
            }
        })
        .collect()
}

/// `values[i] - values[i - periods]`
pub fn diff(values: &[Option<f64>], periods: usize) -> Series {
    (0..values.len())
        .map(|i| {
            if i < periods {
                return None;
            }
            Some(values[i]? - values[i - periods]?)
        })
        .collect()
}

/// Series shifted forward by `periods` rows
pub fn shift(values: &[Option<f64>], periods: usize) -> Series {
    (0..values.len())
        .map(|i| if i < periods { None } else { values[i - periods] })
        .collect()
}

/// Element-wise combination where both sides are defined
pub fn zip_with<F>(a: &[Option<f64>], b: &[Option<f64>], f: F) -> Series
where
    F: Fn(f64, f64) -> f64,
{
    a.iter()
        .zip(b)
        .map(|(x, y)| Some(f((*x)?, (*y)?)))
        .collect()
}

/// Time-proportional linear interpolation of interior gaps
///
/// A gap is filled only when it spans at most `limit` missing days; longer
/// gaps and leading or trailing gaps stay undefined.
pub fn interpolate_gaps(dates: &[NaiveDate], values: &[Option<f64>], limit: usize) -> Series {
    let mut out = values.to_vec();
    let defined: Vec<usize> = values
        .iter()
        .enumerate()
        .filter_map(|(i, v)| v.map(|_| i))
        .collect();

    for pair in defined.windows(2) {
        let (i, j) = (pair[0], pair[1]);
        if j <= i + 1 {
            continue;
        }
        let span_days = (dates[j] - dates[i]).num_days();
        let missing_days = span_days - 1;
        if missing_days <= 0 || missing_days as usize > limit {
            continue;
        }
        let (Some(start), Some(end)) = (values[i], values[j]) else {
            continue;
        };
        for (k, slot) in out.iter_mut().enumerate().take(j).skip(i + 1) {
            let t = (dates[k] - dates[i]).num_days() as f64 / span_days as f64;
            *slot = Some(start + (end - start) * t);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn days(n: usize) -> Vec<NaiveDate> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        (0..n)
            .map(|i| start + chrono::Duration::days(i as i64))
            .collect()
    }

    #[test]
    fn test_pearson_perfect_and_degenerate() {
        let x: Series = (0..10).map(|i| Some(i as f64)).collect();
        let y: Series = (0..10).map(|i| Some(2.0 * i as f64 + 1.0)).collect();
        let neg: Series = (0..10).map(|i| Some(-(i as f64))).collect();
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-12);
        assert!((pearson(&x, &neg).unwrap() + 1.0).abs() < 1e-12);

        let flat = vec![Some(3.0); 10];
        assert!(pearson(&x, &flat).is_none());
        assert!(pearson(&x[..2], &y[..2]).is_none());
    }

    #[test]
    fn test_pearson_skips_undefined_pairs() {
        let x = vec![Some(1.0), None, Some(2.0), Some(3.0), Some(4.0)];
        let y = vec![Some(2.0), Some(100.0), Some(4.0), Some(6.0), None];
        assert!((pearson(&x, &y).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_r_squared() {
        let actual = [1.0, 2.0, 3.0, 4.0];
        assert!((r_squared(&actual, &actual) - 1.0).abs() < 1e-12);
        let mean_pred = [2.5; 4];
        assert!(r_squared(&actual, &mean_pred).abs() < 1e-12);
        assert_eq!(r_squared(&[5.0, 5.0], &[5.0, 5.0]), 1.0);
        assert_eq!(r_squared(&[5.0, 5.0], &[4.0, 6.0]), 0.0);
    }

    #[test]
    fn test_rolling_means() {
        let values = vec![Some(1.0), Some(2.0), None, Some(4.0), Some(5.0)];
        let trailing = rolling_mean(&values, 3, 2);
        assert_eq!(trailing[0], None);
        assert_eq!(trailing[1], Some(1.5));
        assert_eq!(trailing[2], Some(1.5));
        assert_eq!(trailing[3], Some(3.0));
        assert_eq!(trailing[4], Some(4.5));

        let centered = centered_rolling_mean(&values, 3, 1);
        assert_eq!(centered[0], Some(1.5));
        assert_eq!(centered[2], Some(3.0));
        assert_eq!(centered[4], Some(4.5));
    }

    #[test]
    fn test_ewm_resets_after_gap() {
        let values = vec![Some(10.0), Some(20.0), None, Some(30.0)];
        let out = ewm(&values, 3);
        assert_eq!(out[0], Some(10.0));
        assert!((out[1].unwrap() - 15.0).abs() < 1e-12);
        assert_eq!(out[2], None);
        assert_eq!(out[3], Some(30.0));
    }

    #[test]
    fn test_diff_and_shift() {
        let values = vec![Some(1.0), Some(3.0), None, Some(10.0)];
        assert_eq!(diff(&values, 1), vec![None, Some(2.0), None, None]);
        assert_eq!(diff(&values, 2), vec![None, None, None, Some(7.0)]);
        assert_eq!(shift(&values, 1), vec![None, Some(1.0), Some(3.0), None]);
    }

    #[test]
    fn test_interpolation_respects_limit() {
        let dates = days(8);
        let mut values = vec![None; 8];
        values[0] = Some(80.0);
        values[4] = Some(84.0);
        values[7] = Some(90.0);

        let filled = interpolate_gaps(&dates, &values, 3);
        assert_eq!(filled[1], Some(81.0));
        assert_eq!(filled[3], Some(83.0));
        assert_eq!(filled[5], Some(86.0));

        let strict = interpolate_gaps(&dates, &values, 2);
        assert_eq!(strict[1], None);
        assert_eq!(strict[5], Some(86.0));
    }

    #[test]
    fn test_interpolation_leaves_edges_undefined() {
        let dates = days(5);
        let values = vec![None, Some(1.0), None, Some(3.0), None];
        let filled = interpolate_gaps(&dates, &values, 14);
        assert_eq!(filled, vec![None, Some(1.0), Some(2.0), Some(3.0), None]);
    }
}
