//! Statistical primitives shared by the workflow orchestrators.
//!
//! Textbook formulas only: OLS regression with a two-sided t-test on the
//! slope, CAGR, growth volatility, coefficient of variation, and rolling
//! variance for structural-break detection. Inputs are plain slices; callers
//! filter missing values first.

use serde::Serialize;
use statrs::distribution::{ContinuousCDF, StudentsT};

/// Ordinary least squares fit of `y` on `x`.
#[derive(Debug, Clone, Serialize)]
pub struct Regression {
    /// Slope coefficient
    pub slope: f64,
    /// Intercept
    pub intercept: f64,
    /// Coefficient of determination
    pub r_squared: f64,
    /// Two-sided p-value for the slope (t-test, n-2 df)
    pub p_value: f64,
}

/// Fit `y = intercept + slope * x`.
///
/// Requires at least 3 points and non-zero variance in `x`; returns `None`
/// otherwise.
pub fn linear_regression(x: &[f64], y: &[f64]) -> Option<Regression> {
    let n = x.len();
    if n < 3 || n != y.len() {
        return None;
    }
    let nf = n as f64;
    let x_mean = x.iter().sum::<f64>() / nf;
    let y_mean = y.iter().sum::<f64>() / nf;

    let sxx: f64 = x.iter().map(|xi| (xi - x_mean).powi(2)).sum();
    let sxy: f64 = x
        .iter()
        .zip(y.iter())
        .map(|(xi, yi)| (xi - x_mean) * (yi - y_mean))
        .sum();
    let syy: f64 = y.iter().map(|yi| (yi - y_mean).powi(2)).sum();

    if sxx == 0.0 {
        return None;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let sse = (syy - slope * sxy).max(0.0);
    let r_squared = if syy == 0.0 { 1.0 } else { 1.0 - sse / syy };

    let df = nf - 2.0;
    let p_value = if sse == 0.0 {
        0.0
    } else {
        let se_slope = (sse / df / sxx).sqrt();
        let t = (slope / se_slope).abs();
        match StudentsT::new(0.0, 1.0, df) {
            Ok(dist) => 2.0 * (1.0 - dist.cdf(t)),
            Err(_) => 1.0,
        }
    };

    Some(Regression {
        slope,
        intercept,
        r_squared,
        p_value: p_value.clamp(0.0, 1.0),
    })
}

/// Arithmetic mean. `None` for an empty slice.
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Sample standard deviation. `None` below 2 observations.
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let n = values.len();
    if n < 2 {
        return None;
    }
    let m = mean(values)?;
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (n - 1) as f64;
    Some(variance.sqrt())
}

/// Median of a sample. `None` for an empty slice.
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Coefficient of variation: `std_dev / |mean|`. `None` when the mean is zero.
pub fn coefficient_of_variation(values: &[f64]) -> Option<f64> {
    let m = mean(values)?;
    if m == 0.0 {
        return None;
    }
    Some(std_dev(values)? / m.abs())
}

/// Period-over-period growth in percent. Output starts at the second input
/// point; each output value is dated at the corresponding input date.
pub fn growth_rates(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .map(|pair| {
            if pair[0] == 0.0 {
                f64::NAN
            } else {
                (pair[1] / pair[0] - 1.0) * 100.0
            }
        })
        .collect()
}

/// Compound annual growth rate over `years`, in percent.
///
/// `None` when inputs are non-positive or the window is empty.
pub fn cagr(start_value: f64, end_value: f64, years: f64) -> Option<f64> {
    if start_value <= 0.0 || end_value <= 0.0 || years <= 0.0 {
        return None;
    }
    Some(((end_value / start_value).powf(1.0 / years) - 1.0) * 100.0)
}

/// Standard deviation of period growth rates, in percentage points.
pub fn volatility(values: &[f64]) -> Option<f64> {
    let growth: Vec<f64> = growth_rates(values)
        .into_iter()
        .filter(|g| g.is_finite())
        .collect();
    std_dev(&growth)
}

/// `1 / (1 + volatility)`: 1 is perfectly stable, → 0 with rising volatility.
pub fn stability_index(values: &[f64]) -> Option<f64> {
    volatility(values).map(|v| 1.0 / (1.0 + v))
}

/// Direction of a structural variance shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakKind {
    /// Later window at least twice as variable
    VarianceIncrease,
    /// Later window at most half as variable
    VarianceDecrease,
}

/// One detected structural break.
#[derive(Debug, Clone, Serialize)]
pub struct StructuralBreak {
    /// Last date of the later window
    pub date: String,
    /// Shift direction
    pub kind: BreakKind,
    /// Ratio of later to earlier window variance
    pub ratio: f64,
}

/// Detect variance regime shifts with a rolling window.
///
/// The variance of the trailing `window` observations is tracked at each
/// index; an event fires when it jumps to at least double or drops to at most
/// half of the previous window's variance. Events are tagged with the last
/// date of the later window.
pub fn detect_structural_breaks(
    dates: &[String],
    values: &[f64],
    window: usize,
) -> Vec<StructuralBreak> {
    let n = values.len();
    if window < 2 || n < window + 1 || dates.len() != n {
        return Vec::new();
    }

    let rolling_variance = |end: usize| -> Option<f64> {
        let slice = &values[end + 1 - window..=end];
        let m = mean(slice)?;
        Some(slice.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (window - 1) as f64)
    };

    let mut breaks = Vec::new();
    let mut previous = rolling_variance(window - 1);
    for end in window..n {
        let current = rolling_variance(end);
        if let (Some(prev), Some(curr)) = (previous, current) {
            if prev > 0.0 {
                let ratio = curr / prev;
                if ratio >= 2.0 {
                    breaks.push(StructuralBreak {
                        date: dates[end].clone(),
                        kind: BreakKind::VarianceIncrease,
                        ratio,
                    });
                } else if ratio <= 0.5 {
                    breaks.push(StructuralBreak {
                        date: dates[end].clone(),
                        kind: BreakKind::VarianceDecrease,
                        ratio,
                    });
                }
            }
        }
        previous = current;
    }
    breaks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_regression_perfect_line() {
        let x: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|xi| 2.0 * xi + 1.0).collect();
        let fit = linear_regression(&x, &y).unwrap();
        assert!((fit.slope - 2.0).abs() < 1e-9);
        assert!((fit.intercept - 1.0).abs() < 1e-9);
        assert!((fit.r_squared - 1.0).abs() < 1e-9);
        assert!(fit.p_value < 1e-6);
    }

    #[test]
    fn test_regression_flat_line_is_insignificant() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        // Zero-slope data with symmetric noise
        let y: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let fit = linear_regression(&x, &y).unwrap();
        assert!(fit.slope.abs() < 0.05);
        assert!(fit.p_value > 0.5, "p_value = {}", fit.p_value);
    }

    #[test]
    fn test_regression_requires_three_points() {
        assert!(linear_regression(&[1.0, 2.0], &[1.0, 2.0]).is_none());
        assert!(linear_regression(&[1.0, 1.0, 1.0], &[1.0, 2.0, 3.0]).is_none());
    }

    #[test]
    fn test_cagr_known_value() {
        // 100 -> 200 over 10 years: 2^(1/10)-1 = 7.177...%
        let g = cagr(100.0, 200.0, 10.0).unwrap();
        assert!((g - 7.177346253629313).abs() < 1e-9);
        assert!(cagr(0.0, 200.0, 10.0).is_none());
        assert!(cagr(100.0, 200.0, 0.0).is_none());
    }

    #[test]
    fn test_growth_rates_shift_by_one() {
        let values = vec![100.0, 110.0, 99.0];
        let growth = growth_rates(&values);
        assert_eq!(growth.len(), 2);
        assert!((growth[0] - 10.0).abs() < 1e-9);
        assert!((growth[1] - -10.0).abs() < 1e-9);
    }

    #[test]
    fn test_volatility_and_stability() {
        let steady = vec![100.0, 102.0, 104.04, 106.1208];
        let vol = volatility(&steady).unwrap();
        assert!(vol < 1e-9, "constant growth has zero volatility, got {vol}");
        assert!((stability_index(&steady).unwrap() - 1.0).abs() < 1e-6);

        let bumpy = vec![100.0, 120.0, 90.0, 130.0];
        assert!(volatility(&bumpy).unwrap() > 10.0);
    }

    #[test]
    fn test_coefficient_of_variation() {
        let values = vec![2.0, 4.0, 6.0];
        let cv = coefficient_of_variation(&values).unwrap();
        assert!((cv - 2.0 / 4.0).abs() < 1e-9);
        assert!(coefficient_of_variation(&[1.0, -1.0]).is_none());
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_break_detection_on_variance_drop() {
        // 12 noisy observations followed by 12 nearly flat ones
        let mut values = Vec::new();
        for i in 0..12 {
            values.push(if i % 2 == 0 { 10.0 } else { -10.0 });
        }
        for i in 0..12 {
            values.push(if i % 2 == 0 { 0.5 } else { -0.5 });
        }
        let dates: Vec<String> = (1980..1980 + 24).map(|y| format!("{y}-01-01")).collect();
        let breaks = detect_structural_breaks(&dates, &values, 12);
        assert!(!breaks.is_empty());
        let decrease = breaks
            .iter()
            .find(|b| b.kind == BreakKind::VarianceDecrease)
            .expect("expected a variance_decrease event");
        assert!(decrease.ratio <= 0.5);
        // The event lands while the calm regime displaces the noisy one
        assert!(decrease.date.as_str() >= "1992-01-01");
    }

    #[test]
    fn test_break_detection_reports_dates_in_window() {
        let values: Vec<f64> = (0..30).map(|i| (i as f64).sin() * 5.0).collect();
        let dates: Vec<String> = (0..30).map(|i| format!("19{:02}-01-01", 70 + i)).collect();
        for event in detect_structural_breaks(&dates, &values, 12) {
            assert!(dates.contains(&event.date));
            assert!(event.ratio >= 2.0 || event.ratio <= 0.5);
        }
    }

    #[test]
    fn test_break_detection_short_series_is_empty() {
        let dates: Vec<String> = (0..5).map(|i| format!("200{i}-01-01")).collect();
        let values = vec![1.0, 2.0, 1.0, 2.0, 1.0];
        assert!(detect_structural_breaks(&dates, &values, 12).is_empty());
    }
}
