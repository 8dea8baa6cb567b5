//! Selectivity estimation of predicates.

use crate::meta::ColumnId;
use crate::operators::scalar::expr::{BinaryOp, ScalarExpr};
use crate::operators::scalar::value::ScalarValue;
use crate::statistics::ColumnStats;

/// Selectivity of a predicate when no statistics is available.
pub const DEFAULT_SELECTIVITY: f64 = 0.1;

/// Selectivity of a range predicate when no histogram is available.
pub const DEFAULT_RANGE_SELECTIVITY: f64 = 1.0 / 3.0;

/// Provides statistics of columns referenced by predicates.
pub trait ColumnStatsProvider {
    /// Returns statistics of the given column or `None` if the column has no statistics
    /// (it is a synthetic column or its table has not been analyzed).
    fn column_stats(&self, column_id: ColumnId) -> Option<ColumnStats>;
}

/// A [ColumnStatsProvider] that has no statistics.
#[derive(Debug)]
pub struct NoColumnStats;

impl ColumnStatsProvider for NoColumnStats {
    fn column_stats(&self, _column_id: ColumnId) -> Option<ColumnStats> {
        None
    }
}

/// Estimates the fraction of rows that satisfy all of the given predicates.
pub fn conjunction_selectivity<'a, I, P>(predicates: I, provider: &P) -> f64
where
    I: IntoIterator<Item = &'a ScalarExpr>,
    P: ColumnStatsProvider + ?Sized,
{
    predicates.into_iter().map(|p| estimate_selectivity(p, provider)).product()
}

/// Estimates the fraction of rows that satisfy the given predicate.
pub fn estimate_selectivity<P>(expr: &ScalarExpr, provider: &P) -> f64
where
    P: ColumnStatsProvider + ?Sized,
{
    let selectivity = match expr {
        ScalarExpr::Scalar(ScalarValue::Bool(true)) => 1.0,
        ScalarExpr::Scalar(ScalarValue::Bool(false)) | ScalarExpr::Scalar(ScalarValue::Null) => 0.0,
        ScalarExpr::BinaryExpr {
            lhs,
            op: BinaryOp::And,
            rhs,
        } => estimate_selectivity(lhs, provider) * estimate_selectivity(rhs, provider),
        ScalarExpr::BinaryExpr {
            lhs,
            op: BinaryOp::Or,
            rhs,
        } => {
            let s1 = estimate_selectivity(lhs, provider);
            let s2 = estimate_selectivity(rhs, provider);
            s1 + s2 - s1 * s2
        }
        ScalarExpr::Not(expr) => 1.0 - estimate_selectivity(expr, provider),
        ScalarExpr::IsNull(expr) => match expr.as_ref() {
            ScalarExpr::Column(id) => provider.column_stats(*id).map(|s| s.frac_null).unwrap_or(DEFAULT_SELECTIVITY),
            _ => DEFAULT_SELECTIVITY,
        },
        ScalarExpr::IsNotNull(expr) => match expr.as_ref() {
            ScalarExpr::Column(id) => {
                provider.column_stats(*id).map(|s| 1.0 - s.frac_null).unwrap_or(1.0 - DEFAULT_SELECTIVITY)
            }
            _ => 1.0 - DEFAULT_SELECTIVITY,
        },
        ScalarExpr::BinaryExpr { lhs, op, rhs } if op.is_comparison() => {
            match (lhs.as_ref(), rhs.as_ref()) {
                (ScalarExpr::Column(col), ScalarExpr::Scalar(value)) => {
                    comparison_selectivity(provider.column_stats(*col).as_ref(), op, value)
                }
                (ScalarExpr::Scalar(value), ScalarExpr::Column(col)) => match op.commute() {
                    Some(op) => comparison_selectivity(provider.column_stats(*col).as_ref(), &op, value),
                    None => DEFAULT_SELECTIVITY,
                },
                (ScalarExpr::Column(l), ScalarExpr::Column(r)) if *op == BinaryOp::Eq => {
                    let l = provider.column_stats(*l);
                    let r = provider.column_stats(*r);
                    join_selectivity(l.as_ref(), r.as_ref())
                }
                _ => DEFAULT_SELECTIVITY,
            }
        }
        _ => DEFAULT_SELECTIVITY,
    };
    clamp(selectivity)
}

/// Selectivity of an equi-join predicate `l = r`: `1 / max(card(l), card(r))`.
pub fn join_selectivity(left: Option<&ColumnStats>, right: Option<&ColumnStats>) -> f64 {
    let card = left
        .map(|s| s.cardinality)
        .into_iter()
        .chain(right.map(|s| s.cardinality))
        .fold(0f64, f64::max);
    if card >= 1.0 {
        1.0 / card
    } else {
        DEFAULT_SELECTIVITY
    }
}

/// Selectivity of a comparison `column <op> value`.
pub fn comparison_selectivity(stats: Option<&ColumnStats>, op: &BinaryOp, value: &ScalarValue) -> f64 {
    if value.is_null() {
        // A comparison with NULL is never true.
        return 0.0;
    }
    match op {
        BinaryOp::Eq => equality_selectivity(stats, value),
        BinaryOp::NotEq => {
            let frac_null = stats.map(|s| s.frac_null).unwrap_or_default();
            clamp(1.0 - equality_selectivity(stats, value) - frac_null)
        }
        BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => range_selectivity(stats, op, value),
        _ => DEFAULT_SELECTIVITY,
    }
}

/// Selectivity of `column = value`.
///
/// If the value is one of the most common values its frequency is used.
/// Otherwise the remaining non-NULL fraction is distributed evenly among the remaining distinct values.
pub fn equality_selectivity(stats: Option<&ColumnStats>, value: &ScalarValue) -> f64 {
    let stats = match stats {
        Some(stats) if stats.cardinality > 0.0 => stats,
        _ => return DEFAULT_SELECTIVITY,
    };
    if let Some(freq) = stats.most_common_freq(value) {
        return freq;
    }
    let num_mcv = stats.most_common_vals.len() as f64;
    let sum_mcv: f64 = stats.most_common_freqs.iter().sum();
    let remaining_distinct = stats.cardinality - num_mcv;
    if num_mcv > 0.0 && remaining_distinct >= 1.0 {
        clamp((1.0 - stats.frac_null - sum_mcv) / remaining_distinct)
    } else {
        1.0 / stats.cardinality
    }
}

/// Selectivity of a range predicate computed from an equi-depth histogram.
pub fn range_selectivity(stats: Option<&ColumnStats>, op: &BinaryOp, value: &ScalarValue) -> f64 {
    let (stats, value) = match (stats, value.as_f64()) {
        (Some(stats), Some(value)) if stats.histogram_bounds.len() >= 2 => (stats, value),
        _ => return DEFAULT_RANGE_SELECTIVITY,
    };
    let less = fraction_less_than(&stats.histogram_bounds, value);
    let non_null = 1.0 - stats.frac_null;
    let selectivity = match op {
        BinaryOp::Lt | BinaryOp::LtEq => less,
        BinaryOp::Gt | BinaryOp::GtEq => 1.0 - less,
        _ => return DEFAULT_RANGE_SELECTIVITY,
    };
    clamp(selectivity * non_null)
}

/// Fraction of histogram values that are less than the given value.
/// Values within a bucket are assumed to be uniformly distributed.
fn fraction_less_than(bounds: &[f64], value: f64) -> f64 {
    let first = bounds[0];
    let last = bounds[bounds.len() - 1];
    if value <= first {
        return 0.0;
    }
    if value >= last {
        return 1.0;
    }
    let num_buckets = (bounds.len() - 1) as f64;
    // bounds[i] <= value < bounds[i + 1]
    let i = bounds.windows(2).position(|w| value >= w[0] && value < w[1]).unwrap_or(bounds.len() - 2);
    let width = bounds[i + 1] - bounds[i];
    let within = if width > 0.0 { (value - bounds[i]) / width } else { 0.0 };
    (i as f64 + within) / num_buckets
}

fn clamp(selectivity: f64) -> f64 {
    if selectivity.is_nan() {
        DEFAULT_SELECTIVITY
    } else {
        selectivity.max(0.0).min(1.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    struct TestStats {
        columns: HashMap<ColumnId, ColumnStats>,
    }

    impl ColumnStatsProvider for TestStats {
        fn column_stats(&self, column_id: ColumnId) -> Option<ColumnStats> {
            self.columns.get(&column_id).cloned()
        }
    }

    fn col_eq(col: ColumnId, value: i32) -> ScalarExpr {
        ScalarExpr::binary(ScalarExpr::Column(col), BinaryOp::Eq, ScalarExpr::Scalar(ScalarValue::Int32(value)))
    }

    fn approx_eq(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-9, "expected: {} actual: {}", expected, actual);
    }

    fn test_stats() -> TestStats {
        let a1 = ColumnStats::new(100.0);
        let a2 = ColumnStats::new(10.0)
            .with_frac_null(0.1)
            .with_most_common(vec![ScalarValue::Int32(1)], vec![0.45])
            .unwrap();
        let a3 = ColumnStats::new(1000.0).with_histogram(vec![0.0, 10.0, 20.0, 30.0, 40.0]);
        TestStats {
            columns: HashMap::from([(1, a1), (2, a2), (3, a3)]),
        }
    }

    #[test]
    fn equality() {
        let stats = test_stats();
        approx_eq(estimate_selectivity(&col_eq(1, 5), &stats), 0.01);
        // most common value
        approx_eq(estimate_selectivity(&col_eq(2, 1), &stats), 0.45);
        // (1 - 0.1 - 0.45) / (10 - 1)
        approx_eq(estimate_selectivity(&col_eq(2, 7), &stats), 0.05);
        // no stats
        approx_eq(estimate_selectivity(&col_eq(7, 1), &stats), DEFAULT_SELECTIVITY);
    }

    #[test]
    fn constant_on_the_left() {
        let stats = test_stats();
        let expr = ScalarExpr::binary(ScalarExpr::Scalar(ScalarValue::Int32(20)), BinaryOp::Gt, ScalarExpr::Column(3));
        // 20 > col:3 => col:3 < 20
        approx_eq(estimate_selectivity(&expr, &stats), 0.5);
    }

    #[test]
    fn range() {
        let stats = test_stats();
        let lt = |v: i32| ScalarExpr::binary(ScalarExpr::Column(3), BinaryOp::Lt, ScalarExpr::Scalar(ScalarValue::Int32(v)));
        approx_eq(estimate_selectivity(&lt(-1), &stats), 0.0);
        approx_eq(estimate_selectivity(&lt(15), &stats), 0.375);
        approx_eq(estimate_selectivity(&lt(100), &stats), 1.0);

        let gt = ScalarExpr::binary(ScalarExpr::Column(1), BinaryOp::Gt, ScalarExpr::Scalar(ScalarValue::Int32(1)));
        approx_eq(estimate_selectivity(&gt, &stats), DEFAULT_RANGE_SELECTIVITY);
    }

    #[test]
    fn conjunction_and_disjunction() {
        let stats = test_stats();
        let and = ScalarExpr::binary(col_eq(1, 1), BinaryOp::And, col_eq(2, 1));
        approx_eq(estimate_selectivity(&and, &stats), 0.01 * 0.45);

        let or = ScalarExpr::binary(col_eq(1, 1), BinaryOp::Or, col_eq(2, 1));
        approx_eq(estimate_selectivity(&or, &stats), 0.01 + 0.45 - 0.01 * 0.45);
    }

    #[test]
    fn null_checks() {
        let stats = test_stats();
        let is_null = ScalarExpr::IsNull(Box::new(ScalarExpr::Column(2)));
        approx_eq(estimate_selectivity(&is_null, &stats), 0.1);

        let is_not_null = ScalarExpr::IsNotNull(Box::new(ScalarExpr::Column(2)));
        approx_eq(estimate_selectivity(&is_not_null, &stats), 0.9);

        let eq_null = ScalarExpr::binary(ScalarExpr::Column(1), BinaryOp::Eq, ScalarExpr::Scalar(ScalarValue::Null));
        approx_eq(estimate_selectivity(&eq_null, &stats), 0.0);
    }

    #[test]
    fn join_predicate() {
        let stats = test_stats();
        approx_eq(estimate_selectivity(&ScalarExpr::column_eq(1, 2), &stats), 0.01);
        approx_eq(estimate_selectivity(&ScalarExpr::column_eq(8, 9), &stats), DEFAULT_SELECTIVITY);
    }
}
