use crate::error::{PnlError, Result};
use crate::schema::{ChangeMode, DetectorOptions, MatchPolicy};
use crate::table::CleanedTable;
use crate::utils::{format_signed_percent, mean_std, validate_threshold};
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    /// Zero counts as a decrease.
    pub fn of(change: f64) -> Self {
        if change > 0.0 {
            Self::Increase
        } else {
            Self::Decrease
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Increase => f.write_str("increase"),
            Self::Decrease => f.write_str("decrease"),
        }
    }
}

/// One flagged (row, metric) pair.
///
/// `change_value` depends on the mode that produced it:
/// - explicit-percent: the cell in percentage points
/// - period-over-period: the relative change as a fraction (`-0.0417`)
/// - statistical: the z-score of the cell within its row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Position of the row in the cleaned table.
    pub row: usize,
    pub line_item: String,
    pub metric: String,
    pub change_value: f64,
    pub formatted_change: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct IrregularityDetector {
    options: DetectorOptions,
}

impl IrregularityDetector {
    pub fn new(options: DetectorOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &DetectorOptions {
        &self.options
    }

    /// Runs the configured mode at the configured (or mode default) threshold.
    pub fn run(&self, cleaned: &CleanedTable) -> Result<Vec<Anomaly>> {
        self.detect(
            cleaned,
            self.options.effective_threshold(),
            self.options.mode,
        )
    }

    pub fn detect(
        &self,
        cleaned: &CleanedTable,
        threshold: f64,
        mode: ChangeMode,
    ) -> Result<Vec<Anomaly>> {
        validate_threshold(threshold)?;
        cleaned.validate()?;
        debug!(
            "Running {} detection at threshold {} ({:?})",
            mode, threshold, self.options.match_policy
        );

        let anomalies = match mode {
            ChangeMode::ExplicitPercent => self.explicit_percent(cleaned, threshold)?,
            ChangeMode::PeriodOverPeriod => self.period_over_period(cleaned, threshold)?,
            ChangeMode::Statistical => self.statistical(cleaned, threshold)?,
        };

        info!(
            "{} detection flagged {} of {} line items ({} anomalies)",
            mode,
            count_rows(&anomalies),
            cleaned.row_count(),
            anomalies.len()
        );
        Ok(anomalies)
    }

    fn explicit_percent(&self, cleaned: &CleanedTable, threshold: f64) -> Result<Vec<Anomaly>> {
        let columns = cleaned.percent_columns();
        if columns.is_empty() {
            return Err(PnlError::NoMetricColumns {
                mode: ChangeMode::ExplicitPercent,
                required: "at least one change/percent",
            });
        }

        let mut anomalies = Vec::new();
        for row in 0..cleaned.row_count() {
            for column in &columns {
                let Some(value) = column.values[row] else {
                    continue;
                };
                let points = cleaned.percent_scale.to_points(value);
                if points.abs() < threshold {
                    continue;
                }

                anomalies.push(Anomaly {
                    row,
                    line_item: cleaned.labels[row].clone(),
                    metric: column.name.clone(),
                    change_value: points,
                    formatted_change: format_signed_percent(points),
                    direction: Some(Direction::of(points)),
                    previous: None,
                    current: None,
                });
                if self.first_match_only() {
                    break;
                }
            }
        }

        Ok(anomalies)
    }

    fn period_over_period(&self, cleaned: &CleanedTable, threshold: f64) -> Result<Vec<Anomaly>> {
        let periods = cleaned.period_columns();
        if periods.len() < 2 {
            return Err(PnlError::NoMetricColumns {
                mode: ChangeMode::PeriodOverPeriod,
                required: "at least two period",
            });
        }

        let mut anomalies = Vec::new();
        for row in 0..cleaned.row_count() {
            for pair in periods.windows(2) {
                let (prev_col, curr_col) = (pair[0], pair[1]);
                let (Some(prev), Some(curr)) = (prev_col.values[row], curr_col.values[row]) else {
                    continue;
                };
                if prev == 0.0 {
                    continue;
                }

                let change = (curr - prev) / prev.abs();
                if !change.is_finite() {
                    trace!(
                        "Row {}, {} -> {}: change overflowed, skipping",
                        row + 1,
                        prev_col.name,
                        curr_col.name
                    );
                    continue;
                }
                if change.abs() < threshold {
                    continue;
                }

                anomalies.push(Anomaly {
                    row,
                    line_item: cleaned.labels[row].clone(),
                    metric: format!("{} -> {}", prev_col.name, curr_col.name),
                    change_value: change,
                    formatted_change: format_signed_percent(change * 100.0),
                    direction: Some(Direction::of(change)),
                    previous: Some(prev),
                    current: Some(curr),
                });
                if self.first_match_only() {
                    break;
                }
            }
        }

        Ok(anomalies)
    }

    fn statistical(&self, cleaned: &CleanedTable, threshold: f64) -> Result<Vec<Anomaly>> {
        let periods = cleaned.period_columns();
        if periods.len() < 2 {
            return Err(PnlError::NoMetricColumns {
                mode: ChangeMode::Statistical,
                required: "at least two period",
            });
        }

        let mut anomalies = Vec::new();
        for row in 0..cleaned.row_count() {
            let present: Vec<(usize, f64)> = periods
                .iter()
                .enumerate()
                .filter_map(|(idx, column)| column.values[row].map(|v| (idx, v)))
                .collect();
            if present.len() < 2 {
                continue;
            }

            let values: Vec<f64> = present.iter().map(|(_, v)| *v).collect();
            let (mean, std) = mean_std(&values);
            if !std.is_finite() || std <= f64::EPSILON * mean.abs().max(1.0) {
                continue;
            }

            for (idx, value) in present {
                let z = (value - mean) / std;
                if z.abs() <= threshold {
                    continue;
                }

                anomalies.push(Anomaly {
                    row,
                    line_item: cleaned.labels[row].clone(),
                    metric: periods[idx].name.clone(),
                    change_value: z,
                    formatted_change: format!("z={:+.2}", z),
                    direction: Some(Direction::of(z)),
                    previous: None,
                    current: Some(value),
                });
                if self.first_match_only() {
                    break;
                }
            }
        }

        Ok(anomalies)
    }

    fn first_match_only(&self) -> bool {
        self.options.match_policy == MatchPolicy::FirstPerRow
    }
}

fn count_rows(anomalies: &[Anomaly]) -> usize {
    let mut rows: Vec<usize> = anomalies.iter().map(|a| a.row).collect();
    rows.dedup();
    rows.len()
}

/// Detects irregularities reporting every match per row.
pub fn detect(cleaned: &CleanedTable, threshold: f64, mode: ChangeMode) -> Result<Vec<Anomaly>> {
    IrregularityDetector::default().detect(cleaned, threshold, mode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::PercentScale;
    use crate::table::{ColumnKind, NumericColumn};

    fn column(name: &str, kind: ColumnKind, values: &[Option<f64>]) -> NumericColumn {
        NumericColumn {
            name: name.to_string(),
            kind,
            values: values.to_vec(),
        }
    }

    fn cleaned(labels: &[&str], columns: Vec<NumericColumn>) -> CleanedTable {
        CleanedTable {
            line_item_column: "Line Item".to_string(),
            labels: labels.iter().map(|l| l.to_string()).collect(),
            columns,
            percent_scale: PercentScale::Points,
        }
    }

    fn pnl() -> CleanedTable {
        cleaned(
            &["Revenue", "COGS"],
            vec![
                column("Jan", ColumnKind::Period, &[Some(12000.0), Some(4000.0)]),
                column("Feb", ColumnKind::Period, &[Some(11500.0), Some(3900.0)]),
            ],
        )
    }

    #[test]
    fn test_period_over_period_flags_revenue_only() {
        let anomalies = detect(&pnl(), 0.03, ChangeMode::PeriodOverPeriod).unwrap();

        assert_eq!(anomalies.len(), 1);
        let revenue = &anomalies[0];
        assert_eq!(revenue.line_item, "Revenue");
        assert_eq!(revenue.metric, "Jan -> Feb");
        assert!((revenue.change_value - (-500.0 / 12000.0)).abs() < 1e-12);
        assert_eq!(revenue.formatted_change, "-4.17%");
        assert_eq!(revenue.direction, Some(Direction::Decrease));
        assert_eq!(revenue.previous, Some(12000.0));
        assert_eq!(revenue.current, Some(11500.0));
    }

    #[test]
    fn test_period_over_period_threshold_is_inclusive() {
        let anomalies = detect(&pnl(), 0.025, ChangeMode::PeriodOverPeriod).unwrap();
        assert_eq!(anomalies.len(), 2);
        assert_eq!(anomalies[1].line_item, "COGS");
    }

    #[test]
    fn test_zero_and_missing_previous_are_skipped() {
        let table = cleaned(
            &["Grants", "Other"],
            vec![
                column("Q1", ColumnKind::Period, &[Some(0.0), None]),
                column("Q2", ColumnKind::Period, &[Some(5000.0), Some(10.0)]),
                column("Q3", ColumnKind::Period, &[None, Some(100.0)]),
            ],
        );

        let anomalies = detect(&table, 0.0, ChangeMode::PeriodOverPeriod).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].line_item, "Other");
        assert_eq!(anomalies[0].metric, "Q2 -> Q3");
        assert_eq!(anomalies[0].formatted_change, "+900.00%");
        assert_eq!(anomalies[0].direction, Some(Direction::Increase));
    }

    #[test]
    fn test_negative_previous_uses_magnitude() {
        let table = cleaned(
            &["Net Income"],
            vec![
                column("2022", ColumnKind::Period, &[Some(-100.0)]),
                column("2023", ColumnKind::Period, &[Some(50.0)]),
            ],
        );

        let anomalies = detect(&table, 0.5, ChangeMode::PeriodOverPeriod).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert!((anomalies[0].change_value - 1.5).abs() < 1e-12);
        assert_eq!(anomalies[0].direction, Some(Direction::Increase));
    }

    #[test]
    fn test_no_change_is_a_decrease() {
        assert_eq!(Direction::of(0.0), Direction::Decrease);
        assert_eq!(Direction::of(0.1), Direction::Increase);
    }

    #[test]
    fn test_percent_columns_are_not_periods() {
        let table = cleaned(
            &["Revenue"],
            vec![
                column("Jan", ColumnKind::Period, &[Some(100.0)]),
                column("% Change", ColumnKind::Percent, &[Some(10.0)]),
            ],
        );

        let err = detect(&table, 0.05, ChangeMode::PeriodOverPeriod).unwrap_err();
        assert!(matches!(
            err,
            PnlError::NoMetricColumns {
                mode: ChangeMode::PeriodOverPeriod,
                ..
            }
        ));
    }

    #[test]
    fn test_explicit_percent() {
        let table = cleaned(
            &["Revenue", "COGS", "Opex"],
            vec![column(
                "% Change",
                ColumnKind::Percent,
                &[Some(12.5), Some(-3.0), Some(6.1)],
            )],
        );

        let anomalies = detect(&table, 5.0, ChangeMode::ExplicitPercent).unwrap();
        let rows: Vec<usize> = anomalies.iter().map(|a| a.row).collect();
        assert_eq!(rows, vec![0, 2]);
        assert_eq!(anomalies[0].formatted_change, "+12.50%");
        assert_eq!(anomalies[0].metric, "% Change");
        assert_eq!(anomalies[1].formatted_change, "+6.10%");
    }

    #[test]
    fn test_explicit_percent_on_fraction_scale() {
        let mut table = cleaned(
            &["Revenue", "COGS"],
            vec![column(
                "Change",
                ColumnKind::Percent,
                &[Some(0.125), Some(-0.03)],
            )],
        );
        table.percent_scale = PercentScale::Fraction;

        let anomalies = detect(&table, 5.0, ChangeMode::ExplicitPercent).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert!((anomalies[0].change_value - 12.5).abs() < 1e-9);
        assert_eq!(anomalies[0].formatted_change, "+12.50%");
    }

    #[test]
    fn test_explicit_percent_requires_percent_columns() {
        let err = detect(&pnl(), 5.0, ChangeMode::ExplicitPercent).unwrap_err();
        assert!(matches!(err, PnlError::NoMetricColumns { .. }));
        assert_eq!(
            err.to_string(),
            "explicit-percent detection requires at least one change/percent columns"
        );
    }

    #[test]
    fn test_first_match_per_row() {
        let table = cleaned(
            &["Revenue", "COGS"],
            vec![
                column("Jan", ColumnKind::Period, &[Some(100.0), Some(100.0)]),
                column("Feb", ColumnKind::Period, &[Some(200.0), Some(101.0)]),
                column("Mar", ColumnKind::Period, &[Some(50.0), Some(300.0)]),
            ],
        );

        let all = detect(&table, 0.1, ChangeMode::PeriodOverPeriod).unwrap();
        assert_eq!(all.len(), 3);

        let detector = IrregularityDetector::new(
            DetectorOptions::new(ChangeMode::PeriodOverPeriod, 0.1)
                .with_match_policy(MatchPolicy::FirstPerRow),
        );
        let first = detector.run(&table).unwrap();
        let metrics: Vec<(&str, &str)> = first
            .iter()
            .map(|a| (a.line_item.as_str(), a.metric.as_str()))
            .collect();
        assert_eq!(metrics, vec![("Revenue", "Jan -> Feb"), ("COGS", "Feb -> Mar")]);
    }

    #[test]
    fn test_statistical_flags_outlier() {
        let table = cleaned(
            &["Marketing", "Rent", "Sparse"],
            vec![
                column("M1", ColumnKind::Period, &[Some(10.0), Some(5.0), Some(1.0)]),
                column("M2", ColumnKind::Period, &[Some(10.0), Some(5.0), None]),
                column("M3", ColumnKind::Period, &[Some(10.0), Some(5.0), None]),
                column("M4", ColumnKind::Period, &[Some(10.0), Some(5.0), None]),
                column("M5", ColumnKind::Period, &[Some(10.0), Some(5.0), None]),
                column("M6", ColumnKind::Period, &[Some(100.0), Some(5.0), None]),
            ],
        );

        let anomalies = detect(&table, 2.0, ChangeMode::Statistical).unwrap();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].line_item, "Marketing");
        assert_eq!(anomalies[0].metric, "M6");
        assert!((anomalies[0].change_value - 5.0_f64.sqrt()).abs() < 1e-9);
        assert_eq!(anomalies[0].formatted_change, "z=+2.24");
        assert_eq!(anomalies[0].current, Some(100.0));
    }

    #[test]
    fn test_invalid_threshold() {
        assert!(matches!(
            detect(&pnl(), -0.1, ChangeMode::PeriodOverPeriod),
            Err(PnlError::InvalidThreshold(_))
        ));
    }

    #[test]
    fn test_detection_is_deterministic() {
        let table = pnl();
        let first = detect(&table, 0.01, ChangeMode::PeriodOverPeriod).unwrap();
        let second = detect(&table, 0.01, ChangeMode::PeriodOverPeriod).unwrap();
        assert_eq!(first, second);
    }

    fn pairs(anomalies: &[Anomaly]) -> Vec<(&str, &str)> {
        anomalies
            .iter()
            .map(|a| (a.line_item.as_str(), a.metric.as_str()))
            .collect()
    }

    fn first_per_row(mode: ChangeMode, threshold: f64) -> IrregularityDetector {
        IrregularityDetector::new(
            DetectorOptions::new(mode, threshold).with_match_policy(MatchPolicy::FirstPerRow),
        )
    }

    #[test]
    fn test_explicit_percent_match_policies() {
        let table = cleaned(
            &["Revenue", "COGS"],
            vec![
                column("% Change MoM", ColumnKind::Percent, &[Some(12.0), Some(1.0)]),
                column("% Change YoY", ColumnKind::Percent, &[Some(8.0), Some(-7.0)]),
            ],
        );

        let all = detect(&table, 5.0, ChangeMode::ExplicitPercent).unwrap();
        assert_eq!(
            pairs(&all),
            vec![
                ("Revenue", "% Change MoM"),
                ("Revenue", "% Change YoY"),
                ("COGS", "% Change YoY"),
            ]
        );

        let first = first_per_row(ChangeMode::ExplicitPercent, 5.0)
            .run(&table)
            .unwrap();
        assert_eq!(
            pairs(&first),
            vec![("Revenue", "% Change MoM"), ("COGS", "% Change YoY")]
        );
    }

    #[test]
    fn test_statistical_match_policies() {
        let mut values = vec![Some(0.0); 8];
        values.extend([Some(10.0), Some(10.0)]);
        let columns = values
            .iter()
            .enumerate()
            .map(|(i, v)| column(&format!("P{}", i + 1), ColumnKind::Period, &[*v]))
            .collect();
        let table = cleaned(&["Marketing"], columns);

        let all = detect(&table, 1.5, ChangeMode::Statistical).unwrap();
        assert_eq!(pairs(&all), vec![("Marketing", "P9"), ("Marketing", "P10")]);
        assert!((all[0].change_value - 2.0).abs() < 1e-9);

        let first = first_per_row(ChangeMode::Statistical, 1.5)
            .run(&table)
            .unwrap();
        assert_eq!(pairs(&first), vec![("Marketing", "P9")]);
    }

    #[test]
    fn test_ragged_table_is_rejected() {
        let table = cleaned(
            &["Revenue", "COGS"],
            vec![
                column("Jan", ColumnKind::Period, &[Some(1.0), Some(2.0)]),
                column("Feb", ColumnKind::Period, &[Some(3.0)]),
            ],
        );

        for mode in [
            ChangeMode::ExplicitPercent,
            ChangeMode::PeriodOverPeriod,
            ChangeMode::Statistical,
        ] {
            let result = detect(&table, mode.default_threshold(), mode);
            assert!(matches!(result, Err(PnlError::MalformedTable(_))));
        }
    }

    #[test]
    fn test_overflowing_change_is_skipped() {
        let table = cleaned(
            &["Swing", "Revenue"],
            vec![
                column("Jan", ColumnKind::Period, &[Some(-1e308), Some(100.0)]),
                column("Feb", ColumnKind::Period, &[Some(1e308), Some(150.0)]),
            ],
        );

        let anomalies = detect(&table, 0.0, ChangeMode::PeriodOverPeriod).unwrap();
        assert_eq!(pairs(&anomalies), vec![("Revenue", "Jan -> Feb")]);
        assert!(anomalies.iter().all(|a| a.change_value.is_finite()));
    }

    #[test]
    fn test_statistical_handles_large_figures() {
        let table = cleaned(
            &["Holding"],
            vec![
                column("M1", ColumnKind::Period, &[Some(1e200)]),
                column("M2", ColumnKind::Period, &[Some(1e200)]),
                column("M3", ColumnKind::Period, &[Some(1e200)]),
                column("M4", ColumnKind::Period, &[Some(1e200)]),
                column("M5", ColumnKind::Period, &[Some(5e200)]),
            ],
        );

        let anomalies = detect(&table, 1.5, ChangeMode::Statistical).unwrap();
        assert_eq!(pairs(&anomalies), vec![("Holding", "M5")]);
        assert_eq!(anomalies[0].formatted_change, "z=+2.00");
    }
}
