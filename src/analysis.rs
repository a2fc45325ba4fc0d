use crate::extract::MetricKind;
use crate::sampler::{Collection, Series};
use crate::stats::{compute_ewma, compute_mean, find_peak};
use anyhow::{Context, Result};
use rmp_serde::encode;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AnalysisError {
    #[error("no samples were collected")]
    EmptySeries,
}

/// Summary statistics of a completed series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryStats {
    pub raw_mean: f64,
    pub smoothed_mean: f64,
    /// Maximum raw value.
    pub peak_value: f64,
    /// Timestamp of the first sample attaining `peak_value`.
    pub peak_timestamp: f64,
}

/// Smoothed series, index-aligned with the raw series, and its summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trend {
    pub smoothed: Vec<f64>,
    pub stats: SummaryStats,
}

/// Trend analyzer.
///
/// Pure: the result depends only on the series and the smoothing factor.
#[derive(Debug, Clone)]
pub struct Analyzer {
    alpha: f64,
}

impl Analyzer {
    pub fn new(alpha: f64) -> Self {
        Self { alpha }
    }

    pub fn analyze(&self, series: &Series) -> Result<Trend, AnalysisError> {
        let vals: Vec<_> = series.values().collect();
        let (i_peak, peak_value) = find_peak(&vals).ok_or(AnalysisError::EmptySeries)?;

        let smoothed = compute_ewma(&vals, self.alpha);
        let stats = SummaryStats {
            raw_mean: compute_mean(&vals),
            smoothed_mean: compute_mean(&smoothed),
            peak_value,
            peak_timestamp: series.samples()[i_peak].timestamp,
        };

        Ok(Trend { smoothed, stats })
    }
}

/// Everything known about one finished run.
#[derive(Debug, Serialize, Deserialize)]
pub struct Report {
    pub metric: MetricKind,
    pub target: String,
    pub series: Series,
    pub trend: Trend,
    /// Total run time (seconds).
    pub elapsed: f64,
    pub n_iterations: usize,
}

impl Report {
    pub fn new(metric: MetricKind, target: &str, collection: Collection, trend: Trend) -> Self {
        Self {
            metric,
            target: target.to_string(),
            series: collection.series,
            trend,
            elapsed: collection.elapsed,
            n_iterations: collection.n_iterations,
        }
    }

    /// Log the console summary.
    pub fn log_summary(&self) {
        let unit = self.metric.unit();
        let stats = &self.trend.stats;
        log::info!("smoothed mean over the run: {:.2} {unit}", stats.smoothed_mean);
        log::info!("raw mean: {:.2} {unit}", stats.raw_mean);
        log::info!(
            "peak: {:.2} {unit} at {:.2} s",
            stats.peak_value,
            stats.peak_timestamp
        );
        log::info!("total duration: {:.2} s", self.elapsed);
        log::info!(
            "samples collected: {} of {} iterations",
            self.series.len(),
            self.n_iterations
        );
    }

    /// Save the report to a MessagePack-encoded file.
    pub fn save<P: AsRef<Path>>(&self, file: P) -> Result<()> {
        let file = file.as_ref();
        let file = File::create(file).with_context(|| format!("failed to create {file:?}"))?;
        let mut writer = BufWriter::new(file);
        encode::write(&mut writer, self).context("failed to serialize report")?;
        writer.flush().context("failed to flush writer stream")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::Sample;

    fn series(vals: &[f64]) -> Series {
        vals.iter()
            .enumerate()
            .map(|(i, &value)| Sample {
                timestamp: i as f64,
                value,
            })
            .collect()
    }

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    #[test]
    fn spike_is_smoothed_and_detected() {
        let trend = Analyzer::new(0.3)
            .analyze(&series(&[10.0, 20.0, 10.0, 40.0, 10.0]))
            .unwrap();

        let expected = [10.0, 13.0, 12.1, 20.47, 17.329];
        assert_eq!(trend.smoothed.len(), expected.len());
        for (&got, &exp) in trend.smoothed.iter().zip(&expected) {
            assert_close(got, exp);
        }

        let stats = &trend.stats;
        assert_close(stats.raw_mean, 18.0);
        assert_close(stats.smoothed_mean, 14.5798);
        assert_eq!(stats.peak_value, 40.0);
        assert_eq!(stats.peak_timestamp, 3.0);
    }

    #[test]
    fn smoothed_series_is_aligned_and_damped() {
        let raw = [4.0, 9.0, 1.0, 1.0, 7.5, 30.0, 0.0];
        let trend = Analyzer::new(0.3).analyze(&series(&raw)).unwrap();

        assert_eq!(trend.smoothed.len(), raw.len());
        assert_eq!(trend.smoothed[0], raw[0]);
        for i in 1..raw.len() {
            let lo = raw[i].min(trend.smoothed[i - 1]);
            let hi = raw[i].max(trend.smoothed[i - 1]);
            assert!(lo <= trend.smoothed[i] && trend.smoothed[i] <= hi);
        }
    }

    #[test]
    fn peak_ties_resolve_to_first_timestamp() {
        let trend = Analyzer::new(0.3)
            .analyze(&series(&[1.0, 5.0, 2.0, 5.0]))
            .unwrap();
        assert_eq!(trend.stats.peak_value, 5.0);
        assert_eq!(trend.stats.peak_timestamp, 1.0);
    }

    #[test]
    fn analysis_is_idempotent() {
        let analyzer = Analyzer::new(0.3);
        let series = series(&[3.0, 8.0, 2.5, 6.0]);
        assert_eq!(analyzer.analyze(&series), analyzer.analyze(&series));
    }

    #[test]
    fn single_sample_series() {
        let trend = Analyzer::new(0.3).analyze(&series(&[42.0])).unwrap();
        assert_eq!(trend.smoothed, vec![42.0]);
        assert_eq!(trend.stats.raw_mean, 42.0);
        assert_eq!(trend.stats.smoothed_mean, 42.0);
        assert_eq!(trend.stats.peak_timestamp, 0.0);
    }

    #[test]
    fn empty_series_is_an_error() {
        assert_eq!(
            Analyzer::new(0.3).analyze(&Series::new()),
            Err(AnalysisError::EmptySeries)
        );
    }

    #[test]
    fn report_is_saved_as_msgpack() {
        let series = series(&[1.0, 2.0]);
        let trend = Analyzer::new(0.3).analyze(&series).unwrap();
        let collection = Collection {
            series,
            n_iterations: 3,
            elapsed: 2.5,
            cancelled: false,
        };
        let report = Report::new(MetricKind::Cpu, "4321", collection, trend);

        let file = std::env::temp_dir().join(format!("usetrend-report-{}.msgpack", std::process::id()));
        report.save(&file).unwrap();

        let bytes = std::fs::read(&file).unwrap();
        let loaded: Report = rmp_serde::from_slice(&bytes).unwrap();
        std::fs::remove_file(&file).ok();

        assert_eq!(loaded.metric, MetricKind::Cpu);
        assert_eq!(loaded.target, "4321");
        assert_eq!(loaded.series, report.series);
        assert_eq!(loaded.trend, report.trend);
        assert_eq!(loaded.n_iterations, 3);
    }
}
