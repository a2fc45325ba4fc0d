use crate::config::SamplingConfig;
use crate::extract::{ExtractionError, Extractor};
use crate::probe::{Probe, ProbeError};
use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    sync::{Arc, Condvar, Mutex, PoisonError},
    time::{Duration, Instant},
};
use thiserror::Error;

/// One reading of the sampled metric.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// Seconds since the start of the observation window.
    pub timestamp: f64,
    /// Reading in the unit of the metric.
    pub value: f64,
}

/// Samples of one run, in temporal order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    samples: Vec<Sample>,
}

impl Series {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a sample. Timestamps must be non-decreasing.
    pub fn push(&mut self, sample: Sample) {
        debug_assert!(
            self.samples
                .last()
                .is_none_or(|last| last.timestamp <= sample.timestamp),
            "samples must be pushed in temporal order"
        );
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|sample| sample.value)
    }

    pub fn timestamps(&self) -> impl Iterator<Item = f64> + '_ {
        self.samples.iter().map(|sample| sample.timestamp)
    }
}

impl FromIterator<Sample> for Series {
    fn from_iter<I: IntoIterator<Item = Sample>>(iter: I) -> Self {
        let mut series = Series::new();
        for sample in iter {
            series.push(sample);
        }
        series
    }
}

/// Reason a loop iteration produced no sample.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("probe unavailable: {0}")]
    Probe(#[from] ProbeError),

    #[error("parse failure: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Shareable handle that stops a running [`Sampler`].
///
/// Cancellation is observed between iterations and wakes the sampler
/// out of its inter-sample sleep.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let (lock, cvar) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Block for `timeout` or until cancelled; returns whether cancelled.
    fn sleep(&self, timeout: Duration) -> bool {
        let (lock, cvar) = &*self.inner;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = cvar
            .wait_timeout_while(guard, timeout, |cancelled| !*cancelled)
            .unwrap_or_else(PoisonError::into_inner);
        *guard
    }
}

/// Outcome of one sampling run.
#[derive(Debug)]
pub struct Collection {
    pub series: Series,
    /// Number of probe invocations.
    pub n_iterations: usize,
    /// Wall time from start to return (seconds).
    pub elapsed: f64,
    /// Whether the run was stopped before the window elapsed.
    pub cancelled: bool,
}

/// Fixed-cadence, drift-corrected sampling loop.
#[derive(Debug, Clone)]
pub struct Sampler {
    duration: Duration,
    interval: Duration,
}

impl Sampler {
    pub fn new(cfg: &SamplingConfig) -> Result<Self> {
        let duration =
            Duration::try_from_secs_f64(cfg.duration).context("invalid sampling duration")?;
        let interval = Duration::try_from_secs_f64(cfg.sample_interval)
            .context("invalid sample interval")?;
        if duration.is_zero() || interval.is_zero() {
            bail!("sampling duration and interval must be positive");
        }
        Ok(Self { duration, interval })
    }

    /// Poll `probe` every sample interval until the duration elapses.
    ///
    /// Each iteration sleeps for the interval minus its own processing
    /// time, so iteration starts are spaced by the interval regardless of
    /// probe latency. Iterations without a usable reading are skipped.
    pub fn run<P: Probe + ?Sized>(
        &self,
        probe: &mut P,
        extractor: &Extractor,
        target: &str,
        cancel: &CancelToken,
    ) -> Collection {
        let mut series = Series::new();
        let mut n_iterations = 0;
        let mut cancelled = false;

        let start = Instant::now();
        while start.elapsed() < self.duration {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            let iteration_start = Instant::now();
            let reading = sample_once(probe, extractor, target);
            n_iterations += 1;

            let elapsed = start.elapsed();
            match reading {
                Ok(value) if elapsed < self.duration => {
                    let timestamp = elapsed.as_secs_f64();
                    log::debug!("captured {value} at {timestamp:.3}s");
                    series.push(Sample { timestamp, value });
                }
                Ok(value) => {
                    log::debug!("discarded {value} past the observation window");
                }
                Err(err) => {
                    log::debug!("no sample at iteration {n_iterations}: {err}");
                }
            }

            let progress = 100.0 * (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0);
            log::info!("completed {progress:06.2}% ({} samples)", series.len());

            let remaining = self.interval.saturating_sub(iteration_start.elapsed());
            if !remaining.is_zero() && cancel.sleep(remaining) {
                cancelled = true;
                break;
            }
        }

        Collection {
            series,
            n_iterations,
            elapsed: start.elapsed().as_secs_f64(),
            cancelled,
        }
    }
}

fn sample_once<P: Probe + ?Sized>(
    probe: &mut P,
    extractor: &Extractor,
    target: &str,
) -> Result<f64, SampleError> {
    let raw = probe.query(target)?;
    let value = extractor.extract(&raw, target)?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::Selector;
    use std::thread;

    /// Probe that replays scripted outputs with a fixed latency.
    struct FakeProbe {
        outputs: Vec<Option<&'static str>>,
        latency: Duration,
        n_queries: usize,
    }

    impl FakeProbe {
        fn new(outputs: Vec<Option<&'static str>>, latency: f64) -> Self {
            Self {
                outputs,
                latency: Duration::from_secs_f64(latency),
                n_queries: 0,
            }
        }
    }

    impl Probe for FakeProbe {
        fn query(&mut self, _target: &str) -> Result<String, ProbeError> {
            thread::sleep(self.latency);
            let output = self.outputs[self.n_queries % self.outputs.len()];
            self.n_queries += 1;
            output.map(str::to_string).ok_or(ProbeError::Empty {
                program: "fake".to_string(),
            })
        }
    }

    fn sampler(duration: f64, sample_interval: f64) -> Sampler {
        Sampler::new(&SamplingConfig {
            duration,
            sample_interval,
        })
        .unwrap()
    }

    fn extractor() -> Extractor {
        Extractor::new(Selector::Target, 1, 1.0)
    }

    #[test]
    fn invalid_config_is_rejected() {
        let cfg = |duration, sample_interval| SamplingConfig {
            duration,
            sample_interval,
        };
        assert!(Sampler::new(&cfg(0.0, 0.1)).is_err());
        assert!(Sampler::new(&cfg(1.0, -0.1)).is_err());
        assert!(Sampler::new(&cfg(f64::NAN, 0.1)).is_err());
    }

    #[test]
    fn drift_correction_keeps_cadence() {
        let mut probe = FakeProbe::new(vec![Some("app 5.0")], 0.1);
        let collection = sampler(2.0, 0.5).run(&mut probe, &extractor(), "app", &CancelToken::new());

        let series = &collection.series;
        assert!((3..=4).contains(&series.len()), "got {} samples", series.len());
        assert_eq!(collection.n_iterations, series.len());
        assert!(!collection.cancelled);

        let timestamps: Vec<_> = series.timestamps().collect();
        assert!(timestamps[0] >= 0.1);
        for pair in timestamps.windows(2) {
            let spacing = pair[1] - pair[0];
            assert!((spacing - 0.5).abs() < 0.15, "spacing {spacing}");
        }
        assert!(timestamps.iter().all(|&t| t < 2.0));
    }

    #[test]
    fn slow_probe_never_sleeps_and_respects_duration() {
        let mut probe = FakeProbe::new(vec![Some("app 1.0")], 0.3);
        let collection = sampler(1.0, 0.1).run(&mut probe, &extractor(), "app", &CancelToken::new());

        let series = &collection.series;
        assert!((2..=4).contains(&series.len()), "got {} samples", series.len());
        let timestamps: Vec<_> = series.timestamps().collect();
        for pair in timestamps.windows(2) {
            assert!(pair[1] - pair[0] >= 0.3);
        }
        assert!(timestamps.iter().all(|&t| t < 1.0));
        assert!(collection.elapsed < 1.5);
    }

    #[test]
    fn absent_readings_are_skipped() {
        let outputs = vec![Some("app 1.0"), None, Some("garbage"), Some("app 4.0")];
        let mut probe = FakeProbe::new(outputs, 0.0);
        let collection = sampler(0.38, 0.1).run(&mut probe, &extractor(), "app", &CancelToken::new());

        assert_eq!(collection.n_iterations, 4);
        let values: Vec<_> = collection.series.values().collect();
        assert_eq!(values, vec![1.0, 4.0]);
    }

    #[test]
    fn failing_probe_yields_empty_series() {
        let mut probe = FakeProbe::new(vec![None], 0.0);
        let collection = sampler(0.3, 0.1).run(&mut probe, &extractor(), "app", &CancelToken::new());
        assert!(collection.n_iterations >= 1);
        assert!(collection.series.is_empty());
    }

    #[test]
    fn cancel_interrupts_sleep() {
        let cancel = CancelToken::new();
        let handle = {
            let cancel = cancel.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(200));
                cancel.cancel();
            })
        };

        let mut probe = FakeProbe::new(vec![Some("app 2.0")], 0.0);
        let begin = Instant::now();
        let collection = sampler(60.0, 10.0).run(&mut probe, &extractor(), "app", &cancel);
        handle.join().unwrap();

        assert!(begin.elapsed() < Duration::from_secs(5));
        assert!(collection.cancelled);
        assert_eq!(collection.series.len(), 1);
        assert_eq!(collection.series.samples()[0].value, 2.0);
    }

    #[test]
    fn cancelled_token_stops_before_first_probe() {
        let cancel = CancelToken::new();
        cancel.cancel();
        assert!(cancel.is_cancelled());

        let mut probe = FakeProbe::new(vec![Some("app 2.0")], 0.0);
        let collection = sampler(1.0, 0.1).run(&mut probe, &extractor(), "app", &cancel);
        assert_eq!(collection.n_iterations, 0);
        assert!(collection.cancelled);
        assert!(collection.series.is_empty());
    }
}
