use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{fmt::Debug, fs, ops::RangeBounds, path::Path};

/// Run profile.
///
/// Loaded from a TOML file and validated before use.
/// Every section is optional and falls back to its default.
/// See [`Config::from_file`] for loading.
#[derive(Debug, Default, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Sampling loop parameters.
    pub sampling: SamplingConfig,

    /// Trend analysis parameters.
    pub analysis: AnalysisConfig,

    /// Probe command override (per-metric default if absent).
    pub probe: Option<ProbeConfig>,
}

/// Sampling loop parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SamplingConfig {
    /// Length of the observation window (seconds).
    pub duration: f64,
    /// Target time between iteration starts (seconds).
    pub sample_interval: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            duration: 120.0,
            sample_interval: 0.4,
        }
    }
}

/// Trend analysis parameters.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AnalysisConfig {
    /// Smoothing factor of the exponential moving average.
    pub alpha: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { alpha: 0.3 }
    }
}

/// External probe command.
///
/// Every occurrence of `{target}` in `args` is replaced by the target identifier.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Program to execute.
    pub program: String,
    /// Argument template.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Config {
    /// Load a [`Config`] from a file.
    ///
    /// The file must be TOML-encoded and contain a serialized [`Config`].
    /// Performs validation on all parameters before returning.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, deserialized,
    /// or if the configuration values are invalid.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let contents =
            fs::read_to_string(file).with_context(|| format!("failed to read {file:?}"))?;

        let config: Config = toml::from_str(&contents).context("failed to deserialize config")?;

        config.validate().context("failed to validate config")?;

        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let duration = self.sampling.duration;
        check_num(duration, f64::MIN_POSITIVE..=86_400.0).context("invalid duration")?;
        check_num(self.sampling.sample_interval, f64::MIN_POSITIVE..=duration)
            .context("invalid sample interval")?;

        check_num(self.analysis.alpha, f64::MIN_POSITIVE..=1.0)
            .context("invalid smoothing factor")?;

        if let Some(probe) = &self.probe {
            if probe.program.trim().is_empty() {
                bail!("probe program must not be empty");
            }
        }

        Ok(())
    }
}

fn check_num<T, R>(num: T, range: R) -> Result<()>
where
    T: PartialOrd + Debug,
    R: RangeBounds<T> + Debug,
{
    if !range.contains(&num) {
        bail!("number must be in the range {range:?}, but is {num:?}");
    }
    Ok(())
}
