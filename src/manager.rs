use crate::analysis::{Analyzer, Report};
use crate::chart::save_chart;
use crate::config::Config;
use crate::extract::MetricKind;
use crate::probe::CommandProbe;
use crate::sampler::{CancelToken, Sampler};
use anyhow::{Context, Result};
use glob::glob;
use std::{
    fs,
    path::{Path, PathBuf},
    thread,
};

pub struct Manager {
    out_dir: PathBuf,
    cfg: Config,
}

impl Manager {
    pub fn new<P: AsRef<Path>>(out_dir: P) -> Result<Self> {
        let out_dir = out_dir.as_ref().to_path_buf();

        let config_file = out_dir.join("config.toml");
        let cfg = if config_file.exists() {
            Config::from_file(&config_file).context("failed to construct cfg")?
        } else {
            log::info!("no {config_file:?}, using the default profile");
            Config::default()
        };
        log::info!("{cfg:#?}");

        Ok(Self { out_dir, cfg })
    }

    /// Sample `target` for one observation window and write the run outputs.
    pub fn sample_target(&self, metric: MetricKind, target: &str) -> Result<()> {
        let mut probe = match &self.cfg.probe {
            Some(probe_cfg) => CommandProbe::from_config(probe_cfg),
            None => metric.default_probe(),
        };
        log::info!("probing with `{}`", probe.command_line(target));

        let sampler = Sampler::new(&self.cfg.sampling).context("failed to construct sampler")?;
        let cancel = CancelToken::new();
        cancel_on_ctrl_c(cancel.clone()).context("failed to install Ctrl+C handler")?;
        let collection = sampler.run(&mut probe, &metric.extractor(), target, &cancel);
        if collection.cancelled {
            log::warn!("sampling stopped before the observation window elapsed");
        }
        if collection.series.is_empty() {
            log::warn!("no usable reading in {} iterations", collection.n_iterations);
        }

        let trend = Analyzer::new(self.cfg.analysis.alpha)
            .analyze(&collection.series)
            .with_context(|| {
                format!(
                    "failed to analyze {} iterations of {target:?}",
                    collection.n_iterations
                )
            })?;

        let report = Report::new(metric, target, collection, trend);
        report.log_summary();

        let run_idx = self.next_run_idx().context("failed to find next run index")?;
        let run_dir = self.run_dir(run_idx);
        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("failed to create {:?}", self.out_dir))?;
        fs::create_dir(&run_dir).with_context(|| format!("failed to create {run_dir:?}"))?;
        log::info!("created {run_dir:?}");

        report
            .save(self.results_file(run_idx))
            .context("failed to save results")?;

        let chart_file = self.chart_file(run_idx);
        save_chart(&report, &chart_file).context("failed to save chart")?;
        log::info!("saved {chart_file:?}");

        Ok(())
    }

    /// Remove every run directory.
    pub fn clean_runs(&self) -> Result<()> {
        for run_dir in self.run_dirs().context("failed to list run dirs")? {
            fs::remove_dir_all(&run_dir)
                .with_context(|| format!("failed to remove {run_dir:?}"))?;
            log::info!("removed {run_dir:?}");
        }
        Ok(())
    }

    fn run_dirs(&self) -> Result<Vec<PathBuf>> {
        let pattern = self.out_dir.join("run-*");
        let pattern = pattern.to_str().context("pattern is not valid UTF-8")?;
        let run_dirs = glob(pattern)
            .context("failed to glob run dirs")?
            .filter_map(Result::ok)
            .filter(|p| p.is_dir())
            .collect();
        Ok(run_dirs)
    }

    /// One past the highest existing run index.
    fn next_run_idx(&self) -> Result<usize> {
        let max_idx = self
            .run_dirs()?
            .iter()
            .filter_map(|run_dir| parse_run_idx(run_dir))
            .max();
        Ok(max_idx.map_or(0, |idx| idx + 1))
    }

    fn run_dir(&self, run_idx: usize) -> PathBuf {
        self.out_dir.join(format!("run-{run_idx:04}"))
    }

    fn results_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("results.msgpack")
    }

    fn chart_file(&self, run_idx: usize) -> PathBuf {
        self.run_dir(run_idx).join("chart.svg")
    }
}

fn parse_run_idx(run_dir: &Path) -> Option<usize> {
    run_dir
        .file_name()?
        .to_str()?
        .strip_prefix("run-")?
        .parse()
        .ok()
}

/// Cancel `cancel` on Ctrl+C instead of terminating the process.
fn cancel_on_ctrl_c(cancel: CancelToken) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_io()
        .build()
        .context("failed to build signal runtime")?;

    thread::spawn(move || {
        runtime.block_on(async {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    log::warn!("received Ctrl+C");
                    cancel.cancel();
                }
                Err(err) => log::error!("failed to listen for Ctrl+C: {err}"),
            }
        });
    });

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_idx_is_parsed_from_dir_name() {
        assert_eq!(parse_run_idx(Path::new("out/run-0000")), Some(0));
        assert_eq!(parse_run_idx(Path::new("out/run-0017")), Some(17));
        assert_eq!(parse_run_idx(Path::new("out/run-old")), None);
        assert_eq!(parse_run_idx(Path::new("out/chart.svg")), None);
    }

    #[test]
    fn next_run_idx_follows_highest_existing() {
        let out_dir = std::env::temp_dir().join(format!("usetrend-runs-{}", std::process::id()));
        fs::remove_dir_all(&out_dir).ok();
        fs::create_dir_all(out_dir.join("run-0001")).unwrap();
        fs::create_dir_all(out_dir.join("run-0004")).unwrap();

        let mgr = Manager::new(&out_dir).unwrap();
        assert_eq!(mgr.next_run_idx().unwrap(), 5);

        mgr.clean_runs().unwrap();
        assert_eq!(mgr.next_run_idx().unwrap(), 0);

        fs::remove_dir_all(&out_dir).ok();
    }
}
