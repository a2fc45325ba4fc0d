use crate::config::ProbeConfig;
use std::{
    io,
    process::{Command, ExitStatus},
};
use thiserror::Error;

/// Placeholder replaced by the target identifier in probe arguments.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Failure to obtain any usable output from a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program:?} produced no output and exited with {status}")]
    Status { program: String, status: ExitStatus },

    #[error("{program:?} produced no output")]
    Empty { program: String },
}

/// Source of raw text for one sample.
pub trait Probe {
    fn query(&mut self, target: &str) -> Result<String, ProbeError>;
}

/// Probe backed by an external program.
///
/// The program is executed directly (no shell) once per query
/// and its standard output is returned as the raw text.
#[derive(Debug, Clone)]
pub struct CommandProbe {
    program: String,
    args: Vec<String>,
}

impl CommandProbe {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    pub fn from_config(cfg: &ProbeConfig) -> Self {
        Self::new(cfg.program.clone(), cfg.args.clone())
    }

    /// Command line with the target substituted, for logging.
    pub fn command_line(&self, target: &str) -> String {
        let mut line = self.program.clone();
        for arg in self.expand_args(target) {
            line.push(' ');
            line.push_str(&arg);
        }
        line
    }

    fn expand_args(&self, target: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace(TARGET_PLACEHOLDER, target))
            .collect()
    }
}

impl Probe for CommandProbe {
    fn query(&mut self, target: &str) -> Result<String, ProbeError> {
        let output = Command::new(&self.program)
            .args(self.expand_args(target))
            .output()
            .map_err(|source| ProbeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if stdout.trim().is_empty() {
            let program = self.program.clone();
            if output.status.success() {
                return Err(ProbeError::Empty { program });
            }
            return Err(ProbeError::Status {
                program,
                status: output.status,
            });
        }

        Ok(stdout)
    }
}
