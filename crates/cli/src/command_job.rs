//! Shell commands as job work.

use std::{collections::BTreeMap, path::PathBuf, process::Stdio, time::Duration};

use {
    anyhow::{Context, bail},
    cadence_config::JobConfig,
    cadence_jobs::{JobFn, job_fn},
    tokio::process::Command,
};

/// Longest stderr excerpt carried into a failure message.
const STDERR_TAIL: usize = 512;

#[derive(Debug, Clone)]
struct CommandSpec {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

/// Build the work for a configured job.
///
/// Each attempt spawns `command args...`. A non-zero exit status, a spawn
/// failure or an elapsed timeout fail the attempt; stdout is the output.
pub fn command_job(job: &JobConfig) -> anyhow::Result<JobFn> {
    let spec = CommandSpec {
        program: job.command.clone(),
        args: job.args.clone(),
        env: job.env.clone(),
        working_dir: job.working_dir.clone(),
        timeout: job
            .timeout()
            .with_context(|| format!("job '{}': invalid timeout", job.name))?,
    };
    Ok(job_fn(move || {
        let spec = spec.clone();
        async move { spec.run().await }
    }))
}

impl CommandSpec {
    async fn run(&self) -> anyhow::Result<String> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .envs(&self.env)
            .stdin(Stdio::null())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        let output = cmd.output();
        let output = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, output)
                .await
                .map_err(|_| anyhow::anyhow!("'{}' timed out after {limit:?}", self.program))?,
            None => output.await,
        }
        .with_context(|| format!("failed to spawn '{}'", self.program))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stderr = stderr.trim();
            let tail = match stderr.char_indices().rev().nth(STDERR_TAIL) {
                Some((idx, _)) => &stderr[idx..],
                None => stderr,
            };
            if tail.is_empty() {
                bail!("'{}' exited with {}", self.program, output.status);
            }
            bail!("'{}' exited with {}: {tail}", self.program, output.status);
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
    }
}
