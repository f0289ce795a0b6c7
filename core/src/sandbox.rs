//! Thin adapter over the `isolate` jail CLI.
//!
//! All sandbox state lives in the external jail implementation; the driver
//! only shells out. `SandboxDriver` is a trait so the pool and the session
//! coordinator can be exercised against an in-process fake.

use std::fmt;
use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::Result;
use crate::error::RunnerErr;

/// Identifier of one sandbox. Created at server start, never destroyed,
/// recycled through the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoxId(pub u32);

impl fmt::Display for BoxId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[async_trait]
pub trait SandboxDriver: Send + Sync {
    /// Prepare a fresh jail for `id`. Returns the jail's working directory
    /// as reported by the CLI. Callers treat a failure at startup as fatal.
    async fn init(&self, id: BoxId) -> Result<String>;

    /// Tear the jail down. Idempotent from the caller's view: failures are
    /// logged by callers and never prevent a subsequent `init` attempt.
    async fn cleanup(&self, id: BoxId) -> Result<()>;

    /// Host-side path of the jail's working directory.
    fn box_dir(&self, id: BoxId) -> PathBuf;

    /// Full host argv that runs `argv` inside jail `id`.
    fn run_argv(&self, id: BoxId, argv: &[&str]) -> Vec<String>;
}

/// Production driver for the `isolate` CLI with cgroup support enabled.
#[derive(Debug, Default, Clone)]
pub struct IsolateDriver;

const ISOLATE_BIN: &str = "isolate";
const ISOLATE_BOX_ROOT: &str = "/var/local/lib/isolate";

impl IsolateDriver {
    async fn invoke(&self, id: BoxId, subcommand: &str) -> Result<(bool, String)> {
        let output = Command::new(ISOLATE_BIN)
            .arg("--cg")
            .arg("--box-id")
            .arg(id.to_string())
            .arg(subcommand)
            .stdin(Stdio::null())
            .output()
            .await?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        debug!("isolate {subcommand} on box {id}: {}", combined.trim());
        Ok((output.status.success(), combined))
    }
}

#[async_trait]
impl SandboxDriver for IsolateDriver {
    async fn init(&self, id: BoxId) -> Result<String> {
        let (ok, output) = self.invoke(id, "--init").await?;
        if ok {
            Ok(output.trim().to_string())
        } else {
            Err(RunnerErr::BoxInit { id, output })
        }
    }

    async fn cleanup(&self, id: BoxId) -> Result<()> {
        let (ok, output) = self.invoke(id, "--cleanup").await?;
        if ok {
            Ok(())
        } else {
            Err(RunnerErr::BoxCleanup { id, output })
        }
    }

    fn box_dir(&self, id: BoxId) -> PathBuf {
        PathBuf::from(format!("{ISOLATE_BOX_ROOT}/{id}/box"))
    }

    fn run_argv(&self, id: BoxId, argv: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = vec![
            ISOLATE_BIN.to_string(),
            "--cg".to_string(),
            "--box-id".to_string(),
            id.to_string(),
            "--run".to_string(),
            "--".to_string(),
        ];
        full.extend(argv.iter().map(|arg| arg.to_string()));
        full
    }
}
