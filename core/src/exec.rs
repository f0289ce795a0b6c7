//! Process supervisor: spawns children for the compile and execute phases
//! and hands their stdio back to the caller.
//!
//! The supervisor does not interpret output and does not retry. Sandbox
//! teardown is the session's responsibility via the pool release path.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Child;
use tokio::process::ChildStderr;
use tokio::process::ChildStdin;
use tokio::process::ChildStdout;
use tokio::process::Command;

use crate::error::Result;
use crate::error::RunnerErr;

/// Result of a non-interactive run, e.g. a compile step.
#[derive(Debug)]
pub struct CapturedOutput {
    pub exit_code: i32,
    /// stdout followed by stderr.
    pub output: String,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn command(argv: &[String], cwd: &Path) -> Result<Command> {
    let Some(program) = argv.first() else {
        return Err(RunnerErr::Spawn("command args are empty".to_string()));
    };
    let mut cmd = Command::new(program);
    cmd.args(&argv[1..]);
    cmd.current_dir(cwd);
    Ok(cmd)
}

/// Run `argv` to completion and capture its combined output. Compilation is
/// non-interactive, so stdin is closed up front.
pub async fn run_captured(argv: &[String], cwd: &Path) -> Result<CapturedOutput> {
    let output = command(argv, cwd)?
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(CapturedOutput {
        exit_code: output.status.code().unwrap_or(-1),
        output: combined,
    })
}

/// A spawned execute-phase child with all three stdio streams piped.
///
/// The read halves are handed to the stream readers; the write half stays
/// with the session so client `input` messages can reach the program.
pub struct InteractiveChild {
    pub stdin: ChildStdin,
    pub stdout: ChildStdout,
    pub stderr: ChildStderr,
    pub child: Child,
}

/// Spawn `argv` with piped stdio. The child is killed on drop, so an
/// aborted session cannot leak the process.
pub fn spawn_interactive(argv: &[String], cwd: &Path) -> Result<InteractiveChild> {
    let mut child = command(argv, cwd)?
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()?;

    // All three were configured with `Stdio::piped()`, so `take()` should
    // normally return `Some`. If it doesn't we treat it as a spawn failure.
    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| RunnerErr::Spawn("child stdin not captured".to_string()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| RunnerErr::Spawn("child stdout not captured".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| RunnerErr::Spawn("child stderr not captured".to_string()))?;

    Ok(InteractiveChild {
        stdin,
        stdout,
        stderr,
        child,
    })
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;
    use tokio::io::AsyncWriteExt;

    use super::*;

    fn sh(script: &str) -> Vec<String> {
        vec!["/bin/sh".to_string(), "-c".to_string(), script.to_string()]
    }

    #[tokio::test]
    async fn run_captured_combines_stdout_and_stderr() {
        let result = run_captured(&sh("echo out; echo err 1>&2; exit 3"), Path::new("/"))
            .await
            .unwrap();
        assert_eq!(result.exit_code, 3);
        assert!(!result.success());
        assert!(result.output.contains("out"));
        assert!(result.output.contains("err"));
    }

    #[tokio::test]
    async fn run_captured_reports_success() {
        let result = run_captured(&sh("true"), Path::new("/")).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.success());
    }

    #[tokio::test]
    async fn empty_argv_is_a_spawn_error() {
        let result = run_captured(&[], Path::new("/")).await;
        assert!(matches!(result, Err(RunnerErr::Spawn(_))));
    }

    #[tokio::test]
    async fn spawn_interactive_bridges_stdin_to_stdout() {
        let mut running = spawn_interactive(&sh(r#"read line; echo "got $line""#), Path::new("/"))
            .expect("spawn should succeed");

        running.stdin.write_all(b"hello\n").await.unwrap();
        drop(running.stdin);

        let mut out = String::new();
        running.stdout.read_to_string(&mut out).await.unwrap();
        assert_eq!(out, "got hello\n");

        let status = running.child.wait().await.unwrap();
        assert_eq!(status.code(), Some(0));
    }
}
