//! Per-connection session coordinator.
//!
//! A session exclusively borrows one box from the pool for its lifetime,
//! owns at most one child process, and bridges the child's three stdio
//! streams to the client's message channel. All outbound frames pass
//! through one writer task, so frames on a connection are totally ordered.

use std::io;
use std::ops::ControlFlow;
use std::sync::Arc;

use axum::extract::ws::Message;
use axum::extract::ws::WebSocket;
use futures::SinkExt;
use futures::StreamExt;
use futures::stream::SplitSink;
use futures::stream::SplitStream;
use tokio::io::AsyncWriteExt;
use tokio::process::Child;
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;

use runbox_core::exec;
use runbox_core::languages;
use runbox_core::languages::LanguageSpec;
use runbox_core::sandbox::BoxId;
use runbox_core::sandbox::SandboxDriver;
use runbox_core::stream;
use runbox_protocol::ClientMessage;
use runbox_protocol::Frame;

use crate::AppState;

/// Size of the bounded outgoing-frame channel. Stream readers block here
/// when the client cannot keep up, which back-pressures the child's pipes.
const OUTGOING_CAPACITY: usize = 128;

const CRLF: &str = "\r\n";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    Idle,
    Compiling,
    Running,
    Terminal,
}

/// Drive one client connection to completion. On return the box has been
/// released back to the pool, whatever the exit path was.
pub(crate) async fn run(socket: WebSocket, box_id: BoxId, state: AppState) {
    let (sink, inbound) = socket.split();
    let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CAPACITY);
    let writer = tokio::spawn(write_outgoing(sink, outgoing_rx));

    let shutdown = CancellationToken::new();
    let mut session = Session {
        box_id,
        state: SessionState::Idle,
        driver: Arc::clone(&state.driver),
        outgoing: outgoing_tx,
        shutdown: shutdown.clone(),
        child_stdin: None,
        waiter: None,
    };

    session.serve(inbound).await;

    // Terminal actions, on every exit path: kill the child, close the
    // client channel, release the box.
    shutdown.cancel();
    session.child_stdin = None;
    if let Some(waiter) = session.waiter.take() {
        let _ = waiter.await;
    }
    // Dropping the session drops the last outgoing sender; the writer task
    // drains any remaining frames and closes the socket.
    drop(session);
    let _ = writer.await;

    state.pool.release(box_id).await;
    info!("box {box_id} returned to pool");
}

struct Session {
    box_id: BoxId,
    state: SessionState,
    driver: Arc<dyn SandboxDriver>,
    outgoing: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
    child_stdin: Option<ChildStdin>,
    waiter: Option<JoinHandle<()>>,
}

impl Session {
    async fn serve(&mut self, mut inbound: SplitStream<WebSocket>) {
        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = inbound.next() => {
                    let text = match next {
                        Some(Ok(Message::Text(text))) => text,
                        Some(Ok(Message::Close(_))) | None => break,
                        // Pings are answered by the transport layer.
                        Some(Ok(_)) => continue,
                        Some(Err(err)) => {
                            debug!("box {}: read error: {err}", self.box_id);
                            break;
                        }
                    };
                    match serde_json::from_str::<ClientMessage>(text.as_str()) {
                        Ok(message) => {
                            if self.handle(message).await.is_break() {
                                break;
                            }
                        }
                        Err(err) => {
                            debug!("box {}: unparseable message: {err}", self.box_id);
                            self.send(Frame::error("Unknown message type")).await;
                        }
                    }
                }
            }
        }
    }

    async fn handle(&mut self, message: ClientMessage) -> ControlFlow<()> {
        match message {
            ClientMessage::Code { language, source } => self.handle_code(language, source).await,
            ClientMessage::Input { data } => self.handle_input(data).await,
            ClientMessage::Exit => {
                self.send(Frame::client_exit()).await;
                ControlFlow::Break(())
            }
        }
    }

    async fn handle_code(&mut self, language: String, source: String) -> ControlFlow<()> {
        if self.state != SessionState::Idle {
            self.send(Frame::error("Code already submitted")).await;
            return ControlFlow::Continue(());
        }

        let Some(spec) = languages::find(&language) else {
            self.send(Frame::error(format!("Unsupported language: {language}")))
                .await;
            return ControlFlow::Continue(());
        };

        if let Err(err) = self.write_source(spec, &source).await {
            error!("box {}: failed to write source: {err}", self.box_id);
            self.send(Frame::error(format!("Failed to write file: {err}")))
                .await;
            return ControlFlow::Break(());
        }

        if spec.needs_compile() {
            self.state = SessionState::Compiling;
            match self.compile(spec).await {
                Ok(true) => {}
                Ok(false) => {
                    self.state = SessionState::Terminal;
                    return ControlFlow::Break(());
                }
                Err(err) => {
                    error!("box {}: compile run failed: {err}", self.box_id);
                    self.send(Frame::error(format!("Failed to compile: {err}")))
                        .await;
                    return ControlFlow::Break(());
                }
            }
        }

        self.state = SessionState::Running;
        if let Err(err) = self.start_execution(spec) {
            error!("box {}: failed to start execution: {err}", self.box_id);
            self.send(Frame::error(format!("Failed to execute: {err}")))
                .await;
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }

    /// Write the submitted source into the box, creating the `code/`
    /// directory with permissive access so the sandboxed compiler can put
    /// its artifacts next to the source.
    async fn write_source(&self, spec: &LanguageSpec, source: &str) -> runbox_core::Result<()> {
        let path = self.driver.box_dir(self.box_id).join(spec.source_filename);
        if let Some(dir) = path.parent() {
            tokio::fs::create_dir_all(dir).await?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o777)).await?;
            }
        }
        tokio::fs::write(&path, source).await?;
        debug!("box {}: wrote source to {}", self.box_id, path.display());
        Ok(())
    }

    /// Compilation is synchronous from the client's perspective: the
    /// inbound loop blocks until the compiler finishes. Returns whether the
    /// compile succeeded.
    async fn compile(&mut self, spec: &LanguageSpec) -> runbox_core::Result<bool> {
        info!("box {}: compile command: {:?}", self.box_id, spec.compile);
        let argv = self.driver.run_argv(self.box_id, spec.compile);
        let cwd = self.driver.box_dir(self.box_id);
        let result = exec::run_captured(&argv, &cwd).await?;
        if result.success() {
            self.send(Frame::CompileSuccess {
                stdout: result.output,
            })
            .await;
            Ok(true)
        } else {
            info!(
                "box {}: compile failed with exit code {}",
                self.box_id, result.exit_code
            );
            self.send(Frame::CompileError {
                stderr: result.output,
            })
            .await;
            Ok(false)
        }
    }

    fn start_execution(&mut self, spec: &LanguageSpec) -> runbox_core::Result<()> {
        info!("box {}: starting execution: {:?}", self.box_id, spec.execute);
        let argv = self.driver.run_argv(self.box_id, spec.execute);
        let cwd = self.driver.box_dir(self.box_id);
        let running = exec::spawn_interactive(&argv, &cwd)?;

        self.child_stdin = Some(running.stdin);
        let (stdout_task, stderr_task) =
            stream::spawn_output_readers(running.stdout, running.stderr, self.outgoing.clone());
        self.waiter = Some(tokio::spawn(wait_for_exit(
            self.box_id,
            running.child,
            stdout_task,
            stderr_task,
            self.outgoing.clone(),
            self.shutdown.clone(),
        )));
        Ok(())
    }

    async fn handle_input(&mut self, data: String) -> ControlFlow<()> {
        // Without a live stdin there is nowhere to deliver the keystroke.
        let Some(stdin) = self.child_stdin.as_mut() else {
            return ControlFlow::Continue(());
        };

        let data = normalize_input(&data);
        if let Err(err) = write_stdin(stdin, data.as_bytes()).await {
            self.send(Frame::error(format!("stdin write error: {err}")))
                .await;
            return ControlFlow::Break(());
        }

        if data != CRLF {
            self.send(Frame::Echo { data }).await;
        }
        ControlFlow::Continue(())
    }

    async fn send(&self, frame: Frame) {
        let _ = self.outgoing.send(frame).await;
    }
}

/// A bare carriage return or newline becomes `\r\n`; anything else passes
/// through untouched.
fn normalize_input(data: &str) -> String {
    if data == "\r" || data == "\n" {
        CRLF.to_string()
    } else {
        data.to_string()
    }
}

async fn write_stdin(stdin: &mut ChildStdin, bytes: &[u8]) -> io::Result<()> {
    stdin.write_all(bytes).await?;
    stdin.flush().await
}

/// Waits for the execute process. Both stream readers are joined before the
/// `exit` frame is emitted, so no `stdout`/`stderr` frame can follow it.
/// Cancelling the session kills the child.
async fn wait_for_exit(
    box_id: BoxId,
    mut child: Child,
    stdout_task: JoinHandle<()>,
    stderr_task: JoinHandle<()>,
    outgoing: mpsc::Sender<Frame>,
    shutdown: CancellationToken,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        _ = shutdown.cancelled() => {
            // The session is being torn down (client disconnect or exit
            // request). Kill the child and drain the readers; nobody is
            // listening for an exit frame anymore.
            let _ = child.start_kill();
            let _ = child.wait().await;
            let _ = stdout_task.await;
            let _ = stderr_task.await;
            return;
        }
    };

    let _ = stdout_task.await;
    let _ = stderr_task.await;

    let frame = match status {
        Ok(status) => {
            let return_code = status.code().unwrap_or(-1);
            info!("box {box_id}: execution finished with exit code {return_code}");
            Frame::process_exit(return_code, None)
        }
        Err(err) => {
            error!("box {box_id}: wait failed: {err}");
            Frame::process_exit(-1, Some(err.to_string()))
        }
    };
    let _ = outgoing.send(frame).await;

    // Ends the inbound loop so an idle client cannot pin a finished box.
    shutdown.cancel();
}

async fn write_outgoing(mut sink: SplitSink<WebSocket, Message>, mut rx: mpsc::Receiver<Frame>) {
    while let Some(frame) = rx.recv().await {
        let json = match serde_json::to_string(&frame) {
            Ok(json) => json,
            Err(err) => {
                error!("failed to serialize frame: {err}");
                continue;
            }
        };
        if sink.send(Message::Text(json.into())).await.is_err() {
            break;
        }
    }
    let _ = sink.close().await;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn bare_carriage_return_and_newline_normalize_identically() {
        assert_eq!(normalize_input("\r"), "\r\n");
        assert_eq!(normalize_input("\n"), "\r\n");
        assert_eq!(normalize_input("\r\n"), "\r\n");
    }

    #[test]
    fn regular_input_passes_through() {
        assert_eq!(normalize_input("a"), "a");
        assert_eq!(normalize_input("ab\n"), "ab\n");
        assert_eq!(normalize_input(""), "");
    }

    #[test]
    fn only_normalized_line_endings_suppress_the_echo() {
        for data in ["\r", "\n", "\r\n"] {
            assert_eq!(normalize_input(data), CRLF, "{data:?} suppresses echo");
        }
        for data in ["a", "b", " ", "ab"] {
            assert_ne!(normalize_input(data), CRLF, "{data:?} must echo");
        }
    }
}
