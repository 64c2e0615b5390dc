//! # `sh -c` interpreter.
//!
//! [`ShellInterpreter`] validates quoting with `shell-words` and hands the line
//! to a POSIX shell. Each command gets its own process group so cancellation
//! reaches everything the shell spawned.
//!
//! ## Cancellation
//! ```text
//! cancel ─► SIGTERM to the group ─► wait kill_grace ─► SIGKILL to the group
//!                                          └─ exited ──► Err(Canceled)
//! ```

use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::command::{Interpreter, Invocation, OutputSink, Script};
use crate::error::CommandError;

/// How long output readers may lag behind the exit of the command.
const OUTPUT_FLUSH: Duration = Duration::from_millis(250);

/// Consecutive read errors after which a reader gives up on its stream.
const MAX_READ_ERRORS: usize = 8;

/// Default interpreter: runs command lines through `sh -c`.
#[derive(Debug, Clone)]
pub struct ShellInterpreter {
    shell: String,
    kill_grace: Duration,
}

impl ShellInterpreter {
    /// Creates an interpreter using `sh` with the given kill grace.
    pub fn new(kill_grace: Duration) -> Self {
        Self {
            shell: "sh".to_string(),
            kill_grace,
        }
    }

    /// Returns a new interpreter using another shell binary (must accept `-c`).
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Terminates the child's process group, escalating after `kill_grace`.
    async fn terminate(&self, child: &mut Child) {
        #[cfg(unix)]
        {
            if let Some(pid) = child.id() {
                let pgid = pid as libc::pid_t;
                // SAFETY: plain syscall on a process group created for this child.
                unsafe {
                    libc::killpg(pgid, libc::SIGTERM);
                }
                if tokio::time::timeout(self.kill_grace, child.wait())
                    .await
                    .is_ok()
                {
                    return;
                }
                debug!(pid, "kill grace elapsed, sending SIGKILL");
                // SAFETY: as above.
                unsafe {
                    libc::killpg(pgid, libc::SIGKILL);
                }
            }
        }
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

impl Default for ShellInterpreter {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

#[async_trait]
impl Interpreter for ShellInterpreter {
    fn parse(&self, line: &str) -> Result<Script, CommandError> {
        let words = shell_words::split(line).map_err(|e| CommandError::Syntax {
            error: e.to_string(),
        })?;
        if words.is_empty() {
            return Err(CommandError::Syntax {
                error: "empty command".to_string(),
            });
        }
        Ok(Script::new(line, words))
    }

    async fn execute(
        &self,
        script: Script,
        invocation: Invocation,
        cancel: CancellationToken,
    ) -> Result<(), CommandError> {
        let mut cmd = Command::new(&self.shell);
        cmd.arg("-c")
            .arg(script.source())
            .env_clear()
            .envs(&invocation.env)
            .stdin(Stdio::inherit())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &invocation.cwd {
            cmd.current_dir(dir);
        }
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|e| CommandError::Spawn {
            error: e.to_string(),
        })?;

        let mut pumps = Vec::with_capacity(2);
        if let Some(out) = child.stdout.take() {
            pumps.push(pump(out, Arc::clone(&invocation.stdout)));
        }
        if let Some(err) = child.stderr.take() {
            pumps.push(pump(err, Arc::clone(&invocation.stderr)));
        }

        let outcome = tokio::select! {
            status = child.wait() => status
                .map_err(|e| CommandError::Spawn { error: e.to_string() })
                .and_then(exit_result),
            _ = cancel.cancelled() => {
                self.terminate(&mut child).await;
                Err(CommandError::Canceled)
            }
        };

        for handle in pumps {
            if tokio::time::timeout(OUTPUT_FLUSH, handle).await.is_err() {
                debug!("output reader still open after exit, detaching");
            }
        }
        outcome
    }
}

/// Forwards every line of `stream` to `sink` until EOF.
///
/// Lines are split on raw bytes; invalid UTF-8 is replaced, never fatal. The
/// pipe stays drained so the child never blocks or dies writing to it.
fn pump<R>(stream: R, sink: Arc<dyn OutputSink>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut errors = 0;
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    errors = 0;
                    sink.line(&String::from_utf8_lossy(trim_newline(&buf)));
                }
                Err(e) => {
                    errors += 1;
                    warn!(error = %e, "reading command output failed");
                    if !buf.is_empty() {
                        sink.line(&String::from_utf8_lossy(trim_newline(&buf)));
                    }
                    if errors >= MAX_READ_ERRORS {
                        break;
                    }
                }
            }
        }
    })
}

fn trim_newline(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

fn exit_result(status: ExitStatus) -> Result<(), CommandError> {
    if status.success() {
        return Ok(());
    }
    if let Some(code) = status.code() {
        return Err(CommandError::Exit { code });
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return Err(CommandError::Signaled { signal });
        }
    }
    Err(CommandError::Exit { code: -1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::effective_env;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use std::time::Instant;

    #[derive(Default)]
    struct Capture {
        lines: Mutex<Vec<String>>,
    }

    impl OutputSink for Capture {
        fn line(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }

    fn invocation(out: Arc<Capture>, err: Arc<Capture>) -> Invocation {
        Invocation {
            cwd: None,
            env: effective_env(&BTreeMap::from([(
                "GREETING".to_string(),
                "hello".to_string(),
            )])),
            stdout: out,
            stderr: err,
        }
    }

    #[test]
    fn parse_rejects_bad_quoting_and_empty_lines() {
        let sh = ShellInterpreter::default();
        assert!(matches!(sh.parse("echo 'open"), Err(CommandError::Syntax { .. })));
        assert!(matches!(sh.parse("   "), Err(CommandError::Syntax { .. })));
        let script = sh.parse("echo 'a b' c").unwrap();
        assert_eq!(script.words(), ["echo", "a b", "c"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn routes_output_and_environment() {
        let sh = ShellInterpreter::default();
        let (out, err) = (Arc::new(Capture::default()), Arc::new(Capture::default()));
        let script = sh.parse("echo $GREETING; echo oops >&2").unwrap();

        sh.execute(script, invocation(out.clone(), err.clone()), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(*out.lines.lock().unwrap(), vec!["hello"]);
        assert_eq!(*err.lines.lock().unwrap(), vec!["oops"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn invalid_utf8_output_keeps_the_stream_flowing() {
        let sh = ShellInterpreter::default();
        let out = Arc::new(Capture::default());
        let inv = invocation(out.clone(), Arc::default());
        let script = sh
            .parse(r"echo before; printf 'caf\351\n'; echo after; seq 1 200000")
            .unwrap();

        sh.execute(script, inv, CancellationToken::new())
            .await
            .unwrap();

        let lines = out.lines.lock().unwrap();
        assert_eq!(lines.len(), 200_003);
        assert_eq!(lines[..3], ["before", "caf\u{FFFD}", "after"]);
        assert_eq!(lines.last().map(String::as_str), Some("200000"));
    }

    #[test]
    fn trailing_line_endings_are_stripped() {
        assert_eq!(trim_newline(b"a\r\n"), b"a");
        assert_eq!(trim_newline(b"a\n"), b"a");
        assert_eq!(trim_newline(b"a"), b"a");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn runs_in_requested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let sh = ShellInterpreter::default();
        let out = Arc::new(Capture::default());
        let mut inv = invocation(out.clone(), Arc::new(Capture::default()));
        inv.cwd = Some(dir.path().to_path_buf());

        sh.execute(sh.parse("pwd -P").unwrap(), inv, CancellationToken::new())
            .await
            .unwrap();

        let expected = dir.path().canonicalize().unwrap();
        assert_eq!(
            out.lines.lock().unwrap()[0],
            expected.to_string_lossy().to_string()
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn non_zero_exit_is_reported() {
        let sh = ShellInterpreter::default();
        let inv = invocation(Arc::default(), Arc::default());
        let res = sh
            .execute(sh.parse("exit 3").unwrap(), inv, CancellationToken::new())
            .await;
        assert!(matches!(res, Err(CommandError::Exit { code: 3 })));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn cancellation_stops_the_whole_group() {
        let sh = ShellInterpreter::new(Duration::from_secs(2));
        let inv = invocation(Arc::default(), Arc::default());
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let res = sh
            .execute(sh.parse("sleep 5; sleep 5").unwrap(), inv, cancel)
            .await;

        assert!(matches!(res, Err(CommandError::Canceled)));
        assert!(started.elapsed() < Duration::from_secs(3));
    }
}
