//! Subprocess adapter: runs an external implementation per invocation.
//!
//! Each invocation gets its own temporary directory holding the document
//! file and the captured stdout/stderr. Output goes to files rather than
//! pipes so a chatty child cannot stall on a full pipe buffer while the
//! harness is polling it. The directory is removed when the invocation
//! returns, on every path.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use jpdiff_error::HarnessError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::adapter::QueryAdapter;
use crate::execution::ExecutionResult;

const DEFAULT_POLL_INTERVAL_MILLIS: u64 = 10;
const STDERR_EXCERPT_CHARS: usize = 400;

/// Placeholder replaced by the query text in argument templates.
pub const QUERY_PLACEHOLDER: &str = "{query}";
/// Placeholder replaced by the per-invocation document path.
pub const DOCUMENT_PLACEHOLDER: &str = "{document}";

/// How the document reaches the child process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentMode {
    /// Written to a file whose path replaces `{document}`.
    #[default]
    File,
    /// Piped to the child's stdin as compact JSON.
    Stdin,
}

/// Launch description for one external implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AdapterCommand {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub document_mode: DocumentMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    /// Parent directory for per-invocation scratch directories. System temp
    /// directory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scratch_dir: Option<PathBuf>,
}

impl AdapterCommand {
    pub fn new(name: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            program: program.into(),
            args: Vec::new(),
            document_mode: DocumentMode::File,
            working_dir: None,
            env: BTreeMap::new(),
            scratch_dir: None,
        }
    }

    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub const fn with_document_mode(mut self, mode: DocumentMode) -> Self {
        self.document_mode = mode;
        self
    }

    #[must_use]
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    fn render_args(&self, query: &str, document_path: &Path) -> Vec<String> {
        let document = document_path.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                arg.replace(QUERY_PLACEHOLDER, query)
                    .replace(DOCUMENT_PLACEHOLDER, &document)
            })
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProcessStatus {
    exit_code: Option<i32>,
    timed_out: bool,
    elapsed_ms: u64,
}

/// Adapter that spawns one child process per invocation.
#[derive(Debug, Clone)]
pub struct SubprocessAdapter {
    command: AdapterCommand,
}

impl SubprocessAdapter {
    #[must_use]
    pub const fn new(command: AdapterCommand) -> Self {
        Self { command }
    }

    fn scratch(&self) -> io::Result<tempfile::TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("jpdiff-");
        match &self.command.scratch_dir {
            Some(parent) => builder.tempdir_in(parent),
            None => builder.tempdir(),
        }
    }

    fn run(&self, query: &str, document: &Value, timeout: Duration) -> Result<ExecutionResult, HarnessError> {
        let name = self.command.name.as_str();
        let io_failure = |what: &str, err: io::Error| HarnessError::execution(name, format!("{what}: {err}"));

        let scratch = self.scratch().map_err(|err| io_failure("scratch dir", err))?;
        let document_path = scratch.path().join("document.json");
        let stdout_path = scratch.path().join("stdout.txt");
        let stderr_path = scratch.path().join("stderr.txt");

        let document_bytes = serde_json::to_vec(document)
            .map_err(|err| HarnessError::execution(name, format!("encode document: {err}")))?;
        fs::write(&document_path, &document_bytes).map_err(|err| io_failure("write document", err))?;
        let stdout_file = File::create(&stdout_path).map_err(|err| io_failure("create stdout", err))?;
        let stderr_file = File::create(&stderr_path).map_err(|err| io_failure("create stderr", err))?;

        let mut process = Command::new(&self.command.program);
        process
            .args(self.command.render_args(query, &document_path))
            .envs(&self.command.env)
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file))
            .stdin(match self.command.document_mode {
                DocumentMode::File => Stdio::null(),
                DocumentMode::Stdin => Stdio::piped(),
            });
        if let Some(dir) = &self.command.working_dir {
            process.current_dir(dir);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt as _;
            // Own process group, so a timeout can take down wrappers such as
            // `go run` together with the engine they start.
            process.process_group(0);
        }

        debug!(
            implementation = name,
            program = %self.command.program,
            query,
            "spawning implementation"
        );
        let mut child = process.spawn().map_err(|err| {
            io_failure(&format!("failed to spawn '{}'", self.command.program), err)
        })?;

        if let Some(mut stdin) = child.stdin.take() {
            // Detached: a child that never reads stdin must not block us past
            // the timeout. The write fails once the child is gone.
            let spawned = thread::Builder::new()
                .name(format!("jpdiff-stdin-{name}"))
                .spawn(move || {
                    let _ = stdin.write_all(&document_bytes);
                });
            if let Err(err) = spawned {
                kill_process_tree(&mut child);
                let _ = child.wait();
                return Err(io_failure("stdin writer", err));
            }
        }

        let status = wait_for_child(&mut child, timeout)
            .map_err(|err| io_failure("wait for child", err))?;
        debug!(
            implementation = name,
            exit_code = ?status.exit_code,
            timed_out = status.timed_out,
            elapsed_ms = status.elapsed_ms,
            "implementation finished"
        );

        if status.timed_out {
            warn!(
                implementation = name,
                query,
                timeout_ms = timeout.as_millis(),
                "implementation timed out and was killed"
            );
            return Err(HarnessError::AdapterTimeout {
                implementation: name.to_owned(),
                timeout,
            });
        }

        let stdout_bytes = fs::read(&stdout_path).map_err(|err| io_failure("read stdout", err))?;
        let stdout = String::from_utf8(stdout_bytes).map_err(|err| {
            HarnessError::malformed_output(name, format!("stdout is not valid UTF-8: {err}"))
        })?;
        let last_line = stdout.lines().rev().map(str::trim).find(|line| !line.is_empty());

        if status.exit_code != Some(0) {
            // A protocol error object still counts as the implementation's
            // answer when the child exits non-zero after printing it.
            if let Some(line) = last_line {
                if let Err(err @ HarnessError::ImplementationError { .. }) =
                    ExecutionResult::from_protocol_json(name, line)
                {
                    return Err(err);
                }
            }
            let stderr = read_lossy(&stderr_path).unwrap_or_default();
            let exit = status
                .exit_code
                .map_or_else(|| "terminated by signal".to_owned(), |code| format!("exit status {code}"));
            return Err(HarnessError::execution(
                name,
                format!("{exit}: {}", excerpt(&stderr, STDERR_EXCERPT_CHARS)),
            ));
        }

        let Some(line) = last_line else {
            return Err(HarnessError::malformed_output(name, "no output on stdout"));
        };
        ExecutionResult::from_protocol_json(name, line)
    }
}

impl QueryAdapter for SubprocessAdapter {
    fn name(&self) -> &str {
        &self.command.name
    }

    fn invoke(&self, query: &str, document: &Value, timeout: Duration) -> ExecutionResult {
        self.run(query, document, timeout)
            .unwrap_or_else(|err| ExecutionResult::from_error(&err))
    }
}

fn wait_for_child(child: &mut Child, timeout: Duration) -> io::Result<ProcessStatus> {
    let started_at = Instant::now();
    let poll_interval = Duration::from_millis(DEFAULT_POLL_INTERVAL_MILLIS);

    loop {
        if let Some(status) = child.try_wait()? {
            return Ok(ProcessStatus {
                exit_code: status.code(),
                timed_out: false,
                elapsed_ms: elapsed_ms_u64(started_at.elapsed()),
            });
        }
        if started_at.elapsed() >= timeout {
            kill_process_tree(child);
            let status = child.wait()?;
            return Ok(ProcessStatus {
                exit_code: status.code(),
                timed_out: true,
                elapsed_ms: elapsed_ms_u64(started_at.elapsed()),
            });
        }
        thread::sleep(poll_interval);
    }
}

/// Kill the child and everything in its process group. The group is
/// signalled before the leader is reaped, so its id cannot have been reused.
#[cfg(unix)]
fn kill_process_tree(child: &mut Child) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal, killpg};
    use nix::unistd::Pid;

    let Ok(pgid) = i32::try_from(child.id()) else {
        let _ = child.kill();
        return;
    };
    match killpg(Pid::from_raw(pgid), Signal::SIGKILL) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(errno) => {
            warn!(pgid, %errno, "killpg failed, killing the direct child only");
            let _ = child.kill();
        }
    }
}

#[cfg(not(unix))]
fn kill_process_tree(child: &mut Child) {
    let _ = child.kill();
}

fn read_lossy(path: &Path) -> io::Result<String> {
    fs::read(path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn excerpt(text: &str, max_chars: usize) -> String {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return "(no stderr)".to_owned();
    }
    let mut out: String = trimmed.chars().take(max_chars).collect();
    if trimmed.chars().nth(max_chars).is_some() {
        out.push_str("...");
    }
    out
}

fn elapsed_ms_u64(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
