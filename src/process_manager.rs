use std::io::{BufRead, BufReader, Read};
#[cfg(unix)]
use std::os::unix::process::CommandExt;
#[cfg(unix)]
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::{Child, Command as ProcessCommand, ExitStatus, Stdio};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread;
use std::time::{Duration, Instant};

#[cfg(unix)]
use nix::sys::signal::{kill, Signal};
#[cfg(unix)]
use nix::unistd::{setpgid, Pid};
use tracing::{debug, warn};

/// Time a process gets to exit after the interrupt before it is force-killed.
pub const KILL_GRACE: Duration = Duration::from_secs(5);

const POLL_INTERVAL: Duration = Duration::from_millis(40);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, cwd: &Path) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.to_path_buf(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn has_arg(&self, value: &str) -> bool {
        self.args.iter().any(|arg| arg == value)
    }

    pub fn display(&self) -> String {
        let mut parts = self
            .env
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<String>>();
        parts.push(self.program.clone());
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Combined stdout + stderr in arrival order.
    pub output: String,
    pub code: Option<i32>,
    pub diagnostic: String,
    pub deadline_exceeded: bool,
    pub force_killed: bool,
}

impl ProcessOutcome {
    pub fn success(&self) -> bool {
        self.code == Some(0) && !self.deadline_exceeded
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("failed to spawn `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("process `{command}` missing stdout/stderr pipe")]
    MissingStdio { command: String },
    #[error("failed waiting on `{command}`: {source}")]
    Wait {
        command: String,
        #[source]
        source: std::io::Error,
    },
}

/// Seam between orchestration and the operating system.
pub trait CommandRunner: Send + Sync {
    fn run_streaming(
        &self,
        spec: &CommandSpec,
        deadline: Option<Duration>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<ProcessOutcome, ProcessError>;

    fn run(
        &self,
        spec: &CommandSpec,
        deadline: Option<Duration>,
    ) -> Result<ProcessOutcome, ProcessError> {
        self.run_streaming(spec, deadline, &mut |_| {})
    }

    fn on_path(&self, program: &str) -> bool;
}

#[derive(Debug, Clone)]
pub struct SystemRunner {
    kill_grace: Duration,
}

impl Default for SystemRunner {
    fn default() -> Self {
        Self {
            kill_grace: KILL_GRACE,
        }
    }
}

impl SystemRunner {
    pub fn with_kill_grace(mut self, grace: Duration) -> Self {
        self.kill_grace = grace;
        self
    }
}

enum StreamEvent {
    Chunk(String),
    Closed,
}

impl CommandRunner for SystemRunner {
    fn run_streaming(
        &self,
        spec: &CommandSpec,
        deadline: Option<Duration>,
        on_output: &mut dyn FnMut(&str),
    ) -> Result<ProcessOutcome, ProcessError> {
        let command = spec.display();
        debug!(command = %command, deadline_ms = deadline.map(|d| d.as_millis() as u64), "spawning");
        let mut child = build_command(spec)
            .spawn()
            .map_err(|source| ProcessError::Spawn {
                command: command.clone(),
                source,
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProcessError::MissingStdio {
                command: command.clone(),
            })?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProcessError::MissingStdio {
                command: command.clone(),
            })?;

        let (events_tx, events_rx) = mpsc::channel::<StreamEvent>();
        spawn_stream_reader(stdout, events_tx.clone());
        spawn_stream_reader(stderr, events_tx);

        let started = Instant::now();
        let mut outcome = ProcessOutcome::default();
        let mut open_streams = 2usize;
        let mut status: Option<ExitStatus> = None;
        let mut interrupted_at: Option<Instant> = None;

        loop {
            if open_streams > 0 {
                match events_rx.recv_timeout(POLL_INTERVAL) {
                    Ok(StreamEvent::Chunk(text)) => {
                        outcome.output.push_str(&text);
                        on_output(&text);
                    }
                    Ok(StreamEvent::Closed) => open_streams -= 1,
                    Err(RecvTimeoutError::Timeout) => {}
                    Err(RecvTimeoutError::Disconnected) => open_streams = 0,
                }
            } else if status.is_none() {
                thread::sleep(POLL_INTERVAL);
            }

            if status.is_none() {
                status = child.try_wait().map_err(|source| ProcessError::Wait {
                    command: command.clone(),
                    source,
                })?;
            }
            if open_streams == 0 && status.is_some() {
                break;
            }

            if let Some(limit) = deadline {
                if interrupted_at.is_none() && started.elapsed() >= limit {
                    warn!(command = %command, limit_secs = limit.as_secs(), "deadline exceeded, interrupting");
                    outcome.deadline_exceeded = true;
                    interrupted_at = Some(Instant::now());
                    signal_interrupt(&mut child);
                }
            }
            if let Some(at) = interrupted_at {
                if !outcome.force_killed && at.elapsed() >= self.kill_grace {
                    warn!(command = %command, "process ignored interrupt, killing");
                    outcome.force_killed = true;
                    signal_kill(&mut child);
                }
                // Orphaned grandchildren may hold the pipes open after a kill.
                if outcome.force_killed && status.is_some() && at.elapsed() >= self.kill_grace * 2
                {
                    break;
                }
            }
        }

        let status = match status {
            Some(status) => status,
            None => child.wait().map_err(|source| ProcessError::Wait {
                command: command.clone(),
                source,
            })?,
        };
        outcome.code = status.code();
        outcome.diagnostic = format_exit_diagnostic(status);
        debug!(
            command = %command,
            elapsed_ms = started.elapsed().as_millis() as u64,
            exit = %outcome.diagnostic,
            "process finished"
        );
        Ok(outcome)
    }

    fn on_path(&self, program: &str) -> bool {
        command_on_path(program)
    }
}

fn build_command(spec: &CommandSpec) -> ProcessCommand {
    let mut process = ProcessCommand::new(&spec.program);
    process
        .args(&spec.args)
        .current_dir(&spec.cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    for (key, value) in &spec.env {
        process.env(key, value);
    }
    #[cfg(unix)]
    unsafe {
        process.pre_exec(|| {
            setpgid(Pid::from_raw(0), Pid::from_raw(0))
                .map_err(|error| std::io::Error::other(error.to_string()))
        });
    }
    process
}

fn spawn_stream_reader<R>(stream: R, tx: Sender<StreamEvent>)
where
    R: Read + Send + 'static,
{
    thread::spawn(move || {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::<u8>::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf).into_owned();
                    if tx.send(StreamEvent::Chunk(text)).is_err() {
                        return;
                    }
                }
            }
        }
        let _ = tx.send(StreamEvent::Closed);
    });
}

fn format_exit_diagnostic(status: ExitStatus) -> String {
    #[cfg(unix)]
    {
        if let Some(code) = status.code() {
            return format!("exit={code}");
        }
        if let Some(signal) = status.signal() {
            return format!("signal={signal}");
        }
        "exit=unknown".to_owned()
    }
    #[cfg(not(unix))]
    {
        format!("exit={}", status.code().unwrap_or(-1))
    }
}

fn signal_interrupt(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = signal_process_group(child, Signal::SIGINT);
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

fn signal_kill(child: &mut Child) {
    #[cfg(unix)]
    {
        let _ = signal_process_group(child, Signal::SIGKILL);
    }
    #[cfg(not(unix))]
    {
        let _ = child.kill();
    }
}

#[cfg(unix)]
fn signal_process_group(child: &mut Child, signal: Signal) -> Result<(), nix::Error> {
    let pid = child.id() as i32;
    if pid > 0 {
        kill(Pid::from_raw(-pid), signal)
    } else {
        Ok(())
    }
}

pub fn command_on_path(command: &str) -> bool {
    if command.contains(std::path::MAIN_SEPARATOR) {
        return Path::new(command).is_file();
    }
    std::env::var_os("PATH")
        .map(|value| std::env::split_paths(&value).collect::<Vec<PathBuf>>())
        .unwrap_or_default()
        .into_iter()
        .any(|dir| dir.join(command).is_file())
}
