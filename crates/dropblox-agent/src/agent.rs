use std::{
    ffi::{OsStr, OsString},
    io::{BufRead as _, BufReader},
    path::Path,
    process::{Command as Process, Stdio},
    sync::mpsc::{self, RecvTimeoutError},
    thread,
    time::{Duration, Instant},
};

use dropblox_engine::{Command, GameSnapshot};

use crate::AgentError;

/// Move tokens produced by one agent invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AgentReply {
    pub commands: Vec<Command>,
    /// Non-empty output lines that were not move tokens.
    pub invalid_lines: Vec<String>,
    /// `true` if the agent was killed at the turn deadline.
    pub timed_out: bool,
}

impl AgentReply {
    fn push_line(&mut self, line: &str) {
        let token = line.trim();
        if token.is_empty() {
            return;
        }
        match token.parse() {
            Ok(command) => self.commands.push(command),
            Err(err) => {
                tracing::warn!(%err, "dropping invalid agent output");
                self.invalid_lines.push(line.to_owned());
            }
        }
    }
}

/// An external move-choosing program.
///
/// Each call to [`Agent::request`] starts a fresh process:
///
/// ```text
/// program [args..] <state-json> <seconds-remaining> [<weight-file>]
/// ```
///
/// and reads its stdout line by line until it exits or the turn deadline passes.
#[derive(Debug, Clone)]
pub struct Agent {
    program: OsString,
    args: Vec<OsString>,
}

impl Agent {
    pub fn new<S>(program: S) -> Self
    where
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: vec![],
        }
    }

    /// Adds fixed arguments placed before the per-turn arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn program(&self) -> &OsStr {
        &self.program
    }

    #[must_use]
    pub fn args(&self) -> &[OsString] {
        &self.args
    }

    /// Runs the agent for one turn.
    ///
    /// The process is killed once `timeout` elapses; tokens it printed before that
    /// are kept. Lines that are not move tokens are dropped and listed in
    /// [`AgentReply::invalid_lines`].
    pub fn request(
        &self,
        snapshot: &GameSnapshot,
        seconds_remaining: f64,
        weights: Option<&Path>,
        timeout: Duration,
    ) -> Result<AgentReply, AgentError> {
        let state = serde_json::to_string(snapshot).map_err(AgentError::Serialize)?;
        let budget = serde_json::to_string(&seconds_remaining).map_err(AgentError::Serialize)?;

        let mut process = Process::new(&self.program);
        process
            .args(&self.args)
            .arg(state)
            .arg(budget)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        if let Some(path) = weights {
            process.arg(path);
        }
        let mut child = process.spawn().map_err(AgentError::Spawn)?;
        let Some(stdout) = child.stdout.take() else {
            child.kill().ok();
            child.wait().map_err(AgentError::Wait)?;
            return Err(AgentError::MissingStdout);
        };

        // The reader is detached: a grandchild holding the pipe open must not block
        // the turn past its deadline.
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let mut reader = BufReader::new(stdout);
            let mut buf = Vec::new();
            loop {
                buf.clear();
                match reader.read_until(b'\n', &mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
                let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
                let line = line.strip_suffix(b"\r").unwrap_or(line);
                if tx.send(String::from_utf8_lossy(line).into_owned()).is_err() {
                    break;
                }
            }
        });

        let deadline = Instant::now() + timeout;
        let mut reply = AgentReply::default();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok(line) => reply.push_line(&line),
                Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {
                    tracing::debug!(?timeout, "agent turn timed out");
                    reply.timed_out = true;
                    break;
                }
            }
        }

        child.kill().ok();
        child.wait().map_err(AgentError::Wait)?;
        Ok(reply)
    }
}
