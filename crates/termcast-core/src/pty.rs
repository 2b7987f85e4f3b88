//! Pseudo-terminal processes
//!
//! Wraps `portable-pty`: spawning a command on a fresh PTY, chunked reads on
//! the blocking pool, writes, resize, and staged termination (hangup, grace
//! period, kill).
//!
//! The child is a session leader. Termination signals its whole process
//! group and, on Linux, every other process left in its session, so
//! background jobs cannot keep the terminal (and a pending read) open.

use crate::error::{Error, Result};
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtyPair, PtySize};
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::task;
use tracing::{debug, warn};

/// Environment every shell starts with
pub const BASE_ENV: [(&str, &str); 4] = [
    ("TERM", "xterm-256color"),
    ("COLORTERM", "truecolor"),
    ("LANG", "en_US.UTF-8"),
    ("LC_ALL", "en_US.UTF-8"),
];

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A command to run on a PTY
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShellCommand {
    /// Program to execute
    pub program: String,
    /// Arguments
    pub args: Vec<String>,
    /// Extra environment on top of the inherited one
    pub env: Vec<(String, String)>,
    /// Working directory
    pub cwd: Option<PathBuf>,
}

impl ShellCommand {
    /// Command running `program` with no arguments
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            cwd: None,
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, value: impl Into<String>) -> Self {
        self.args.push(value.into());
        self
    }

    /// Append arguments
    #[must_use]
    pub fn args<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(values.into_iter().map(Into::into));
        self
    }

    /// Set an environment variable
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Set the baseline terminal and locale variables
    #[must_use]
    pub fn with_base_env(self) -> Self {
        BASE_ENV
            .iter()
            .fold(self, |cmd, (key, value)| cmd.env(*key, *value))
    }

    /// Set the working directory
    #[must_use]
    pub fn cwd(mut self, path: impl Into<PathBuf>) -> Self {
        self.cwd = Some(path.into());
        self
    }
}

/// Terminal geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TermSize {
    /// Columns
    pub cols: u16,
    /// Rows
    pub rows: u16,
}

impl TermSize {
    /// Geometry from client-supplied values; `None` unless both are positive
    #[must_use]
    pub fn from_request(cols: i64, rows: i64) -> Option<Self> {
        let cols = u16::try_from(cols).ok().filter(|c| *c > 0)?;
        let rows = u16::try_from(rows).ok().filter(|r| *r > 0)?;
        Some(Self { cols, rows })
    }

    fn to_pty_size(self) -> PtySize {
        PtySize {
            rows: self.rows,
            cols: self.cols,
            pixel_width: 0,
            pixel_height: 0,
        }
    }
}

impl Default for TermSize {
    fn default() -> Self {
        Self { cols: 120, rows: 30 }
    }
}

fn lock_err<T>(_: std::sync::PoisonError<T>) -> Error {
    Error::Pty("lock poisoned".to_string())
}

/// A child process attached to a PTY
pub struct PtyProcess {
    master: Arc<Mutex<Option<Box<dyn MasterPty + Send>>>>,
    child: Arc<Mutex<Box<dyn Child + Send + Sync>>>,
    pid: Option<u32>,
    closed: Arc<AtomicBool>,
}

impl PtyProcess {
    /// Open a PTY of `size` and spawn `command` on it
    pub fn spawn(command: &ShellCommand, size: TermSize) -> Result<(Self, PtyReader, PtyWriter)> {
        let pair = open_pair(size)?;
        let child = spawn_child(&pair, command)?;
        let PtyPair { master, slave } = pair;
        // The child holds its own copy; ours would keep reads from reaching EOF
        drop(slave);

        let reader = master
            .try_clone_reader()
            .map_err(|e| Error::Pty(format!("clone PTY reader: {e}")))?;
        let writer = master
            .take_writer()
            .map_err(|e| Error::Pty(format!("take PTY writer: {e}")))?;
        let pid = child.process_id();

        debug!(program = %command.program, ?pid, "Spawned PTY child");
        let closed = Arc::new(AtomicBool::new(false));
        let process = Self {
            master: Arc::new(Mutex::new(Some(master))),
            child: Arc::new(Mutex::new(child)),
            pid,
            closed: closed.clone(),
        };
        Ok((process, PtyReader::new(reader, closed), PtyWriter::new(writer)))
    }

    /// OS process ID of the child
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Apply a new geometry
    pub fn resize(&self, size: TermSize) -> Result<()> {
        let master = self.master.lock().map_err(lock_err)?;
        match master.as_ref() {
            Some(master) => master
                .resize(size.to_pty_size())
                .map_err(|e| Error::Pty(format!("resize PTY: {e}"))),
            None => Err(Error::Pty("PTY closed".to_string())),
        }
    }

    /// Whether the child has exited
    pub fn has_exited(&self) -> Result<bool> {
        let mut child = self.child.lock().map_err(lock_err)?;
        Ok(child.try_wait()?.is_some())
    }

    /// Resolve once the child has exited
    pub async fn wait_exit(&self) {
        loop {
            match self.has_exited() {
                Ok(false) => tokio::time::sleep(EXIT_POLL_INTERVAL * 4).await,
                Ok(true) => return,
                Err(e) => {
                    warn!("Lost track of PTY child: {}", e);
                    return;
                }
            }
        }
    }

    /// Drop the master side of the PTY
    ///
    /// Later reads return EOF at once. A read already in flight ends when
    /// the last process holding the terminal is gone (see [`terminate`]).
    ///
    /// [`terminate`]: Self::terminate
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        if let Ok(mut master) = self.master.lock() {
            master.take();
        }
    }

    /// Hang up the child's session, give it `grace` to leave, then kill it
    pub async fn terminate(&self, grace: Duration) -> Result<()> {
        self.signal_session(Hangup::Soft);
        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if self.has_exited()? && !self.session_alive() {
                debug!(pid = ?self.pid, "PTY session exited after hangup");
                return Ok(());
            }
            tokio::time::sleep(EXIT_POLL_INTERVAL).await;
        }

        warn!(pid = ?self.pid, "PTY session ignored hangup, killing");
        self.signal_session(Hangup::Kill);
        let child = self.child.clone();
        task::spawn_blocking(move || {
            let mut child = child.lock().map_err(lock_err)?;
            if child.try_wait()?.is_none() {
                child.kill()?;
                child.wait()?;
            }
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Pty(format!("join kill task: {e}")))?
    }

    fn leader(&self) -> Option<i32> {
        self.pid.and_then(|p| i32::try_from(p).ok())
    }

    #[cfg(unix)]
    fn signal_session(&self, hangup: Hangup) {
        use nix::sys::signal::{kill, killpg, Signal};
        use nix::unistd::Pid;

        let Some(leader) = self.leader() else {
            return;
        };
        let signal = match hangup {
            Hangup::Soft => Signal::SIGHUP,
            Hangup::Kill => Signal::SIGKILL,
        };
        if let Err(e) = killpg(Pid::from_raw(leader), signal) {
            debug!(pgid = leader, %signal, "Process group signal failed: {}", e);
        }
        for member in session_members(leader) {
            if let Err(e) = kill(member, signal) {
                debug!(pid = %member, %signal, "Session member signal failed: {}", e);
            }
        }
    }

    #[cfg(not(unix))]
    fn signal_session(&self, _hangup: Hangup) {}

    /// Whether any process of the child's group or session is still around
    #[cfg(unix)]
    fn session_alive(&self) -> bool {
        use nix::sys::signal::killpg;
        use nix::unistd::Pid;

        self.leader().is_some_and(|leader| {
            killpg(Pid::from_raw(leader), None).is_ok() || !session_members(leader).is_empty()
        })
    }

    #[cfg(not(unix))]
    fn session_alive(&self) -> bool {
        false
    }
}

#[derive(Clone, Copy)]
enum Hangup {
    Soft,
    Kill,
}

/// Processes whose session is `leader`, the leader excluded
#[cfg(target_os = "linux")]
fn session_members(leader: i32) -> Vec<nix::unistd::Pid> {
    use nix::unistd::{getsid, Pid};

    let Ok(entries) = std::fs::read_dir("/proc") else {
        return Vec::new();
    };
    entries
        .filter_map(|entry| entry.ok()?.file_name().to_str()?.parse::<i32>().ok())
        .filter(|pid| *pid != leader)
        .map(Pid::from_raw)
        .filter(|pid| getsid(Some(*pid)).is_ok_and(|sid| sid.as_raw() == leader))
        .collect()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn session_members(_leader: i32) -> Vec<nix::unistd::Pid> {
    Vec::new()
}

/// Reading half of a PTY
#[derive(Clone)]
pub struct PtyReader {
    reader: Arc<Mutex<Box<dyn Read + Send>>>,
    closed: Arc<AtomicBool>,
}

impl PtyReader {
    fn new(reader: Box<dyn Read + Send>, closed: Arc<AtomicBool>) -> Self {
        Self {
            reader: Arc::new(Mutex::new(reader)),
            closed,
        }
    }

    /// Read up to `max` bytes; `None` on EOF or once the PTY is closed
    pub async fn read_chunk(&self, max: usize) -> Result<Option<Vec<u8>>> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(None);
        }
        let reader = self.reader.clone();
        task::spawn_blocking(move || {
            let mut guard = reader.lock().map_err(lock_err)?;
            let mut buffer = vec![0u8; max.max(1)];
            loop {
                match guard.read(&mut buffer) {
                    Ok(0) => return Ok(None),
                    Ok(n) => {
                        buffer.truncate(n);
                        return Ok(Some(buffer));
                    }
                    Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(err) => return Err(Error::Io(err)),
                }
            }
        })
        .await
        .map_err(|e| Error::Pty(format!("join PTY read task: {e}")))?
    }
}

/// Writing half of a PTY
#[derive(Clone)]
pub struct PtyWriter {
    writer: Arc<Mutex<Box<dyn Write + Send>>>,
}

impl PtyWriter {
    fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Arc::new(Mutex::new(writer)),
        }
    }

    /// Write all of `bytes` and flush
    pub async fn write(&self, bytes: Vec<u8>) -> Result<()> {
        let writer = self.writer.clone();
        task::spawn_blocking(move || {
            let mut guard = writer.lock().map_err(lock_err)?;
            guard.write_all(&bytes)?;
            guard.flush()?;
            Ok::<_, Error>(())
        })
        .await
        .map_err(|e| Error::Pty(format!("join PTY write task: {e}")))?
    }
}

fn open_pair(size: TermSize) -> Result<PtyPair> {
    native_pty_system()
        .openpty(size.to_pty_size())
        .map_err(|e| Error::Pty(format!("open PTY pair: {e}")))
}

fn spawn_child(pair: &PtyPair, command: &ShellCommand) -> Result<Box<dyn Child + Send + Sync>> {
    let mut cmd = CommandBuilder::new(&command.program);
    for arg in &command.args {
        cmd.arg(arg);
    }
    for (key, value) in &command.env {
        cmd.env(key, value);
    }
    if let Some(cwd) = &command.cwd {
        cmd.cwd(cwd);
    }
    pair.slave
        .spawn_command(cmd)
        .map_err(|e| Error::Pty(format!("spawn {}: {e}", command.program)))
}
