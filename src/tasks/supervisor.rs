//! Lifecycle of the single external video-player process.
//!
//! Liveness is polled; there is no completion callback. The supervisor owns
//! the child, the controller only ever sees an opaque [`ProcessHandle`].

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::{Configuration, PlayerConfig};
use crate::error::SpawnFailure;

/// Fully resolved player invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl PlayerCommand {
    fn describe(&self) -> String {
        let mut out = self.program.display().to_string();
        for arg in &self.args {
            out.push(' ');
            out.push_str(&arg.to_string_lossy());
        }
        out
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Running,
    /// Exited for any reason; the code is informational only.
    Exited(Option<i32>),
}

/// Platform seam for locating, spawning and signalling player processes.
pub trait SpawnBackend {
    type Child;

    fn resolve_player_command(&self, path: &Path) -> Option<PlayerCommand>;
    fn spawn(&mut self, command: &PlayerCommand) -> io::Result<Self::Child>;
    fn poll(&mut self, child: &mut Self::Child) -> ProcessStatus;
    fn signal_terminate(&mut self, child: &mut Self::Child);
    fn force_kill(&mut self, child: &mut Self::Child);

    fn pid(&self, _child: &Self::Child) -> Option<u32> {
        None
    }
}

/// Opaque reference to a launched player. Stale handles are harmless.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The handle was not the live one; nothing was done.
    AlreadyRetired,
    Exited,
    /// Still alive at the deadline and killed.
    Killed,
    /// Still alive at the deadline; left with only a termination request.
    Abandoned,
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    pub poll_interval: Duration,
    pub force_kill_after_timeout: bool,
}

impl SupervisorOptions {
    pub fn from_config(cfg: &Configuration) -> Self {
        Self {
            force_kill_after_timeout: cfg.force_kill_after_timeout,
            ..Self::default()
        }
    }
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            force_kill_after_timeout: true,
        }
    }
}

struct ActiveProcess<C> {
    handle: ProcessHandle,
    child: C,
    program: String,
}

pub struct ProcessSupervisor<B: SpawnBackend> {
    backend: B,
    options: SupervisorOptions,
    active: Option<ActiveProcess<B::Child>>,
    next_id: u64,
}

impl<B: SpawnBackend> ProcessSupervisor<B> {
    pub fn new(backend: B, options: SupervisorOptions) -> Self {
        Self {
            backend,
            options,
            active: None,
            next_id: 0,
        }
    }

    pub fn active_handle(&self) -> Option<ProcessHandle> {
        self.active.as_ref().map(|active| active.handle)
    }

    /// Launch the first resolvable player for `path`. Any previous player is
    /// retired first so at most one is ever live.
    ///
    /// # Errors
    /// [`SpawnFailure`] when no player resolves or the spawn itself fails.
    pub fn launch(&mut self, path: &Path) -> Result<ProcessHandle, SpawnFailure> {
        if let Some(previous) = self.active_handle() {
            warn!("launch requested while a player is still live; retiring it first");
            self.terminate(previous, Duration::ZERO);
        }

        let command = self
            .backend
            .resolve_player_command(path)
            .ok_or(SpawnFailure::NoPlayer)?;
        let program = command.program.display().to_string();
        info!(command = %command.describe(), "launching video player");

        let child = self
            .backend
            .spawn(&command)
            .map_err(|source| SpawnFailure::Spawn {
                program: program.clone(),
                source,
            })?;

        let handle = ProcessHandle { id: self.next_id };
        self.next_id += 1;
        debug!(pid = ?self.backend.pid(&child), program = %program, "video player running");
        self.active = Some(ActiveProcess {
            handle,
            child,
            program,
        });
        Ok(handle)
    }

    /// Non-blocking liveness check. Handles that are no longer live report finished.
    pub fn is_finished(&mut self, handle: ProcessHandle) -> bool {
        let Some(active) = self.active.as_mut().filter(|a| a.handle == handle) else {
            return true;
        };
        match self.backend.poll(&mut active.child) {
            ProcessStatus::Running => false,
            ProcessStatus::Exited(code) => {
                debug!(program = %active.program, ?code, "video player exited");
                true
            }
        }
    }

    /// Ask the player to stop and wait up to `timeout` for it to exit. The
    /// handle is retired whatever the outcome.
    pub fn terminate(&mut self, handle: ProcessHandle, timeout: Duration) -> TerminateOutcome {
        let Some(mut active) = self.active.take_if(|a| a.handle == handle) else {
            return TerminateOutcome::AlreadyRetired;
        };

        if let ProcessStatus::Exited(_) = self.backend.poll(&mut active.child) {
            return TerminateOutcome::Exited;
        }

        debug!(program = %active.program, "terminating video player");
        self.backend.signal_terminate(&mut active.child);

        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            if let ProcessStatus::Exited(_) = self.backend.poll(&mut active.child) {
                debug!(
                    program = %active.program,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "video player stopped"
                );
                return TerminateOutcome::Exited;
            }
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep(self.options.poll_interval.min(deadline - now));
        }

        if self.options.force_kill_after_timeout {
            warn!(
                program = %active.program,
                timeout_ms = timeout.as_millis() as u64,
                "video player ignored termination; killing"
            );
            self.backend.force_kill(&mut active.child);
            TerminateOutcome::Killed
        } else {
            warn!(
                program = %active.program,
                timeout_ms = timeout.as_millis() as u64,
                "video player still running after termination request; abandoning handle"
            );
            TerminateOutcome::Abandoned
        }
    }

    /// Best-effort stop used on shutdown: request termination, do not wait.
    pub fn shutdown(&mut self, handle: ProcessHandle) {
        let Some(mut active) = self.active.take_if(|a| a.handle == handle) else {
            return;
        };
        if self.backend.poll(&mut active.child) == ProcessStatus::Running {
            info!(program = %active.program, "stopping video player for shutdown");
            self.backend.signal_terminate(&mut active.child);
        }
    }
}

/// Spawns real player binaries found on `PATH`.
#[derive(Debug, Clone)]
pub struct SystemSpawner {
    players: Vec<PlayerConfig>,
}

impl SystemSpawner {
    pub fn new(players: Vec<PlayerConfig>) -> Self {
        Self { players }
    }
}

impl SpawnBackend for SystemSpawner {
    type Child = Child;

    fn resolve_player_command(&self, path: &Path) -> Option<PlayerCommand> {
        for player in &self.players {
            match which::which(&player.program) {
                Ok(program) => {
                    let args = player
                        .args
                        .iter()
                        .map(OsString::from)
                        .chain(std::iter::once(path.as_os_str().to_owned()))
                        .collect();
                    return Some(PlayerCommand { program, args });
                }
                Err(err) => debug!(program = %player.program, %err, "video player not available"),
            }
        }
        None
    }

    fn spawn(&mut self, command: &PlayerCommand) -> io::Result<Child> {
        // Keep player output off the kiosk terminal.
        Command::new(&command.program)
            .args(&command.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }

    fn poll(&mut self, child: &mut Child) -> ProcessStatus {
        match child.try_wait() {
            Ok(Some(status)) => ProcessStatus::Exited(status.code()),
            Ok(None) => ProcessStatus::Running,
            Err(err) => {
                warn!(pid = child.id(), %err, "failed to poll video player; treating as exited");
                ProcessStatus::Exited(None)
            }
        }
    }

    #[cfg(unix)]
    fn signal_terminate(&mut self, child: &mut Child) {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(child.id()) else {
            return;
        };
        if let Err(err) = kill(Pid::from_raw(raw), Signal::SIGTERM) {
            debug!(pid = raw, %err, "SIGTERM delivery failed");
        }
    }

    #[cfg(not(unix))]
    fn signal_terminate(&mut self, child: &mut Child) {
        if let Err(err) = child.kill() {
            debug!(pid = child.id(), %err, "terminate request failed");
        }
    }

    fn force_kill(&mut self, child: &mut Child) {
        if let Err(err) = child.kill() {
            debug!(pid = child.id(), %err, "kill failed");
        }
        // Reap if it is already gone; never block here.
        let _ = child.try_wait();
    }

    fn pid(&self, child: &Child) -> Option<u32> {
        Some(child.id())
    }
}
