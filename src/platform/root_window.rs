use std::io;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

/// Longest the render loop waits on the root-window command.
pub const ROOT_WINDOW_TIMEOUT: Duration = Duration::from_millis(500);
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Paint the desktop root window so nothing flashes behind a recreated
/// window. Best-effort; returns whether the command ran successfully within
/// `timeout`. A command still running at the deadline is killed.
pub fn paint_black(command: &[String], timeout: Duration) -> bool {
    let Some((program, args)) = command.split_first() else {
        return false;
    };

    let mut child = match Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
    {
        Ok(child) => child,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(program = %program, "root window command not found; background flash may be visible");
            return false;
        }
        Err(err) => {
            warn!(program = %program, %err, "failed to run root window command");
            return false;
        }
    };

    let deadline = Instant::now() + timeout;
    loop {
        match child.try_wait() {
            Ok(Some(status)) if status.success() => return true,
            Ok(Some(status)) => {
                warn!(
                    program = %program,
                    exit_code = status.code().unwrap_or(-1),
                    "root window command failed"
                );
                return false;
            }
            Ok(None) => {}
            Err(err) => {
                warn!(program = %program, %err, "failed to poll root window command");
                return false;
            }
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(POLL_INTERVAL.min(deadline - now));
    }

    warn!(
        program = %program,
        timeout_ms = timeout.as_millis() as u64,
        "root window command timed out; killing"
    );
    if let Err(err) = child.kill() {
        debug!(program = %program, %err, "kill failed");
    }
    let _ = child.try_wait();
    false
}
