//! Platform bell. Runs on the runtime, never on the MQTT I/O task.

use std::io::Write;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

#[cfg(target_os = "macos")]
fn bell_command() -> Option<Command> {
    let mut cmd = Command::new("osascript");
    cmd.args(["-e", "beep"]);
    Some(cmd)
}

#[cfg(target_os = "linux")]
fn bell_command() -> Option<Command> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(
        "paplay /usr/share/sounds/freedesktop/bell.oga 2>/dev/null || printf '\\a'",
    );
    Some(cmd)
}

#[cfg(target_os = "windows")]
fn bell_command() -> Option<Command> {
    let mut cmd = Command::new("cmd");
    cmd.args(["/C", "echo \x07"]);
    Some(cmd)
}

#[cfg(not(any(target_os = "macos", target_os = "linux", target_os = "windows")))]
fn bell_command() -> Option<Command> {
    None
}

fn terminal_bell() {
    let mut stdout = std::io::stdout();
    let _ = stdout.write_all(b"\x07");
    let _ = stdout.flush();
}

/// Ring once; falls back to the terminal BEL when no player can be started.
pub async fn ring() {
    let Some(mut cmd) = bell_command() else {
        terminal_bell();
        return;
    };
    match cmd.stdin(Stdio::null()).status().await {
        Ok(status) if status.success() => {}
        Ok(status) => {
            debug!("Bell command exited with {status}");
            terminal_bell();
        }
        Err(e) => {
            debug!("Failed to run bell command: {e}");
            terminal_bell();
        }
    }
}
