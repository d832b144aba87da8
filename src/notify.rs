use std::io;
use std::process::{Command, Stdio};

use tracing::{debug, warn};

const NOTIFY_PROGRAM: &str = "notify-send";
const ICON: &str = "face-glasses";

/// Post a desktop notification. Never fails; returns whether it was delivered.
pub fn send(summary: &str, body: &str) -> bool {
    send_with(NOTIFY_PROGRAM, summary, body)
}

pub fn send_with(program: &str, summary: &str, body: &str) -> bool {
    let status = Command::new(program)
        .arg(summary)
        .arg(body)
        .arg(format!("--icon={ICON}"))
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match status {
        Ok(status) if status.success() => true,
        Ok(status) => {
            warn!(program, %status, "notification command failed");
            false
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(program, "notifications unavailable");
            false
        }
        Err(e) => {
            warn!(program, error = %e, "could not run notification command");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_program_is_not_an_error() {
        assert!(!send_with(
            "fantastic-filter-no-such-notifier",
            "Done",
            "Enhanced image is ready"
        ));
    }
}
