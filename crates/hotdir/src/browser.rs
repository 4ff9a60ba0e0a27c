//! System browser launching.

use std::io;
use std::process::{Command, Stdio};

/// Open `url` in the default browser without waiting for it.
///
/// - macOS: `open`
/// - Windows: `cmd /C start`
/// - elsewhere: `xdg-open`
pub(crate) fn open(url: &str) -> io::Result<()> {
    let mut child = command(url)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;

    // Reap the launcher so it does not linger as a zombie
    std::thread::spawn(move || {
        let _ = child.wait();
    });
    Ok(())
}

fn command(url: &str) -> Command {
    if cfg!(target_os = "macos") {
        let mut command = Command::new("open");
        command.arg(url);
        command
    } else if cfg!(windows) {
        let mut command = Command::new("cmd");
        command.args(["/C", "start", url]);
        command
    } else {
        let mut command = Command::new("xdg-open");
        command.arg(url);
        command
    }
}
