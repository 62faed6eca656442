//! Opening the feed output folder in the platform file browser.

use std::path::Path;
use std::process::Command;
use tracing::{info, warn};

/// Something that can show a directory to the user.
pub trait Reveal {
    fn reveal(&self, dir: &Path);
}

/// Hands the directory to the desktop shell.
#[derive(Debug, Default, Clone, Copy)]
pub struct ShellReveal;

impl ShellReveal {
    fn program() -> &'static str {
        if cfg!(target_os = "windows") {
            "explorer"
        } else if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        }
    }
}

impl Reveal for ShellReveal {
    fn reveal(&self, dir: &Path) {
        let program = Self::program();
        match Command::new(program).arg(dir).spawn() {
            Ok(_) => info!("Opened {} with {}", dir.display(), program),
            Err(e) => warn!("Failed to open {}: {}", dir.display(), e),
        }
    }
}

/// Does nothing. Used when the output folder should stay closed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoReveal;

impl Reveal for NoReveal {
    fn reveal(&self, _dir: &Path) {}
}
