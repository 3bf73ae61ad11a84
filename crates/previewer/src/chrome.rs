use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command as StdCommand, Stdio};
use std::time::Duration;
use tokio::process::Command;

/// Represents a Chrome/Chromium executable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chrome {
    /// A directly executable binary.
    Binary { path: PathBuf },
    /// A Flatpak-installed application.
    Flatpak { flatpak: PathBuf, app_id: String },
}

/// Viewport and timing for a single screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capture {
    pub width: u32,
    pub height: u32,
    /// Virtual time Chrome lets the page run before capturing
    pub settle: Duration,
    pub timeout: Duration,
}

impl Chrome {
    /// Use `explicit` if given, otherwise search `PATH` and Flatpak.
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(Self::Binary {
                    path: path.to_path_buf(),
                });
            }
            tracing::warn!(path = %path.display(), "Configured Chrome executable does not exist");
            return Err(Error::ChromeNotFound);
        }

        let executables = ["google-chrome", "chromium", "chromium-browser", "chrome"];
        for exe in executables {
            if let Ok(path) = which::which(exe) {
                tracing::debug!(chrome = %path.display(), "Discovered Chrome executable");
                return Ok(Self::Binary { path });
            }
        }
        tracing::info!("Chrome executable not found in PATH");

        if let Ok(flatpak) = which::which("flatpak") {
            tracing::trace!(flatpak = %flatpak.display(), "Discovered Flatpak on system; searching installed apps");
            let flatpak_apps = ["com.google.Chrome", "org.chromium.Chromium"];
            for app_id in flatpak_apps {
                let installed = StdCommand::new(&flatpak)
                    .args(["info", app_id])
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .is_ok_and(|s| s.success());
                if installed {
                    return Ok(Self::Flatpak {
                        flatpak,
                        app_id: app_id.to_string(),
                    });
                }
            }
        } else {
            tracing::info!("Flatpak not found; skipping containerized Chrome checks.");
        }

        Err(Error::ChromeNotFound)
    }

    fn command(&self) -> Command {
        match self {
            Self::Binary { path } => Command::new(path),
            Self::Flatpak { flatpak, app_id } => {
                let mut cmd = Command::new(flatpak);
                cmd.args(["run", "--filesystem=host", app_id.as_str()]);
                cmd
            }
        }
    }

    /// Load `page` headlessly and write a screenshot of the viewport to
    /// `output`. The child is killed if the timeout expires or the returned
    /// future is dropped.
    pub async fn screenshot(&self, page: &Path, output: &Path, capture: Capture) -> Result<()> {
        let mut cmd = self.command();
        cmd.args(screenshot_args(page, output, capture))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let result = tokio::time::timeout(capture.timeout, cmd.output())
            .await
            .map_err(|_| Error::ChromeTimeout(capture.timeout))??;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            tracing::debug!(stderr = %stderr.trim(), "Chrome stderr");
            return Err(match result.status.code() {
                Some(code) => Error::ChromeFailed(code),
                None => Error::ChromeKilled,
            });
        }

        if !output.is_file() {
            return Err(Error::MissingScreenshot);
        }
        Ok(())
    }
}

/// Command line for a headless viewport screenshot.
pub fn screenshot_args(page: &Path, output: &Path, capture: Capture) -> Vec<OsString> {
    let mut screenshot = OsString::from("--screenshot=");
    screenshot.push(output);

    let mut url = OsString::from("file://");
    url.push(page);

    vec![
        "--headless=new".into(),
        "--disable-gpu".into(),
        "--hide-scrollbars".into(),
        "--no-first-run".into(),
        "--no-default-browser-check".into(),
        format!("--window-size={},{}", capture.width, capture.height).into(),
        format!("--virtual-time-budget={}", capture.settle.as_millis()).into(),
        screenshot,
        url,
    ]
}
