//! Acquisition backed by a spawned child process

use super::{Acquisition, AcquisitionStatus};
use anyhow::{Context, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// Child process whose stderr is captured in a log file next to the segment
pub struct ProcessAcquisition {
    label: String,
    child: Child,
    log_path: PathBuf,
    settled: Option<AcquisitionStatus>,
}

impl ProcessAcquisition {
    pub fn spawn(mut command: Command, label: impl Into<String>, log_path: &Path) -> Result<Self> {
        let label = label.into();
        let log = File::create(log_path)
            .with_context(|| format!("Failed to create log file {}", log_path.display()))?;

        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::from(log));

        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) => {
                remove_log(log_path);
                return Err(e).with_context(|| format!("Failed to start {}", label));
            }
        };
        log::debug!("Started {} (pid {})", label, child.id());

        Ok(Self {
            label,
            child,
            log_path: log_path.to_path_buf(),
            settled: None,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

impl Acquisition for ProcessAcquisition {
    fn poll(&mut self) -> AcquisitionStatus {
        if let Some(status) = &self.settled {
            return status.clone();
        }

        let status = match self.child.try_wait() {
            Ok(None) => return AcquisitionStatus::Pending,
            Ok(Some(exit)) if exit.success() => {
                remove_log(&self.log_path);
                AcquisitionStatus::Finished
            }
            Ok(Some(exit)) => AcquisitionStatus::Failed(format!("{} exited with {}", self.label, exit)),
            Err(e) => AcquisitionStatus::Failed(format!("{}: {}", self.label, e)),
        };
        self.settled = Some(status.clone());
        status
    }

    fn cancel(&mut self) -> anyhow::Result<()> {
        if self.settled.is_some() {
            return Ok(());
        }

        match self.child.kill() {
            Ok(()) => {}
            // already exited
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e).with_context(|| format!("Failed to stop {}", self.label)),
        }
        self.child
            .wait()
            .with_context(|| format!("Failed to reap {}", self.label))?;

        log::debug!("Cancelled {}", self.label);
        self.settled = Some(AcquisitionStatus::Failed(format!("{} cancelled", self.label)));
        Ok(())
    }

    fn drain_errors(&mut self) -> String {
        let text = std::fs::read_to_string(&self.log_path).unwrap_or_default();
        remove_log(&self.log_path);
        text.trim().to_string()
    }
}

impl Drop for ProcessAcquisition {
    fn drop(&mut self) {
        if self.settled.is_none() && matches!(self.child.try_wait(), Ok(None)) {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

fn remove_log(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            log::debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::poll::Poller;
    use std::time::Duration;

    fn shell(script: &str) -> Command {
        let mut command = Command::new("sh");
        command.arg("-c").arg(script);
        command
    }

    fn settle(handle: &mut ProcessAcquisition) -> AcquisitionStatus {
        let poller = Poller::new(Duration::from_millis(5), Duration::from_secs(10));
        poller.wait_until(|| handle.poll() != AcquisitionStatus::Pending);
        handle.poll()
    }

    #[test]
    fn test_successful_process_finishes() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("ok.log");
        let mut handle = ProcessAcquisition::spawn(shell("exit 0"), "ok", &log).unwrap();

        assert_eq!(settle(&mut handle), AcquisitionStatus::Finished);
        assert!(!log.exists());
        assert_eq!(handle.drain_errors(), "");
    }

    #[test]
    fn test_failed_process_keeps_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("bad.log");
        let mut handle =
            ProcessAcquisition::spawn(shell("echo 'no such format' >&2; exit 3"), "bad", &log)
                .unwrap();

        assert!(matches!(settle(&mut handle), AcquisitionStatus::Failed(_)));
        assert!(log.exists());
        assert_eq!(handle.drain_errors(), "no such format");
        assert_eq!(handle.drain_errors(), "");
    }

    #[test]
    fn test_cancel_stops_running_process() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("slow.log");
        let mut handle = ProcessAcquisition::spawn(shell("sleep 30"), "slow", &log).unwrap();

        assert_eq!(handle.poll(), AcquisitionStatus::Pending);
        handle.cancel().unwrap();
        assert!(matches!(handle.poll(), AcquisitionStatus::Failed(_)));
        // second cancel is a no-op
        handle.cancel().unwrap();
    }

    #[test]
    fn test_missing_program_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("missing.log");
        let command = Command::new("clipfinder-no-such-program");
        assert!(ProcessAcquisition::spawn(command, "missing", &log).is_err());
        assert!(!log.exists());
    }
}
