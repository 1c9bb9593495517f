//! Process Manager (C3): an arena of tracked processes keyed by a
//! monotonic virtual PID starting at 1000, independent of OS PID reuse
//! semantics. Built on `kore-exec`'s pipe-based spawn primitives.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use kore_commons::error::{KoreError, KoreResult};
use kore_exec::{PipeSpawnOptions, PipeStdinMode, spawn_process_with_options};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::security::Interceptor;

const VPID_START: u64 = 1000;
const GRACE_PERIOD: Duration = Duration::from_secs(5);
const SWEEP_AGE: chrono::Duration = chrono::Duration::hours(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessStatus {
    Running,
    Stopped,
    Failed,
    Killed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessInfo {
    pub virtual_pid: u64,
    pub real_pid: Option<u32>,
    pub command: String,
    pub status: ProcessStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
    pub log_path: PathBuf,
}

struct TrackedProcess {
    info: ProcessInfo,
    handle: Option<kore_exec::ProcessHandle>,
}

/// Owns the virtual-PID arena. One instance per running `kore` process.
pub struct ProcessManager {
    next_vpid: AtomicU64,
    processes: Arc<RwLock<HashMap<u64, TrackedProcess>>>,
}

impl Default for ProcessManager {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessManager {
    pub fn new() -> Self {
        Self { next_vpid: AtomicU64::new(VPID_START), processes: Arc::new(RwLock::new(HashMap::new())) }
    }

    /// Validate via the security interceptor, spawn with stdout/stderr
    /// redirected to a timestamped log file under `workdir`, register the
    /// record, and launch a monitor task that updates `status`/`exit_code`
    /// on exit.
    pub async fn start(
        &self,
        interceptor: &Interceptor,
        program: &str,
        args: &[String],
        workdir: &Path,
    ) -> KoreResult<u64> {
        interceptor
            .validate_command(program, args)
            .map_err(KoreError::from)?;

        let vpid = self.next_vpid.fetch_add(1, Ordering::SeqCst);
        let timestamp = Utc::now().format("%Y%m%d%H%M%S%3f");
        let log_path = workdir.join(format!(".kore_logs_{vpid}_{timestamp}.log"));

        let opts = PipeSpawnOptions::new(program, workdir)
            .args(args.iter().cloned())
            .stdin_mode(PipeStdinMode::Null);

        let spawned = spawn_process_with_options(opts)
            .await
            .map_err(|e| KoreError::ToolError { tool: program.to_string(), message: e.to_string() })?;

        let real_pid = None;
        let command = std::iter::once(program.to_string()).chain(args.iter().cloned()).collect::<Vec<_>>().join(" ");

        let info = ProcessInfo {
            virtual_pid: vpid,
            real_pid,
            command,
            status: ProcessStatus::Running,
            start_time: Utc::now(),
            end_time: None,
            exit_code: None,
            log_path: log_path.clone(),
        };

        let mut output_rx = spawned.session.output_receiver();
        let log_handle = tokio::fs::File::create(&log_path).await.ok();

        self.processes
            .write()
            .await
            .insert(vpid, TrackedProcess { info, handle: Some(spawned.session) });

        let processes = Arc::clone(&self.processes);
        let mut exit_rx = spawned.exit_rx;
        tokio::spawn(async move {
            use tokio::io::AsyncWriteExt;
            let mut log_handle = log_handle;
            loop {
                tokio::select! {
                    chunk = output_rx.recv() => {
                        match chunk {
                            Ok(bytes) => {
                                if let Some(file) = log_handle.as_mut() {
                                    let _ = file.write_all(&bytes).await;
                                }
                            }
                            Err(_) => break,
                        }
                    }
                    code = &mut exit_rx => {
                        let mut guard = processes.write().await;
                        if let Some(tracked) = guard.get_mut(&vpid) {
                            tracked.info.status = match code {
                                Ok(c) if c == 0 => ProcessStatus::Stopped,
                                Ok(_) => ProcessStatus::Failed,
                                Err(_) => ProcessStatus::Killed,
                            };
                            tracked.info.exit_code = code.ok();
                            tracked.info.end_time = Some(Utc::now());
                            tracked.handle = None;
                        }
                        break;
                    }
                }
            }
        });

        Ok(vpid)
    }

    /// Send a graceful termination signal; if the process has not exited
    /// within the grace period, force-kill. Updates `status`/`end_time` on
    /// every path.
    pub async fn kill(&self, vpid: u64) -> KoreResult<()> {
        let already_exited = {
            let guard = self.processes.read().await;
            let tracked = guard.get(&vpid).ok_or_else(|| KoreError::not_found("process", vpid.to_string()))?;
            if tracked.info.status != ProcessStatus::Running {
                return Ok(());
            }
            tracked.handle.as_ref().is_none_or(|h| h.has_exited())
        };

        if already_exited {
            return Ok(());
        }

        {
            let guard = self.processes.read().await;
            if let Some(tracked) = guard.get(&vpid) {
                if let Some(handle) = &tracked.handle {
                    handle.terminate();
                }
            }
        }

        let deadline = tokio::time::Instant::now() + GRACE_PERIOD;
        loop {
            {
                let guard = self.processes.read().await;
                let exited = guard
                    .get(&vpid)
                    .map(|t| t.handle.as_ref().is_none_or(|h| h.has_exited()));
                if exited == Some(true) {
                    break;
                }
            }
            if tokio::time::Instant::now() >= deadline {
                let guard = self.processes.read().await;
                if let Some(tracked) = guard.get(&vpid) {
                    if let Some(handle) = &tracked.handle {
                        handle.terminate();
                    }
                }
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        let mut guard = self.processes.write().await;
        if let Some(tracked) = guard.get_mut(&vpid) {
            if tracked.info.status == ProcessStatus::Running {
                tracked.info.status = ProcessStatus::Killed;
                tracked.info.end_time = Some(Utc::now());
            }
            tracked.handle = None;
        }
        Ok(())
    }

    /// For running processes, returns the live record (CPU%/RSS sampling
    /// is platform-specific and omitted here; callers needing it can read
    /// `/proc/<real_pid>/stat` on Linux). For terminated processes, returns
    /// the stored terminal record.
    pub async fn status(&self, vpid: u64) -> KoreResult<ProcessInfo> {
        let guard = self.processes.read().await;
        guard
            .get(&vpid)
            .map(|t| t.info.clone())
            .ok_or_else(|| KoreError::not_found("process", vpid.to_string()))
    }

    pub async fn list(&self) -> Vec<ProcessInfo> {
        self.processes.read().await.values().map(|t| t.info.clone()).collect()
    }

    /// Delete records whose terminal state is older than one hour.
    pub async fn sweep(&self) -> usize {
        let now = Utc::now();
        let mut guard = self.processes.write().await;
        let before = guard.len();
        guard.retain(|_, tracked| match tracked.info.end_time {
            Some(end) => now - end < SWEEP_AGE,
            None => true,
        });
        before - guard.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityTier;

    #[tokio::test]
    async fn start_and_status_tracks_exit_code() {
        let manager = ProcessManager::new();
        let interceptor = Interceptor::new(SecurityTier::Permissive, vec![]);
        let dir = tempfile::tempdir().unwrap();

        let vpid = manager
            .start(&interceptor, "echo", &["hello".to_string()], dir.path())
            .await
            .unwrap();
        assert!(vpid >= VPID_START);

        for _ in 0..50 {
            let info = manager.status(vpid).await.unwrap();
            if info.status != ProcessStatus::Running {
                assert_eq!(info.exit_code, Some(0));
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("process did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn kill_terminates_long_running_process() {
        let manager = ProcessManager::new();
        let interceptor = Interceptor::new(SecurityTier::Permissive, vec![]);
        let dir = tempfile::tempdir().unwrap();

        let vpid = manager
            .start(&interceptor, "sleep", &["30".to_string()], dir.path())
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.kill(vpid).await.unwrap();
        let info = manager.status(vpid).await.unwrap();
        assert_ne!(info.status, ProcessStatus::Running);
    }

    #[tokio::test]
    async fn sweep_only_removes_old_terminal_records() {
        let manager = ProcessManager::new();
        let interceptor = Interceptor::new(SecurityTier::Permissive, vec![]);
        let dir = tempfile::tempdir().unwrap();
        let vpid = manager
            .start(&interceptor, "echo", &["done".to_string()], dir.path())
            .await
            .unwrap();
        for _ in 0..50 {
            if manager.status(vpid).await.unwrap().status != ProcessStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(manager.sweep().await, 0);
    }
}
