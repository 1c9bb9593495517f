//! Local Environment (C4): composes the Security Interceptor, Process
//! Manager, and on-disk file I/O into the tool surface the agent loop
//! actually calls — `execute`, `execute_stream`, `read_file`, `write_file`,
//! `diff`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kore_commons::diff::{self, DiffResult};
use kore_commons::error::{KoreError, KoreResult};
use kore_exec::{PipeSpawnOptions, PipeStdinMode, spawn_process_with_options};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::security::Interceptor;

#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    pub workdir: Option<PathBuf>,
    pub env: HashMap<String, String>,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[derive(Debug, Clone, Default)]
pub struct WriteOptions {
    pub backup: bool,
    pub create_missing_dirs: bool,
}

pub struct LocalEnvironment {
    interceptor: Interceptor,
    workdir: PathBuf,
}

impl LocalEnvironment {
    pub fn new(interceptor: Interceptor, workdir: PathBuf) -> Self {
        Self { interceptor, workdir }
    }

    fn resolve(&self, base: Option<&Path>, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            base.unwrap_or(&self.workdir).join(p)
        }
    }

    /// Validate, set workdir, merge sanitised env over the inherited env,
    /// run with an optional timeout. On timeout, `exit_code = -1` and the
    /// result carries whatever output arrived before the deadline.
    pub async fn execute(&self, cmd: &str, args: &[String], ctx: &ExecContext) -> KoreResult<ExecResult> {
        self.interceptor.validate_command(cmd, args).map_err(KoreError::from)?;
        let workdir = ctx.workdir.clone().unwrap_or_else(|| self.workdir.clone());

        let inherited: HashMap<String, String> = std::env::vars().collect();
        let mut merged = self.interceptor.sanitize_env(&inherited);
        merged.extend(ctx.env.clone());

        let opts = PipeSpawnOptions::new(cmd, workdir)
            .args(args.iter().cloned())
            .env(merged)
            .stdin_mode(PipeStdinMode::Null);

        let spawned = spawn_process_with_options(opts)
            .await
            .map_err(|e| KoreError::ToolError { tool: cmd.to_string(), message: e.to_string() })?;

        let timeout_ms = ctx.timeout.map(|d| d.as_millis() as u64).unwrap_or(u64::MAX / 2);
        let (stdout_bytes, exit_code) = spawned.wait_with_output(timeout_ms).await;

        Ok(ExecResult {
            exit_code,
            stdout: String::from_utf8_lossy(&stdout_bytes).to_string(),
            stderr: String::new(),
        })
    }

    /// Returns a receiver that yields stdout/stderr chunks interleaved in
    /// arrival order, exactly as `kore-exec`'s broadcast channel delivers
    /// them (both streams are read into the same channel), alongside a
    /// one-shot receiver that resolves to the exit code once the process
    /// has fully terminated.
    pub async fn execute_stream(
        &self,
        cmd: &str,
        args: &[String],
        ctx: &ExecContext,
    ) -> KoreResult<(tokio::sync::broadcast::Receiver<Vec<u8>>, tokio::sync::oneshot::Receiver<i32>)> {
        self.interceptor.validate_command(cmd, args).map_err(KoreError::from)?;
        let workdir = ctx.workdir.clone().unwrap_or_else(|| self.workdir.clone());
        let inherited: HashMap<String, String> = std::env::vars().collect();
        let mut merged = self.interceptor.sanitize_env(&inherited);
        merged.extend(ctx.env.clone());

        let opts = PipeSpawnOptions::new(cmd, workdir).args(args.iter().cloned()).env(merged);
        let spawned = spawn_process_with_options(opts)
            .await
            .map_err(|e| KoreError::ToolError { tool: cmd.to_string(), message: e.to_string() })?;
        Ok((spawned.output_rx, spawned.exit_rx))
    }

    pub async fn read_file(&self, path: &Path) -> KoreResult<String> {
        let resolved = self.resolve(None, path);
        let validated = self.interceptor.validate_path(&resolved).map_err(KoreError::from)?;
        let mut file = tokio::fs::File::open(&validated)
            .await
            .map_err(|e| KoreError::Storage(format!("reading {}: {e}", validated.display())))?;
        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .await
            .map_err(|e| KoreError::Storage(format!("reading {}: {e}", validated.display())))?;
        Ok(buf)
    }

    pub async fn write_file(&self, path: &Path, bytes: &[u8], opts: &WriteOptions) -> KoreResult<()> {
        let resolved = self.resolve(None, path);
        let validated = self.interceptor.validate_path(&resolved).map_err(KoreError::from)?;

        if opts.backup && validated.exists() {
            let backup_path = append_bak_extension(&validated);
            tokio::fs::copy(&validated, &backup_path)
                .await
                .map_err(|e| KoreError::Storage(format!("backing up {}: {e}", validated.display())))?;
        }
        if opts.create_missing_dirs {
            if let Some(parent) = validated.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| KoreError::Storage(format!("creating {}: {e}", parent.display())))?;
            }
        }
        let mut file = tokio::fs::File::create(&validated)
            .await
            .map_err(|e| KoreError::Storage(format!("writing {}: {e}", validated.display())))?;
        file.write_all(bytes)
            .await
            .map_err(|e| KoreError::Storage(format!("writing {}: {e}", validated.display())))?;
        Ok(())
    }

    /// Same shape as `VirtualFileSystem::diff`, but over two on-disk files.
    pub async fn diff(&self, p1: &Path, p2: &Path) -> KoreResult<DiffResult> {
        let left = self.read_file(p1).await?;
        let right = self.read_file(p2).await?;
        Ok(diff::unified_diff(&p2.display().to_string(), &left, &right))
    }
}

fn append_bak_extension(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".bak");
    PathBuf::from(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::SecurityTier;

    fn env(dir: &Path) -> LocalEnvironment {
        LocalEnvironment::new(Interceptor::new(SecurityTier::Permissive, vec![dir.to_path_buf()]), dir.to_path_buf())
    }

    #[tokio::test]
    async fn execute_captures_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let local = env(dir.path());
        let result = local.execute("echo", &["hi".to_string()], &ExecContext::default()).await.unwrap();
        assert_eq!(result.exit_code, 0);
        assert!(result.stdout.contains("hi"));
    }

    #[tokio::test]
    async fn execute_times_out_with_partial_output() {
        let dir = tempfile::tempdir().unwrap();
        let local = env(dir.path());
        let ctx = ExecContext { timeout: Some(Duration::from_millis(50)), ..Default::default() };
        let result = local.execute("sleep", &["5".to_string()], &ctx).await.unwrap();
        assert_eq!(result.exit_code, -1);
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let local = env(dir.path());
        let path = dir.path().join("out.txt");
        local.write_file(&path, b"hello", &WriteOptions::default()).await.unwrap();
        let content = local.read_file(&path).await.unwrap();
        assert_eq!(content, "hello");
    }

    #[tokio::test]
    async fn write_with_backup_preserves_previous_content() {
        let dir = tempfile::tempdir().unwrap();
        let local = env(dir.path());
        let path = dir.path().join("out.txt");
        local.write_file(&path, b"first", &WriteOptions::default()).await.unwrap();
        local
            .write_file(&path, b"second", &WriteOptions { backup: true, create_missing_dirs: false })
            .await
            .unwrap();
        let backup = tokio::fs::read_to_string(append_bak_extension(&path)).await.unwrap();
        assert_eq!(backup, "first");
    }

    #[tokio::test]
    async fn write_outside_workspace_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let local = env(dir.path());
        let result = local
            .write_file(&outside.path().join("x.txt"), b"nope", &WriteOptions::default())
            .await;
        assert!(result.is_err());
    }
}
