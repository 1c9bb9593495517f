//! Picks a bind target for the server: a Unix domain socket under a temp
//! directory on POSIX platforms, falling back to a loopback TCP port
//! (including on platforms without `AF_UNIX`, e.g. Windows).

use std::path::PathBuf;

use axum::Router;
use kore_commons::error::{KoreError, KoreResult};

pub enum Transport {
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, PathBuf),
    Tcp(tokio::net::TcpListener),
}

impl Transport {
    /// Binds a fresh Unix socket named after the session server's PID under
    /// the system temp dir; if that fails (no `AF_UNIX`, permissions, a
    /// stale socket file) falls back to `127.0.0.1:0`, letting the OS pick a
    /// free port.
    pub async fn bind() -> KoreResult<Self> {
        #[cfg(unix)]
        {
            let path = dirs::runtime_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join(format!("kore-server-{}.sock", std::process::id()));
            let _ = std::fs::remove_file(&path);
            if let Ok(listener) = tokio::net::UnixListener::bind(&path) {
                return Ok(Transport::Unix(listener, path));
            }
        }

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| KoreError::ToolError { tool: "bind".to_string(), message: e.to_string() })?;
        Ok(Transport::Tcp(listener))
    }

    pub fn describe(&self) -> String {
        match self {
            #[cfg(unix)]
            Transport::Unix(_, path) => format!("unix://{}", path.display()),
            Transport::Tcp(listener) => {
                let addr = listener.local_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".to_string());
                format!("tcp://{addr}")
            }
        }
    }

    pub async fn serve(self, router: Router) -> KoreResult<()> {
        let result = match self {
            #[cfg(unix)]
            Transport::Unix(listener, path) => {
                let outcome = axum::serve(listener, router).await;
                let _ = std::fs::remove_file(&path);
                outcome
            }
            Transport::Tcp(listener) => axum::serve(listener, router).await,
        };
        result.map_err(|e| KoreError::ToolError { tool: "serve".to_string(), message: e.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bind_prefers_a_unix_socket_on_unix() {
        let transport = Transport::bind().await.unwrap();
        let description = transport.describe();
        #[cfg(unix)]
        assert!(description.starts_with("unix://"), "got {description}");
        #[cfg(not(unix))]
        assert!(description.starts_with("tcp://"), "got {description}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn rebinding_the_same_pid_reclaims_the_stale_socket_file() {
        // `bind()` names the socket after the process id, so a second bind
        // in the same process replaces the first rather than erroring.
        let first = Transport::bind().await.unwrap();
        let second = Transport::bind().await.unwrap();
        assert_eq!(first.describe(), second.describe());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn unix_socket_path_is_removed_after_bind() {
        let transport = Transport::bind().await.unwrap();
        let Transport::Unix(_, path) = &transport else {
            panic!("expected a Unix transport on this platform");
        };
        assert!(path.exists());
    }
}
