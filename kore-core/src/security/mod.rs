//! Security Interceptor: the one place path, command, filename, and
//! environment validation happens before anything touches the filesystem
//! or spawns a process. Pure and synchronous by design, so C3/C4 and the
//! skill runtime can call it inline without an await.

mod tier;

pub use tier::SecurityTier;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use kore_commons::error::SecurityError;
use kore_commons::paths;

const INJECTION_CHARS: [char; 3] = [';', '|', '&'];

const BLOCKLIST_SUBSTRINGS: &[&str] = &[
    "rm -rf /",
    "rm -rf /*",
    ":(){ :|:& };:",
    "mkfs",
    "shutdown",
    "dd if=/dev/zero",
    "dd if=/dev/random of=/dev/sd",
    "> /dev/sda",
];

const STRICT_ALLOWED_COMMANDS: &[&str] =
    &["ls", "cat", "pwd", "echo", "grep", "find", "head", "tail", "wc"];

const STANDARD_ALLOWED_COMMANDS: &[&str] = &[
    "ls", "cat", "pwd", "echo", "grep", "find", "head", "tail", "wc", "git", "cargo", "npm",
    "pnpm", "yarn", "node", "python", "python3", "pip", "make", "go", "rustc", "mkdir", "cp",
    "mv", "touch", "sed", "awk", "diff", "curl", "wget",
];

const STRICT_ENV_ALLOWLIST: &[&str] = &[
    "HOME", "USER", "SHELL", "LANG", "LC_ALL", "NODE_PATH", "PYTHONPATH",
];

const ENV_DENYLIST: &[&str] = &["PATH", "LD_LIBRARY_PATH", "IFS"];

const RESERVED_WINDOWS_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

const INVALID_FILENAME_CHARS: [char; 9] = ['<', '>', ':', '"', '|', '?', '*', '\\', '\0'];

/// A pure, synchronous validator. One `Interceptor` is built per security
/// tier plus a set of allowed filesystem roots; every mutation-capable
/// subsystem (process manager, local environment, VFS disk writes) calls
/// through it before touching the world.
#[derive(Debug, Clone)]
pub struct Interceptor {
    tier: SecurityTier,
    allowed_roots: Vec<PathBuf>,
    extra_blocked_cmds: Vec<String>,
}

impl Interceptor {
    pub fn new(tier: SecurityTier, allowed_roots: Vec<PathBuf>) -> Self {
        Self { tier, allowed_roots, extra_blocked_cmds: Vec::new() }
    }

    /// Append additional blocked-command substrings, e.g. from
    /// `security.blocked_cmds` in config.
    pub fn with_blocked_cmds(mut self, extra: Vec<String>) -> Self {
        self.extra_blocked_cmds = extra;
        self
    }

    pub fn tier(&self) -> SecurityTier {
        self.tier
    }

    /// Reject paths that are not equal to, or a descendant of, one of the
    /// interceptor's allowed roots. Canonicalizes when the path exists;
    /// falls back to a lexical clean when it doesn't (so callers can
    /// validate a path before creating it).
    pub fn validate_path(&self, candidate: &Path) -> Result<PathBuf, SecurityError> {
        let resolved = if candidate.exists() {
            candidate.canonicalize().unwrap_or_else(|_| paths::clean(candidate))
        } else {
            paths::clean(candidate)
        };

        if self.allowed_roots.is_empty() {
            return Ok(resolved);
        }

        let within_any = self
            .allowed_roots
            .iter()
            .any(|root| paths::is_descendant_or_equal(&resolved, root));

        if within_any {
            Ok(resolved)
        } else {
            Err(SecurityError::PathEscape {
                path: resolved,
                root: self.allowed_roots.first().cloned().unwrap_or_default(),
            })
        }
    }

    /// Validate a command and its argument vector against tier-specific
    /// allow-lists, a shared denylist, and shell-metacharacter injection.
    pub fn validate_command(&self, cmd: &str, args: &[String]) -> Result<(), SecurityError> {
        let full = std::iter::once(cmd).chain(args.iter().map(String::as_str)).collect::<Vec<_>>().join(" ");

        for pattern in BLOCKLIST_SUBSTRINGS {
            if full.contains(pattern) {
                return Err(SecurityError::CommandBlocked {
                    command: full.clone(),
                    reason: format!("matches denylisted pattern `{pattern}`"),
                });
            }
        }
        for pattern in &self.extra_blocked_cmds {
            if full.contains(pattern.as_str()) {
                return Err(SecurityError::CommandBlocked {
                    command: full.clone(),
                    reason: format!("matches configured denylist entry `{pattern}`"),
                });
            }
        }

        if cmd.chars().any(|c| INJECTION_CHARS.contains(&c))
            || args.iter().any(|a| a.chars().any(|c| INJECTION_CHARS.contains(&c)))
        {
            return Err(SecurityError::CommandInjection { command: full });
        }

        if let Some(allowlist) = self.tier.command_allowlist() {
            let program = program_name(cmd);
            if !allowlist.iter().any(|allowed| program == *allowed) {
                return Err(SecurityError::CommandBlocked {
                    command: full,
                    reason: format!("`{program}` is not in the {:?}-tier allow-list", self.tier),
                });
            }
        }

        Ok(())
    }

    /// Validate a bare filename (not a full path): rejects reserved Windows
    /// device stems, control characters, reserved punctuation, and `..`.
    pub fn validate_filename(&self, name: &str) -> Result<(), SecurityError> {
        if name == ".." || name.split(std::path::MAIN_SEPARATOR).any(|seg| seg == "..") {
            return Err(SecurityError::InvalidFilename {
                name: name.to_string(),
                reason: "contains a `..` segment".into(),
            });
        }
        if name.chars().any(|c| c.is_control()) {
            return Err(SecurityError::InvalidFilename {
                name: name.to_string(),
                reason: "contains a control character".into(),
            });
        }
        if name.chars().any(|c| INVALID_FILENAME_CHARS.contains(&c)) {
            return Err(SecurityError::InvalidFilename {
                name: name.to_string(),
                reason: "contains a reserved character".into(),
            });
        }
        let stem = name.split('.').next().unwrap_or(name).to_ascii_uppercase();
        if RESERVED_WINDOWS_NAMES.contains(&stem.as_str()) {
            return Err(SecurityError::InvalidFilename {
                name: name.to_string(),
                reason: format!("`{stem}` is a reserved Windows device name"),
            });
        }
        Ok(())
    }

    /// Produce a fresh, sanitized copy of an environment map. Strict tier
    /// keeps only a small allow-list; other tiers strip a fixed denylist.
    pub fn sanitize_env(&self, env: &HashMap<String, String>) -> HashMap<String, String> {
        match self.tier {
            SecurityTier::Strict => env
                .iter()
                .filter(|(k, _)| {
                    STRICT_ENV_ALLOWLIST.contains(&k.as_str()) || k.starts_with("GO")
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            SecurityTier::Standard | SecurityTier::Permissive => env
                .iter()
                .filter(|(k, _)| !ENV_DENYLIST.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

fn program_name(cmd: &str) -> &str {
    cmd.rsplit(['/', '\\']).next().unwrap_or(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interceptor(tier: SecurityTier, root: &Path) -> Interceptor {
        Interceptor::new(tier, vec![root.to_path_buf()])
    }

    #[test]
    fn validate_path_rejects_sibling_with_shared_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("work");
        std::fs::create_dir(&root).unwrap();
        let sibling = dir.path().join("work-evil");
        std::fs::create_dir(&sibling).unwrap();

        let interceptor = interceptor(SecurityTier::Standard, &root);
        assert!(interceptor.validate_path(&sibling).is_err());
    }

    #[test]
    fn validate_path_accepts_descendant() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        let interceptor = interceptor(SecurityTier::Standard, dir.path());
        assert!(interceptor.validate_path(&nested).is_ok());
    }

    #[test]
    fn validate_command_blocks_fork_bomb() {
        let interceptor = Interceptor::new(SecurityTier::Permissive, vec![]);
        let err = interceptor.validate_command(":(){ :|:& };:", &[]).unwrap_err();
        assert!(matches!(err, SecurityError::CommandBlocked { .. }));
    }

    #[test]
    fn validate_command_detects_injection() {
        let interceptor = Interceptor::new(SecurityTier::Permissive, vec![]);
        let err = interceptor
            .validate_command("ls", &["foo".into(), "; rm -rf ~".into()])
            .unwrap_err();
        assert!(matches!(err, SecurityError::CommandInjection { .. }));
    }

    #[test]
    fn strict_tier_requires_allowlist_membership() {
        let interceptor = Interceptor::new(SecurityTier::Strict, vec![]);
        assert!(interceptor.validate_command("cargo", &["build".into()]).is_err());
        assert!(interceptor.validate_command("cat", &["README.md".into()]).is_ok());
    }

    #[test]
    fn validate_filename_rejects_reserved_device_name() {
        let interceptor = Interceptor::new(SecurityTier::Permissive, vec![]);
        assert!(interceptor.validate_filename("CON.txt").is_err());
        assert!(interceptor.validate_filename("normal.txt").is_ok());
    }

    #[test]
    fn sanitize_env_strips_path_variables() {
        let interceptor = Interceptor::new(SecurityTier::Standard, vec![]);
        let mut env = HashMap::new();
        env.insert("PATH".to_string(), "/usr/bin".to_string());
        env.insert("HOME".to_string(), "/home/kore".to_string());
        let sanitized = interceptor.sanitize_env(&env);
        assert!(!sanitized.contains_key("PATH"));
        assert_eq!(sanitized.get("HOME").map(String::as_str), Some("/home/kore"));
    }

    #[test]
    fn strict_sanitize_env_keeps_only_allowlist() {
        let interceptor = Interceptor::new(SecurityTier::Strict, vec![]);
        let mut env = HashMap::new();
        env.insert("HOME".to_string(), "/home/kore".to_string());
        env.insert("SOME_SECRET".to_string(), "value".to_string());
        let sanitized = interceptor.sanitize_env(&env);
        assert_eq!(sanitized.len(), 1);
        assert!(sanitized.contains_key("HOME"));
    }
}
