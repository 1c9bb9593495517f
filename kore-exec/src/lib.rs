//! Low-level process spawning and lifecycle primitives.
//!
//! `kore-core`'s process manager (the virtual-PID arena) and local
//! environment build on top of these: pipe-based spawning with unified
//! stdout/stderr handles, process-group cleanup, and bounded line reading.
//!
//! ## Modules
//!
//! - [`pipe`] - async pipe-based process spawning with unified handles
//! - [`process`] - process handle types for pipe-based children
//! - [`process_group`] - process group management for reliable cleanup
//! - [`stream`] - bounded-size line reading over async readers

pub mod pipe;
pub mod process;
pub mod process_group;
pub mod stream;

pub use pipe::{
    PipeSpawnOptions, PipeStdinMode, spawn_process, spawn_process_no_stdin,
    spawn_process_with_options,
};

pub use process::{
    ChildTerminator, ExecCommandSession, ProcessHandle, SpawnedProcess, SpawnedPty,
    collect_output_until_exit,
};

pub use process_group::{
    DEFAULT_GRACEFUL_TIMEOUT_MS, GracefulTerminationResult, KillSignal, detach_from_tty,
    graceful_kill_process_group, graceful_kill_process_group_default, kill_child_process_group,
    kill_child_process_group_with_signal, kill_process_group, kill_process_group_by_pid,
    kill_process_group_by_pid_with_signal, kill_process_group_with_signal, set_parent_death_signal,
    set_process_group,
};

#[cfg(windows)]
pub use process_group::kill_process;

pub use stream::{ReadLineResult, read_line_with_limit};
