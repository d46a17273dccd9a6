//! Resource limits for sandboxed processes.

#![allow(unsafe_code)]

use crate::config::ResourceLimits;

/// Apply `limits` to the current process with `setrlimit`.
///
/// Runs inside `pre_exec`, between `fork()` and `exec()`: only direct
/// syscalls, no allocation on the success path.
#[cfg(target_os = "linux")]
pub(crate) fn apply(limits: &ResourceLimits) -> std::io::Result<()> {
    use nix::sys::resource::{Resource, setrlimit};

    for (resource, value) in [
        (Resource::RLIMIT_CPU, limits.cpu_secs),
        (Resource::RLIMIT_AS, limits.memory_bytes),
        (Resource::RLIMIT_FSIZE, limits.file_size_bytes),
        (Resource::RLIMIT_NOFILE, limits.open_files),
    ] {
        setrlimit(resource, value, value)?;
    }
    Ok(())
}

/// Install the limits on `cmd` so they apply to the child only.
#[cfg(target_os = "linux")]
pub(crate) fn install(cmd: &mut tokio::process::Command, limits: ResourceLimits) {
    // SAFETY: pre_exec runs between fork() and exec(). The closure only
    // calls setrlimit(2) on a stack array of copied values. Error paths
    // convert errno without allocating.
    unsafe {
        cmd.pre_exec(move || apply(&limits));
    }
}

#[cfg(not(target_os = "linux"))]
pub(crate) fn install(_cmd: &mut tokio::process::Command, _limits: ResourceLimits) {
    tracing::warn!("resource limits are only enforced on Linux; process runs with host limits");
}
