//! Platform-specific process liveness checks.
//!
//! The probe is run against pids recorded by other processes, possibly long
//! ago, so it must be harmless for any value: it never delivers a signal and
//! never targets a process group.

use tracing::debug;

/// Check if a process with the given PID is alive.
///
/// Only a definitive "no such process" answer counts as dead. Any other
/// failure (for example `EPERM` when the pid belongs to another user) counts
/// as alive, since the process evidently exists.
///
/// # Platform Behavior
/// - **Linux/macOS**: `kill(pid, 0)` via `nix`; dead only on `ESRCH`
/// - **Windows**: `OpenProcess` with `PROCESS_QUERY_LIMITED_INFORMATION`;
///   dead only on `ERROR_INVALID_PARAMETER`
pub fn is_process_alive(pid: u32) -> bool {
    // 0 addresses our own process group and values past i32::MAX become
    // negative pids (whole process groups) once cast to pid_t.
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }

    #[cfg(unix)]
    {
        use nix::errno::Errno;
        use nix::sys::signal::kill;
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid as i32), None) {
            Ok(()) => true,
            Err(Errno::ESRCH) => false,
            Err(e) => {
                debug!("Liveness probe for PID {} returned {}, treating as alive", pid, e);
                true
            }
        }
    }

    #[cfg(windows)]
    {
        is_process_alive_windows(pid)
    }

    #[cfg(not(any(unix, windows)))]
    {
        // Fallback: assume it exists
        debug!("Process alive check not implemented for this platform");
        true
    }
}

#[cfg(windows)]
#[allow(unsafe_code)]
fn is_process_alive_windows(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, GetLastError, ERROR_INVALID_PARAMETER};
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    // SAFETY: OpenProcess accepts any pid value and returns a null handle on
    // failure; a non-null handle is owned here and closed exactly once.
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if !handle.is_null() {
            CloseHandle(handle);
            return true;
        }
        let err = GetLastError();
        if err != ERROR_INVALID_PARAMETER {
            debug!("OpenProcess({}) failed with {}, treating as alive", pid, err);
        }
        err != ERROR_INVALID_PARAMETER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_process_alive_self() {
        // Our own process should be alive
        let pid = std::process::id();
        assert!(is_process_alive(pid));
    }

    #[test]
    fn test_is_process_alive_nonexistent() {
        // Above the kernel's pid_max, so never allocated
        assert!(!is_process_alive(999_999_999));
    }

    #[test]
    fn test_invalid_pids_are_never_probed() {
        assert!(!is_process_alive(0));
        assert!(!is_process_alive(u32::MAX));
        assert!(!is_process_alive(i32::MAX as u32 + 1));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_init_counts_as_alive() {
        // PID 1 always exists; unprivileged callers get EPERM, which is alive
        assert!(is_process_alive(1));
    }
}
