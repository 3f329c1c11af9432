//! Process liveness checks
//!
//! Used to tell whether the agent recorded in the lock file is still
//! running, without any IPC round trip.

/// Check if a process with the given PID is still alive
///
/// On Unix, uses kill(pid, 0) to check if the process exists.
/// On Windows, uses OpenProcess to check if the process exists.
#[cfg(unix)]
pub fn is_process_alive(pid: u32) -> bool {
    if pid == 0 || pid > i32::MAX as u32 {
        return false;
    }
    // ESRCH means no such process; EPERM means it exists but isn't ours
    unsafe {
        let result = libc::kill(pid as libc::pid_t, 0);
        if result == 0 {
            return true;
        }
        let err = std::io::Error::last_os_error();
        err.raw_os_error() == Some(libc::EPERM)
    }
}

#[cfg(windows)]
pub fn is_process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION};

    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_process_is_alive() {
        assert!(is_process_alive(std::process::id()));
    }

    #[test]
    fn test_invalid_pid_not_alive() {
        assert!(!is_process_alive(999_999_999));
        assert!(!is_process_alive(0));
    }
}
