//! Seccomp policy of the sandbox worker.
//!
//! The filter is an allow-list: the listed syscalls pass, everything else
//! kills the process. The worker's runtime needs are small and fixed before
//! the filter is installed: read and write its stdio pipes, allocate and
//! flip page protections for the engine, check the clock for deadlines, and
//! exit. Nothing else is granted, so networking, process creation,
//! tracing, namespace changes, capability changes and filesystem mutation
//! are all denied by default rather than enumerated.
//!
//! Only implemented for x86_64 Linux; elsewhere the worker runs with process
//! isolation but without a syscall filter.

use bidbox_common::status::Result;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
mod syscall {
    // Numbers from asm/unistd_64.h.

    // Stdio pipes and file reads
    pub const READ: i64 = 0;
    pub const WRITE: i64 = 1;
    pub const OPEN: i64 = 2;
    pub const CLOSE: i64 = 3;
    pub const LSEEK: i64 = 8;
    pub const WRITEV: i64 = 20;
    pub const OPENAT: i64 = 257;

    // File metadata
    pub const STAT: i64 = 4;
    pub const FSTAT: i64 = 5;
    pub const LSTAT: i64 = 6;
    pub const NEWFSTATAT: i64 = 262;
    pub const STATX: i64 = 332;

    // Memory management, including page protection flips for the engine
    pub const MMAP: i64 = 9;
    pub const MPROTECT: i64 = 10;
    pub const MUNMAP: i64 = 11;
    pub const BRK: i64 = 12;
    pub const MREMAP: i64 = 25;
    pub const MADVISE: i64 = 28;

    // Signal plumbing used by the runtime's panic and abort paths
    pub const RT_SIGACTION: i64 = 13;
    pub const RT_SIGPROCMASK: i64 = 14;
    pub const RT_SIGRETURN: i64 = 15;
    pub const SIGALTSTACK: i64 = 131;

    // Scheduling hints and lock support
    pub const SCHED_YIELD: i64 = 24;
    pub const FUTEX: i64 = 202;
    pub const SET_ROBUST_LIST: i64 = 273;

    // Process identity and time
    pub const GETPID: i64 = 39;
    pub const GETTID: i64 = 186;
    pub const GETTIMEOFDAY: i64 = 96;
    pub const CLOCK_GETTIME: i64 = 228;

    // Hashing seeds
    pub const GETRANDOM: i64 = 318;

    // Shutdown
    pub const EXIT: i64 = 60;
    pub const EXIT_GROUP: i64 = 231;
}

/// The only syscalls the worker may make once serving begins.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn allowed_syscalls() -> Vec<i64> {
    use syscall::*;
    vec![
        READ, WRITE, OPEN, CLOSE, LSEEK, WRITEV, OPENAT,
        STAT, FSTAT, LSTAT, NEWFSTATAT, STATX,
        MMAP, MPROTECT, MUNMAP, BRK, MREMAP, MADVISE,
        RT_SIGACTION, RT_SIGPROCMASK, RT_SIGRETURN, SIGALTSTACK,
        SCHED_YIELD, FUTEX, SET_ROBUST_LIST,
        GETPID, GETTID, GETTIMEOFDAY, CLOCK_GETTIME,
        GETRANDOM,
        EXIT, EXIT_GROUP,
    ]
}

/// Installs the syscall filter on the calling process.
///
/// Irreversible. Any syscall outside the allow-list afterwards terminates
/// the process with SIGSYS.
#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
pub fn apply() -> Result<()> {
    use std::collections::BTreeMap;

    use bidbox_common::status::Status;
    use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch};

    let rules: BTreeMap<i64, Vec<SeccompRule>> =
        allowed_syscalls().into_iter().map(|nr| (nr, vec![])).collect();

    let filter = SeccompFilter::new(
        rules,
        // mismatch_action: any syscall outside the allow-list kills the
        // process.
        SeccompAction::KillProcess,
        // match_action: the listed syscalls pass.
        SeccompAction::Allow,
        TargetArch::x86_64,
    )
    .map_err(|e| Status::internal(format!("Failed to create the seccomp filter: {e}")))?;

    let program: BpfProgram = filter
        .try_into()
        .map_err(|e: seccompiler::BackendError| {
            Status::internal(format!("Failed to compile the seccomp filter: {e}"))
        })?;

    seccompiler::apply_filter(&program)
        .map_err(|e| Status::internal(format!("Failed to apply the seccomp filter: {e}")))?;
    Ok(())
}

/// No-op on platforms without seccomp support.
#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
pub fn apply() -> Result<()> {
    tracing::warn!("syscall filtering is unavailable on this platform; worker runs unfiltered");
    Ok(())
}

#[cfg(all(target_os = "linux", target_arch = "x86_64", test))]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn allow_list_covers_the_permitted_classes() {
        let allowed = allowed_syscalls();
        // read/open/stat/exit, page protection for the engine, scheduling
        // hints.
        assert!(allowed.contains(&syscall::READ));
        assert!(allowed.contains(&syscall::WRITE));
        assert!(allowed.contains(&syscall::OPEN));
        assert!(allowed.contains(&syscall::STAT));
        assert!(allowed.contains(&syscall::EXIT));
        assert!(allowed.contains(&syscall::EXIT_GROUP));
        assert!(allowed.contains(&syscall::MPROTECT));
        assert!(allowed.contains(&syscall::MADVISE));
        assert!(allowed.contains(&syscall::SCHED_YIELD));
        assert!(allowed.contains(&syscall::SET_ROBUST_LIST));
    }

    #[test]
    fn escape_primitives_are_not_in_the_allow_list() {
        let allowed = allowed_syscalls();
        // Everything unlisted is denied by default; spot-check the classic
        // escape primitives never creep into the list.
        for forbidden in [
            41i64,  // socket
            42,     // connect
            56,     // clone
            57,     // fork
            59,     // execve
            87,     // unlink
            101,    // ptrace
            105,    // setuid
            125,    // capget
            126,    // capset
            155,    // pivot_root
            161,    // chroot
            165,    // mount
            272,    // unshare
            298,    // perf_event_open
            308,    // setns
            321,    // bpf
            425,    // io_uring_setup
            435,    // clone3
        ] {
            assert!(!allowed.contains(&forbidden), "syscall {forbidden} must not be allowed");
        }
    }

    #[test]
    fn filter_compiles_to_bpf() {
        use seccompiler::{BpfProgram, SeccompAction, SeccompFilter, SeccompRule, TargetArch};

        let rules: BTreeMap<i64, Vec<SeccompRule>> =
            allowed_syscalls().into_iter().map(|nr| (nr, vec![])).collect();
        let filter = SeccompFilter::new(
            rules,
            SeccompAction::KillProcess,
            SeccompAction::Allow,
            TargetArch::x86_64,
        )
        .expect("filter creation should succeed");
        let _program: BpfProgram = filter.try_into().expect("BPF compilation should succeed");
    }

    // Applying the filter is not tested here: it is irreversible and would
    // constrain the test process itself. The worker integration test drives
    // it in a child process.
}
