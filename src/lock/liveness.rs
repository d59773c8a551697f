//! Owner-process liveness probing for lock staleness checks

use serde::Serialize;

/// Outcome of probing a lock owner's process id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Liveness {
    /// The process exists
    Alive,
    /// The process provably does not exist (or the pid is not a valid owner)
    ConfirmedDead,
    /// The probe could not decide, e.g. the process exists but belongs to
    /// another user
    Indeterminate,
}

impl Liveness {
    /// Only a confirmed-dead owner counts as gone; uncertain evidence never
    /// allows a reclaim.
    pub fn is_dead(&self) -> bool {
        matches!(self, Liveness::ConfirmedDead)
    }
}

/// Probe a pid with a null signal (`kill(pid, 0)`), which checks existence
/// without delivering anything.
#[cfg(unix)]
pub fn probe(pid: u32) -> Liveness {
    if pid == 0 {
        return Liveness::ConfirmedDead;
    }
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return Liveness::ConfirmedDead;
    };

    // SAFETY: signal 0 performs the permission and existence checks only.
    // The pid is a validated positive value, so no process group is targeted.
    let result = unsafe { libc::kill(pid, 0) };
    if result == 0 {
        return Liveness::Alive;
    }

    match std::io::Error::last_os_error().raw_os_error() {
        Some(libc::ESRCH) => Liveness::ConfirmedDead,
        Some(libc::EPERM) => Liveness::Indeterminate,
        _ => Liveness::Indeterminate,
    }
}

#[cfg(not(unix))]
pub fn probe(pid: u32) -> Liveness {
    if pid == 0 {
        return Liveness::ConfirmedDead;
    }
    Liveness::Indeterminate
}
