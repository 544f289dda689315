//! File-descriptor usage of the current process.
//!
//! Read from procfs, so only Linux reports real numbers; elsewhere both
//! calls return [`io::ErrorKind::Unsupported`].

use std::io;

use serde::Serialize;

/// Published as the `fds` var: `{"Max": <soft limit>, "Open": <open fds>}`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FdUsage {
    pub max: u64,
    pub open: u64,
}

impl FdUsage {
    /// Current usage; unavailable figures read as zero.
    pub fn current() -> Self {
        Self {
            max: limit().unwrap_or(0),
            open: open().unwrap_or(0),
        }
    }
}

/// Number of open file descriptors.
#[cfg(target_os = "linux")]
pub fn open() -> io::Result<u64> {
    // Includes the descriptor opened to list the directory.
    Ok(std::fs::read_dir("/proc/self/fd")?.count() as u64)
}

/// Soft limit on open file descriptors (`RLIMIT_NOFILE`).
#[cfg(target_os = "linux")]
pub fn limit() -> io::Result<u64> {
    parse_limits(&std::fs::read_to_string("/proc/self/limits")?)
}

#[cfg(not(target_os = "linux"))]
pub fn open() -> io::Result<u64> {
    Err(io::ErrorKind::Unsupported.into())
}

#[cfg(not(target_os = "linux"))]
pub fn limit() -> io::Result<u64> {
    Err(io::ErrorKind::Unsupported.into())
}

// Limit Soft Limit Hard Limit Units
// Max open files 1024 4096 files
#[cfg_attr(not(target_os = "linux"), allow(dead_code))]
fn parse_limits(limits: &str) -> io::Result<u64> {
    let soft = limits
        .lines()
        .find_map(|line| line.strip_prefix("Max open files"))
        .and_then(|rest| rest.split_whitespace().next())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "no `Max open files` entry"))?;

    if soft == "unlimited" {
        return Ok(u64::MAX);
    }
    soft.parse()
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("bad fd limit `{soft}`: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: &str = "\
Limit                     Soft Limit           Hard Limit           Units
Max cpu time              unlimited            unlimited            seconds
Max open files            1024                 524288               files
Max locked memory         8388608              8388608              bytes
";

    #[test]
    fn parses_soft_limit() {
        assert_eq!(parse_limits(LIMITS).unwrap(), 1024);
    }

    #[test]
    fn unlimited_maps_to_max() {
        let limits = LIMITS.replace("1024   ", "unlimited");
        assert_eq!(parse_limits(&limits).unwrap(), u64::MAX);
    }

    #[test]
    fn missing_entry_is_invalid_data() {
        let err = parse_limits("Limit Soft Limit Hard Limit Units\n").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn reports_live_process_figures() {
        let usage = FdUsage::current();
        assert!(usage.open >= 3, "{usage:?}");
        assert!(usage.max >= usage.open, "{usage:?}");
    }
}
