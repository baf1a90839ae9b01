//! Process vitals used by the health monitor.

/// Resident set size of the current process in bytes.
///
/// Read from `/proc/self/status` (`VmRSS`); returns `None` on platforms
/// without procfs or if the field is missing.
pub fn current_rss_bytes() -> Option<u64> {
    #[cfg(target_os = "linux")]
    {
        let status = std::fs::read_to_string("/proc/self/status").ok()?;
        for line in status.lines() {
            if let Some(rest) = line.strip_prefix("VmRSS:") {
                let kb: u64 = rest.trim().trim_end_matches("kB").trim().parse().ok()?;
                return Some(kb * 1024);
            }
        }
        None
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}

/// Number of tasks currently alive on the ambient tokio runtime.
///
/// `None` when called outside a runtime.
pub fn alive_task_count() -> Option<usize> {
    tokio::runtime::Handle::try_current()
        .ok()
        .map(|handle| handle.metrics().num_alive_tasks())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(target_os = "linux")]
    #[test]
    fn test_rss_is_nonzero_on_linux() {
        let rss = current_rss_bytes().expect("procfs should be readable");
        assert!(rss > 0);
    }

    #[tokio::test]
    async fn test_task_count_inside_runtime() {
        let guard = tokio::spawn(std::future::pending::<()>());
        let count = alive_task_count().expect("inside a runtime");
        assert!(count >= 1);
        guard.abort();
    }

    #[test]
    fn test_task_count_outside_runtime() {
        assert!(alive_task_count().is_none());
    }
}
