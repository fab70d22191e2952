//! Advisory, directory-based exclusive locks.
//!
//! A lock is a directory created next to the governed path (`<path>.lockdir`)
//! whose atomic create-if-absent (`mkdir`) is the mutual-exclusion primitive.
//! A small JSON file inside it records the acquiring process so a later
//! contender can detect a stale lock left behind by a dead process.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{EngineError, Result};

const RETRY_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    acquired_at_unix_secs: u64,
}

fn lock_dir_for(path: &Path) -> PathBuf {
    let mut s = path.as_os_str().to_os_string();
    s.push(".lockdir");
    PathBuf::from(s)
}

fn info_file(lock_dir: &Path) -> PathBuf {
    lock_dir.join("info.json")
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(unix)]
fn process_is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond existence/permission checks.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 || std::io::Error::last_os_error().raw_os_error() == Some(libc::EPERM) }
}

#[cfg(not(unix))]
fn process_is_alive(_pid: u32) -> bool {
    // Conservative: without a portable liveness check, never treat as stale.
    true
}

/// Holds an exclusive lock on `path` for as long as the guard lives; releases
/// it on drop so a panic or early return cannot leak the lock directory.
pub struct LockGuard {
    lock_dir: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let info = info_file(&self.lock_dir);
        let _ = std::fs::remove_file(&info);
        if let Err(e) = std::fs::remove_dir(&self.lock_dir) {
            warn!(path = %self.lock_dir.display(), error = %e, "failed to remove lock directory on release");
        }
    }
}

/// Attempts to create the lock directory. Returns `true` on success, `false`
/// if it already exists (contended).
fn try_create(lock_dir: &Path) -> std::io::Result<bool> {
    match std::fs::create_dir(lock_dir) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(e),
    }
}

/// Returns `Some(pid)` of the recorded holder if the lock is stale (holder's
/// process is no longer live) and at least `stale_age` old; `None` otherwise.
fn stale_holder(lock_dir: &Path, stale_age: Duration) -> Option<u32> {
    let raw = std::fs::read_to_string(info_file(lock_dir)).ok()?;
    let info: LockInfo = serde_json::from_str(&raw).ok()?;
    let age = now_unix_secs().saturating_sub(info.acquired_at_unix_secs);
    if age < stale_age.as_secs() {
        return None;
    }
    if process_is_alive(info.pid) {
        return None;
    }
    Some(info.pid)
}

/// Forcibly reclaims a lock directory believed to be stale. Best-effort: if
/// another contender wins the race to remove+recreate it, the caller simply
/// loops and retries like any other contention.
fn reclaim_stale(lock_dir: &Path) {
    let _ = std::fs::remove_file(info_file(lock_dir));
    let _ = std::fs::remove_dir(lock_dir);
}

/// Acquires an advisory exclusive lock on `path`, blocking with bounded
/// backoff until `timeout` elapses.
pub fn acquire(path: &Path, timeout: Duration, stale_age: Duration) -> Result<LockGuard> {
    let lock_dir = lock_dir_for(path);
    let deadline = Instant::now() + timeout;

    loop {
        match try_create(&lock_dir)? {
            true => {
                let info = LockInfo {
                    pid: std::process::id(),
                    acquired_at_unix_secs: now_unix_secs(),
                };
                let info_path = info_file(&lock_dir);
                if let Err(e) = std::fs::write(&info_path, serde_json::to_vec(&info)?) {
                    // Couldn't record ownership; release the directory we just
                    // made rather than hold an unlabeled lock.
                    let _ = std::fs::remove_dir(&lock_dir);
                    return Err(EngineError::Io(e));
                }
                debug!(path = %path.display(), pid = info.pid, "lock acquired");
                return Ok(LockGuard { lock_dir });
            }
            false => {
                if let Some(pid) = stale_holder(&lock_dir, stale_age) {
                    warn!(path = %path.display(), stale_pid = pid, "reclaiming stale lock");
                    reclaim_stale(&lock_dir);
                    continue;
                }

                if Instant::now() >= deadline {
                    return Err(EngineError::LockTimeout {
                        path: path.to_path_buf(),
                        timeout_ms: timeout.as_millis() as u64,
                    });
                }
                std::thread::sleep(RETRY_INTERVAL.min(deadline.saturating_duration_since(Instant::now())));
            }
        }
    }
}

/// Acquires locks on every path in `paths`, in a fixed global order
/// (alphabetic by absolute path) to prevent deadlock between contenders that
/// need the same set of locks. Releases all held locks (in reverse
/// acquisition order, via `Drop`) if any acquisition in the sequence fails.
pub fn acquire_ordered(paths: &[&Path], timeout: Duration, stale_age: Duration) -> Result<Vec<LockGuard>> {
    let mut ordered: Vec<&Path> = paths.to_vec();
    ordered.sort();
    ordered.dedup();

    let mut guards = Vec::with_capacity(ordered.len());
    for p in ordered {
        match acquire(p, timeout, stale_age) {
            Ok(g) => guards.push(g),
            Err(e) => {
                // Dropping `guards` here releases everything acquired so far,
                // in reverse order, before propagating the failure.
                return Err(e);
            }
        }
    }
    Ok(guards)
}

/// Scans `roots` for `.lockdir` entries and removes any whose holder is dead,
/// regardless of the stale-age debounce (an explicit operator request
/// overrides the race-avoidance heuristic). Returns the number reclaimed.
pub fn cleanup_stale_locks(roots: &[PathBuf]) -> Result<usize> {
    let mut reclaimed = 0;
    for root in roots {
        if !root.exists() {
            continue;
        }
        for entry in walk_lockdirs(root)? {
            if let Some(pid) = stale_holder(&entry, Duration::from_secs(0)) {
                warn!(lock_dir = %entry.display(), stale_pid = pid, "cleanup: reclaiming stale lock");
                reclaim_stale(&entry);
                reclaimed += 1;
            }
        }
    }
    Ok(reclaimed)
}

fn walk_lockdirs(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                if path.extension().and_then(|e| e.to_str()) == Some("lockdir") {
                    found.push(path);
                } else {
                    stack.push(path);
                }
            }
        }
    }
    Ok(found)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn acquire_then_release_allows_reacquire() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.txt");
        std::fs::write(&target, b"x").unwrap();

        let guard = acquire(&target, Duration::from_secs(1), Duration::from_secs(5)).unwrap();
        drop(guard);

        let guard2 = acquire(&target, Duration::from_secs(1), Duration::from_secs(5));
        assert!(guard2.is_ok());
    }

    #[test]
    fn contended_lock_times_out() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.txt");
        std::fs::write(&target, b"x").unwrap();

        let _held = acquire(&target, Duration::from_secs(1), Duration::from_secs(5)).unwrap();
        let result = acquire(&target, Duration::from_millis(50), Duration::from_secs(5));
        assert!(matches!(result, Err(EngineError::LockTimeout { .. })));
    }

    #[test]
    fn ordered_acquisition_is_alphabetic() {
        let dir = TempDir::new().unwrap();
        let b = dir.path().join("b.txt");
        let a = dir.path().join("a.txt");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();

        let guards = acquire_ordered(&[&b, &a], Duration::from_secs(1), Duration::from_secs(5)).unwrap();
        assert_eq!(guards.len(), 2);
    }

    #[test]
    fn lock_with_dead_holder_is_reclaimed_after_debounce() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.txt");
        std::fs::write(&target, b"x").unwrap();

        let lock_dir = lock_dir_for(&target);
        std::fs::create_dir(&lock_dir).unwrap();
        let dead_info = LockInfo {
            // PID 1 belongs to init and is always alive on a real system, so
            // use an implausibly large pid that (barring a wrapped counter)
            // cannot correspond to a live process in this test's container.
            pid: 999_999,
            acquired_at_unix_secs: now_unix_secs().saturating_sub(60),
        };
        std::fs::write(info_file(&lock_dir), serde_json::to_vec(&dead_info).unwrap()).unwrap();

        let result = acquire(&target, Duration::from_secs(1), Duration::from_secs(5));
        assert!(result.is_ok());
    }

    #[test]
    fn cleanup_reclaims_without_debounce() {
        let dir = TempDir::new().unwrap();
        let target = dir.path().join("a.txt");
        std::fs::write(&target, b"x").unwrap();
        let lock_dir = lock_dir_for(&target);
        std::fs::create_dir(&lock_dir).unwrap();
        let dead_info = LockInfo {
            pid: 999_999,
            acquired_at_unix_secs: now_unix_secs(),
        };
        std::fs::write(info_file(&lock_dir), serde_json::to_vec(&dead_info).unwrap()).unwrap();

        let reclaimed = cleanup_stale_locks(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(reclaimed, 1);
        assert!(!lock_dir.exists());
    }
}
