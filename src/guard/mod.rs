use anyhow::Result;
use std::path::Path;
use std::time::{Duration, SystemTime};
use sysinfo::{Disks, System};

/// Outcome of a pre-flight admission check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Allow,
    Deny(String),
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow)
    }
}

/// Process-wide disk/memory guard.
///
/// The guard queries live OS metrics on every call; it keeps no counters that
/// could drift between checks. Admission is advisory and re-checked per stage,
/// so no cross-process lock is required.
pub struct ResourceGuard {
    min_free_space_bytes: u64,
    min_available_memory_bytes: u64,
}

/// Memory floor below which new disk/memory-consuming work is refused
const DEFAULT_MEMORY_FLOOR_BYTES: u64 = 200 * 1024 * 1024;

impl ResourceGuard {
    pub fn new(min_free_space_mb: u64) -> Self {
        Self {
            min_free_space_bytes: min_free_space_mb * 1024 * 1024,
            min_available_memory_bytes: DEFAULT_MEMORY_FLOOR_BYTES,
        }
    }

    /// Decide whether an operation expected to write `estimated_bytes` under
    /// `target` may proceed
    pub fn admit(&self, target: &Path, estimated_bytes: u64) -> Admission {
        let free_space = match self.free_space(target) {
            Some(free) => free,
            None => {
                // Admission is advisory; without metrics the per-stage
                // re-checks are the remaining safety net
                tracing::warn!(
                    path = %target.display(),
                    "Unable to determine free space, allowing operation"
                );
                return Admission::Allow;
            }
        };

        let available_memory = available_memory();

        self.decide(free_space, available_memory, estimated_bytes)
    }

    /// Pure admission decision given live metrics
    fn decide(&self, free_space: u64, available_memory: u64, estimated_bytes: u64) -> Admission {
        if estimated_bytes.saturating_add(self.min_free_space_bytes) > free_space {
            return Admission::Deny(format!(
                "estimated {} exceeds free space {} minus {} margin",
                crate::utils::format_file_size(estimated_bytes),
                crate::utils::format_file_size(free_space),
                crate::utils::format_file_size(self.min_free_space_bytes),
            ));
        }

        if available_memory < self.min_available_memory_bytes {
            return Admission::Deny(format!(
                "available memory {} below {} floor",
                crate::utils::format_file_size(available_memory),
                crate::utils::format_file_size(self.min_available_memory_bytes),
            ));
        }

        Admission::Allow
    }

    /// Free space on the volume holding `path`, chosen by the longest
    /// matching mount point
    pub fn free_space(&self, path: &Path) -> Option<u64> {
        let resolved = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        let disks = Disks::new_with_refreshed_list();

        disks
            .iter()
            .filter(|disk| resolved.starts_with(disk.mount_point()))
            .max_by_key(|disk| disk.mount_point().as_os_str().len())
            .map(|disk| disk.available_space())
    }

    /// Remove a file or directory tree, logging failures instead of
    /// propagating them
    pub fn reclaim(&self, path: &Path) {
        let result = if path.is_dir() {
            fs_err::remove_dir_all(path)
        } else {
            fs_err::remove_file(path)
        };

        match result {
            Ok(()) => tracing::debug!(path = %path.display(), "Reclaimed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to reclaim"),
        }
    }

    /// Remove files older than `max_age` under `dir`, recursively.
    ///
    /// Safety net for working files left behind by crashed jobs; runs
    /// independently of any job lifecycle. Returns the number of files
    /// removed.
    pub fn sweep(&self, dir: &Path, max_age: Duration) -> Result<usize> {
        if !dir.exists() {
            return Ok(0);
        }

        let now = SystemTime::now();
        let mut removed = 0;
        let mut pending = vec![dir.to_path_buf()];
        let mut subdirs = Vec::new();

        while let Some(current) = pending.pop() {
            for entry in fs_err::read_dir(&current)? {
                let entry = entry?;
                let path = entry.path();

                if path.is_dir() {
                    subdirs.push(path.clone());
                    pending.push(path);
                    continue;
                }

                let expired = entry
                    .metadata()
                    .and_then(|m| m.modified())
                    .ok()
                    .and_then(|modified| now.duration_since(modified).ok())
                    .map(|age| age > max_age)
                    .unwrap_or(false);

                if expired {
                    match fs_err::remove_file(&path) {
                        Ok(()) => {
                            tracing::info!(path = %path.display(), "Swept stale file");
                            removed += 1;
                        }
                        Err(e) => {
                            tracing::warn!(path = %path.display(), error = %e, "Sweep failed")
                        }
                    }
                }
            }
        }

        // Prune directories the sweep left empty, deepest first, so
        // crashed-job subdirectories do not accumulate. Non-empty
        // directories make remove_dir fail and are kept.
        subdirs.sort_by_key(|path| std::cmp::Reverse(path.components().count()));
        for path in subdirs {
            let is_empty = fs_err::read_dir(&path)
                .map(|mut entries| entries.next().is_none())
                .unwrap_or(false);

            if is_empty && fs_err::remove_dir(&path).is_ok() {
                tracing::debug!(path = %path.display(), "Removed empty directory");
            }
        }

        Ok(removed)
    }
}

fn available_memory() -> u64 {
    let mut system = System::new();
    system.refresh_memory();
    system.available_memory()
}
