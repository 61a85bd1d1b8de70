// Time-based cleanup of the output directory.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

const SECS_PER_HOUR: u64 = 60 * 60;

/// Deletes regular files in `directory` whose modification time is more than
/// `max_age_hours` in the past. Returns how many files were deleted.
///
/// No-op when `max_age_hours <= 0`. Unreadable entries and failed deletions
/// are skipped; nothing here is fatal.
pub async fn sweep(directory: &Path, max_age_hours: i64) -> usize {
    if max_age_hours <= 0 {
        return 0;
    }
    let max_age = Duration::from_secs((max_age_hours as u64).saturating_mul(SECS_PER_HOUR));
    let Some(cutoff) = SystemTime::now().checked_sub(max_age) else {
        return 0;
    };

    let mut entries = match tokio::fs::read_dir(directory).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Purge: cannot read {}: {}", directory.display(), e);
            return 0;
        }
    };

    let mut deleted = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Purge: directory listing interrupted: {}", e);
                break;
            }
        };

        // DirEntry::metadata does not follow symlinks.
        let Ok(metadata) = entry.metadata().await else {
            continue;
        };
        if !metadata.is_file() {
            continue;
        }
        let Ok(modified) = metadata.modified() else {
            continue;
        };
        if modified >= cutoff {
            continue;
        }

        let path = entry.path();
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Purge: deleted {}", path.display());
                deleted += 1;
            }
            Err(e) => warn!("Purge: skipped {}: {}", path.display(), e),
        }
    }
    deleted
}

/// Runs `sweep` every `every`, starting immediately. Returns `None` when purging is disabled.
pub fn spawn_purge_task(
    directory: PathBuf,
    max_age_hours: i64,
    every: Duration,
) -> Option<JoinHandle<()>> {
    if max_age_hours <= 0 {
        info!("Image purging disabled");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            info!(
                "Purging files older than {} hours from \"{}\"",
                max_age_hours,
                directory.display()
            );
            let deleted = sweep(&directory, max_age_hours).await;
            info!("Purge finished, {} file(s) deleted", deleted);
        }
    }))
}
