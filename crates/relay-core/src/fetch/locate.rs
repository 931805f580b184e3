//! Finding downloaded files on disk.
//!
//! The swarm engine reports where it intends to write each file, but engines
//! sometimes rename or nest the top-level directory. When the expected path
//! is missing we fall back to a breadth-first search by file name under the
//! download root, bounded by a maximum depth.

use std::collections::VecDeque;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};

/// Resolve the on-disk path of a file the engine laid out at `relative`.
pub async fn locate_file(root: &Path, relative: &str, max_depth: usize) -> Option<PathBuf> {
    let relative_path = Path::new(relative);

    // Relative paths that could escape the root are only matched by name.
    if is_contained(relative_path) {
        let expected = root.join(relative_path);
        if is_file(&expected).await {
            return Some(expected);
        }
    }

    let name = relative_path.file_name()?;
    find_by_name(root, name, max_depth).await
}

/// Breadth-first search for a regular file called `name`. Directory entries
/// are visited in sorted order so the first match is deterministic.
pub async fn find_by_name(root: &Path, name: &OsStr, max_depth: usize) -> Option<PathBuf> {
    let mut queue = VecDeque::from([(root.to_path_buf(), 0usize)]);

    while let Some((dir, depth)) = queue.pop_front() {
        let Ok(mut entries) = tokio::fs::read_dir(&dir).await else {
            continue;
        };

        let mut children = Vec::new();
        while let Ok(Some(entry)) = entries.next_entry().await {
            children.push(entry.path());
        }
        children.sort();

        for path in children {
            let Ok(metadata) = tokio::fs::metadata(&path).await else {
                continue;
            };
            if metadata.is_file() && path.file_name() == Some(name) {
                return Some(path);
            }
            if metadata.is_dir() && depth < max_depth {
                queue.push_back((path, depth + 1));
            }
        }
    }

    None
}

fn is_contained(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}
