//! Dump file naming and discovery.
//!
//! A dump family shares a prefix and a suffix; member `i` is named
//! `<prefix>.<NN>.<suffix>` where `NN` is `i` zero-padded to at least two
//! digits. Members are written and read strictly in index order, starting at 0,
//! with no gaps.

use glob::{Pattern, glob};
use std::path::{Path, PathBuf};

/// Path of member `index` of the family `prefix`/`suffix`.
///
/// ```
/// use std::path::Path;
/// use tsvdump::io::naming::dump_file_path;
///
/// assert_eq!(dump_file_path("out/events", 3, "bgz"), Path::new("out/events.03.bgz"));
/// assert_eq!(dump_file_path("events", 120, "bgz"), Path::new("events.120.bgz"));
/// ```
#[must_use]
pub fn dump_file_path(prefix: impl AsRef<Path>, index: usize, suffix: &str) -> PathBuf {
    let mut name = prefix.as_ref().as_os_str().to_owned();
    name.push(format!(".{index:02}.{suffix}"));
    PathBuf::from(name)
}

/// Family prefix for dumps of `input`: the input path with its last extension
/// removed (`data/events.tsv` → `data/events`).
#[must_use]
pub fn dump_prefix(input: impl AsRef<Path>) -> PathBuf {
    let input = input.as_ref();
    match input.file_stem() {
        Some(stem) if input.extension().is_some() => input.with_file_name(stem),
        _ => input.to_path_buf(),
    }
}

/// List the existing members of a dump family in index order.
///
/// Enumeration starts at index 0 and stops at the first missing index, even if
/// later indices exist. Such orphans are reported with a `warn` log but never
/// returned.
#[must_use]
pub fn find_dump_files(prefix: impl AsRef<Path>, suffix: &str) -> Vec<PathBuf> {
    let prefix = prefix.as_ref();
    let mut files = Vec::new();
    loop {
        let path = dump_file_path(prefix, files.len(), suffix);
        if !path.is_file() {
            break;
        }
        files.push(path);
    }

    let orphans = orphaned_dump_files(prefix, suffix, files.len());
    if !orphans.is_empty() {
        log::warn!(
            "dump family {}.*.{suffix} has a gap at index {}; ignoring {} later file(s), first {}",
            prefix.display(),
            files.len(),
            orphans.len(),
            orphans[0].display()
        );
    }
    files
}

/// Members of the family whose index is `>= first_gap`.
fn orphaned_dump_files(prefix: &Path, suffix: &str, first_gap: usize) -> Vec<PathBuf> {
    let pattern = format!(
        "{}.*.{}",
        Pattern::escape(&prefix.to_string_lossy()),
        Pattern::escape(suffix)
    );
    let Ok(paths) = glob(&pattern) else {
        return Vec::new();
    };
    let head = format!("{}.", prefix.to_string_lossy());
    let tail = format!(".{suffix}");
    let mut orphans: Vec<(usize, PathBuf)> = paths
        .filter_map(Result::ok)
        .filter_map(|path| {
            let text = path.to_string_lossy();
            let index = text.strip_prefix(&head)?.strip_suffix(&tail)?;
            if index.len() < 2 || !index.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            let index: usize = index.parse().ok()?;
            (index >= first_gap).then_some((index, path))
        })
        .collect();
    orphans.sort();
    orphans.into_iter().map(|(_, path)| path).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_drops_last_extension_only() {
        assert_eq!(dump_prefix("data/events.tsv"), Path::new("data/events"));
        assert_eq!(dump_prefix("data/events.2024.tsv"), Path::new("data/events.2024"));
        assert_eq!(dump_prefix("data.d/events"), Path::new("data.d/events"));
    }

    #[test]
    fn index_padding_grows_past_two_digits() {
        assert_eq!(dump_file_path("x", 0, "pb"), Path::new("x.00.pb"));
        assert_eq!(dump_file_path("x", 99, "pb"), Path::new("x.99.pb"));
        assert_eq!(dump_file_path("x", 100, "pb"), Path::new("x.100.pb"));
    }
}
