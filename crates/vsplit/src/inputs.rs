use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};

/// Expand the command-line paths into MIDI files.
///
/// Files are taken as given. Directories contribute their `.mid`/`.midi`
/// entries (not recursively), sorted by name.
pub fn collect_midi_files(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for path in paths {
        if path.is_dir() {
            let mut entries = Vec::new();
            for entry in std::fs::read_dir(path)
                .with_context(|| format!("Failed to list directory {}", path.display()))?
            {
                let entry_path = entry?.path();
                if entry_path.is_file() && is_midi(&entry_path) {
                    entries.push(entry_path);
                }
            }
            entries.sort();
            files.extend(entries);
        } else if path.exists() {
            files.push(path.clone());
        } else {
            bail!("File not found: {}", path.display());
        }
    }
    Ok(files)
}

fn is_midi(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("mid") || ext.eq_ignore_ascii_case("midi"))
}
