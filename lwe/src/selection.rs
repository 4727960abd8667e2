use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;

/// Immediate subdirectories of `dir`, sorted by name.
pub fn list_wallpapers(dir: &Path) -> Result<Vec<String>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("Failed to read {}", dir.display()))?;
    let mut names: Vec<String> = entries
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_dir()).unwrap_or(false))
        .filter_map(|entry| entry.file_name().into_string().ok())
        .collect();
    names.sort();
    Ok(names)
}

/// The explicit pool, or a fresh scan of `dir` when the pool is empty.
pub fn candidates(pool: &[String], dir: Option<&Path>) -> Vec<String> {
    if !pool.is_empty() {
        return pool.to_vec();
    }
    let Some(dir) = dir else {
        return Vec::new();
    };
    list_wallpapers(dir).unwrap_or_else(|e| {
        tracing::warn!("{:#}", e);
        Vec::new()
    })
}

pub fn choose<'a, R: Rng + ?Sized>(candidates: &'a [String], rng: &mut R) -> Option<&'a String> {
    candidates.choose(rng)
}

/// An existing path is used as is; anything else is a name inside `dir`.
pub fn resolve_wallpaper(entry: &str, dir: Option<&Path>) -> PathBuf {
    let path = PathBuf::from(entry);
    if path.exists() {
        return path;
    }
    match dir {
        Some(dir) => dir.join(entry),
        None => path,
    }
}
