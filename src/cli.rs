//! Argument grammar for the `mergefs` binary: `mergefs [--debug] <label>=<root> ... <mount_point>`.

use std::path::{Path, PathBuf};

use clap::Parser;
use mergefs_core::Root;

/// A parsed `<label>=<root-path>` positional argument.
#[derive(Debug, Clone)]
pub struct LabeledRoot {
    pub label: char,
    pub path: PathBuf,
}

impl From<LabeledRoot> for Root {
    fn from(labeled: LabeledRoot) -> Self {
        Root { label: labeled.label, canonical: labeled.path }
    }
}

fn parse_labeled_root(raw: &str) -> Result<LabeledRoot, String> {
    let (label_part, path_part) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected `<label>=<path>`, got `{raw}`"))?;

    let mut chars = label_part.chars();
    let label = chars
        .next()
        .ok_or_else(|| "root label must not be empty".to_string())?;
    if chars.next().is_some() {
        return Err(format!("root label must be a single character, got `{label_part}`"));
    }
    if label == '.' {
        return Err("root label '.' is reserved".to_string());
    }

    let path = PathBuf::from(path_part);
    if !path.is_dir() {
        return Err(format!("root path `{}` is not a directory", path.display()));
    }
    let path = path
        .canonicalize()
        .map_err(|e| format!("root path `{}` could not be canonicalized: {e}", path.display()))?;

    Ok(LabeledRoot { label, path })
}

fn parse_mount_point(raw: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(raw);
    if !path.is_dir() {
        return Err(format!("mount point `{}` is not a directory", path.display()));
    }
    path.canonicalize()
        .map_err(|e| format!("mount point `{}` could not be canonicalized: {e}", path.display()))
}

/// mergefs presents a single virtual directory tree assembled from several labeled backing
/// directories, mounted over `mount_point` via FUSE.
#[derive(Debug, Parser)]
#[command(name = "mergefs", version, about)]
pub struct Cli {
    /// Raise the log level to debug.
    #[arg(long)]
    pub debug: bool,

    /// One or more `<label>=<root-path>` roots, in the order they participate in fan-out.
    #[arg(value_parser = parse_labeled_root, required = true, num_args = 1..)]
    pub roots: Vec<LabeledRoot>,

    /// Directory to mount the merged tree onto.
    #[arg(value_parser = parse_mount_point)]
    pub mount_point: PathBuf,
}

impl Cli {
    pub fn mount_point(&self) -> &Path {
        &self.mount_point
    }
}
