// Resolver :: the brain of the system (spec.md §4.1). Decides which backing roots
// participate in a given request: mask decoding, existence fan-out, best-inexistent
// selection, or NotFound, applied in that order.

use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use crate::errors::MergeError;
use crate::mask::decode_mask;
use crate::registry::RootRegistry;

/// A concrete (root, filesystem-path) pair, as returned by the [`Resolver`].
#[derive(Debug, Clone)]
pub struct BackingPath {
    pub root_index: usize,
    pub path: PathBuf,
}

/// Joins a root's canonical directory with a virtual path's components, skipping the leading
/// `/` (and any `.`/`..`) so `PathBuf::push` never treats the virtual path as an absolute
/// replacement of the root.
pub fn join_virtual(root: &Path, virt: &Path) -> PathBuf {
    let mut result = root.to_path_buf();
    for component in virt.components() {
        if let Component::Normal(part) = component {
            result.push(part);
        }
    }
    result
}

/// Implements spec.md §4.1: `resolve(virtual_path, allow_best_inexistent)`.
pub struct Resolver<'a> {
    registry: &'a RootRegistry,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a RootRegistry) -> Self {
        Self { registry }
    }

    /// Resolves `virtual_path` to the backing paths that should participate in an operation,
    /// in root-registry order. Applies, in order: mask decoding (rule 1), existence fan-out
    /// (rule 2), then — only if `allow_best_inexistent` — best-inexistent selection (rule 3).
    /// Otherwise fails with [`MergeError::NotFound`] (rule 4).
    pub fn resolve(
        &self,
        virtual_path: &Path,
        allow_best_inexistent: bool,
    ) -> Result<Vec<BackingPath>, MergeError> {
        if let Some(decoded) = self.decode_masked_name(virtual_path) {
            return Ok(decoded);
        }

        let existing = self.existence_fanout(virtual_path);
        if !existing.is_empty() {
            return Ok(existing);
        }

        if allow_best_inexistent {
            return Ok(vec![self.best_inexistent(virtual_path)]);
        }

        Err(MergeError::NotFound)
    }

    /// spec.md §4.1 rule 1. Does not check existence — a decoded mask is returned even if
    /// nothing exists at the resulting paths.
    fn decode_masked_name(&self, virtual_path: &Path) -> Option<Vec<BackingPath>> {
        let parent = virtual_path.parent()?;
        let basename = virtual_path.file_name()?.to_str()?;
        let n = self.registry.len();

        let chars: Vec<char> = basename.chars().collect();
        if chars.len() <= n || chars[n] != '_' {
            return None;
        }

        let selected = decode_mask(self.registry, &chars[..n])?;
        let remainder: String = chars[n + 1..].iter().collect();
        let target_virt = parent.join(remainder);

        Some(
            selected
                .into_iter()
                .map(|i| BackingPath {
                    root_index: i,
                    path: join_virtual(&self.registry.get(i).canonical, &target_virt),
                })
                .collect(),
        )
    }

    /// spec.md §4.1 rule 2: every root whose candidate path exists (lstat, no symlink
    /// dereference), in root-registry order.
    fn existence_fanout(&self, virtual_path: &Path) -> Vec<BackingPath> {
        self.registry
            .iter()
            .enumerate()
            .filter_map(|(i, root)| {
                let candidate = join_virtual(&root.canonical, virtual_path);
                candidate
                    .symlink_metadata()
                    .ok()
                    .map(|_| BackingPath { root_index: i, path: candidate })
            })
            .collect()
    }

    /// Implements spec.md §4.1.1: picks the root whose tree already has the longest existing
    /// prefix of `virtual_path`, for attaching a new entry that doesn't exist under any root.
    /// Ties are broken by root-registry order.
    pub fn best_inexistent(&self, virtual_path: &Path) -> BackingPath {
        let components: Vec<OsString> = virtual_path
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_os_string()),
                _ => None,
            })
            .collect();

        let mut working: Vec<(usize, PathBuf)> = self
            .registry
            .iter()
            .enumerate()
            .map(|(i, root)| (i, root.canonical.clone()))
            .collect();

        let mut consumed = 0;
        for component in &components {
            let existing: Vec<(usize, PathBuf)> = working
                .iter()
                .map(|(i, p)| (*i, p.join(component)))
                .filter(|(_, p)| p.symlink_metadata().is_ok())
                .collect();

            if existing.is_empty() {
                break;
            }

            working = existing;
            consumed += 1;
        }

        let (root_index, mut path) = working.into_iter().next().expect("registry is never empty");
        for component in &components[consumed..] {
            path.push(component);
        }

        BackingPath { root_index, path }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Root;
    use std::fs;
    use tempfile::TempDir;

    fn two_roots() -> (TempDir, TempDir, RootRegistry) {
        let a = TempDir::new().unwrap();
        let b = TempDir::new().unwrap();

        let registry = RootRegistry::new(vec![
            Root { label: 'a', canonical: a.path().to_path_buf() },
            Root { label: 'b', canonical: b.path().to_path_buf() },
        ])
        .unwrap();

        (a, b, registry)
    }

    #[test]
    fn existence_fanout_returns_roots_containing_the_path_in_order() {
        let (a, b, registry) = two_roots();
        fs::write(a.path().join("foo.txt"), b"hello").unwrap();
        fs::write(b.path().join("foo.txt"), b"world").unwrap();

        let resolver = Resolver::new(&registry);
        let resolved = resolver.resolve(Path::new("/foo.txt"), false).unwrap();

        assert_eq!(resolved.len(), 2);
        assert_eq!(resolved[0].root_index, 0);
        assert_eq!(resolved[1].root_index, 1);
    }

    #[test]
    fn existence_fanout_skips_roots_missing_the_path() {
        let (a, _b, registry) = two_roots();
        fs::write(a.path().join("only_a.txt"), b"hello").unwrap();

        let resolver = Resolver::new(&registry);
        let resolved = resolver.resolve(Path::new("/only_a.txt"), false).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].root_index, 0);
    }

    #[test]
    fn missing_everywhere_fails_without_best_inexistent() {
        let (_a, _b, registry) = two_roots();
        let resolver = Resolver::new(&registry);
        let err = resolver.resolve(Path::new("/nope.txt"), false).unwrap_err();
        assert!(matches!(err, MergeError::NotFound));
    }

    #[test]
    fn mask_decoding_selects_exactly_the_labeled_roots() {
        let (a, b, registry) = two_roots();
        fs::write(a.path().join("bar.txt"), b"a-content").unwrap();
        fs::write(b.path().join("bar.txt"), b"b-content").unwrap();

        let resolver = Resolver::new(&registry);
        let resolved = resolver.resolve(Path::new("/a._bar.txt"), false).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].root_index, 0);
        assert_eq!(resolved[0].path, a.path().join("bar.txt"));
    }

    #[test]
    fn invalid_mask_falls_through_to_existence_fanout() {
        let (a, _b, registry) = two_roots();
        // "bX_weird" isn't a valid mask against labels {a, b} (position 0 mismatches); the
        // whole name is treated as a literal basename instead.
        fs::write(a.path().join("bX_weird"), b"literal").unwrap();

        let resolver = Resolver::new(&registry);
        let resolved = resolver.resolve(Path::new("/bX_weird"), false).unwrap();

        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].root_index, 0);
    }

    #[test]
    fn best_inexistent_picks_the_root_with_the_longest_existing_prefix() {
        let (a, b, registry) = two_roots();
        fs::create_dir_all(a.path().join("new")).unwrap();

        let resolver = Resolver::new(&registry);
        let picked = resolver.best_inexistent(Path::new("/new/sub"));

        assert_eq!(picked.root_index, 0);
        assert_eq!(picked.path, a.path().join("new").join("sub"));
        let _ = &b;
    }

    #[test]
    fn best_inexistent_defaults_to_first_root_when_nothing_matches() {
        let (a, _b, registry) = two_roots();
        let resolver = Resolver::new(&registry);
        let picked = resolver.best_inexistent(Path::new("/brand/new"));

        assert_eq!(picked.root_index, 0);
        assert_eq!(picked.path, a.path().join("brand").join("new"));
    }
}
