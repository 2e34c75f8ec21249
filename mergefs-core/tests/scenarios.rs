// End-to-end scenario coverage for mergefs-core, exercising a `Dispatcher` the same way the
// kernel bridge would: through `fuse_mt::FilesystemMT`'s public methods, never through the
// private resolver/fanout machinery directly.

use std::ffi::OsStr;
use std::fs;
use std::path::Path;

use fuse_mt::{FilesystemMT, RequestInfo};
use tempfile::TempDir;

use mergefs_core::{Dispatcher, Root, RootRegistry};

fn req() -> RequestInfo {
    RequestInfo { unique: 0, uid: 0, gid: 0, pid: 0 }
}

fn two_roots() -> (TempDir, TempDir, Dispatcher) {
    let a = TempDir::new().unwrap();
    let b = TempDir::new().unwrap();

    let registry = RootRegistry::new(vec![
        Root { label: 'a', canonical: a.path().to_path_buf() },
        Root { label: 'b', canonical: b.path().to_path_buf() },
    ])
    .unwrap();

    (a, b, Dispatcher::new(registry))
}

/// S5: `x` exists under both roots, `y` exists under root `a` only. Renaming `x` to `y`
/// resolves `y`'s target roots to exactly `{a}` — root `b`'s copy of `y` does not exist, and
/// a partially-successful resolve is never synthesized to cover the rest of `x`'s roots — so
/// only root `a`'s copy of `x` is renamed (overwriting its pre-existing `y`); root `b`'s copy
/// of `x` is left untouched under its old name.
#[test]
fn scenario_rename_only_touches_roots_the_new_name_resolved_under() {
    let (a, b, dispatcher) = two_roots();

    fs::write(a.path().join("x"), b"a-content").unwrap();
    fs::write(b.path().join("x"), b"b-content").unwrap();
    fs::write(a.path().join("y"), b"pre-existing y").unwrap();

    dispatcher
        .rename(req(), Path::new("/"), OsStr::new("x"), Path::new("/"), OsStr::new("y"))
        .unwrap();

    assert!(!a.path().join("x").exists());
    assert_eq!(fs::read(a.path().join("y")).unwrap(), b"a-content");

    // Root b never had a "y" to resolve, and partial resolve failure is not synthesized: its
    // copy of "x" is left exactly where it was.
    assert!(b.path().join("x").exists());
    assert!(!b.path().join("y").exists());
}

/// When the new name doesn't exist anywhere, its backing paths are synthesized from every
/// root the old name resolved under, so the rename fans out to all of them.
#[test]
fn scenario_rename_synthesizes_new_name_when_absent_everywhere() {
    let (a, b, dispatcher) = two_roots();

    fs::write(a.path().join("x"), b"a-content").unwrap();
    fs::write(b.path().join("x"), b"b-content").unwrap();

    dispatcher
        .rename(req(), Path::new("/"), OsStr::new("x"), Path::new("/"), OsStr::new("y"))
        .unwrap();

    assert!(!a.path().join("x").exists());
    assert!(!b.path().join("x").exists());
    assert!(a.path().join("y").is_file());
    assert!(b.path().join("y").is_file());
}
