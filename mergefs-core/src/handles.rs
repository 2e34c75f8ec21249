// HandleTable :: the multi-descriptor open-handle bookkeeping from spec.md §3 and §4.3.
// Each virtual file handle owns one raw fd per participating root, and the table mediates
// the coherent-read/write protocol that keeps sibling descriptors' offsets in sync.

use std::collections::HashMap;
use std::os::unix::io::{BorrowedFd, RawFd};
use std::sync::{Arc, Mutex};

use nix::unistd::Whence;

/// Borrows a raw backing descriptor for the duration of one nix call, as nix 0.29's `AsFd`-
/// based syscall wrappers require. Never closes `fd` — ownership stays with the `OpenHandle`
/// that opened it, released only in `HandleTable::release`.
fn borrow(fd: RawFd) -> BorrowedFd<'static> {
    unsafe { BorrowedFd::borrow_raw(fd) }
}

/// One open virtual file: a raw fd per backing root that participated in the `open`/`create`
/// fan-out, ordered by root-registry index (ascending). spec.md §3 fixes the virtual handle
/// to the last element of this list.
pub struct OpenHandle {
    pub virtual_handle: u64,
    pub backing_handles: Vec<RawFd>,
    io_lock: Mutex<()>,
}

impl OpenHandle {
    /// Reads through the first (root-registry-earliest) descriptor, then syncs every sibling
    /// descriptor's offset to match — spec.md §4.3's coherent-read protocol, so a later write
    /// through any descriptor lands at the position a caller would expect from a single
    /// POSIX file.
    pub fn read(&self, offset: u64, size: u32) -> nix::Result<Vec<u8>> {
        let _guard = self.io_lock.lock().unwrap();

        let primary = self.backing_handles[0];
        nix::unistd::lseek(borrow(primary), offset as i64, Whence::SeekSet)?;

        let mut buf = vec![0u8; size as usize];
        let read = nix::unistd::read(borrow(primary), &mut buf)?;
        buf.truncate(read);

        let post_read_offset = nix::unistd::lseek(borrow(primary), 0, Whence::SeekCur)?;
        for &fd in &self.backing_handles[1..] {
            nix::unistd::lseek(borrow(fd), post_read_offset, Whence::SeekSet)?;
        }

        Ok(buf)
    }

    /// Writes the same bytes at the same offset through every backing descriptor, in
    /// root-registry order — spec.md §4.3's coherent-write protocol. Returns the byte count
    /// reported by the last descriptor written.
    pub fn write(&self, offset: u64, data: &[u8]) -> nix::Result<u32> {
        let _guard = self.io_lock.lock().unwrap();

        let mut written = 0usize;
        for &fd in &self.backing_handles {
            nix::unistd::lseek(borrow(fd), offset as i64, Whence::SeekSet)?;
            written = nix::unistd::write(borrow(fd), data)?;
        }

        Ok(written as u32)
    }
}

/// The process-wide table of open virtual handles (spec.md §2.3's Handle Table component).
/// One registry mutex guards the map; each handle additionally carries its own `io_lock` so
/// concurrent reads/writes on two different handles never block each other.
pub struct HandleTable {
    table: Mutex<HashMap<u64, Arc<OpenHandle>>>,
}

impl HandleTable {
    pub fn new() -> Self {
        Self { table: Mutex::new(HashMap::new()) }
    }

    /// Registers a freshly opened set of backing descriptors and returns the handle the
    /// dispatcher should hand back to the kernel bridge.
    pub fn register(&self, backing_handles: Vec<RawFd>) -> Arc<OpenHandle> {
        let virtual_handle =
            *backing_handles.last().expect("open fan-out opens at least one descriptor") as u64;
        let handle =
            Arc::new(OpenHandle { virtual_handle, backing_handles, io_lock: Mutex::new(()) });

        self.table.lock().unwrap().insert(virtual_handle, handle.clone());
        handle
    }

    pub fn get(&self, virtual_handle: u64) -> Option<Arc<OpenHandle>> {
        self.table.lock().unwrap().get(&virtual_handle).cloned()
    }

    /// Removes the handle and closes every backing descriptor it owned. Closing errors are
    /// logged, not propagated — `release` has no way to report them to the kernel bridge.
    pub fn release(&self, virtual_handle: u64) {
        let handle = self.table.lock().unwrap().remove(&virtual_handle);
        if let Some(handle) = handle {
            for &fd in &handle.backing_handles {
                if let Err(e) = nix::unistd::close(fd) {
                    warn!("failed to close backing descriptor {fd}: {e}");
                }
            }
        }
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
