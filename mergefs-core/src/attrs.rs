// Attribute conversions :: nix/libc stat structures to the fuse_mt wire types. Mirrors
// modcrabfs::filesystem's stat_to_fuse / mode_to_filetype / statfs_to_fuse helpers, generalized
// to take the nix crate's typed wrappers instead of raw libc::stat64.

use std::os::unix::fs::{FileTypeExt, MetadataExt};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use fuse_mt::{FileAttr, FileType, Statfs};
use nix::sys::stat::FileStat;
use nix::sys::statvfs::Statvfs;

/// Attribute cache lifetime handed back with every entry, matching modcrabfs's `TTL`.
pub const TTL: Duration = Duration::from_secs(1);

fn system_time(secs: i64, nanos: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::new(secs as u64, nanos as u32)
    } else {
        UNIX_EPOCH - Duration::new((-secs) as u64, 0)
    }
}

/// Converts a `nix::sys::stat::FileStat` into the `FileAttr` fuse_mt expects, the nix-typed
/// counterpart of `modcrabfs::filesystem::stat_to_fuse`.
pub fn stat_to_fuse(stat: FileStat) -> FileAttr {
    FileAttr {
        size: stat.st_size as u64,
        blocks: stat.st_blocks as u64,
        atime: system_time(stat.st_atime, stat.st_atime_nsec),
        mtime: system_time(stat.st_mtime, stat.st_mtime_nsec),
        ctime: system_time(stat.st_ctime, stat.st_ctime_nsec),
        crtime: UNIX_EPOCH,
        kind: mode_to_filetype(stat.st_mode as libc::mode_t),
        perm: (stat.st_mode as libc::mode_t & 0o7777) as u16,
        nlink: stat.st_nlink as u32,
        uid: stat.st_uid,
        gid: stat.st_gid,
        rdev: stat.st_rdev as u32,
        flags: 0,
    }
}

/// Classifies a raw `st_mode`'s type bits, the nix-typed counterpart of
/// `modcrabfs::filesystem::mode_to_filetype`. Falls back to `RegularFile` for a mode this
/// build doesn't recognize rather than panicking — a FUSE reply has to go out regardless.
pub fn mode_to_filetype(mode: libc::mode_t) -> FileType {
    match mode & libc::S_IFMT {
        libc::S_IFDIR => FileType::Directory,
        libc::S_IFLNK => FileType::Symlink,
        libc::S_IFREG => FileType::RegularFile,
        libc::S_IFBLK => FileType::BlockDevice,
        libc::S_IFCHR => FileType::CharDevice,
        libc::S_IFIFO => FileType::NamedPipe,
        libc::S_IFSOCK => FileType::Socket,
        _ => FileType::RegularFile,
    }
}

/// Classifies a `std::fs::FileType` as returned by `DirEntry::file_type` during readdir,
/// where only the type bits (not a full stat) are available.
pub fn classify_entry(file_type: std::fs::FileType) -> FileType {
    if file_type.is_dir() {
        FileType::Directory
    } else if file_type.is_symlink() {
        FileType::Symlink
    } else if file_type.is_block_device() {
        FileType::BlockDevice
    } else if file_type.is_char_device() {
        FileType::CharDevice
    } else if file_type.is_fifo() {
        FileType::NamedPipe
    } else if file_type.is_socket() {
        FileType::Socket
    } else {
        FileType::RegularFile
    }
}

/// Converts a `nix::sys::statvfs::Statvfs` into fuse_mt's `Statfs`, the nix-typed counterpart
/// of `modcrabfs::filesystem::statfs_to_fuse`'s Linux branch.
pub fn statvfs_to_fuse(stat: Statvfs) -> Statfs {
    Statfs {
        blocks: stat.blocks(),
        bfree: stat.blocks_free(),
        bavail: stat.blocks_available(),
        files: stat.files(),
        ffree: stat.files_free(),
        bsize: stat.block_size() as u32,
        namelen: stat.name_max() as u32,
        frsize: stat.fragment_size() as u32,
    }
}

/// The `(mtime, size)` half of a [`crate::mask::FileIdentity`], derived from a
/// `std::fs::Metadata` picked up during readdir.
pub fn mtime_ns(meta: &std::fs::Metadata) -> i128 {
    meta.mtime() as i128 * 1_000_000_000 + meta.mtime_nsec() as i128
}
