// This is the root of mergefs-core, a merging filesystem assembled from labeled backing roots.

#[macro_use]
extern crate log;

use std::ffi::OsStr;
use std::io;
use std::path::Path;

mod attrs;
mod dispatcher;
mod errors;
mod fanout;
mod handles;
mod mask;
mod registry;
mod resolver;

pub use dispatcher::Dispatcher;
pub use errors::MergeError;
pub use fanout::FanoutPolicy;
pub use mask::{FileIdentity, PresenceMask};
pub use registry::{Root, RootRegistry, RegistryError};
pub use resolver::{join_virtual, BackingPath, Resolver};

/// Mounts a merging filesystem over `mount_point` using `registry`'s backing roots.
/// Blocks the calling thread until the filesystem is unmounted.
pub fn mount(registry: RootRegistry, mount_point: impl AsRef<Path>) -> io::Result<()> {
    let dispatcher = Dispatcher::new(registry);
    let args = ["fsname=mergefs"].map(OsStr::new);
    fuse_mt::mount(fuse_mt::FuseMT::new(dispatcher, 1), mount_point, &args)
}

/// Mounts a merging filesystem on a newly spawned thread.
/// The returned handle unmounts the filesystem when dropped.
pub fn spawn_mount(
    registry: RootRegistry,
    mount_point: impl AsRef<Path>,
) -> io::Result<fuser::BackgroundSession> {
    let dispatcher = Dispatcher::new(registry);
    let args = ["fsname=mergefs"].map(OsStr::new);
    fuse_mt::spawn_mount(fuse_mt::FuseMT::new(dispatcher, 1), mount_point, &args)
}
