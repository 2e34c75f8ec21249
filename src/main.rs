//! mergefs is a user-space filesystem that merges several backing directories into one mount.

mod cli;
mod error;
mod prelude;

use std::sync::mpsc;

use clap::Parser;
use log::LevelFilter;
use simple_logger::SimpleLogger;

use mergefs_core::RootRegistry;

use crate::cli::Cli;
use crate::prelude::*;

fn run() -> AppResult<()> {
    let cli = Cli::parse();

    SimpleLogger::new()
        .with_colors(true)
        .with_level(if cli.debug { LevelFilter::Debug } else { LevelFilter::Info })
        .init()
        .expect("Failed to start logger!");

    let roots = cli.roots.iter().cloned().map(Into::into).collect();
    let registry = RootRegistry::new(roots)?;

    info!(
        "mounting {} root(s) onto {}",
        registry.len(),
        cli.mount_point().display()
    );

    let session = mergefs_core::spawn_mount(registry, cli.mount_point())?;

    let (tx, rx) = mpsc::channel();
    let handler_tx = tx.clone();
    ctrlc_shim::set_handler(move || {
        let _ = handler_tx.send(());
    })?;

    // Blocks until a signal arrives; dropping `session` here unmounts cleanly.
    let _ = rx.recv();
    info!("unmounting");
    drop(session);

    Ok(())
}

/// A minimal SIGINT/SIGTERM handler so `mergefs` doesn't need a dependency dedicated to it:
/// one `libc::signal` installation per signal, funneling both into the same callback.
mod ctrlc_shim {
    use std::sync::Mutex;

    use anyhow::Result;

    static HANDLER: Mutex<Option<Box<dyn Fn() + Send>>> = Mutex::new(None);

    extern "C" fn dispatch(_signum: libc::c_int) {
        if let Ok(guard) = HANDLER.lock() {
            if let Some(handler) = guard.as_ref() {
                handler();
            }
        }
    }

    pub fn set_handler(handler: impl Fn() + Send + 'static) -> Result<()> {
        *HANDLER.lock().unwrap() = Some(Box::new(handler));
        unsafe {
            libc::signal(libc::SIGINT, dispatch as usize);
            libc::signal(libc::SIGTERM, dispatch as usize);
        }
        Ok(())
    }
}

fn main() {
    if let Err(e) = run() {
        eprintln!("mergefs: {e}");
        std::process::exit(1);
    }
}
