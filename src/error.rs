use std::io;

use crate::prelude::*;

/// Convenience wrapper around *Result<T, AppError>*.
pub type AppResult<T> = Result<T, AppError>;

/// Error returned by the `mergefs` binary: argument validation and mount setup failures.
#[derive(Error, Debug)]
pub enum AppError {
    /// Error returned by failing IO operations, mostly during mount setup.
    #[error(transparent)]
    IO(#[from] io::Error),

    /// Error returned while building the root registry the mount is started with.
    #[error(transparent)]
    Registry(#[from] mergefs_core::RegistryError),

    /// Error converted from any error that does not have a matching *AppError* variant.
    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}
