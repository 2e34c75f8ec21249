//! This module re-exports a bunch of utilities used across this program.

#![allow(unused_imports)]

pub use thiserror::Error;

pub use log::debug;
pub use log::error;
pub use log::info;
pub use log::warn;

pub use crate::error::AppError;
pub use crate::error::AppResult;
