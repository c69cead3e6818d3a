//! Shared code for the modflow binaries

pub mod common;
