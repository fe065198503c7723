//! Command line plumbing shared by the `iamkeeper` binaries.

pub mod config;
