//! bpack CLI - Cloud Native Buildpacks builder assembly and rebase.

pub mod commands;
