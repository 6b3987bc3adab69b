//! Workspace file access control.
//!
//! Prompt assembly may embed snippets of caller-referenced files. Every
//! read goes through [`WorkspaceGate`], which canonicalizes the path,
//! confines it to the configured root, applies deny-list and extension
//! policy, and bounds how much of the file is read.

pub mod access;

pub use access::{Snippet, WorkspaceGate};
