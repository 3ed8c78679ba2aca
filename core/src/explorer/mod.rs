//! Hierarchical view of a bucket: directory paths, files, and the lazily
//! loaded directory tree with its per-directory state machine.
//!
//! The tree is strictly parent-to-child owning; a child refers to its
//! parent only through [`Directory::parent_path`].

pub mod directory;
pub mod file;
pub mod path;

pub use directory::{Directory, Listing, State};
pub use file::{File, FileOption};
pub use path::{validate_name, DirPath};
