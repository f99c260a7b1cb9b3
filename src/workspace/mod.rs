//! Job workspaces on local storage.
//!
//! Each job gets an isolated directory tree created by the
//! [`WorkspaceAllocator`] and described by [`JobPaths`]. The tree holds the
//! raw uploads, the transform and score outputs, the rubric and any other
//! artifacts. There is no index file on disk: the job registry is the only
//! index, and workspaces are not rediscovered after a restart.

pub mod allocator;

pub use allocator::{JobPaths, WorkspaceAllocator};
