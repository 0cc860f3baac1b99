//! Run-scoped workspaces: staging submissions and serializing reuse.

pub mod locks;
pub mod stager;

pub use locks::{WorkspaceLease, WorkspaceLocks};
pub use stager::{StagedWorkspace, WorkspaceStager};
