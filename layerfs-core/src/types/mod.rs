// Module declarations
pub mod ids;
pub mod flags;
pub mod mount;

// Re-export all types from submodules
pub use ids::{Ino, BranchId, BranchRange};
pub use flags::SlotFlags;
pub use mount::{MountOptions, MountOptionsBuilder, Udba};
