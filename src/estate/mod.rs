pub mod envelope;
pub mod overview;
pub mod rename;

pub use envelope::{EnvelopeError, Unwrapped, unwrap_envelope};
pub use overview::{ListingOverview, build_overview};
pub use rename::{RenameRules, deep_rename_keys};
