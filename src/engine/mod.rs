pub mod editor;
pub mod memstore;
pub mod persistence;

pub use editor::{CommitMode, Edit, EditBatch, Editor};
pub use memstore::MemPreferences;
pub use persistence::Persistence;
