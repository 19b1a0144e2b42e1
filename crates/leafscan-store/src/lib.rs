//! Plant and user record storage.
//!
//! [`RecordStore`] is the single contract the API layer talks to. Four
//! backends implement it:
//!
//! - [`memory::MemoryStore`]: process memory, lost on restart
//! - [`fs::FileStore`]: one JSON file per record plus `metadata.json`
//! - [`object::ObjectStore`]: individually addressable blobs plus an index blob
//! - [`sqlite::SqliteStore`]: relational tables with a counter table
//!
//! Every backend owns identifier assignment and merges a new plant into an
//! existing record with the same scientific and common name.
//!
//! Medium failures never cross this boundary. They are logged and the
//! operation degrades to "not found", an empty list or `false`.

pub mod fs;
pub mod image;
pub mod memory;
pub mod object;
pub mod sqlite;

use async_trait::async_trait;
use leafscan_types::{NewPlant, NewUser, Plant, User};
use tracing::warn;

pub use fs::FileStore;
pub use memory::MemoryStore;
pub use object::{BlobClient, HttpBlobClient, MemoryBlobClient, ObjectStore};
pub use sqlite::SqliteStore;

/// First identifier handed out, and the value the plant counter returns to
/// after [`RecordStore::delete_all_plants`].
pub const FIRST_ID: u32 = 1;

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_user(&self, id: u32) -> Option<User>;

    /// Exact, case-sensitive match.
    async fn get_user_by_username(&self, username: &str) -> Option<User>;

    async fn create_user(&self, user: NewUser) -> User;

    /// All plants, newest (highest id) first.
    async fn get_all_plants(&self) -> Vec<Plant>;

    async fn get_plant(&self, id: u32) -> Option<Plant>;

    /// Insert a plant, or bump the count of the record with the same
    /// scientific and common name. A merge leaves every other field of the
    /// existing record untouched and does not consume an identifier.
    async fn create_plant(&self, plant: NewPlant) -> Plant;

    /// Increment `identification_count` by one.
    async fn update_plant_count(&self, id: u32) -> Option<Plant>;

    /// Returns `false` when no record had this id.
    async fn delete_plant(&self, id: u32) -> bool;

    /// Remove every plant and image and reset the plant counter to
    /// [`FIRST_ID`]. Unlike single deletion this makes identifiers reusable.
    async fn delete_all_plants(&self);
}

/// Sort newest first.
pub(crate) fn sort_newest_first(plants: &mut [Plant]) {
    plants.sort_by(|a, b| b.id.cmp(&a.id));
}

/// First identifier above every id in `ids`.
pub(crate) fn next_after(ids: impl IntoIterator<Item = u32>) -> u32 {
    ids.into_iter().max().map_or(FIRST_ID, |id| id + 1)
}

/// Log a medium failure and turn it into absence.
pub(crate) fn logged<T>(result: anyhow::Result<T>, context: &str) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{}: {:#}", context, e);
            None
        }
    }
}
