mod migrations;
mod queries;

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::Connection;
use tracing::{info, warn};

use leafscan_types::{NewPlant, NewUser, Plant, User};

use crate::{FIRST_ID, RecordStore, logged};

pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL mode for concurrent reads
        conn.pragma_update(None, "journal_mode", "WAL")?;
        migrations::run(&conn)?;

        info!("Plant DB opened at {}", path.display());
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}

/// Record store over SQLite. Images stay inline in `image_url`.
///
/// rusqlite is blocking, so every call is moved onto the blocking pool.
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Database) -> Self {
        Self { db: Arc::new(db) }
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Database) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| anyhow!("spawn_blocking join error: {}", e))?
    }

    /// Id for a record that failed to save. An unreadable counter means no
    /// record is readable either, so [`FIRST_ID`] cannot shadow one.
    async fn unassigned_id<F>(&self, peek: F) -> u32
    where
        F: FnOnce(&Database) -> Result<u32> + Send + 'static,
    {
        logged(self.blocking(peek).await, "Could not read id counter").unwrap_or(FIRST_ID)
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn get_user(&self, id: u32) -> Option<User> {
        logged(self.blocking(move |db| db.get_user(id)).await, "Could not get user").flatten()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        let username = username.to_string();
        logged(
            self.blocking(move |db| db.get_user_by_username(&username)).await,
            "Could not get user by username",
        )
        .flatten()
    }

    async fn create_user(&self, user: NewUser) -> User {
        let fallback = user.clone();
        match self.blocking(move |db| db.create_user(user)).await {
            Ok(user) => user,
            Err(e) => {
                // The transaction rolled back, so the counter still holds the
                // id this user would have had.
                warn!("Could not save user {}: {:#}", fallback.username, e);
                let id = self.unassigned_id(|db| db.next_user_id()).await;
                fallback.into_user(id)
            }
        }
    }

    async fn get_all_plants(&self) -> Vec<Plant> {
        logged(self.blocking(|db| db.list_plants()).await, "Could not list plants").unwrap_or_default()
    }

    async fn get_plant(&self, id: u32) -> Option<Plant> {
        logged(self.blocking(move |db| db.get_plant(id)).await, "Could not get plant").flatten()
    }

    async fn create_plant(&self, new: NewPlant) -> Plant {
        let fallback = new.clone();
        let now = Utc::now();
        match self.blocking(move |db| db.create_plant(new, now)).await {
            Ok(plant) => {
                info!("Plant {} stored: {} (count {})", plant.id, plant.scientific_name, plant.identification_count);
                plant
            }
            Err(e) => {
                // Nothing was written; hand back the record as it would have looked.
                warn!("Could not save plant {}: {:#}", fallback.scientific_name, e);
                let id = self.unassigned_id(|db| db.next_plant_id()).await;
                let image_url = fallback.image_url.clone();
                fallback.into_plant(id, image_url, now)
            }
        }
    }

    async fn update_plant_count(&self, id: u32) -> Option<Plant> {
        logged(
            self.blocking(move |db| db.increment_plant_count(id)).await,
            "Could not update plant count",
        )
        .flatten()
    }

    async fn delete_plant(&self, id: u32) -> bool {
        logged(self.blocking(move |db| db.delete_plant(id)).await, "Could not delete plant").unwrap_or(false)
    }

    async fn delete_all_plants(&self) {
        if let Some(n) = logged(self.blocking(|db| db.delete_all_plants()).await, "Could not delete all plants") {
            info!("Deleted all plants ({} records)", n);
        }
    }
}
