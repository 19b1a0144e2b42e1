//! Record store over a remote blob store.
//!
//! Blob layout:
//!
//! ```text
//! plants/{id}.json
//! plants/index.json                  # [id, ...], authoritative plant listing
//! images/plant-{id}.jpg
//! users/{id}.json
//! users/by-username/{name}.json      # name is base64url, unpadded
//! metadata/nextPlantId.json          # {"id": N}
//! metadata/nextUserId.json
//! ```
//!
//! The blob API has no listing, so every plant create and delete rewrites the
//! index. Index read-modify-write is not atomic.

mod client;

pub use client::{BlobClient, HttpBlobClient, MemoryBlobClient};

use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use leafscan_types::{NewPlant, NewUser, Plant, User};

use crate::image::{decode_data_url, image_name, is_inline};
use crate::{FIRST_ID, RecordStore, logged, next_after, sort_newest_first};

pub const INDEX_KEY: &str = "plants/index.json";
pub const NEXT_PLANT_ID_KEY: &str = "metadata/nextPlantId.json";
pub const NEXT_USER_ID_KEY: &str = "metadata/nextUserId.json";

const JSON: &str = "application/json";
const JPEG: &str = "image/jpeg";

pub fn plant_key(id: u32) -> String {
    format!("plants/{}.json", id)
}

pub fn image_key(id: u32) -> String {
    format!("images/{}", image_name(id))
}

pub fn user_key(id: u32) -> String {
    format!("users/{}.json", id)
}

pub fn username_key(username: &str) -> String {
    format!("users/by-username/{}.json", URL_SAFE_NO_PAD.encode(username))
}

#[derive(Debug, Serialize, Deserialize)]
struct Counter {
    id: u32,
}

pub struct ObjectStore {
    client: Arc<dyn BlobClient>,
}

impl ObjectStore {
    pub fn new(client: Arc<dyn BlobClient>) -> Self {
        Self { client }
    }

    async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.client.get(key).await? {
            Some(bytes) => {
                let value = serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", key))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    async fn put_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.client.put(key, Bytes::from(body), JSON).await
    }

    /// `None` when the counter blob is unset or unreadable.
    async fn read_counter(&self, key: &str) -> Option<u32> {
        match self.get_json::<Counter>(key).await {
            Ok(Some(counter)) => Some(counter.id.max(FIRST_ID)),
            Ok(None) => None,
            Err(e) => {
                warn!("Could not read {}, recovering it: {:#}", key, e);
                None
            }
        }
    }

    /// Users have no index, so walk the user keys up to the first gap.
    async fn recover_user_counter(&self) -> u32 {
        let mut id = FIRST_ID;
        while let Ok(Some(_)) = self.client.get(&user_key(id)).await {
            id += 1;
        }
        id
    }

    async fn write_counter(&self, key: &str, id: u32) {
        if let Err(e) = self.put_json(key, &Counter { id }).await {
            warn!("Could not save {}: {:#}", key, e);
        }
    }

    async fn read_index(&self) -> Result<Vec<u32>> {
        Ok(self.get_json(INDEX_KEY).await?.unwrap_or_default())
    }

    async fn write_index(&self, ids: &[u32]) -> Result<()> {
        self.put_json(INDEX_KEY, &ids).await
    }

    async fn add_to_index(&self, id: u32) -> Result<()> {
        let mut ids = self.read_index().await?;
        if !ids.contains(&id) {
            ids.push(id);
        }
        self.write_index(&ids).await
    }

    async fn remove_from_index(&self, id: u32) -> Result<()> {
        let mut ids = self.read_index().await?;
        ids.retain(|&i| i != id);
        self.write_index(&ids).await
    }

    /// Upload the decoded image and return its blob key.
    async fn upload_image(&self, id: u32, image_url: &str) -> Result<String> {
        let bytes = decode_data_url(image_url)?;
        let key = image_key(id);
        let len = bytes.len();
        self.client.put(&key, Bytes::from(bytes), JPEG).await?;
        debug!("Uploaded {} byte image to {}", len, key);
        Ok(key)
    }

    async fn delete_image(&self, id: u32) {
        if let Err(e) = self.client.delete(&image_key(id)).await {
            warn!("Could not delete image of plant {}: {:#}", id, e);
        }
    }
}

#[async_trait]
impl RecordStore for ObjectStore {
    async fn get_user(&self, id: u32) -> Option<User> {
        logged(self.get_json(&user_key(id)).await, "Could not get user").flatten()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        let user: User = logged(
            self.get_json(&username_key(username)).await,
            "Could not get user by username",
        )
        .flatten()?;
        (user.username == username).then_some(user)
    }

    async fn create_user(&self, user: NewUser) -> User {
        let id = match self.read_counter(NEXT_USER_ID_KEY).await {
            Some(id) => id,
            None => self.recover_user_counter().await,
        };
        let user = user.into_user(id);

        let saved = async {
            self.put_json(&user_key(id), &user).await?;
            self.put_json(&username_key(&user.username), &user).await
        };
        match saved.await {
            Ok(()) => self.write_counter(NEXT_USER_ID_KEY, id + 1).await,
            Err(e) => warn!("Could not save user {}: {:#}", id, e),
        }
        user
    }

    async fn get_all_plants(&self) -> Vec<Plant> {
        let Some(ids) = logged(self.read_index().await, "Could not read plant index") else {
            return Vec::new();
        };

        let mut plants = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get_json::<Plant>(&plant_key(id)).await {
                Ok(Some(plant)) => plants.push(plant),
                Ok(None) => debug!("Plant {} listed in index but missing", id),
                Err(e) => warn!("Could not get plant {}: {:#}", id, e),
            }
        }
        sort_newest_first(&mut plants);
        plants
    }

    async fn get_plant(&self, id: u32) -> Option<Plant> {
        logged(self.get_json(&plant_key(id)).await, "Could not get plant").flatten()
    }

    async fn create_plant(&self, new: NewPlant) -> Plant {
        let plants = self.get_all_plants().await;
        if let Some(existing) = plants.iter().find(|p| p.matches(&new)) {
            debug!("Plant {} re-identified as {}", existing.id, new.scientific_name);
            return self
                .update_plant_count(existing.id)
                .await
                .unwrap_or_else(|| existing.clone());
        }

        // A lost counter restarts above the highest indexed plant.
        let id = match self.read_counter(NEXT_PLANT_ID_KEY).await {
            Some(id) => id,
            None => next_after(plants.iter().map(|p| p.id)),
        };

        let mut image_uploaded = false;
        let image_url = if is_inline(&new.image_url) {
            match self.upload_image(id, &new.image_url).await {
                Ok(key) => {
                    image_uploaded = true;
                    key
                }
                Err(e) => {
                    warn!("Could not upload image for plant {}, keeping data URL: {:#}", id, e);
                    new.image_url.clone()
                }
            }
        } else {
            new.image_url.clone()
        };

        let plant = new.into_plant(id, image_url, Utc::now());

        match self.put_json(&plant_key(id), &plant).await {
            Ok(()) => {
                if let Err(e) = self.add_to_index(id).await {
                    warn!("Could not add plant {} to index: {:#}", id, e);
                }
                self.write_counter(NEXT_PLANT_ID_KEY, id + 1).await;
                info!("Plant {} created: {}", id, plant.scientific_name);
            }
            Err(e) => {
                warn!("Could not save plant {}: {:#}", id, e);
                if image_uploaded {
                    self.delete_image(id).await;
                }
            }
        }
        plant
    }

    async fn update_plant_count(&self, id: u32) -> Option<Plant> {
        let mut plant = self.get_plant(id).await?;
        plant.identification_count += 1;

        if let Err(e) = self.put_json(&plant_key(id), &plant).await {
            warn!("Could not update count of plant {}: {:#}", id, e);
        }
        Some(plant)
    }

    async fn delete_plant(&self, id: u32) -> bool {
        match self.client.delete(&plant_key(id)).await {
            Ok(true) => {
                if let Err(e) = self.remove_from_index(id).await {
                    warn!("Could not remove plant {} from index: {:#}", id, e);
                }
                self.delete_image(id).await;
                info!("Plant {} deleted", id);
                true
            }
            Ok(false) => false,
            Err(e) => {
                warn!("Could not delete plant {}: {:#}", id, e);
                false
            }
        }
    }

    async fn delete_all_plants(&self) {
        let ids = logged(self.read_index().await, "Could not read plant index").unwrap_or_default();

        for &id in &ids {
            if let Err(e) = self.client.delete(&plant_key(id)).await {
                warn!("Could not delete plant {}: {:#}", id, e);
            }
            self.delete_image(id).await;
        }

        if let Err(e) = self.write_index(&[]).await {
            warn!("Could not clear plant index: {:#}", e);
        }
        self.write_counter(NEXT_PLANT_ID_KEY, FIRST_ID).await;
        info!("Deleted all plants ({} records)", ids.len());
    }
}
