use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use leafscan_types::{NewPlant, NewUser, Plant, User};

use crate::image::{decode_data_url, image_name, is_inline};
use crate::{FIRST_ID, RecordStore, logged, next_after, sort_newest_first};

/// URL prefix under which the server exposes the `images/` directory.
pub const IMAGE_URL_PREFIX: &str = "/data/images";

/// Record store backed by a local directory.
///
/// ```text
/// {root}/
/// ├── metadata.json        # {"nextPlantId": N, "nextUserId": M}
/// ├── plants/{id}.json
/// ├── images/plant-{id}.jpg
/// └── users/{id}.json
/// ```
pub struct FileStore {
    root: PathBuf,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    next_plant_id: u32,
    next_user_id: u32,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            next_plant_id: FIRST_ID,
            next_user_id: FIRST_ID,
        }
    }
}

impl FileStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        let store = Self { root };
        for dir in [store.plants_dir(), store.images_dir(), store.users_dir()] {
            fs::create_dir_all(&dir)
                .await
                .with_context(|| format!("creating {}", dir.display()))?;
        }
        info!("Plant data directory: {}", store.root.display());
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn plants_dir(&self) -> PathBuf {
        self.root.join("plants")
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join("images")
    }

    pub fn users_dir(&self) -> PathBuf {
        self.root.join("users")
    }

    fn metadata_path(&self) -> PathBuf {
        self.root.join("metadata.json")
    }

    fn plant_path(&self, id: u32) -> PathBuf {
        self.plants_dir().join(format!("{}.json", id))
    }

    fn image_path(&self, id: u32) -> PathBuf {
        self.images_dir().join(image_name(id))
    }

    fn user_path(&self, id: u32) -> PathBuf {
        self.users_dir().join(format!("{}.json", id))
    }

    /// Counters from `metadata.json`. When the file is missing or unreadable
    /// they are rebuilt from the records on disk so no id is handed out twice.
    async fn read_metadata(&self) -> Metadata {
        match read_json::<Metadata>(&self.metadata_path()).await {
            Ok(Some(meta)) => return meta,
            Ok(None) => {}
            Err(e) => warn!("Could not read metadata, recovering counters: {:#}", e),
        }

        let plants: Vec<Plant> =
            logged(list_json(&self.plants_dir()).await, "Could not list plants").unwrap_or_default();
        let users: Vec<User> =
            logged(list_json(&self.users_dir()).await, "Could not list users").unwrap_or_default();
        Metadata {
            next_plant_id: next_after(plants.iter().map(|p| p.id)),
            next_user_id: next_after(users.iter().map(|u| u.id)),
        }
    }

    async fn write_metadata(&self, meta: Metadata) {
        if let Err(e) = write_json(&self.metadata_path(), &meta).await {
            warn!("Could not save metadata: {:#}", e);
        }
    }

    /// Write the decoded image and return the URL it is served under.
    async fn save_image(&self, id: u32, image_url: &str) -> Result<String> {
        let bytes = decode_data_url(image_url)?;
        let path = self.image_path(id);
        fs::write(&path, &bytes)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        debug!("Saved {} byte image for plant {}", bytes.len(), id);
        Ok(format!("{}/{}", IMAGE_URL_PREFIX, image_name(id)))
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn get_user(&self, id: u32) -> Option<User> {
        logged(read_json(&self.user_path(id)).await, "Could not read user").flatten()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        let users: Vec<User> = logged(list_json(&self.users_dir()).await, "Could not search users")?;
        users.into_iter().find(|u| u.username == username)
    }

    async fn create_user(&self, user: NewUser) -> User {
        let mut meta = self.read_metadata().await;
        let user = user.into_user(meta.next_user_id);

        match write_json(&self.user_path(user.id), &user).await {
            Ok(()) => {
                meta.next_user_id = user.id + 1;
                self.write_metadata(meta).await;
            }
            Err(e) => warn!("Could not save user {}: {:#}", user.id, e),
        }
        user
    }

    async fn get_all_plants(&self) -> Vec<Plant> {
        let mut plants: Vec<Plant> =
            logged(list_json(&self.plants_dir()).await, "Could not list plants").unwrap_or_default();
        sort_newest_first(&mut plants);
        plants
    }

    async fn get_plant(&self, id: u32) -> Option<Plant> {
        logged(read_json(&self.plant_path(id)).await, "Could not read plant").flatten()
    }

    async fn create_plant(&self, new: NewPlant) -> Plant {
        let existing = self
            .get_all_plants()
            .await
            .into_iter()
            .find(|p| p.matches(&new));
        if let Some(existing) = existing {
            debug!("Plant {} re-identified as {}", existing.id, new.scientific_name);
            return self.update_plant_count(existing.id).await.unwrap_or(existing);
        }

        let mut meta = self.read_metadata().await;
        let id = meta.next_plant_id;

        let mut image_saved = false;
        let image_url = if is_inline(&new.image_url) {
            match self.save_image(id, &new.image_url).await {
                Ok(url) => {
                    image_saved = true;
                    url
                }
                Err(e) => {
                    warn!("Could not save image for plant {}, keeping data URL: {:#}", id, e);
                    new.image_url.clone()
                }
            }
        } else {
            new.image_url.clone()
        };

        let plant = new.into_plant(id, image_url, Utc::now());

        match write_json(&self.plant_path(id), &plant).await {
            Ok(()) => {
                meta.next_plant_id = id + 1;
                self.write_metadata(meta).await;
                info!("Plant {} created: {}", id, plant.scientific_name);
            }
            Err(e) => {
                warn!("Could not save plant {}: {:#}", id, e);
                if image_saved {
                    remove_file(&self.image_path(id)).await.ok();
                }
            }
        }
        plant
    }

    async fn update_plant_count(&self, id: u32) -> Option<Plant> {
        let mut plant = self.get_plant(id).await?;
        plant.identification_count += 1;

        if let Err(e) = write_json(&self.plant_path(id), &plant).await {
            warn!("Could not update count of plant {}: {:#}", id, e);
        }
        Some(plant)
    }

    async fn delete_plant(&self, id: u32) -> bool {
        match remove_file(&self.plant_path(id)).await {
            Ok(true) => {
                if let Err(e) = remove_file(&self.image_path(id)).await {
                    warn!("Could not delete image of plant {}: {:#}", id, e);
                }
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
        let removed = clear_dir(&self.plants_dir(), |name| name.ends_with(".json")).await;
        let images = clear_dir(&self.images_dir(), |name| {
            name.starts_with("plant-") && name.ends_with(".jpg")
        })
        .await;

        let mut meta = self.read_metadata().await;
        meta.next_plant_id = FIRST_ID;
        self.write_metadata(meta).await;

        info!("Deleted all plants ({} records, {} images)", removed, images);
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match fs::read(path).await {
        Ok(bytes) => {
            let value = serde_json::from_slice(&bytes)
                .with_context(|| format!("parsing {}", path.display()))?;
            Ok(Some(value))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e).with_context(|| format!("reading {}", path.display())),
    }
}

async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_vec_pretty(value)?;
    fs::write(path, content)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

/// Parse every `.json` file in `dir`. Unreadable entries are skipped.
async fn list_json<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    let mut entries = fs::read_dir(dir)
        .await
        .with_context(|| format!("listing {}", dir.display()))?;
    let mut values = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        match read_json(&path).await {
            Ok(Some(value)) => values.push(value),
            Ok(None) => {}
            Err(e) => warn!("Skipping {}: {:#}", path.display(), e),
        }
    }
    Ok(values)
}

/// Returns `false` if the file was already gone.
async fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e).with_context(|| format!("deleting {}", path.display())),
    }
}

/// Delete the files in `dir` whose names pass `selected`. Returns how many
/// were removed; failures are logged and skipped.
async fn clear_dir(dir: &Path, selected: impl Fn(&str) -> bool) -> usize {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Could not list {}: {}", dir.display(), e);
            return 0;
        }
    };

    let mut removed = 0;
    loop {
        let entry = match entries.next_entry().await {
            Ok(Some(entry)) => entry,
            Ok(None) => break,
            Err(e) => {
                warn!("Could not list {}: {}", dir.display(), e);
                break;
            }
        };
        let Some(name) = entry.file_name().to_str().map(str::to_owned) else {
            continue;
        };
        if !selected(&name) {
            continue;
        }
        match remove_file(&entry.path()).await {
            Ok(true) => removed += 1,
            Ok(false) => {}
            Err(e) => warn!("{:#}", e),
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fern(image_url: &str) -> NewPlant {
        NewPlant {
            scientific_name: "Dryopteris filix-mas".into(),
            common_name: "Male Fern".into(),
            family: "Dryopteridaceae".into(),
            origin: "Europe".into(),
            light_requirements: "Shade".into(),
            watering: "Keep moist".into(),
            special_features: "Hardy".into(),
            confidence: 77,
            image_url: image_url.into(),
            aroma_level: Some(2),
            identification_count: None,
            latitude: Some("51.50".into()),
            longitude: Some("-0.12".into()),
            location_name: Some("London".into()),
        }
    }

    #[tokio::test]
    async fn externalizes_inline_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();

        let plant = store.create_plant(fern("data:image/jpeg;base64,/9j/4A==")).await;
        assert_eq!(plant.image_url, "/data/images/plant-1.jpg");

        let bytes = std::fs::read(dir.path().join("images/plant-1.jpg")).unwrap();
        assert_eq!(bytes, vec![0xff, 0xd8, 0xff, 0xe0]);
        assert!(dir.path().join("plants/1.json").exists());
    }

    #[tokio::test]
    async fn keeps_data_url_when_image_cannot_be_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();

        let url = "data:image/jpeg;base64,%%%";
        let plant = store.create_plant(fern(url)).await;
        assert_eq!(plant.id, 1);
        assert_eq!(plant.image_url, url);
        assert!(!dir.path().join("images/plant-1.jpg").exists());
    }

    #[tokio::test]
    async fn metadata_tracks_both_counters() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();

        store.create_plant(fern("a")).await;
        store
            .create_user(NewUser {
                username: "ivy".into(),
                password: "secret".into(),
            })
            .await;

        let raw = std::fs::read_to_string(dir.path().join("metadata.json")).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta["nextPlantId"], 2);
        assert_eq!(meta["nextUserId"], 2);

        store.delete_all_plants().await;
        let raw = std::fs::read_to_string(dir.path().join("metadata.json")).unwrap();
        let meta: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta["nextPlantId"], 1);
        assert_eq!(meta["nextUserId"], 2);
    }

    #[tokio::test]
    async fn ignores_stray_files_when_listing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        store.create_plant(fern("a")).await;

        std::fs::write(dir.path().join("plants/notes.txt"), "hello").unwrap();
        std::fs::write(dir.path().join("plants/99.json"), "{ not json").unwrap();

        let plants = store.get_all_plants().await;
        assert_eq!(plants.len(), 1);
        assert_eq!(plants[0].id, 1);
    }

    #[tokio::test]
    async fn delete_removes_image() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        store.create_plant(fern("data:image/jpeg;base64,/9j/4A==")).await;

        assert!(store.delete_plant(1).await);
        assert!(!dir.path().join("images/plant-1.jpg").exists());
        assert!(!store.delete_plant(1).await);
    }

    #[tokio::test]
    async fn corrupt_metadata_on_empty_store_starts_at_one() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        std::fs::write(dir.path().join("metadata.json"), "garbage").unwrap();

        let plant = store.create_plant(fern("a")).await;
        assert_eq!(plant.id, 1);
    }

    #[tokio::test]
    async fn lost_metadata_continues_after_existing_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().to_path_buf()).await.unwrap();
        store.create_plant(fern("a")).await;
        let mut holly = fern("b");
        holly.scientific_name = "Ilex aquifolium".into();
        holly.common_name = "Holly".into();
        store.create_plant(holly).await;
        store
            .create_user(NewUser {
                username: "rosa".into(),
                password: "canina".into(),
            })
            .await;

        std::fs::write(dir.path().join("metadata.json"), "garbage").unwrap();
        let mut ivy = fern("c");
        ivy.scientific_name = "Hedera helix".into();
        ivy.common_name = "Ivy".into();
        let plant = store.create_plant(ivy).await;
        assert_eq!(plant.id, 3);
        assert_eq!(store.get_plant(1).await.unwrap().common_name, fern("a").common_name);

        std::fs::remove_file(dir.path().join("metadata.json")).unwrap();
        let user = store
            .create_user(NewUser {
                username: "iris".into(),
                password: "germanica".into(),
            })
            .await;
        assert_eq!(user.id, 2);
        assert_eq!(store.get_user(1).await.unwrap().username, "rosa");
    }
}
