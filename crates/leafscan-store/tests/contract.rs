//! Behaviour every record store backend must share.
//!
//! Each case is written once against `&dyn RecordStore` and instantiated for
//! the memory, filesystem, object and SQLite backends.

use std::sync::Arc;

use leafscan_store::sqlite::Database;
use leafscan_store::{FileStore, MemoryBlobClient, MemoryStore, ObjectStore, RecordStore, SqliteStore};
use leafscan_types::{NewPlant, NewUser};
use tempfile::TempDir;

struct Fixture {
    store: Box<dyn RecordStore>,
    _dir: Option<TempDir>,
}

async fn memory() -> Fixture {
    Fixture {
        store: Box::new(MemoryStore::new()),
        _dir: None,
    }
}

async fn file() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path().join("data")).await.unwrap();
    Fixture {
        store: Box::new(store),
        _dir: Some(dir),
    }
}

async fn object() -> Fixture {
    Fixture {
        store: Box::new(ObjectStore::new(Arc::new(MemoryBlobClient::new()))),
        _dir: None,
    }
}

async fn sqlite() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("leafscan.db")).unwrap();
    Fixture {
        store: Box::new(SqliteStore::new(db)),
        _dir: Some(dir),
    }
}

fn plant(scientific_name: &str, common_name: &str) -> NewPlant {
    NewPlant {
        scientific_name: scientific_name.into(),
        common_name: common_name.into(),
        family: "Araceae".into(),
        origin: "Central America, Southern Mexico".into(),
        light_requirements: "Bright, indirect light".into(),
        watering: "Water when top inch of soil is dry.".into(),
        special_features: "Fenestrated leaves".into(),
        confidence: 92,
        image_url: "/data/images/seed.jpg".into(),
        aroma_level: Some(3),
        identification_count: Some(1),
        latitude: Some("51.5074".into()),
        longitude: Some("-0.1278".into()),
        location_name: Some("London, UK".into()),
    }
}

fn monstera() -> NewPlant {
    plant("Monstera deliciosa", "Swiss Cheese Plant")
}

fn snake_plant() -> NewPlant {
    plant("Sansevieria trifasciata", "Snake Plant")
}

fn fiddle_leaf() -> NewPlant {
    plant("Ficus lyrata", "Fiddle Leaf Fig")
}

mod cases {
    use super::*;

    pub async fn new_names_get_increasing_ids(store: &dyn RecordStore) {
        let a = store.create_plant(monstera()).await;
        let b = store.create_plant(snake_plant()).await;
        let c = store.create_plant(fiddle_leaf()).await;
        assert_eq!(a.id, 1);
        assert!(b.id > a.id);
        assert!(c.id > b.id);
    }

    pub async fn duplicate_names_merge(store: &dyn RecordStore) {
        let first = store.create_plant(monstera()).await;
        assert_eq!(first.id, 1);
        assert_eq!(first.identification_count, 1);

        let mut again = monstera();
        again.family = "Something else".into();
        again.confidence = 40;
        again.location_name = Some("Kew".into());
        let merged = store.create_plant(again).await;

        assert_eq!(merged.id, 1);
        assert_eq!(merged.identification_count, 2);
        assert_eq!(merged.family, "Araceae");
        assert_eq!(merged.confidence, 92);
        assert_eq!(merged.location_name.as_deref(), Some("London, UK"));
        assert_eq!(store.get_all_plants().await.len(), 1);
        assert_eq!(store.get_plant(1).await.unwrap().identification_count, 2);
    }

    pub async fn merge_requires_both_names(store: &dyn RecordStore) {
        store.create_plant(monstera()).await;
        let other = store
            .create_plant(plant("Monstera deliciosa", "Split-leaf Philodendron"))
            .await;
        assert_eq!(other.id, 2);
        assert_eq!(other.identification_count, 1);
        assert_eq!(store.get_all_plants().await.len(), 2);
    }

    pub async fn merge_does_not_consume_identifier(store: &dyn RecordStore) {
        store.create_plant(monstera()).await;
        store.create_plant(monstera()).await;
        store.create_plant(monstera()).await;
        let next = store.create_plant(snake_plant()).await;
        assert_eq!(next.id, 2);
    }

    pub async fn deleted_plant_is_gone(store: &dyn RecordStore) {
        store.create_plant(monstera()).await;
        let c = store.create_plant(fiddle_leaf()).await;
        assert_eq!(c.id, 2);

        assert!(store.delete_plant(1).await);

        let all = store.get_all_plants().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, 2);
        assert!(store.get_plant(1).await.is_none());
    }

    pub async fn deleting_missing_plant_returns_false(store: &dyn RecordStore) {
        assert!(!store.delete_plant(42).await);
        store.create_plant(monstera()).await;
        assert!(store.delete_plant(1).await);
        assert!(!store.delete_plant(1).await);
    }

    pub async fn single_delete_does_not_reuse_ids(store: &dyn RecordStore) {
        store.create_plant(monstera()).await;
        store.create_plant(snake_plant()).await;
        assert!(store.delete_plant(2).await);

        let next = store.create_plant(fiddle_leaf()).await;
        assert_eq!(next.id, 3);
    }

    pub async fn delete_all_resets_ids(store: &dyn RecordStore) {
        store.create_plant(monstera()).await;
        store.create_plant(snake_plant()).await;
        store.create_plant(fiddle_leaf()).await;

        store.delete_all_plants().await;
        assert!(store.get_all_plants().await.is_empty());
        assert!(store.get_plant(3).await.is_none());

        let fresh = store.create_plant(plant("Epipremnum aureum", "Golden Pothos")).await;
        assert_eq!(fresh.id, 1);
        assert_eq!(fresh.identification_count, 1);
    }

    pub async fn listing_is_newest_first(store: &dyn RecordStore) {
        for p in [monstera(), snake_plant(), fiddle_leaf()] {
            store.create_plant(p).await;
        }
        store.update_plant_count(1).await;

        let ids: Vec<u32> = store.get_all_plants().await.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    pub async fn created_record_round_trips(store: &dyn RecordStore) {
        let created = store.create_plant(monstera()).await;
        let loaded = store.get_plant(created.id).await.unwrap();
        assert_eq!(loaded, created);
        assert_eq!(loaded.aroma_level, 3);
        assert_eq!(loaded.latitude.as_deref(), Some("51.5074"));
    }

    pub async fn defaults_fill_absent_fields(store: &dyn RecordStore) {
        let mut bare = monstera();
        bare.aroma_level = None;
        bare.identification_count = None;
        bare.latitude = None;
        bare.longitude = None;
        bare.location_name = None;

        let created = store.create_plant(bare).await;
        let loaded = store.get_plant(created.id).await.unwrap();
        assert_eq!(loaded.aroma_level, 5);
        assert_eq!(loaded.identification_count, 1);
        assert!(loaded.latitude.is_none());
        assert!(loaded.longitude.is_none());
        assert!(loaded.location_name.is_none());
    }

    pub async fn count_update(store: &dyn RecordStore) {
        assert!(store.update_plant_count(1).await.is_none());

        store.create_plant(monstera()).await;
        let updated = store.update_plant_count(1).await.unwrap();
        assert_eq!(updated.identification_count, 2);
        let updated = store.update_plant_count(1).await.unwrap();
        assert_eq!(updated.identification_count, 3);
        assert_eq!(store.get_plant(1).await.unwrap().identification_count, 3);
    }

    pub async fn users(store: &dyn RecordStore) {
        assert!(store.get_user(1).await.is_none());
        assert!(store.get_user_by_username("rosa").await.is_none());

        let rosa = store
            .create_user(NewUser {
                username: "rosa".into(),
                password: "canina".into(),
            })
            .await;
        let iris = store
            .create_user(NewUser {
                username: "iris".into(),
                password: "germanica".into(),
            })
            .await;

        assert_eq!(rosa.id, 1);
        assert_eq!(iris.id, 2);
        assert_eq!(store.get_user(2).await, Some(iris));
        assert_eq!(store.get_user_by_username("rosa").await, Some(rosa));
        assert!(store.get_user_by_username("Rosa").await.is_none());
    }

    pub async fn delete_all_keeps_users(store: &dyn RecordStore) {
        store
            .create_user(NewUser {
                username: "rosa".into(),
                password: "canina".into(),
            })
            .await;
        store.create_plant(monstera()).await;
        store.delete_all_plants().await;

        let next = store
            .create_user(NewUser {
                username: "iris".into(),
                password: "germanica".into(),
            })
            .await;
        assert_eq!(next.id, 2);
        assert!(store.get_user_by_username("rosa").await.is_some());
    }
}

macro_rules! case {
    ($make:ident, $case:ident) => {
        #[tokio::test]
        async fn $case() {
            let fixture = super::$make().await;
            super::cases::$case(fixture.store.as_ref()).await;
        }
    };
}

macro_rules! backend_suite {
    ($($backend:ident),* $(,)?) => {
        $(
            mod $backend {
                case!($backend, new_names_get_increasing_ids);
                case!($backend, duplicate_names_merge);
                case!($backend, merge_requires_both_names);
                case!($backend, merge_does_not_consume_identifier);
                case!($backend, deleted_plant_is_gone);
                case!($backend, deleting_missing_plant_returns_false);
                case!($backend, single_delete_does_not_reuse_ids);
                case!($backend, delete_all_resets_ids);
                case!($backend, listing_is_newest_first);
                case!($backend, created_record_round_trips);
                case!($backend, defaults_fill_absent_fields);
                case!($backend, count_update);
                case!($backend, users);
                case!($backend, delete_all_keeps_users);
            }
        )*
    };
}

backend_suite!(memory, file, object, sqlite);
