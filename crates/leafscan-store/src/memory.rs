use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use leafscan_types::{NewPlant, NewUser, Plant, User};

use crate::{FIRST_ID, RecordStore};

/// Volatile store for tests and demos. Images stay inline.
pub struct MemoryStore {
    state: Mutex<State>,
}

struct State {
    users: BTreeMap<u32, User>,
    plants: BTreeMap<u32, Plant>,
    next_user_id: u32,
    next_plant_id: u32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                users: BTreeMap::new(),
                plants: BTreeMap::new(),
                next_user_id: FIRST_ID,
                next_plant_id: FIRST_ID,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        // A panic mid-update cannot leave the maps half-written; keep serving.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl State {
    fn bump_count(&mut self, id: u32) -> Option<Plant> {
        let plant = self.plants.get_mut(&id)?;
        plant.identification_count += 1;
        Some(plant.clone())
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_user(&self, id: u32) -> Option<User> {
        self.state().users.get(&id).cloned()
    }

    async fn get_user_by_username(&self, username: &str) -> Option<User> {
        self.state()
            .users
            .values()
            .find(|u| u.username == username)
            .cloned()
    }

    async fn create_user(&self, user: NewUser) -> User {
        let mut state = self.state();
        let id = state.next_user_id;
        state.next_user_id += 1;
        let user = user.into_user(id);
        state.users.insert(id, user.clone());
        user
    }

    async fn get_all_plants(&self) -> Vec<Plant> {
        self.state().plants.values().rev().cloned().collect()
    }

    async fn get_plant(&self, id: u32) -> Option<Plant> {
        self.state().plants.get(&id).cloned()
    }

    async fn create_plant(&self, new: NewPlant) -> Plant {
        let mut state = self.state();

        let existing = state.plants.values().find(|p| p.matches(&new)).map(|p| p.id);
        if let Some(id) = existing {
            debug!("Plant {} re-identified as {}", id, new.scientific_name);
            if let Some(plant) = state.bump_count(id) {
                return plant;
            }
        }

        let id = state.next_plant_id;
        state.next_plant_id += 1;
        let image_url = new.image_url.clone();
        let plant = new.into_plant(id, image_url, Utc::now());
        state.plants.insert(id, plant.clone());
        plant
    }

    async fn update_plant_count(&self, id: u32) -> Option<Plant> {
        self.state().bump_count(id)
    }

    async fn delete_plant(&self, id: u32) -> bool {
        self.state().plants.remove(&id).is_some()
    }

    async fn delete_all_plants(&self) {
        let mut state = self.state();
        state.plants.clear();
        state.next_plant_id = FIRST_ID;
    }
}
