use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row};

use leafscan_types::{NewPlant, NewUser, Plant, User};

use super::Database;
use crate::FIRST_ID;

const NEXT_PLANT_ID: &str = "next_plant_id";
const NEXT_USER_ID: &str = "next_user_id";

const PLANT_COLUMNS: &str = "id, scientific_name, common_name, family, origin, light_requirements,
     watering, special_features, confidence, image_url, aroma_level, identification_count,
     latitude, longitude, location_name, created_at";

impl Database {
    // -- Counters --

    /// Identifier the next new user would get.
    pub fn next_user_id(&self) -> Result<u32> {
        self.with_conn(|conn| next_id(conn, NEXT_USER_ID))
    }

    /// Identifier the next new plant would get.
    pub fn next_plant_id(&self) -> Result<u32> {
        self.with_conn(|conn| next_id(conn, NEXT_PLANT_ID))
    }

    // -- Users --

    pub fn create_user(&self, user: NewUser) -> Result<User> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let user = user.into_user(next_id(&tx, NEXT_USER_ID)?);
            tx.execute(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)",
                rusqlite::params![user.id, &user.username, &user.password],
            )?;
            set_next_id(&tx, NEXT_USER_ID, user.id + 1)?;
            tx.commit()?;
            Ok(user)
        })
    }

    pub fn get_user(&self, id: u32) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, password FROM users WHERE id = ?1",
                    [id],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        self.with_conn(|conn| {
            let user = conn
                .query_row(
                    "SELECT id, username, password FROM users WHERE username = ?1",
                    [username],
                    user_from_row,
                )
                .optional()?;
            Ok(user)
        })
    }

    // -- Plants --

    pub fn list_plants(&self) -> Result<Vec<Plant>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {} FROM plants ORDER BY id DESC", PLANT_COLUMNS))?;
            let plants = stmt
                .query_map([], plant_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(plants)
        })
    }

    pub fn get_plant(&self, id: u32) -> Result<Option<Plant>> {
        self.with_conn(|conn| query_plant(conn, id))
    }

    /// Insert `new`, or bump the count of the row with the same names.
    /// Runs in one transaction under the connection lock.
    pub fn create_plant(&self, new: NewPlant, created_at: DateTime<Utc>) -> Result<Plant> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let existing: Option<u32> = tx
                .query_row(
                    "SELECT id FROM plants WHERE scientific_name = ?1 AND common_name = ?2
                     ORDER BY id LIMIT 1",
                    [&new.scientific_name, &new.common_name],
                    |row| row.get(0),
                )
                .optional()?;

            let plant = match existing {
                Some(id) => {
                    increment_count(&tx, id)?;
                    query_plant(&tx, id)?
                        .ok_or_else(|| anyhow::anyhow!("plant {} vanished mid-transaction", id))?
                }
                None => {
                    let id = next_id(&tx, NEXT_PLANT_ID)?;
                    let image_url = new.image_url.clone();
                    let plant = new.into_plant(id, image_url, created_at);
                    insert_plant(&tx, &plant)?;
                    set_next_id(&tx, NEXT_PLANT_ID, id + 1)?;
                    plant
                }
            };

            tx.commit()?;
            Ok(plant)
        })
    }

    pub fn increment_plant_count(&self, id: u32) -> Result<Option<Plant>> {
        self.with_conn(|conn| {
            if increment_count(conn, id)? == 0 {
                return Ok(None);
            }
            query_plant(conn, id)
        })
    }

    pub fn delete_plant(&self, id: u32) -> Result<bool> {
        self.with_conn(|conn| {
            let n = conn.execute("DELETE FROM plants WHERE id = ?1", [id])?;
            Ok(n > 0)
        })
    }

    /// Returns the number of rows removed.
    pub fn delete_all_plants(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            let n = tx.execute("DELETE FROM plants", [])?;
            set_next_id(&tx, NEXT_PLANT_ID, FIRST_ID)?;
            tx.commit()?;
            Ok(n)
        })
    }
}

fn next_id(conn: &Connection, key: &str) -> Result<u32> {
    let id = conn
        .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
            row.get::<_, u32>(0)
        })
        .optional()?;
    Ok(id.unwrap_or(FIRST_ID).max(FIRST_ID))
}

fn set_next_id(conn: &Connection, key: &str, value: u32) -> Result<()> {
    conn.execute(
        "INSERT INTO metadata (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        rusqlite::params![key, value],
    )?;
    Ok(())
}

fn increment_count(conn: &Connection, id: u32) -> Result<usize> {
    let n = conn.execute(
        "UPDATE plants SET identification_count = identification_count + 1 WHERE id = ?1",
        [id],
    )?;
    Ok(n)
}

fn insert_plant(conn: &Connection, plant: &Plant) -> Result<()> {
    conn.execute(
        &format!(
            "INSERT INTO plants ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            PLANT_COLUMNS
        ),
        rusqlite::params![
            plant.id,
            &plant.scientific_name,
            &plant.common_name,
            &plant.family,
            &plant.origin,
            &plant.light_requirements,
            &plant.watering,
            &plant.special_features,
            plant.confidence,
            &plant.image_url,
            plant.aroma_level,
            plant.identification_count,
            &plant.latitude,
            &plant.longitude,
            &plant.location_name,
            plant.created_at.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn query_plant(conn: &Connection, id: u32) -> Result<Option<Plant>> {
    let plant = conn
        .query_row(
            &format!("SELECT {} FROM plants WHERE id = ?1", PLANT_COLUMNS),
            [id],
            plant_from_row,
        )
        .optional()?;
    Ok(plant)
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
    })
}

fn plant_from_row(row: &Row<'_>) -> rusqlite::Result<Plant> {
    let created_at: String = row.get(15)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(15, Type::Text, Box::new(e)))?;

    Ok(Plant {
        id: row.get(0)?,
        scientific_name: row.get(1)?,
        common_name: row.get(2)?,
        family: row.get(3)?,
        origin: row.get(4)?,
        light_requirements: row.get(5)?,
        watering: row.get(6)?,
        special_features: row.get(7)?,
        confidence: row.get(8)?,
        image_url: row.get(9)?,
        aroma_level: row.get(10)?,
        identification_count: row.get(11)?,
        latitude: row.get(12)?,
        longitude: row.get(13)?,
        location_name: row.get(14)?,
        created_at,
    })
}
