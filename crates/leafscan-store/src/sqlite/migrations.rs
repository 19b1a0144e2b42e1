use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Plant DB: running migration v1 (initial schema)");
        conn.execute_batch(
            "
            CREATE TABLE users (
                id          INTEGER PRIMARY KEY,
                username    TEXT NOT NULL UNIQUE,
                password    TEXT NOT NULL
            );

            CREATE TABLE plants (
                id                   INTEGER PRIMARY KEY,
                scientific_name      TEXT NOT NULL,
                common_name          TEXT NOT NULL,
                family               TEXT NOT NULL,
                origin               TEXT NOT NULL,
                light_requirements   TEXT NOT NULL,
                watering             TEXT NOT NULL,
                special_features     TEXT NOT NULL,
                confidence           INTEGER NOT NULL,
                image_url            TEXT NOT NULL,
                aroma_level          INTEGER NOT NULL DEFAULT 5,
                identification_count INTEGER NOT NULL DEFAULT 1,
                latitude             TEXT,
                longitude            TEXT,
                location_name        TEXT,
                created_at           TEXT NOT NULL
            );

            CREATE INDEX idx_plants_names
                ON plants(scientific_name, common_name);

            -- Next unused identifier per entity; ids are never taken from
            -- MAX(id) so single deletes do not free them.
            CREATE TABLE metadata (
                key     TEXT PRIMARY KEY,
                value   INTEGER NOT NULL
            );

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    Ok(())
}
