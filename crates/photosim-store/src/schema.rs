//! Database schema SQL.

/// The `images` collection: one row per photo identity.
pub const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS images (
    id TEXT PRIMARY KEY NOT NULL,
    location TEXT NOT NULL,
    embedding BLOB NOT NULL,
    dim INTEGER NOT NULL,
    model TEXT NOT NULL,
    indexed_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_images_location ON images(location);
CREATE INDEX IF NOT EXISTS idx_images_model ON images(model);
"#;
