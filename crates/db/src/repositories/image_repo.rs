//! Repository for the `images` inventory table.

use sqlx::PgPool;

use crate::models::image::Image;

/// Column list for `images` queries.
const COLUMNS: &str = "id, name, tag, created_at";

/// Provides read operations for the image inventory.
pub struct ImageRepo;

impl ImageRepo {
    /// List the full inventory, by name then tag.
    pub async fn list_all(pool: &PgPool) -> Result<Vec<Image>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM images ORDER BY name, tag");
        sqlx::query_as::<_, Image>(&query).fetch_all(pool).await
    }
}
