//! Image inventory entity model.

use serde::Serialize;
use sqlx::FromRow;
use vigil_core::batch::ImageTarget;
use vigil_core::types::{DbId, Timestamp};

/// A row from the `images` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Image {
    pub id: DbId,
    pub name: String,
    pub tag: String,
    pub created_at: Timestamp,
}

impl From<Image> for ImageTarget {
    fn from(image: Image) -> Self {
        ImageTarget {
            id: image.id,
            name: image.name,
            tag: image.tag,
        }
    }
}
