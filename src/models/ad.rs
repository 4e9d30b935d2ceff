use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A publisher or channel grouping several ads
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Media {
    pub media_id: i64,
    pub name: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_active: bool,
}

/// A single trackable advertisement
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Ad {
    pub ad_id: i64,
    pub media_id: i64,
    pub name: String,
    /// Public tracking code embedded in landing URLs. Unique and never reassigned.
    pub code: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub is_active: bool,
}
