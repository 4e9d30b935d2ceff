use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// One logged visit. Repeat views within the same visit bump `history`.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AccessEvent {
    pub access_id: i64,
    pub unique_id: String,
    pub referrer: Option<String>,
    pub ad_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub page: Option<String>,
    pub history: i64,
    pub created_at: i64,
    /// Last activity of the visit, used for the inactivity window
    pub updated_at: i64,
}

/// Fields of an access row about to be inserted
#[derive(Debug, Clone)]
pub struct NewAccess {
    pub unique_id: String,
    pub referrer: Option<String>,
    pub ad_code: Option<String>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub page: Option<String>,
    pub created_at: i64,
}

/// A completed order attributed to a visitor
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct ConversionEvent {
    pub conversion_id: i64,
    pub order_id: i64,
    pub unique_id: String,
    pub created_at: i64,
}
