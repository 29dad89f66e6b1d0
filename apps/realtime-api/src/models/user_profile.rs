use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::db::schema::user_profiles;

/// Display data for a user, mirrored from the verified identity presented
/// at IDENTIFY time. The identity itself is owned by the auth service.
#[derive(Debug, Clone, Queryable, Selectable, Serialize, ToSchema)]
#[diesel(table_name = user_profiles)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub first_seen_at: DateTime<Utc>,
    /// Persisted when the user's last gateway session closes.
    pub last_seen_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = user_profiles)]
pub struct NewUserProfile<'a> {
    pub id: &'a str,
    pub display_name: &'a str,
    pub first_seen_at: DateTime<Utc>,
}
