use sqlx::FromRow;
use time::OffsetDateTime;

/// User record in the database. Deliberately not `Serialize`; outward shapes live in `dto`.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String, // Argon2 PHC string
    pub is_active: bool,
    pub is_superuser: bool,
    pub created_at: OffsetDateTime,
}

/// Row to insert; id and created_at are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub full_name: Option<String>,
    pub hashed_password: String,
    pub is_active: bool,
    pub is_superuser: bool,
}

/// Columns to overwrite on an existing row. `None` leaves the stored value as it is;
/// `full_name: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub full_name: Option<Option<String>>,
    pub hashed_password: Option<String>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
}
