use std::{collections::BTreeMap, sync::Mutex};

use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;
use time::OffsetDateTime;

use crate::users::repo_types::{NewUser, User, UserChanges};

const USER_COLUMNS: &str = "id, email, full_name, hashed_password, is_active, is_superuser, created_at";

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("record not found")]
    NotFound,
    #[error("constraint violated: {0}")]
    ConstraintViolation(String),
    #[error(transparent)]
    Storage(sqlx::Error),
}

impl From<sqlx::Error> for RepoError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                RepoError::ConstraintViolation(db.constraint().unwrap_or("unique").to_string())
            }
            other => RepoError::Storage(other),
        }
    }
}

/// Persistence of users. Emails arrive already normalised; uniqueness is the store's job.
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError>;
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError>;
    async fn insert(&self, user: NewUser) -> Result<User, RepoError>;
    /// Writes only the columns set in `changes` and returns the stored row.
    async fn update_fields(&self, id: i64, changes: UserChanges) -> Result<User, RepoError>;
    async fn delete(&self, id: i64) -> Result<(), RepoError>;
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, RepoError>;
    async fn count(&self) -> Result<i64, RepoError>;
}

/// PostgreSQL store. Every call borrows a pooled connection for one statement.
#[derive(Clone)]
pub struct PgUserRepo {
    db: PgPool,
}

impl PgUserRepo {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl UserRepo for PgUserRepo {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.db)
        .await?;
        Ok(user)
    }

    async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, full_name, hashed_password, is_active, is_superuser)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(&user.email)
        .bind(&user.full_name)
        .bind(&user.hashed_password)
        .bind(user.is_active)
        .bind(user.is_superuser)
        .fetch_one(&self.db)
        .await?;
        Ok(row)
    }

    async fn update_fields(&self, id: i64, changes: UserChanges) -> Result<User, RepoError> {
        let row = sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
               SET email = COALESCE($2, email),
                   full_name = CASE WHEN $3 THEN $4 ELSE full_name END,
                   hashed_password = COALESCE($5, hashed_password),
                   is_active = COALESCE($6, is_active),
                   is_superuser = COALESCE($7, is_superuser)
             WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(changes.email)
        .bind(changes.full_name.is_some())
        .bind(changes.full_name.flatten())
        .bind(changes.hashed_password)
        .bind(changes.is_active)
        .bind(changes.is_superuser)
        .fetch_optional(&self.db)
        .await?;
        row.ok_or(RepoError::NotFound)
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        let res = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        if res.rows_affected() == 0 {
            return Err(RepoError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, RepoError> {
        let rows = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.db)
        .await?;
        Ok(rows)
    }

    async fn count(&self) -> Result<i64, RepoError> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.db)
            .await?;
        Ok(n)
    }
}

/// In-process store with the same uniqueness rule as the `users` table.
#[derive(Default)]
pub struct MemoryUserRepo {
    inner: Mutex<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    last_id: i64,
    rows: BTreeMap<i64, User>,
}

impl MemoryUserRepo {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryInner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MemoryInner {
    fn email_taken(&self, email: &str, except: Option<i64>) -> bool {
        self.rows
            .values()
            .any(|u| u.email == email && Some(u.id) != except)
    }
}

#[async_trait]
impl UserRepo for MemoryUserRepo {
    async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
        Ok(self.lock().rows.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, RepoError> {
        Ok(self.lock().rows.values().find(|u| u.email == email).cloned())
    }

    async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
        let mut inner = self.lock();
        if inner.email_taken(&user.email, None) {
            return Err(RepoError::ConstraintViolation("users_email_key".into()));
        }
        inner.last_id += 1;
        let row = User {
            id: inner.last_id,
            email: user.email,
            full_name: user.full_name,
            hashed_password: user.hashed_password,
            is_active: user.is_active,
            is_superuser: user.is_superuser,
            created_at: OffsetDateTime::now_utc(),
        };
        inner.rows.insert(row.id, row.clone());
        Ok(row)
    }

    async fn update_fields(&self, id: i64, changes: UserChanges) -> Result<User, RepoError> {
        let mut inner = self.lock();
        if !inner.rows.contains_key(&id) {
            return Err(RepoError::NotFound);
        }
        if let Some(email) = changes.email.as_deref() {
            if inner.email_taken(email, Some(id)) {
                return Err(RepoError::ConstraintViolation("users_email_key".into()));
            }
        }
        let row = inner.rows.get_mut(&id).ok_or(RepoError::NotFound)?;
        if let Some(email) = changes.email {
            row.email = email;
        }
        if let Some(full_name) = changes.full_name {
            row.full_name = full_name;
        }
        if let Some(hash) = changes.hashed_password {
            row.hashed_password = hash;
        }
        if let Some(active) = changes.is_active {
            row.is_active = active;
        }
        if let Some(superuser) = changes.is_superuser {
            row.is_superuser = superuser;
        }
        Ok(row.clone())
    }

    async fn delete(&self, id: i64) -> Result<(), RepoError> {
        self.lock()
            .rows
            .remove(&id)
            .map(|_| ())
            .ok_or(RepoError::NotFound)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, RepoError> {
        let offset = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
        let limit = usize::try_from(limit.max(0)).unwrap_or(usize::MAX);
        Ok(self
            .lock()
            .rows
            .values()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count(&self) -> Result<i64, RepoError> {
        Ok(self.lock().rows.len() as i64)
    }
}
