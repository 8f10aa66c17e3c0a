//! Account rules: registration, admin and self-service mutation, password
//! changes and credential checks. Callers pass the store in explicitly and
//! resolve who is acting (self or superuser) before calling in.

use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    auth::password::{hash_password, verify_password},
    config::{FirstSuperuser, UsersConfig},
    users::{
        dto::{UserCreate, UserRegister, UserUpdate, UserUpdateMe},
        repo::{RepoError, UserRepo},
        repo_types::{NewUser, User, UserChanges},
    },
};

const MAX_FIELD_LEN: usize = 255;
const MIN_PASSWORD_LEN: usize = 8;
const MAX_PASSWORD_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("User not found")]
    NotFound,
    #[error("The user with this email already exists in the system")]
    DuplicateEmail,
    #[error("User with this email already exists")]
    EmailConflict,
    #[error("Incorrect password")]
    WrongPassword,
    #[error("New password cannot be the same as the current one")]
    SamePassword,
    #[error("Super users are not allowed to delete themselves")]
    SuperuserSelfDelete,
    #[error("Open user registration is forbidden on this server")]
    RegistrationClosed,
    #[error("Incorrect email or password")]
    InvalidCredentials,
    #[error("{0}")]
    Validation(String),
    #[error("storage failure: {0}")]
    Storage(#[source] RepoError),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl AccountError {
    /// Maps a store error on insert; a unique violation means someone else owns the email.
    fn on_insert(e: RepoError) -> Self {
        match e {
            RepoError::ConstraintViolation(_) => AccountError::DuplicateEmail,
            RepoError::NotFound => AccountError::NotFound,
            other => AccountError::Storage(other),
        }
    }

    fn on_update(e: RepoError) -> Self {
        match e {
            RepoError::ConstraintViolation(_) => AccountError::EmailConflict,
            RepoError::NotFound => AccountError::NotFound,
            other => AccountError::Storage(other),
        }
    }

    fn on_read(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => AccountError::NotFound,
            other => AccountError::Storage(other),
        }
    }
}

/// Trims and lowercases; uniqueness is case-insensitive.
pub fn normalize_email(raw: &str) -> Result<String, AccountError> {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    let email = raw.trim().to_lowercase();
    if email.len() > MAX_FIELD_LEN {
        return Err(AccountError::Validation("Email is too long".into()));
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(AccountError::Validation("Invalid email".into()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), AccountError> {
    let n = password.chars().count();
    if n < MIN_PASSWORD_LEN {
        return Err(AccountError::Validation("Password too short".into()));
    }
    if n > MAX_PASSWORD_LEN {
        return Err(AccountError::Validation("Password too long".into()));
    }
    Ok(())
}

fn validate_full_name(name: Option<String>) -> Result<Option<String>, AccountError> {
    match name {
        Some(n) if n.is_empty() => Err(AccountError::Validation("Full name cannot be empty".into())),
        Some(n) if n.chars().count() > MAX_FIELD_LEN => {
            Err(AccountError::Validation("Full name is too long".into()))
        }
        other => Ok(other),
    }
}

async fn insert_new(
    repo: &dyn UserRepo,
    email: &str,
    password: &str,
    full_name: Option<String>,
    is_active: bool,
    is_superuser: bool,
) -> Result<User, AccountError> {
    let email = normalize_email(email)?;
    validate_password(password)?;
    let full_name = validate_full_name(full_name)?;

    if repo
        .find_by_email(&email)
        .await
        .map_err(AccountError::on_read)?
        .is_some()
    {
        warn!(email = %email, "email already registered");
        return Err(AccountError::DuplicateEmail);
    }

    let hashed_password = hash_password(password)?;
    // A concurrent insert can still win the race; the unique constraint reports it.
    let user = repo
        .insert(NewUser {
            email,
            full_name,
            hashed_password,
            is_active,
            is_superuser,
        })
        .await
        .map_err(AccountError::on_insert)?;
    Ok(user)
}

pub async fn register(
    repo: &dyn UserRepo,
    cfg: &UsersConfig,
    input: UserRegister,
) -> Result<User, AccountError> {
    if !cfg.open_registration {
        return Err(AccountError::RegistrationClosed);
    }
    let user = insert_new(repo, &input.email, &input.password, input.full_name, true, false).await?;
    info!(user_id = user.id, email = %user.email, "user registered");
    Ok(user)
}

/// Superuser capability is checked by the caller.
pub async fn create_by_admin(repo: &dyn UserRepo, input: UserCreate) -> Result<User, AccountError> {
    let user = insert_new(
        repo,
        &input.email,
        &input.password,
        input.full_name,
        input.is_active,
        input.is_superuser,
    )
    .await?;
    info!(user_id = user.id, email = %user.email, superuser = user.is_superuser, "user created by admin");
    Ok(user)
}

pub async fn get(repo: &dyn UserRepo, id: i64) -> Result<User, AccountError> {
    repo.find_by_id(id)
        .await
        .map_err(AccountError::on_read)?
        .ok_or(AccountError::NotFound)
}

pub async fn list(repo: &dyn UserRepo, skip: i64, limit: i64) -> Result<(Vec<User>, i64), AccountError> {
    let users = repo
        .list(skip.max(0), limit.clamp(0, 1000))
        .await
        .map_err(AccountError::on_read)?;
    let count = repo.count().await.map_err(AccountError::on_read)?;
    Ok((users, count))
}

/// Rejects an email owned by a different user; keeping one's own email is fine.
async fn claim_email(repo: &dyn UserRepo, user: &User, raw: &str) -> Result<String, AccountError> {
    let email = normalize_email(raw)?;
    if email == user.email {
        return Ok(email);
    }
    match repo.find_by_email(&email).await.map_err(AccountError::on_read)? {
        Some(other) if other.id != user.id => Err(AccountError::EmailConflict),
        _ => Ok(email),
    }
}

pub async fn update_self(
    repo: &dyn UserRepo,
    user: &User,
    patch: UserUpdateMe,
) -> Result<User, AccountError> {
    let mut changes = UserChanges::default();
    if let Some(email) = patch.email.as_deref() {
        changes.email = Some(claim_email(repo, user, email).await?);
    }
    if let Some(full_name) = patch.full_name {
        changes.full_name = Some(validate_full_name(full_name)?);
    }
    let saved = repo
        .update_fields(user.id, changes)
        .await
        .map_err(AccountError::on_update)?;
    info!(user_id = saved.id, "user updated own profile");
    Ok(saved)
}

pub async fn update_by_admin(
    repo: &dyn UserRepo,
    id: i64,
    patch: UserUpdate,
) -> Result<User, AccountError> {
    let current = get(repo, id).await?;
    let mut changes = UserChanges {
        is_active: patch.is_active,
        is_superuser: patch.is_superuser,
        ..Default::default()
    };
    if let Some(email) = patch.email.as_deref() {
        changes.email = Some(claim_email(repo, &current, email).await?);
    }
    if let Some(full_name) = patch.full_name {
        changes.full_name = Some(validate_full_name(full_name)?);
    }
    if let Some(password) = patch.password.as_deref() {
        validate_password(password)?;
        changes.hashed_password = Some(hash_password(password)?);
    }
    let saved = repo
        .update_fields(id, changes)
        .await
        .map_err(AccountError::on_update)?;
    info!(user_id = saved.id, "user updated by admin");
    Ok(saved)
}

pub async fn change_password(
    repo: &dyn UserRepo,
    user: &User,
    current_password: &str,
    new_password: &str,
) -> Result<(), AccountError> {
    if !verify_password(current_password, &user.hashed_password) {
        return Err(AccountError::WrongPassword);
    }
    if current_password == new_password {
        return Err(AccountError::SamePassword);
    }
    validate_password(new_password)?;

    let changes = UserChanges {
        hashed_password: Some(hash_password(new_password)?),
        ..Default::default()
    };
    repo.update_fields(user.id, changes)
        .await
        .map_err(AccountError::on_update)?;
    info!(user_id = user.id, "password changed");
    Ok(())
}

pub async fn delete_self(repo: &dyn UserRepo, user: &User) -> Result<(), AccountError> {
    if user.is_superuser {
        return Err(AccountError::SuperuserSelfDelete);
    }
    repo.delete(user.id).await.map_err(AccountError::on_read)?;
    info!(user_id = user.id, "user deleted own account");
    Ok(())
}

pub async fn delete_by_admin(repo: &dyn UserRepo, id: i64) -> Result<(), AccountError> {
    repo.delete(id).await.map_err(AccountError::on_read)?;
    info!(user_id = id, "user deleted by admin");
    Ok(())
}

pub async fn authenticate(
    repo: &dyn UserRepo,
    email: &str,
    password: &str,
) -> Result<User, AccountError> {
    lazy_static! {
        // Verified against when the email is unknown so both failures cost the same.
        static ref DUMMY_HASH: String = hash_password("no-such-user-password").unwrap_or_default();
    }

    let found = match normalize_email(email) {
        Ok(email) => repo.find_by_email(&email).await.map_err(AccountError::on_read)?,
        Err(_) => None,
    };
    match found {
        Some(user) if verify_password(password, &user.hashed_password) => Ok(user),
        Some(user) => {
            warn!(user_id = user.id, "login invalid password");
            Err(AccountError::InvalidCredentials)
        }
        None => {
            let _ = verify_password(password, &DUMMY_HASH);
            warn!("login unknown email");
            Err(AccountError::InvalidCredentials)
        }
    }
}

/// Creates the configured bootstrap superuser unless its email is already taken.
pub async fn ensure_first_superuser(
    repo: &dyn UserRepo,
    su: &FirstSuperuser,
) -> Result<Option<User>, AccountError> {
    let email = normalize_email(&su.email)?;
    if repo
        .find_by_email(&email)
        .await
        .map_err(AccountError::on_read)?
        .is_some()
    {
        return Ok(None);
    }
    match insert_new(repo, &email, &su.password, su.full_name.clone(), true, true).await {
        Ok(user) => {
            info!(user_id = user.id, email = %user.email, "first superuser created");
            Ok(Some(user))
        }
        // Another instance bootstrapped it first.
        Err(AccountError::DuplicateEmail) => Ok(None),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::MemoryUserRepo;
    use async_trait::async_trait;

    /// Store whose email lookup never sees existing rows, as when another
    /// request commits between the lookup and the write.
    struct StaleLookups(MemoryUserRepo);

    #[async_trait]
    impl UserRepo for StaleLookups {
        async fn find_by_id(&self, id: i64) -> Result<Option<User>, RepoError> {
            self.0.find_by_id(id).await
        }
        async fn find_by_email(&self, _email: &str) -> Result<Option<User>, RepoError> {
            Ok(None)
        }
        async fn insert(&self, user: NewUser) -> Result<User, RepoError> {
            self.0.insert(user).await
        }
        async fn update_fields(&self, id: i64, changes: UserChanges) -> Result<User, RepoError> {
            self.0.update_fields(id, changes).await
        }
        async fn delete(&self, id: i64) -> Result<(), RepoError> {
            self.0.delete(id).await
        }
        async fn list(&self, offset: i64, limit: i64) -> Result<Vec<User>, RepoError> {
            self.0.list(offset, limit).await
        }
        async fn count(&self) -> Result<i64, RepoError> {
            self.0.count().await
        }
    }

    fn open() -> UsersConfig {
        UsersConfig {
            open_registration: true,
            first_superuser: None,
        }
    }

    fn signup(email: &str, password: &str) -> UserRegister {
        UserRegister {
            email: email.into(),
            password: password.into(),
            full_name: None,
        }
    }

    async fn superuser(repo: &MemoryUserRepo) -> User {
        create_by_admin(
            repo,
            UserCreate {
                email: "root@example.com".into(),
                password: "rootpass1".into(),
                full_name: Some("Root".into()),
                is_active: true,
                is_superuser: true,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let repo = MemoryUserRepo::new();
        let user = register(&repo, &open(), signup("bob@example.com", "password1"))
            .await
            .unwrap();
        assert!(user.is_active);
        assert!(!user.is_superuser);
        assert_ne!(user.hashed_password, "password1");

        let authed = authenticate(&repo, "bob@example.com", "password1").await.unwrap();
        assert_eq!(authed.id, user.id);
        assert_eq!(authed.email, "bob@example.com");
    }

    #[tokio::test]
    async fn register_is_gated_by_config() {
        let repo = MemoryUserRepo::new();
        let closed = UsersConfig {
            open_registration: false,
            first_superuser: None,
        };
        let err = register(&repo, &closed, signup("bob@example.com", "password1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::RegistrationClosed));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let repo = MemoryUserRepo::new();
        let first = register(&repo, &open(), signup("Alice@Example.com", "hunter2ab"))
            .await
            .unwrap();
        assert_eq!(first.email, "alice@example.com");

        let err = register(&repo, &open(), signup("  alice@EXAMPLE.com ", "otherpass"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail));

        let still = get(&repo, first.id).await.unwrap();
        assert_eq!(still, first);
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn admin_create_skips_registration_gate_but_not_uniqueness() {
        let repo = MemoryUserRepo::new();
        let root = superuser(&repo).await;
        assert!(root.is_superuser);

        let err = create_by_admin(
            &repo,
            UserCreate {
                email: "ROOT@example.com".into(),
                password: "whatever1".into(),
                full_name: None,
                is_active: true,
                is_superuser: false,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail));
    }

    #[tokio::test]
    async fn rejects_bad_input_before_touching_the_store() {
        let repo = MemoryUserRepo::new();
        for (email, password) in [
            ("not-an-email", "password1"),
            ("a@example.com", "short"),
            ("a@example.com", "x".repeat(41).as_str()),
        ] {
            let err = register(&repo, &open(), signup(email, password)).await.unwrap_err();
            assert!(matches!(err, AccountError::Validation(_)), "{email} / {password}");
        }
        let long_email = format!("{}@example.com", "a".repeat(250));
        let err = register(&repo, &open(), signup(&long_email, "password1")).await.unwrap_err();
        assert!(matches!(err, AccountError::Validation(_)));
        assert_eq!(repo.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn get_missing_user_is_not_found() {
        let repo = MemoryUserRepo::new();
        assert!(matches!(get(&repo, 99).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn update_self_applies_only_supplied_fields() {
        let repo = MemoryUserRepo::new();
        let user = register(
            &repo,
            &open(),
            UserRegister {
                email: "carol@example.com".into(),
                password: "password1".into(),
                full_name: Some("Carol".into()),
            },
        )
        .await
        .unwrap();

        let updated = update_self(
            &repo,
            &user,
            UserUpdateMe {
                email: Some("carol2@example.com".into()),
                full_name: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.email, "carol2@example.com");
        assert_eq!(updated.full_name.as_deref(), Some("Carol"));
        assert_eq!(updated.hashed_password, user.hashed_password);

        let cleared = update_self(
            &repo,
            &updated,
            UserUpdateMe {
                email: None,
                full_name: Some(None),
            },
        )
        .await
        .unwrap();
        assert_eq!(cleared.full_name, None);
        assert_eq!(cleared.email, "carol2@example.com");
    }

    #[tokio::test]
    async fn update_self_rejects_someone_elses_email() {
        let repo = MemoryUserRepo::new();
        register(&repo, &open(), signup("dave@example.com", "password1")).await.unwrap();
        let erin = register(&repo, &open(), signup("erin@example.com", "password1"))
            .await
            .unwrap();

        let err = update_self(
            &repo,
            &erin,
            UserUpdateMe {
                email: Some("DAVE@example.com".into()),
                full_name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AccountError::EmailConflict));

        // Re-submitting one's own email is not a conflict.
        let same = update_self(
            &repo,
            &erin,
            UserUpdateMe {
                email: Some("erin@example.com".into()),
                full_name: Some(Some("Erin".into())),
            },
        )
        .await
        .unwrap();
        assert_eq!(same.full_name.as_deref(), Some("Erin"));
    }

    #[tokio::test]
    async fn admin_update_hashes_password_and_sets_flags() {
        let repo = MemoryUserRepo::new();
        let user = register(&repo, &open(), signup("fay@example.com", "password1"))
            .await
            .unwrap();

        let updated = update_by_admin(
            &repo,
            user.id,
            UserUpdate {
                password: Some("brandnew99".into()),
                is_superuser: Some(true),
                is_active: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert!(updated.is_superuser);
        assert!(!updated.is_active);
        assert_eq!(updated.email, "fay@example.com");
        assert!(verify_password("brandnew99", &updated.hashed_password));
        assert!(!verify_password("password1", &updated.hashed_password));
    }

    #[tokio::test]
    async fn admin_update_of_missing_user_is_not_found() {
        let repo = MemoryUserRepo::new();
        let err = update_by_admin(&repo, 5, UserUpdate::default()).await.unwrap_err();
        assert!(matches!(err, AccountError::NotFound));
    }

    #[tokio::test]
    async fn change_password_checks_current_then_sameness() {
        let repo = MemoryUserRepo::new();
        let user = register(&repo, &open(), signup("gus@example.com", "password1"))
            .await
            .unwrap();

        let err = change_password(&repo, &user, "wrongpass", "newpass123").await.unwrap_err();
        assert!(matches!(err, AccountError::WrongPassword));

        let err = change_password(&repo, &user, "password1", "password1").await.unwrap_err();
        assert!(matches!(err, AccountError::SamePassword));

        change_password(&repo, &user, "password1", "newpass123").await.unwrap();
        assert!(authenticate(&repo, "gus@example.com", "newpass123").await.is_ok());
        assert!(matches!(
            authenticate(&repo, "gus@example.com", "password1").await,
            Err(AccountError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn same_password_wins_over_strength_rules() {
        let repo = MemoryUserRepo::new();
        // Seeded directly so the stored password is one the policy would refuse today.
        let weak = repo
            .insert(NewUser {
                email: "weak@example.com".into(),
                full_name: None,
                hashed_password: hash_password("abc").unwrap(),
                is_active: true,
                is_superuser: false,
            })
            .await
            .unwrap();
        let err = change_password(&repo, &weak, "abc", "abc").await.unwrap_err();
        assert!(matches!(err, AccountError::SamePassword));
    }

    #[tokio::test]
    async fn superuser_cannot_delete_self() {
        let repo = MemoryUserRepo::new();
        let root = superuser(&repo).await;
        let err = delete_self(&repo, &root).await.unwrap_err();
        assert!(matches!(err, AccountError::SuperuserSelfDelete));
        assert!(get(&repo, root.id).await.is_ok());
    }

    #[tokio::test]
    async fn regular_user_can_delete_self() {
        let repo = MemoryUserRepo::new();
        let user = register(&repo, &open(), signup("hal@example.com", "password1"))
            .await
            .unwrap();
        delete_self(&repo, &user).await.unwrap();
        assert!(matches!(get(&repo, user.id).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn delete_by_admin_of_missing_user_is_not_found() {
        let repo = MemoryUserRepo::new();
        assert!(matches!(delete_by_admin(&repo, 3).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn authentication_failures_are_indistinguishable() {
        let repo = MemoryUserRepo::new();
        register(&repo, &open(), signup("ivy@example.com", "password1")).await.unwrap();

        let wrong_pw = authenticate(&repo, "ivy@example.com", "nope-nope").await.unwrap_err();
        let no_user = authenticate(&repo, "nobody@example.com", "password1").await.unwrap_err();
        let garbage = authenticate(&repo, "garbage", "password1").await.unwrap_err();

        assert!(matches!(wrong_pw, AccountError::InvalidCredentials));
        assert!(matches!(no_user, AccountError::InvalidCredentials));
        assert!(matches!(garbage, AccountError::InvalidCredentials));
        assert_eq!(wrong_pw.to_string(), no_user.to_string());
    }

    #[tokio::test]
    async fn alice_lifecycle() {
        let repo = MemoryUserRepo::new();
        let alice = register(&repo, &open(), signup("alice@example.com", "hunter2ab"))
            .await
            .unwrap();
        assert_eq!(alice.id, 1);

        let err = register(&repo, &open(), signup("alice@example.com", "hunter2ab"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail));
        assert_eq!(get(&repo, 1).await.unwrap().full_name, None);

        update_self(
            &repo,
            &alice,
            UserUpdateMe {
                email: None,
                full_name: Some(Some("Alice B".into())),
            },
        )
        .await
        .unwrap();
        assert_eq!(get(&repo, 1).await.unwrap().full_name.as_deref(), Some("Alice B"));

        delete_by_admin(&repo, 1).await.unwrap();
        assert!(matches!(get(&repo, 1).await, Err(AccountError::NotFound)));
    }

    #[tokio::test]
    async fn first_superuser_is_created_once() {
        let repo = MemoryUserRepo::new();
        let su = FirstSuperuser {
            email: "admin@example.com".into(),
            password: "adminpass1".into(),
            full_name: Some("Admin".into()),
        };
        let created = ensure_first_superuser(&repo, &su).await.unwrap().expect("created");
        assert!(created.is_superuser);
        assert!(ensure_first_superuser(&repo, &su).await.unwrap().is_none());
        assert_eq!(repo.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn list_pages_and_counts() {
        let repo = MemoryUserRepo::new();
        for i in 0..3 {
            register(&repo, &open(), signup(&format!("u{i}@example.com"), "password1"))
                .await
                .unwrap();
        }
        let (page, count) = list(&repo, 1, 10).await.unwrap();
        assert_eq!(count, 3);
        assert_eq!(page.len(), 2);
    }

    #[tokio::test]
    async fn self_update_keeps_concurrent_admin_changes() {
        let repo = MemoryUserRepo::new();
        let snapshot = register(&repo, &open(), signup("jo@example.com", "password1"))
            .await
            .unwrap();
        update_by_admin(
            &repo,
            snapshot.id,
            UserUpdate {
                is_active: Some(false),
                password: Some("adminset99".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        // The caller still holds the row as it was before the admin's write.
        let saved = update_self(
            &repo,
            &snapshot,
            UserUpdateMe {
                email: None,
                full_name: Some(Some("A".into())),
            },
        )
        .await
        .unwrap();
        assert_eq!(saved.full_name.as_deref(), Some("A"));
        assert!(!saved.is_active);
        assert!(verify_password("adminset99", &saved.hashed_password));

        change_password(&repo, &snapshot, "password1", "mine-again1").await.unwrap();
        let stored = get(&repo, snapshot.id).await.unwrap();
        assert!(!stored.is_active);
        assert_eq!(stored.full_name.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn insert_race_is_reported_as_duplicate() {
        let repo = StaleLookups(MemoryUserRepo::new());
        register(&repo, &open(), signup("kim@example.com", "password1")).await.unwrap();
        let err = register(&repo, &open(), signup("KIM@example.com", "password2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AccountError::DuplicateEmail));
        assert_eq!(repo.count().await.unwrap(), 1);

        let su = FirstSuperuser {
            email: "kim@example.com".into(),
            password: "adminpass1".into(),
            full_name: None,
        };
        assert!(ensure_first_superuser(&repo, &su).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn update_race_is_reported_as_conflict() {
        let repo = StaleLookups(MemoryUserRepo::new());
        register(&repo, &open(), signup("lee@example.com", "password1")).await.unwrap();
        let max = register(&repo, &open(), signup("max@example.com", "password1"))
            .await
            .unwrap();

        let err = update_self(
            &repo,
            &max,
            UserUpdateMe {
                email: Some("lee@example.com".into()),
                full_name: None,
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AccountError::EmailConflict));

        let err = update_by_admin(
            &repo,
            max.id,
            UserUpdate {
                email: Some("lee@example.com".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AccountError::EmailConflict));
        assert_eq!(get(&repo, max.id).await.unwrap().email, "max@example.com");
    }
}
