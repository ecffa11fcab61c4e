//! User data access. Every profile read goes through [`profile_projection`]
//! so credential fields never leave this module.

use futures::TryStreamExt;
use mongodb::{
    bson::{doc, oid::ObjectId, DateTime as BsonDateTime, Document},
    options::{FindOneAndUpdateOptions, FindOneOptions, FindOptions, ReturnDocument},
};

use super::{
    models::{User, UserRecord},
    Db,
};
use crate::{
    error::{ApiError, ApiResult},
    password::{CredentialHasher, Credentials},
    session::Role,
};

pub const DUPLICATE_EMAIL: &str = "User with this email already exists";

pub fn profile_projection() -> Document {
    doc! { "passwordHash": 0, "salt": 0 }
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub role: Role,
    pub avatar: Option<String>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordChangeOutcome {
    Changed,
    IncorrectCurrent,
    NotFound,
}

pub async fn list(db: &Db) -> ApiResult<Vec<User>> {
    let options = FindOptions::builder()
        .projection(profile_projection())
        .sort(doc! { "createdAt": -1 })
        .build();
    let cursor = db
        .users()
        .find(doc! {}, options)
        .await
        .map_err(|e| ApiError::database("Failed to fetch users", e))?;
    cursor
        .try_collect()
        .await
        .map_err(|e| ApiError::database("Failed to fetch users", e))
}

pub async fn find_by_id(db: &Db, id: ObjectId) -> ApiResult<Option<User>> {
    let options = FindOneOptions::builder()
        .projection(profile_projection())
        .build();
    db.users()
        .find_one(doc! { "_id": id }, options)
        .await
        .map_err(|e| ApiError::database("Failed to fetch user", e))
}

pub async fn find_by_email(db: &Db, email: &str) -> ApiResult<Option<User>> {
    let options = FindOneOptions::builder()
        .projection(profile_projection())
        .build();
    db.users()
        .find_one(doc! { "email": normalize_email(email) }, options)
        .await
        .map_err(|e| ApiError::database("Failed to fetch user", e))
}

/// Credential-bearing lookup for the login path.
pub async fn find_record_by_email(db: &Db, email: &str) -> ApiResult<Option<UserRecord>> {
    db.user_records()
        .find_one(doc! { "email": normalize_email(email) }, None)
        .await
        .map_err(|e| ApiError::database("Failed to fetch user", e))
}

pub async fn create(db: &Db, new_user: NewUser, credentials: Credentials) -> ApiResult<User> {
    let now = BsonDateTime::now();
    let mut record = UserRecord {
        id: None,
        name: new_user.name.trim().to_string(),
        email: normalize_email(&new_user.email),
        password_hash: credentials.hash,
        salt: credentials.salt,
        role: new_user.role,
        avatar: new_user.avatar,
        is_active: new_user.is_active,
        last_login: None,
        created_at: now,
        updated_at: now,
    };

    let result = db
        .user_records()
        .insert_one(&record, None)
        .await
        .map_err(|e| ApiError::from_write(e, DUPLICATE_EMAIL, "Failed to create user"))?;
    record.id = result.inserted_id.as_object_id();

    tracing::info!(email = %record.email, role = %record.role, "user created");
    Ok(record.profile())
}

/// Apply a `$set` of allow-listed fields and return the updated profile.
pub async fn update(db: &Db, id: ObjectId, mut set: Document) -> ApiResult<Option<User>> {
    set.insert("updatedAt", BsonDateTime::now());
    let options = FindOneAndUpdateOptions::builder()
        .projection(profile_projection())
        .return_document(ReturnDocument::After)
        .build();
    db.users()
        .find_one_and_update(doc! { "_id": id }, doc! { "$set": set }, options)
        .await
        .map_err(|e| ApiError::from_write(e, DUPLICATE_EMAIL, "Failed to update user"))
}

pub async fn delete(db: &Db, id: ObjectId) -> ApiResult<bool> {
    let result = db
        .users()
        .delete_one(doc! { "_id": id }, None)
        .await
        .map_err(|e| ApiError::database("Failed to delete user", e))?;
    Ok(result.deleted_count > 0)
}

/// Add a salt and hash pair to a `$set` document.
pub fn insert_credentials(set: &mut Document, credentials: Credentials) {
    set.insert("passwordHash", credentials.hash);
    set.insert("salt", credentials.salt);
}

pub async fn set_credentials(db: &Db, id: ObjectId, credentials: Credentials) -> ApiResult<bool> {
    let mut set = doc! { "updatedAt": BsonDateTime::now() };
    insert_credentials(&mut set, credentials);
    let result = db
        .users()
        .update_one(doc! { "_id": id }, doc! { "$set": set }, None)
        .await
        .map_err(|e| ApiError::database("Failed to update password", e))?;
    Ok(result.matched_count > 0)
}

/// Re-check the current password, then store a fresh salt and hash. The
/// stored pair is untouched unless the check passes.
pub async fn change_password(
    db: &Db,
    hasher: &CredentialHasher,
    id: ObjectId,
    current_password: &str,
    new_password: &str,
) -> ApiResult<PasswordChangeOutcome> {
    let record = db
        .user_records()
        .find_one(doc! { "_id": id }, None)
        .await
        .map_err(|e| ApiError::database("Failed to fetch user", e))?;

    let Some(record) = record else {
        return Ok(PasswordChangeOutcome::NotFound);
    };

    if !hasher.verify(current_password, &record.password_hash).await {
        tracing::warn!(email = %record.email, "password change with wrong current password");
        return Ok(PasswordChangeOutcome::IncorrectCurrent);
    }

    let credentials = hasher.hash(new_password).await?;
    if !set_credentials(db, id, credentials).await? {
        return Ok(PasswordChangeOutcome::NotFound);
    }

    tracing::info!(email = %record.email, "password changed");
    Ok(PasswordChangeOutcome::Changed)
}

pub async fn touch_last_login(db: &Db, id: ObjectId) -> ApiResult<()> {
    db.users()
        .update_one(
            doc! { "_id": id },
            doc! { "$set": { "lastLogin": BsonDateTime::now() } },
            None,
        )
        .await
        .map_err(|e| ApiError::database("Failed to update last login", e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Admin@Example.COM "), "admin@example.com");
    }

    #[test]
    fn test_profile_projection_excludes_credentials() {
        let projection = profile_projection();
        assert_eq!(projection.get_i32("passwordHash").unwrap(), 0);
        assert_eq!(projection.get_i32("salt").unwrap(), 0);
        assert_eq!(projection.len(), 2);
    }
}
