//! User account actions.

use super::{ListQuery, Page, found};
use crate::config::StoreConfig;
use crate::db::{AccountStatus, Database, Review, Role, User, new_id, now_timestamp};
use crate::error::{AppError, Result};
use crate::identity::IdentityUser;
use crate::validation::{ProfileUpdate, trim_opt, validate_payload};
use std::collections::BTreeSet;

/// Get a user by local ID.
pub fn get_user(db: &Database, id: &str) -> Result<User> {
    found(db.get_user(id)?, "User", id)
}

/// Paginated user listing, filtered by name or email.
pub fn list_users(db: &Database, store: &StoreConfig, query: &ListQuery) -> Result<Page<User>> {
    let paging = query.paging(store);
    let (items, total) = db.list_users(query.text(), paging.limit, paging.offset)?;
    Ok(Page::new(items, paging, total))
}

/// Update the signed-in user's name and picture.
pub fn update_profile(db: &Database, user: &User, input: &ProfileUpdate) -> Result<User> {
    validate_payload(input)?;

    let mut updated = get_user(db, &user.id)?;
    if let Some(name) = trim_opt(&input.name) {
        updated.name = name;
    }
    if input.picture.is_some() {
        updated.picture = trim_opt(&input.picture);
    }

    db.update_user_profile(&updated)?;
    get_user(db, &user.id)
}

/// Reviews written by a user.
pub fn user_reviews(db: &Database, user_id: &str) -> Result<Vec<Review>> {
    db.get_user_reviews(user_id)
}

/// Replace a user's roles. `user` is always retained.
pub fn set_roles(db: &Database, id: &str, roles: &[Role]) -> Result<User> {
    let mut granted: BTreeSet<Role> = roles.iter().copied().collect();
    granted.insert(Role::User);

    if !db.set_user_roles(id, &granted)? {
        return Err(AppError::NotFound(format!("User '{}' not found", id)));
    }
    tracing::info!(user_id = %id, admin = granted.contains(&Role::Admin), "User roles changed");
    get_user(db, id)
}

/// Activate or suspend an account.
pub fn set_status(db: &Database, id: &str, status: AccountStatus) -> Result<User> {
    if !db.set_user_status(id, status)? {
        return Err(AppError::NotFound(format!("User '{}' not found", id)));
    }
    tracing::info!(user_id = %id, status = %status.as_str(), "User status changed");
    get_user(db, id)
}

/// Delete a user by local ID. Orders and reviews are kept.
pub fn delete_user(db: &Database, id: &str) -> Result<User> {
    let user = get_user(db, id)?;
    db.delete_user(&user.id)?;
    tracing::info!(user_id = %user.id, "User deleted");
    Ok(user)
}

/// Create the local record for a new identity-provider account.
pub fn create_user_from_identity(db: &Database, identity: &IdentityUser) -> Result<User> {
    let now = now_timestamp();
    let mut roles = BTreeSet::from([Role::User]);
    if identity.admin {
        roles.insert(Role::Admin);
    }

    let user = User {
        id: new_id(),
        external_id: identity.external_id.clone(),
        name: identity.name.clone(),
        email: identity.email.clone(),
        picture: identity.picture.clone(),
        roles,
        cart: Vec::new(),
        wishlist: Vec::new(),
        status: AccountStatus::Active,
        created_at: now,
        updated_at: now,
    };

    db.create_user(&user)?;
    tracing::info!(user_id = %user.id, external_id = %user.external_id, "User created");
    Ok(user)
}

/// Patch name, email and picture from the identity provider.
///
/// A missing local record is created.
pub fn update_user_from_identity(db: &Database, identity: &IdentityUser) -> Result<User> {
    let Some(mut user) = db.get_user_by_external_id(&identity.external_id)? else {
        tracing::info!(external_id = %identity.external_id, "Update for unknown user, creating it");
        return create_user_from_identity(db, identity);
    };

    user.name = identity.name.clone();
    user.email = identity.email.clone();
    user.picture = identity.picture.clone();
    db.update_user_profile(&user)?;

    tracing::info!(user_id = %user.id, "User updated from identity provider");
    get_user(db, &user.id)
}

/// Remove the local record of a deleted identity-provider account.
pub fn delete_user_by_external_id(db: &Database, external_id: &str) -> Result<User> {
    let user = db
        .get_user_by_external_id(external_id)?
        .ok_or_else(|| AppError::NotFound(format!("User '{}' not found", external_id)))?;

    db.delete_user(&user.id)?;
    tracing::info!(user_id = %user.id, external_id = %external_id, "User deleted");
    Ok(user)
}
