//! Admin handlers. Every route requires a session and passes the admin guard.

use super::extract::{Params, Payload};
use super::handlers::Deleted;
use crate::actions::{self, ListQuery, Page};
use crate::db::{Author, Book, Order, Publisher, StoreStats, User};
use crate::error::{ApiResult, Result, ok};
use crate::server::AppState;
use crate::validation::{
    AuthorInput, BookInput, OrderStatusInput, PaymentStatusInput, PublisherInput, RolesInput,
    StatusInput, validate_payload,
};
use axum::{
    extract::{Path, State},
    http::HeaderMap,
};

/// Authenticated user holding (or, without enforcement, standing in for) the admin role.
fn admin_user(state: &AppState, headers: &HeaderMap) -> Result<User> {
    let user = state.auth.authenticate(headers)?;
    state.auth.require_admin(&user)?;
    Ok(user)
}

/// Dashboard counters.
pub async fn stats(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<StoreStats> {
    admin_user(&state, &headers)?;
    ok(actions::orders::store_stats(&state.db)?)
}

// ============================================================================
// CATALOG
// ============================================================================

/// Create a book.
pub async fn create_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(input): Payload<BookInput>,
) -> ApiResult<Book> {
    admin_user(&state, &headers)?;
    ok(actions::books::create_book(&state.db, &input)?)
}

/// Replace a book.
pub async fn update_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<BookInput>,
) -> ApiResult<Book> {
    admin_user(&state, &headers)?;
    ok(actions::books::update_book(&state.db, &id, &input)?)
}

/// Delete a book.
pub async fn delete_book(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    admin_user(&state, &headers)?;
    actions::books::delete_book(&state.db, &id)?;
    ok(Deleted { id })
}

/// Create an author.
pub async fn create_author(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(input): Payload<AuthorInput>,
) -> ApiResult<Author> {
    admin_user(&state, &headers)?;
    ok(actions::authors::create_author(&state.db, &input)?)
}

/// Replace an author.
pub async fn update_author(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<AuthorInput>,
) -> ApiResult<Author> {
    admin_user(&state, &headers)?;
    ok(actions::authors::update_author(&state.db, &id, &input)?)
}

/// Delete an author.
pub async fn delete_author(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    admin_user(&state, &headers)?;
    actions::authors::delete_author(&state.db, &id)?;
    ok(Deleted { id })
}

/// Create a publisher.
pub async fn create_publisher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(input): Payload<PublisherInput>,
) -> ApiResult<Publisher> {
    admin_user(&state, &headers)?;
    ok(actions::publishers::create_publisher(&state.db, &input)?)
}

/// Replace a publisher.
pub async fn update_publisher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<PublisherInput>,
) -> ApiResult<Publisher> {
    admin_user(&state, &headers)?;
    ok(actions::publishers::update_publisher(
        &state.db, &id, &input,
    )?)
}

/// Delete a publisher.
pub async fn delete_publisher(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    admin_user(&state, &headers)?;
    actions::publishers::delete_publisher(&state.db, &id)?;
    ok(Deleted { id })
}

// ============================================================================
// USERS
// ============================================================================

/// User listing.
pub async fn list_users(
    State(state): State<AppState>,
    headers: HeaderMap,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<User>> {
    admin_user(&state, &headers)?;
    ok(actions::users::list_users(
        &state.db,
        &state.config.store,
        &query,
    )?)
}

/// User by ID.
pub async fn get_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<User> {
    admin_user(&state, &headers)?;
    ok(actions::users::get_user(&state.db, &id)?)
}

/// Delete a user.
pub async fn delete_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    admin_user(&state, &headers)?;
    let user = actions::users::delete_user(&state.db, &id)?;
    ok(Deleted { id: user.id })
}

/// Replace a user's roles.
pub async fn set_user_roles(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<RolesInput>,
) -> ApiResult<User> {
    admin_user(&state, &headers)?;
    validate_payload(&input)?;
    ok(actions::users::set_roles(&state.db, &id, &input.roles)?)
}

/// Activate or suspend a user.
pub async fn set_user_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<StatusInput>,
) -> ApiResult<User> {
    admin_user(&state, &headers)?;
    ok(actions::users::set_status(&state.db, &id, input.status)?)
}

// ============================================================================
// ORDERS
// ============================================================================

/// Every order.
pub async fn list_orders(
    State(state): State<AppState>,
    headers: HeaderMap,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<Order>> {
    admin_user(&state, &headers)?;
    ok(actions::orders::list_all_orders(
        &state.db,
        &state.config.store,
        &query,
    )?)
}

/// Change fulfillment status.
pub async fn update_order_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<OrderStatusInput>,
) -> ApiResult<Order> {
    admin_user(&state, &headers)?;
    ok(actions::orders::update_order_status(
        &state.db, &id, &input,
    )?)
}

/// Change payment status.
pub async fn update_payment_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<PaymentStatusInput>,
) -> ApiResult<Order> {
    admin_user(&state, &headers)?;
    ok(actions::orders::update_payment_status(
        &state.db, &id, &input,
    )?)
}
