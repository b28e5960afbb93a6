//! HTTP request handlers for the storefront, account and webhook routes.

use super::extract::{Params, Payload};
use crate::actions::cart::CartSummary;
use crate::actions::catalog::BookDetail;
use crate::actions::orders::CheckoutResult;
use crate::actions::reviews::{BookReviews, VotedReview};
use crate::actions::webhook::WebhookOutcome;
use crate::actions::{self, ListQuery, Page};
use crate::db::{self, Author, Book, Order, Publisher, Review, VoteDirection};
use crate::error::{ApiResult, AppError, Result, ok};
use crate::identity::IdentityEvent;
use crate::server::AppState;
use crate::validation::{
    CartItemInput, CheckoutInput, ConfirmPaymentInput, ProfileUpdate, QuantityInput, ReviewInput,
    validate_payload,
};
use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
};
use serde::{Deserialize, Serialize};

/// Health check payload.
#[derive(Debug, Serialize)]
pub struct Health {
    status: &'static str,
    title: String,
    version: &'static str,
    books: u64,
}

/// Acknowledgement of a deletion.
#[derive(Debug, Serialize)]
pub struct Deleted {
    /// ID of the removed record.
    pub id: String,
}

/// `?limit=` for featured lists.
#[derive(Debug, Default, Deserialize)]
pub struct FeaturedQuery {
    limit: Option<u32>,
}

/// Health check.
pub async fn health(State(state): State<AppState>) -> ApiResult<Health> {
    ok(Health {
        status: "ok",
        title: state.config.server.title.clone(),
        version: env!("CARGO_PKG_VERSION"),
        books: state.db.count_books()?,
    })
}

// ============================================================================
// CATALOG
// ============================================================================

/// Book listing.
pub async fn list_books(
    State(state): State<AppState>,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<Book>> {
    ok(actions::books::list_books(&state.db, &state.config.store, &query)?)
}

/// Featured books.
pub async fn featured_books(
    State(state): State<AppState>,
    Params(query): Params<FeaturedQuery>,
) -> ApiResult<Vec<Book>> {
    ok(actions::catalog::featured_books(
        &state.db,
        &state.config.store,
        query.limit,
    )?)
}

/// Distinct categories.
pub async fn book_categories(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    ok(actions::catalog::book_categories(&state.db)?)
}

/// Book page.
pub async fn get_book(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BookDetail> {
    ok(actions::catalog::book_detail(&state.db, &id)?)
}

/// Reviews of a book.
pub async fn book_reviews(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<BookReviews> {
    ok(actions::reviews::book_reviews(&state.db, &id)?)
}

/// Author listing.
pub async fn list_authors(
    State(state): State<AppState>,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<Author>> {
    ok(actions::authors::list_authors(
        &state.db,
        &state.config.store,
        &query,
    )?)
}

/// Featured authors.
pub async fn featured_authors(
    State(state): State<AppState>,
    Params(query): Params<FeaturedQuery>,
) -> ApiResult<Vec<Author>> {
    ok(actions::catalog::featured_authors(
        &state.db,
        &state.config.store,
        query.limit,
    )?)
}

/// Author by ID.
pub async fn get_author(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Author> {
    ok(actions::authors::get_author(&state.db, &id)?)
}

/// Books by an author.
pub async fn author_books(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<Book>> {
    ok(actions::authors::books_by_author(
        &state.db,
        &state.config.store,
        &id,
        &query,
    )?)
}

/// Publisher listing.
pub async fn list_publishers(
    State(state): State<AppState>,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<Publisher>> {
    ok(actions::publishers::list_publishers(
        &state.db,
        &state.config.store,
        &query,
    )?)
}

/// Featured publishers.
pub async fn featured_publishers(
    State(state): State<AppState>,
    Params(query): Params<FeaturedQuery>,
) -> ApiResult<Vec<Publisher>> {
    ok(actions::catalog::featured_publishers(
        &state.db,
        &state.config.store,
        query.limit,
    )?)
}

/// Publisher by ID.
pub async fn get_publisher(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Publisher> {
    ok(actions::publishers::get_publisher(&state.db, &id)?)
}

/// Books by a publisher.
pub async fn publisher_books(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Params(query): Params<ListQuery>,
) -> ApiResult<Page<Book>> {
    ok(actions::publishers::books_by_publisher(
        &state.db,
        &state.config.store,
        &id,
        &query,
    )?)
}

// ============================================================================
// ACCOUNT
// ============================================================================

/// Current user.
pub async fn me(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<db::User> {
    let user = state.auth.authenticate(&headers)?;
    ok(user)
}

/// Update the current user's profile.
pub async fn update_me(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(input): Payload<ProfileUpdate>,
) -> ApiResult<db::User> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::users::update_profile(&state.db, &user, &input)?)
}

/// Reviews written by the current user.
pub async fn my_reviews(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Review>> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::users::user_reviews(&state.db, &user.id)?)
}

/// Cart with totals.
pub async fn get_cart(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<CartSummary> {
    let user = state.auth.authenticate(&headers)?;
    cart_response(&state, &user)
}

/// Empty the cart.
pub async fn clear_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CartSummary> {
    let user = state.auth.authenticate(&headers)?;
    actions::cart::clear_cart(&state.db, &user.id)?;
    cart_response(&state, &user)
}

/// Add a book to the cart.
pub async fn add_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(input): Payload<CartItemInput>,
) -> ApiResult<CartSummary> {
    let user = state.auth.authenticate(&headers)?;
    actions::cart::add_to_cart(&state.db, &user.id, &input)?;
    cart_response(&state, &user)
}

/// Change a cart line's quantity.
pub async fn update_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Payload(input): Payload<QuantityInput>,
) -> ApiResult<CartSummary> {
    let user = state.auth.authenticate(&headers)?;
    actions::cart::update_cart_quantity(&state.db, &user.id, &book_id, &input)?;
    cart_response(&state, &user)
}

/// Remove a cart line.
pub async fn remove_cart_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> ApiResult<CartSummary> {
    let user = state.auth.authenticate(&headers)?;
    actions::cart::remove_from_cart(&state.db, &user.id, &book_id)?;
    cart_response(&state, &user)
}

fn cart_response(state: &AppState, user: &db::User) -> ApiResult<CartSummary> {
    ok(actions::cart::cart_summary(
        &state.db,
        &state.config.store,
        user,
    )?)
}

/// Wishlisted books.
pub async fn get_wishlist(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Book>> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::wishlist::wishlist_books(&state.db, &user.id)?)
}

/// Add a book to the wishlist.
pub async fn add_wishlist_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> ApiResult<Vec<Book>> {
    let user = state.auth.authenticate(&headers)?;
    actions::wishlist::add_to_wishlist(&state.db, &user.id, &book_id)?;
    ok(actions::wishlist::wishlist_books(&state.db, &user.id)?)
}

/// Remove a book from the wishlist.
pub async fn remove_wishlist_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
) -> ApiResult<Vec<Book>> {
    let user = state.auth.authenticate(&headers)?;
    actions::wishlist::remove_from_wishlist(&state.db, &user.id, &book_id)?;
    ok(actions::wishlist::wishlist_books(&state.db, &user.id)?)
}

/// Move the whole wishlist into the cart.
pub async fn move_wishlist_to_cart(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<CartSummary> {
    let user = state.auth.authenticate(&headers)?;
    actions::wishlist::move_wishlist_to_cart(&state.db, &user.id)?;
    cart_response(&state, &user)
}

/// Place an order.
pub async fn checkout(
    State(state): State<AppState>,
    headers: HeaderMap,
    Payload(input): Payload<CheckoutInput>,
) -> ApiResult<CheckoutResult> {
    let user = state.auth.authenticate(&headers)?;
    let result = actions::orders::checkout(
        &state.db,
        &state.config.store,
        &state.config.payment,
        state.payments.as_ref(),
        &user,
        &input,
    )
    .await?;
    ok(result)
}

/// Current user's orders.
pub async fn list_orders(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Vec<Order>> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::orders::list_orders(&state.db, &user)?)
}

/// Order by ID.
pub async fn get_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Order> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::orders::get_order(&state.db, &user, &id)?)
}

/// Confirm payment of an order.
pub async fn confirm_order(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Payload(input): Payload<ConfirmPaymentInput>,
) -> ApiResult<Order> {
    let user = state.auth.authenticate(&headers)?;
    validate_payload(&input)?;
    let order = actions::orders::confirm_payment(
        &state.db,
        &state.config.payment,
        state.payments.as_ref(),
        &user,
        &id,
        input.payment_intent_id.trim(),
    )
    .await?;
    ok(order)
}

/// Review a book.
pub async fn create_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(book_id): Path<String>,
    Payload(input): Payload<ReviewInput>,
) -> ApiResult<Review> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::reviews::create_review(
        &state.db, &user, &book_id, &input,
    )?)
}

/// Delete a review.
pub async fn delete_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Deleted> {
    let user = state.auth.authenticate(&headers)?;
    actions::reviews::delete_review(&state.db, &user, &id)?;
    ok(Deleted { id })
}

/// Toggle an upvote.
pub async fn upvote_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<VotedReview> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::reviews::vote(
        &state.db,
        &user,
        &id,
        VoteDirection::Up,
    )?)
}

/// Toggle a downvote.
pub async fn downvote_review(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<VotedReview> {
    let user = state.auth.authenticate(&headers)?;
    ok(actions::reviews::vote(
        &state.db,
        &user,
        &id,
        VoteDirection::Down,
    )?)
}

// ============================================================================
// WEBHOOK
// ============================================================================

/// Identity-provider webhook.
pub async fn identity_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>> {
    let verifier = state
        .webhook
        .as_ref()
        .ok_or_else(|| AppError::Config("Webhook signing secret is not configured".into()))?;

    verifier.verify_headers(&headers, &body)?;
    let event = IdentityEvent::parse(&body)?;
    let outcome = actions::webhook::handle_identity_event(&state.db, event)?;

    Ok(Json(outcome))
}
