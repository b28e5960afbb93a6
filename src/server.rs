//! HTTP server and routes.

mod admin;
mod extract;
mod handlers;
mod state;

pub use state::AppState;

use axum::{
    Router,
    routing::{delete, get, post, put},
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Create the application router.
pub fn create_router(state: AppState) -> Router {
    let catalog_routes = Router::new()
        .route("/books", get(handlers::list_books))
        .route("/books/featured", get(handlers::featured_books))
        .route("/books/categories", get(handlers::book_categories))
        .route("/books/{id}", get(handlers::get_book))
        .route(
            "/books/{id}/reviews",
            get(handlers::book_reviews).post(handlers::create_review),
        )
        .route("/authors", get(handlers::list_authors))
        .route("/authors/featured", get(handlers::featured_authors))
        .route("/authors/{id}", get(handlers::get_author))
        .route("/authors/{id}/books", get(handlers::author_books))
        .route("/publishers", get(handlers::list_publishers))
        .route("/publishers/featured", get(handlers::featured_publishers))
        .route("/publishers/{id}", get(handlers::get_publisher))
        .route("/publishers/{id}/books", get(handlers::publisher_books));

    let account_routes = Router::new()
        .route("/me", get(handlers::me).put(handlers::update_me))
        .route("/me/reviews", get(handlers::my_reviews))
        // Cart
        .route("/cart", get(handlers::get_cart).delete(handlers::clear_cart))
        .route("/cart/items", post(handlers::add_cart_item))
        .route(
            "/cart/items/{book_id}",
            put(handlers::update_cart_item).delete(handlers::remove_cart_item),
        )
        // Wishlist
        .route("/wishlist", get(handlers::get_wishlist))
        .route("/wishlist/move-to-cart", post(handlers::move_wishlist_to_cart))
        .route(
            "/wishlist/{book_id}",
            post(handlers::add_wishlist_item).delete(handlers::remove_wishlist_item),
        )
        // Orders
        .route("/checkout", post(handlers::checkout))
        .route("/orders", get(handlers::list_orders))
        .route("/orders/{id}", get(handlers::get_order))
        .route("/orders/{id}/confirm", post(handlers::confirm_order))
        // Reviews
        .route("/reviews/{id}", delete(handlers::delete_review))
        .route("/reviews/{id}/upvote", post(handlers::upvote_review))
        .route("/reviews/{id}/downvote", post(handlers::downvote_review));

    let admin_routes = Router::new()
        .route("/stats", get(admin::stats))
        .route("/books", post(admin::create_book))
        .route(
            "/books/{id}",
            put(admin::update_book).delete(admin::delete_book),
        )
        .route("/authors", post(admin::create_author))
        .route(
            "/authors/{id}",
            put(admin::update_author).delete(admin::delete_author),
        )
        .route("/publishers", post(admin::create_publisher))
        .route(
            "/publishers/{id}",
            put(admin::update_publisher).delete(admin::delete_publisher),
        )
        .route("/users", get(admin::list_users))
        .route(
            "/users/{id}",
            get(admin::get_user).delete(admin::delete_user),
        )
        .route("/users/{id}/roles", put(admin::set_user_roles))
        .route("/users/{id}/status", put(admin::set_user_status))
        .route("/orders", get(admin::list_orders))
        .route("/orders/{id}/status", put(admin::update_order_status))
        .route(
            "/orders/{id}/payment-status",
            put(admin::update_payment_status),
        );

    let api_routes = Router::new()
        .route("/health", get(handlers::health))
        .route("/webhook", post(handlers::identity_webhook))
        .merge(catalog_routes)
        .merge(account_routes)
        .nest("/admin", admin_routes);

    Router::new()
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
