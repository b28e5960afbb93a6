use crate::actions::{self, ListQuery};
use crate::auth::SessionClaims;
use crate::config::{Config, StoreConfig};
use crate::db::{
    AccountStatus, Author, Book, Database, OrderStatus, PaymentStatus, Publisher, Role, User,
    VoteDirection, new_id, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::identity::{IdentityEvent, IdentityUser, WebhookVerifier};
use crate::payment::{PaymentGateway, PaymentIntent, STATUS_SUCCEEDED};
use crate::server::{AppState, create_router};
use crate::validation::{
    AuthorInput, BookInput, CartItemInput, CheckoutInput, OrderStatusInput, PaymentStatusInput,
    ProfileUpdate, PublisherInput, QuantityInput, ReviewInput,
};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tower::ServiceExt;

const JWT_SECRET: &str = "test-session-secret-with-enough-bytes";
// base64("test-webhook-signing-key")
const WEBHOOK_SECRET: &str = "whsec_dGVzdC13ZWJob29rLXNpZ25pbmcta2V5";

fn test_db() -> Database {
    Database::open_memory().unwrap()
}

fn from_json<T: DeserializeOwned>(value: Value) -> T {
    serde_json::from_value(value).unwrap()
}

fn create_author(db: &Database, name: &str) -> Author {
    let input: AuthorInput = from_json(json!({ "name": name, "genres": ["Fiction"] }));
    actions::authors::create_author(db, &input).unwrap()
}

fn create_publisher(db: &Database, name: &str) -> Publisher {
    let input: PublisherInput = from_json(json!({ "name": name }));
    actions::publishers::create_publisher(db, &input).unwrap()
}

fn book_input(title: &str, isbn: &str, price: i64, stock: i64, author: &str, publisher: &str) -> BookInput {
    from_json(json!({
        "title": title,
        "price": price,
        "isbn": isbn,
        "stock": stock,
        "author_id": author,
        "publisher_id": publisher,
        "categories": ["Fiction"],
    }))
}

fn create_book(db: &Database, title: &str, isbn: &str, price: i64, stock: i64) -> Book {
    let author = create_author(db, &format!("Author of {}", title));
    let publisher = create_publisher(db, &format!("Publisher of {}", title));
    let input = book_input(title, isbn, price, stock, &author.id, &publisher.id);
    actions::books::create_book(db, &input).unwrap()
}

fn create_user(db: &Database, external_id: &str, roles: &[Role]) -> User {
    let now = now_timestamp();
    let user = User {
        id: new_id(),
        external_id: external_id.to_string(),
        name: "Grace".to_string(),
        email: format!("{}@example.com", external_id),
        picture: None,
        roles: roles.iter().copied().collect::<BTreeSet<_>>(),
        cart: Vec::new(),
        wishlist: Vec::new(),
        status: AccountStatus::Active,
        created_at: now,
        updated_at: now,
    };
    db.create_user(&user).unwrap();
    user
}

fn checkout_input(items: Value) -> CheckoutInput {
    from_json(json!({
        "items": items,
        "shipping_address": {
            "name": "Grace Hopper",
            "line1": "1 Main St",
            "city": "Arlington",
            "postal_code": "22201",
            "country": "us"
        }
    }))
}

/// In-memory payment processor.
#[derive(Default)]
struct MockGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
}

impl MockGateway {
    fn succeed(&self, intent_id: &str) {
        if let Some(intent) = self.intents.lock().get_mut(intent_id) {
            intent.status = STATUS_SUCCEEDED.to_string();
        }
    }

    fn set_amount(&self, intent_id: &str, amount: i64) {
        if let Some(intent) = self.intents.lock().get_mut(intent_id) {
            intent.amount = amount;
        }
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_intent(&self, amount: i64, currency: &str, order_id: &str) -> Result<PaymentIntent> {
        let id = format!("pi_{}", new_id().replace('-', ""));
        let intent = PaymentIntent {
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            status: "requires_payment_method".to_string(),
            client_secret: Some(format!("{}_secret", id)),
            metadata: HashMap::from([("order_id".to_string(), order_id.to_string())]),
        };
        self.intents.lock().insert(id, intent.clone());
        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent> {
        // Let concurrent confirmations interleave at the network boundary.
        tokio::task::yield_now().await;
        self.intents
            .lock()
            .get(intent_id)
            .cloned()
            .ok_or_else(|| AppError::Payment(format!("No such payment_intent: {}", intent_id)))
    }
}

// ============================================================================
// CATALOG
// ============================================================================

#[test]
fn catalog_create_and_get_book() {
    let db = test_db();
    let book = create_book(&db, "Dune", "9780306406157", 1999, 5);

    let stored = actions::books::get_book(&db, &book.id).unwrap();
    assert_eq!(stored, book);

    let detail = actions::catalog::book_detail(&db, &book.id).unwrap();
    assert_eq!(detail.author.unwrap().id, book.author_id);
    assert_eq!(detail.publisher.unwrap().id, book.publisher_id);
    assert_eq!(detail.rating.count, 0);
}

#[test]
fn catalog_stored_records_match_payload() {
    let db = test_db();
    let author_input: AuthorInput = from_json(json!({
        "name": "Ursula K. Le Guin",
        "biography": "  Wrote Earthsea.\n",
        "images": ["https://img.example.com/ukl.jpg"],
        "birth_date": "1929-10-21",
        "birth_place": "Berkeley",
        "website": "https://ursulakleguin.com",
        "genres": ["Fantasy", "Science Fiction"],
        "awards": [{ "name": "Hugo", "year": 1970 }],
        "featured": true
    }));
    let author = actions::authors::create_author(&db, &author_input).unwrap();
    let stored_author = actions::authors::get_author(&db, &author.id).unwrap();
    assert_eq!(stored_author.name, author_input.name);
    assert_eq!(stored_author.biography, author_input.biography);
    assert_eq!(stored_author.images, author_input.images);
    assert_eq!(stored_author.birth_date, author_input.birth_date);
    assert_eq!(stored_author.birth_place, author_input.birth_place);
    assert_eq!(stored_author.website, author_input.website);
    assert_eq!(stored_author.genres, author_input.genres);
    assert_eq!(stored_author.awards.len(), 1);
    assert_eq!(stored_author.awards[0].name, "Hugo");
    assert_eq!(stored_author.awards[0].year, Some(1970));
    assert!(stored_author.featured);

    let publisher_input: PublisherInput = from_json(json!({
        "name": "Ace Books",
        "description": "Paperbacks",
        "founded_year": 1952,
        "headquarters": "New York",
        "phone": "+1 212 555 0100",
        "imprints": ["Ace", "Ace Science Fiction"]
    }));
    let publisher = actions::publishers::create_publisher(&db, &publisher_input).unwrap();
    let stored_publisher = actions::publishers::get_publisher(&db, &publisher.id).unwrap();
    assert_eq!(stored_publisher.name, publisher_input.name);
    assert_eq!(stored_publisher.description, publisher_input.description);
    assert_eq!(stored_publisher.founded_year, publisher_input.founded_year);
    assert_eq!(stored_publisher.headquarters, publisher_input.headquarters);
    assert_eq!(stored_publisher.phone, publisher_input.phone);
    assert_eq!(stored_publisher.imprints, publisher_input.imprints);

    let book_input: BookInput = from_json(json!({
        "title": "The Left Hand of Darkness",
        "description": "Gethen, in winter. ",
        "cover_image": "https://img.example.com/lhod.jpg",
        "price": 1599,
        "isbn": "080442957X",
        "publish_date": "1969-03-01",
        "page_count": 304,
        "language": "English",
        "stock": 7,
        "featured": true,
        "author_id": author.id,
        "publisher_id": publisher.id,
        "categories": ["Science Fiction", "Classics"]
    }));
    let book = actions::books::create_book(&db, &book_input).unwrap();
    let stored = actions::books::get_book(&db, &book.id).unwrap();
    assert_eq!(stored.title, book_input.title);
    assert_eq!(stored.description, book_input.description);
    assert_eq!(stored.cover_image, book_input.cover_image);
    assert_eq!(stored.price, book_input.price);
    assert_eq!(stored.isbn, book_input.isbn);
    assert_eq!(stored.publish_date, book_input.publish_date);
    assert_eq!(stored.page_count, book_input.page_count);
    assert_eq!(stored.language, book_input.language);
    assert_eq!(stored.stock, book_input.stock);
    assert_eq!(stored.featured, book_input.featured);
    assert_eq!(stored.author_id, book_input.author_id);
    assert_eq!(stored.publisher_id, book_input.publisher_id);
    assert_eq!(stored.categories, book_input.categories);
}

#[test]
fn catalog_rejects_input_that_would_be_stored_differently() {
    let db = test_db();
    let author = create_author(&db, "Frank Herbert");
    let publisher = create_publisher(&db, "Chilton");

    let hyphenated = book_input("Dune", "978-0-306-40615-7", 100, 1, &author.id, &publisher.id);
    let lowercase_x = book_input("Dune", "080442957x", 100, 1, &author.id, &publisher.id);
    let padded_title = book_input(" Dune ", "9780306406157", 100, 1, &author.id, &publisher.id);
    let mut duplicate_tags = book_input("Dune", "9780306406157", 100, 1, &author.id, &publisher.id);
    duplicate_tags.categories = vec!["SciFi".into(), "scifi".into()];
    let mut padded_tag = book_input("Dune", "9780306406157", 100, 1, &author.id, &publisher.id);
    padded_tag.categories = vec![" SciFi".into()];

    for input in [hyphenated, lowercase_x, padded_title, duplicate_tags, padded_tag] {
        let err = actions::books::create_book(&db, &input).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
    }

    let padded_author: AuthorInput = from_json(json!({ "name": "Frank Herbert " }));
    assert!(matches!(
        actions::authors::create_author(&db, &padded_author),
        Err(AppError::Validation(_))
    ));
    let blank_imprint: PublisherInput = from_json(json!({ "name": "Ace", "imprints": ["Ace", ""] }));
    assert!(matches!(
        actions::publishers::create_publisher(&db, &blank_imprint),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn catalog_invalid_book_is_not_stored() {
    let db = test_db();
    let author = create_author(&db, "Frank Herbert");
    let publisher = create_publisher(&db, "Chilton");

    let bad_price = book_input("Dune", "9780306406157", -1, 1, &author.id, &publisher.id);
    let bad_isbn = book_input("Dune", "9780306406158", 100, 1, &author.id, &publisher.id);
    let missing_author = book_input("Dune", "9780306406157", 100, 1, "nope", &publisher.id);

    for input in [bad_price, bad_isbn, missing_author] {
        let err = actions::books::create_book(&db, &input).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)), "{:?}", err);
    }

    let page = actions::books::list_books(&db, &StoreConfig::default(), &ListQuery::default()).unwrap();
    assert_eq!(page.total, 0);
}

#[test]
fn catalog_duplicate_isbn_conflicts() {
    let db = test_db();
    let book = create_book(&db, "Dune", "9780306406157", 1999, 5);
    let input = book_input("Dune Again", "9780306406157", 999, 1, &book.author_id, &book.publisher_id);

    assert!(matches!(
        actions::books::create_book(&db, &input),
        Err(AppError::Conflict(_))
    ));
}

#[test]
fn catalog_list_filters_and_sorts() {
    let db = test_db();
    let cheap = create_book(&db, "Alpha", "9780306406157", 500, 1);
    let pricey = create_book(&db, "Beta", "9781861972712", 2500, 1);
    let store = StoreConfig::default();

    let query = ListQuery {
        sort: Some("price".into()),
        order: Some("desc".into()),
        ..Default::default()
    };
    let page = actions::books::list_books(&db, &store, &query).unwrap();
    let ids: Vec<&str> = page.items.iter().map(|b| b.id.as_str()).collect();
    assert_eq!(ids, vec![pricey.id.as_str(), cheap.id.as_str()]);

    let query = ListQuery {
        author_id: Some(cheap.author_id.clone()),
        ..Default::default()
    };
    let page = actions::books::list_books(&db, &store, &query).unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].id, cheap.id);

    let query = ListQuery {
        sort: Some("password".into()),
        ..Default::default()
    };
    assert!(matches!(
        actions::books::list_books(&db, &store, &query),
        Err(AppError::Validation(_))
    ));
}

#[test]
fn catalog_categories_and_titles_ignore_case() {
    let db = test_db();
    let store = StoreConfig::default();
    let author = create_author(&db, "Various");
    let publisher = create_publisher(&db, "Orchard");

    for (title, isbn, category) in [
        ("cherry", "9780306406157", "fantasy"),
        ("Banana", "9781861972712", "Fantasy"),
        ("apple", "080442957X", "Horror"),
    ] {
        let mut input = book_input(title, isbn, 999, 1, &author.id, &publisher.id);
        input.categories = vec![category.into()];
        actions::books::create_book(&db, &input).unwrap();
    }

    assert_eq!(
        actions::catalog::book_categories(&db).unwrap(),
        vec!["Fantasy", "Horror"]
    );

    let query = ListQuery {
        sort: Some("title".into()),
        order: Some("asc".into()),
        ..Default::default()
    };
    let titles: Vec<String> = actions::books::list_books(&db, &store, &query)
        .unwrap()
        .items
        .into_iter()
        .map(|b| b.title)
        .collect();
    assert_eq!(titles, vec!["apple", "Banana", "cherry"]);
}

#[test]
fn catalog_author_with_books_cannot_be_deleted() {
    let db = test_db();
    let book = create_book(&db, "Dune", "9780306406157", 1999, 5);

    assert!(matches!(
        actions::authors::delete_author(&db, &book.author_id),
        Err(AppError::Conflict(_))
    ));

    actions::books::delete_book(&db, &book.id).unwrap();
    actions::authors::delete_author(&db, &book.author_id).unwrap();
    assert!(matches!(
        actions::authors::get_author(&db, &book.author_id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn catalog_publisher_with_books_cannot_be_deleted() {
    let db = test_db();
    let book = create_book(&db, "Dune", "9780306406157", 1999, 5);

    assert!(matches!(
        actions::publishers::delete_publisher(&db, &book.publisher_id),
        Err(AppError::Conflict(_))
    ));
    assert!(actions::publishers::get_publisher(&db, &book.publisher_id).is_ok());

    actions::books::delete_book(&db, &book.id).unwrap();
    actions::publishers::delete_publisher(&db, &book.publisher_id).unwrap();
    assert!(matches!(
        actions::publishers::get_publisher(&db, &book.publisher_id),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn catalog_featured_listings() {
    let db = test_db();
    let store = StoreConfig::default();
    let author = create_author(&db, "Frank Herbert");
    let publisher = create_publisher(&db, "Chilton");

    let mut featured_ids = Vec::new();
    for (title, isbn, featured) in [
        ("Dune", "9780306406157", true),
        ("Dune Messiah", "9781861972712", false),
        ("Children of Dune", "080442957X", true),
    ] {
        let mut input = book_input(title, isbn, 999, 1, &author.id, &publisher.id);
        input.featured = featured;
        let book = actions::books::create_book(&db, &input).unwrap();
        if featured {
            featured_ids.push(book.id);
        }
    }

    let books = actions::catalog::featured_books(&db, &store, None).unwrap();
    let mut ids: Vec<String> = books.into_iter().map(|b| b.id).collect();
    ids.sort();
    featured_ids.sort();
    assert_eq!(ids, featured_ids);
    assert_eq!(actions::catalog::featured_books(&db, &store, Some(1)).unwrap().len(), 1);

    for (name, featured) in [("Zadie Smith", true), ("Anne Rice", true), ("Bram Stoker", false)] {
        let input: AuthorInput = from_json(json!({ "name": name, "featured": featured }));
        actions::authors::create_author(&db, &input).unwrap();
    }
    let names: Vec<String> = actions::catalog::featured_authors(&db, &store, None)
        .unwrap()
        .into_iter()
        .map(|a| a.name)
        .collect();
    assert_eq!(names, vec!["Anne Rice", "Zadie Smith"]);

    for (name, featured) in [("Tor", true), ("Ace", true), ("Baen", false)] {
        let input: PublisherInput = from_json(json!({ "name": name, "featured": featured }));
        actions::publishers::create_publisher(&db, &input).unwrap();
    }
    let names: Vec<String> = actions::catalog::featured_publishers(&db, &store, None)
        .unwrap()
        .into_iter()
        .map(|p| p.name)
        .collect();
    assert_eq!(names, vec!["Ace", "Tor"]);
}

// ============================================================================
// CART AND WISHLIST
// ============================================================================

#[test]
fn cart_add_merges_quantities() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

    let input: CartItemInput = from_json(json!({ "book_id": book.id, "quantity": 2 }));
    actions::cart::add_to_cart(&db, &user.id, &input).unwrap();
    let cart = actions::cart::add_to_cart(&db, &user.id, &input).unwrap();

    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity, 4);
}

#[test]
fn cart_rejects_non_positive_quantity_without_writing() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

    let input: CartItemInput = from_json(json!({ "book_id": book.id, "quantity": 3 }));
    actions::cart::add_to_cart(&db, &user.id, &input).unwrap();

    for quantity in [0, -2] {
        let update = QuantityInput { quantity };
        let err = actions::cart::update_cart_quantity(&db, &user.id, &book.id, &update).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    let stored = db.get_user(&user.id).unwrap().unwrap();
    assert_eq!(stored.cart[0].quantity, 3);
}

#[test]
fn cart_summary_applies_pricing() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

    let input: CartItemInput = from_json(json!({ "book_id": book.id, "quantity": 2 }));
    actions::cart::add_to_cart(&db, &user.id, &input).unwrap();

    let summary = actions::cart::cart_summary(&db, &StoreConfig::default(), &user).unwrap();
    assert_eq!(summary.item_count, 2);
    assert_eq!(summary.items[0].line_total, 2000);
    assert_eq!(summary.totals.shipping, 599);
    assert_eq!(summary.totals.tax, 160);
    assert_eq!(summary.totals.total, 2759);
}

#[test]
fn wishlist_add_is_idempotent_and_moves_to_cart() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

    actions::wishlist::add_to_wishlist(&db, &user.id, &book.id).unwrap();
    let wishlist = actions::wishlist::add_to_wishlist(&db, &user.id, &book.id).unwrap();
    assert_eq!(wishlist, vec![book.id.clone()]);

    let cart = actions::wishlist::move_wishlist_to_cart(&db, &user.id).unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity, 1);

    let stored = db.get_user(&user.id).unwrap().unwrap();
    assert!(stored.wishlist.is_empty());
}

// ============================================================================
// REVIEWS
// ============================================================================

#[test]
fn reviews_one_per_user_and_vote_toggle() {
    let db = test_db();
    let author = create_user(&db, "user_1", &[Role::User]);
    let voter = create_user(&db, "user_2", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

    let input = ReviewInput {
        rating: 5,
        content: "A classic".into(),
    };
    let review = actions::reviews::create_review(&db, &author, &book.id, &input).unwrap();
    assert!(matches!(
        actions::reviews::create_review(&db, &author, &book.id, &input),
        Err(AppError::Conflict(_))
    ));

    let up = actions::reviews::vote(&db, &voter, &review.id, VoteDirection::Up).unwrap();
    assert_eq!((up.review.upvotes(), up.review.downvotes()), (1, 0));
    assert_eq!(up.my_vote, Some(VoteDirection::Up));

    let switched = actions::reviews::vote(&db, &voter, &review.id, VoteDirection::Down).unwrap();
    assert_eq!((switched.review.upvotes(), switched.review.downvotes()), (0, 1));
    assert_eq!(switched.my_vote, Some(VoteDirection::Down));

    let cleared = actions::reviews::vote(&db, &voter, &review.id, VoteDirection::Down).unwrap();
    assert_eq!((cleared.review.upvotes(), cleared.review.downvotes()), (0, 0));
    assert_eq!(cleared.my_vote, None);

    assert!(matches!(
        actions::reviews::delete_review(&db, &voter, &review.id),
        Err(AppError::Forbidden(_))
    ));
    actions::reviews::delete_review(&db, &author, &review.id).unwrap();
}

// ============================================================================
// ORDERS
// ============================================================================

#[test]
fn checkout_and_confirm_payment() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

        let item: CartItemInput = from_json(json!({ "book_id": book.id, "quantity": 2 }));
        actions::cart::add_to_cart(&db, &user.id, &item).unwrap();

        let result = actions::orders::checkout(
            &db,
            &config.store,
            &config.payment,
            &gateway,
            &user,
            &checkout_input(json!([])),
        )
        .await
        .unwrap();

        let order = result.order;
        assert_eq!(order.subtotal, 2000);
        assert_eq!(order.shipping, 599);
        assert_eq!(order.tax, 160);
        assert_eq!(order.total, 2759);
        assert_eq!(order.status, OrderStatus::Processing);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert!(order.order_number.starts_with("BK-"));
        assert!(result.client_secret.is_some());

        let intent_id = order.payment_intent_id.clone().unwrap();
        gateway.succeed(&intent_id);

        let paid = actions::orders::confirm_payment(
            &db,
            &config.payment,
            &gateway,
            &user,
            &order.id,
            &intent_id,
        )
        .await
        .unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.timeline.last().unwrap().label, "Payment received");

        assert_eq!(actions::books::get_book(&db, &book.id).unwrap().stock, 3);
        assert!(db.get_user(&user.id).unwrap().unwrap().cart.is_empty());

        // Confirming again leaves the order and stock alone.
        let again = actions::orders::confirm_payment(
            &db,
            &config.payment,
            &gateway,
            &user,
            &order.id,
            &intent_id,
        )
        .await
        .unwrap();
        assert_eq!(again.timeline.len(), paid.timeline.len());
        assert_eq!(actions::books::get_book(&db, &book.id).unwrap().stock, 3);
    });
}

#[test]
fn concurrent_confirmations_apply_payment_once() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

        let order = actions::orders::checkout(
            &db,
            &config.store,
            &config.payment,
            &gateway,
            &user,
            &checkout_input(json!([{ "book_id": book.id, "quantity": 2 }])),
        )
        .await
        .unwrap()
        .order;
        let intent_id = order.payment_intent_id.clone().unwrap();
        gateway.succeed(&intent_id);

        let (first, second) = tokio::join!(
            actions::orders::confirm_payment(&db, &config.payment, &gateway, &user, &order.id, &intent_id),
            actions::orders::confirm_payment(&db, &config.payment, &gateway, &user, &order.id, &intent_id),
        );
        assert_eq!(first.unwrap().payment_status, PaymentStatus::Paid);
        assert_eq!(second.unwrap().payment_status, PaymentStatus::Paid);

        assert_eq!(actions::books::get_book(&db, &book.id).unwrap().stock, 3);
        let stored = db.get_order(&order.id).unwrap().unwrap();
        let receipts = stored
            .timeline
            .iter()
            .filter(|e| e.label == "Payment received")
            .count();
        assert_eq!(receipts, 1);
    });
}

#[test]
fn confirm_payment_rejects_amount_mismatch() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

        let result = actions::orders::checkout(
            &db,
            &config.store,
            &config.payment,
            &gateway,
            &user,
            &checkout_input(json!([{ "book_id": book.id, "quantity": 1 }])),
        )
        .await
        .unwrap();

        let intent_id = result.order.payment_intent_id.clone().unwrap();
        gateway.succeed(&intent_id);
        gateway.set_amount(&intent_id, 1);

        let err = actions::orders::confirm_payment(
            &db,
            &config.payment,
            &gateway,
            &user,
            &result.order.id,
            &intent_id,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Payment(_)));

        let stored = db.get_order(&result.order.id).unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(actions::books::get_book(&db, &book.id).unwrap().stock, 5);
    });
}

#[test]
fn checkout_rejects_insufficient_stock() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 1000, 1);

        let err = actions::orders::checkout(
            &db,
            &config.store,
            &config.payment,
            &gateway,
            &user,
            &checkout_input(json!([{ "book_id": book.id, "quantity": 2 }])),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(db.get_user_orders(&user.id).unwrap().is_empty());
    });
}

#[test]
fn orders_status_transitions() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let other = create_user(&db, "user_2", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 6000, 5);

        let order = actions::orders::checkout(
            &db,
            &config.store,
            &config.payment,
            &gateway,
            &user,
            &checkout_input(json!([{ "book_id": book.id, "quantity": 1 }])),
        )
        .await
        .unwrap()
        .order;
        assert_eq!(order.shipping, 0);

        assert!(matches!(
            actions::orders::get_order(&db, &other, &order.id),
            Err(AppError::NotFound(_))
        ));

        let delivered = OrderStatusInput {
            status: OrderStatus::Delivered,
            note: None,
        };
        assert!(matches!(
            actions::orders::update_order_status(&db, &order.id, &delivered),
            Err(AppError::Conflict(_))
        ));

        let shipped = OrderStatusInput {
            status: OrderStatus::Shipped,
            note: Some("  UPS 1Z999  ".into()),
        };
        let updated = actions::orders::update_order_status(&db, &order.id, &shipped).unwrap();
        assert_eq!(updated.status, OrderStatus::Shipped);
        let event = updated.timeline.last().unwrap();
        assert_eq!(event.label, "Shipped");
        assert_eq!(event.note.as_deref(), Some("UPS 1Z999"));

        let updated = actions::orders::update_order_status(&db, &order.id, &delivered).unwrap();
        assert_eq!(updated.status, OrderStatus::Delivered);
    });
}

#[test]
fn orders_payment_status_transitions() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

        let order = actions::orders::checkout(
            &db,
            &config.store,
            &config.payment,
            &gateway,
            &user,
            &checkout_input(json!([{ "book_id": book.id, "quantity": 1 }])),
        )
        .await
        .unwrap()
        .order;

        let to = |payment_status| PaymentStatusInput {
            payment_status,
            note: None,
        };

        assert!(matches!(
            actions::orders::update_payment_status(&db, &order.id, &to(PaymentStatus::Refunded)),
            Err(AppError::Conflict(_))
        ));

        let paid = actions::orders::update_payment_status(&db, &order.id, &to(PaymentStatus::Paid)).unwrap();
        assert_eq!(paid.payment_status, PaymentStatus::Paid);
        assert_eq!(paid.timeline.last().unwrap().label, "Payment received");

        let refunded =
            actions::orders::update_payment_status(&db, &order.id, &to(PaymentStatus::Refunded)).unwrap();
        assert_eq!(refunded.payment_status, PaymentStatus::Refunded);
        assert_eq!(refunded.timeline.last().unwrap().label, "Payment refunded");

        assert!(matches!(
            actions::orders::update_payment_status(&db, &order.id, &to(PaymentStatus::Paid)),
            Err(AppError::Conflict(_))
        ));
        let stored = db.get_order(&order.id).unwrap().unwrap();
        assert_eq!(stored.payment_status, PaymentStatus::Refunded);
    });
}

#[test]
fn orders_admin_list_filters_by_status() {
    tokio_test::block_on(async {
        let db = test_db();
        let config = Config::default();
        let gateway = MockGateway::default();
        let user = create_user(&db, "user_1", &[Role::User]);
        let book = create_book(&db, "Dune", "9780306406157", 1000, 5);

        let mut orders = Vec::new();
        for _ in 0..2 {
            let result = actions::orders::checkout(
                &db,
                &config.store,
                &config.payment,
                &gateway,
                &user,
                &checkout_input(json!([{ "book_id": book.id, "quantity": 1 }])),
            )
            .await
            .unwrap();
            orders.push(result.order);
        }

        let shipped = OrderStatusInput {
            status: OrderStatus::Shipped,
            note: None,
        };
        actions::orders::update_order_status(&db, &orders[0].id, &shipped).unwrap();

        let by_status = |status: Option<&str>| ListQuery {
            status: status.map(str::to_string),
            ..Default::default()
        };

        let page = actions::orders::list_all_orders(&db, &config.store, &by_status(Some("shipped"))).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, orders[0].id);

        let page =
            actions::orders::list_all_orders(&db, &config.store, &by_status(Some("processing"))).unwrap();
        assert_eq!(page.total, 1);
        assert_eq!(page.items[0].id, orders[1].id);

        let page = actions::orders::list_all_orders(&db, &config.store, &by_status(None)).unwrap();
        assert_eq!(page.total, 2);

        assert!(matches!(
            actions::orders::list_all_orders(&db, &config.store, &by_status(Some("lost"))),
            Err(AppError::Validation(_))
        ));
    });
}

// ============================================================================
// USERS
// ============================================================================

#[test]
fn users_set_roles_keeps_user_role() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);

    let promoted = actions::users::set_roles(&db, &user.id, &[Role::Admin]).unwrap();
    assert_eq!(promoted.roles, BTreeSet::from([Role::User, Role::Admin]));

    let demoted = actions::users::set_roles(&db, &user.id, &[Role::User]).unwrap();
    assert_eq!(demoted.roles, BTreeSet::from([Role::User]));

    assert!(matches!(
        actions::users::set_roles(&db, "missing", &[Role::Admin]),
        Err(AppError::NotFound(_))
    ));
}

#[test]
fn users_update_profile() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);

    let update = ProfileUpdate {
        name: Some("Ada Lovelace".into()),
        picture: Some("https://img.example.com/ada.png".into()),
    };
    let updated = actions::users::update_profile(&db, &user, &update).unwrap();
    assert_eq!(updated.name, "Ada Lovelace");
    assert_eq!(updated.picture.as_deref(), Some("https://img.example.com/ada.png"));
    assert_eq!(updated.email, user.email);

    let unchanged = ProfileUpdate {
        name: None,
        picture: None,
    };
    let kept = actions::users::update_profile(&db, &user, &unchanged).unwrap();
    assert_eq!(kept.name, "Ada Lovelace");
    assert_eq!(kept.picture, updated.picture);

    let bad_picture = ProfileUpdate {
        name: None,
        picture: Some("not a url".into()),
    };
    assert!(matches!(
        actions::users::update_profile(&db, &user, &bad_picture),
        Err(AppError::Validation(_))
    ));
    assert_eq!(db.get_user(&user.id).unwrap().unwrap().picture, updated.picture);
}

// ============================================================================
// WEBHOOK
// ============================================================================

#[test]
fn webhook_events_sync_users() {
    let db = test_db();
    let body = json!({
        "type": "user.created",
        "data": {
            "id": "user_abc",
            "first_name": "Grace",
            "last_name": "Hopper",
            "email_addresses": [{ "id": "idn_1", "email_address": "grace@example.com" }],
            "primary_email_address_id": "idn_1"
        }
    });

    let event = IdentityEvent::parse(body.to_string().as_bytes()).unwrap();
    let outcome = actions::webhook::handle_identity_event(&db, event.clone()).unwrap();
    let user = outcome.user.unwrap();
    assert_eq!(user.name, "Grace Hopper");
    assert_eq!(user.roles, BTreeSet::from([Role::User]));

    // Redelivery
    let outcome = actions::webhook::handle_identity_event(&db, event).unwrap();
    assert!(outcome.user.is_none());

    let deleted = IdentityEvent::UserDeleted {
        id: "user_abc".into(),
    };
    let outcome = actions::webhook::handle_identity_event(&db, Some(deleted.clone())).unwrap();
    assert_eq!(outcome.user.unwrap().id, user.id);

    let outcome = actions::webhook::handle_identity_event(&db, Some(deleted)).unwrap();
    assert!(outcome.user.is_none());
}

#[test]
fn webhook_user_updated_patches_or_creates() {
    let db = test_db();
    let existing = create_user(&db, "user_abc", &[Role::User]);

    let patch = IdentityUser {
        external_id: "user_abc".into(),
        name: "Grace B. Hopper".into(),
        email: "gbh@example.com".into(),
        picture: Some("https://img.example.com/grace.png".into()),
        admin: false,
    };
    let outcome =
        actions::webhook::handle_identity_event(&db, Some(IdentityEvent::UserUpdated(patch))).unwrap();
    let user = outcome.user.unwrap();
    assert_eq!(user.id, existing.id);
    assert_eq!(user.name, "Grace B. Hopper");
    assert_eq!(user.email, "gbh@example.com");
    assert_eq!(user.picture.as_deref(), Some("https://img.example.com/grace.png"));
    assert_eq!(user.roles, existing.roles);

    let unknown = IdentityUser {
        external_id: "user_new".into(),
        name: "Ada".into(),
        email: "ada@example.com".into(),
        picture: None,
        admin: true,
    };
    let outcome =
        actions::webhook::handle_identity_event(&db, Some(IdentityEvent::UserUpdated(unknown))).unwrap();
    let created = outcome.user.unwrap();
    assert_eq!(created.external_id, "user_new");
    assert_eq!(created.roles, BTreeSet::from([Role::User, Role::Admin]));
    assert!(db.get_user_by_external_id("user_new").unwrap().is_some());
}

// ============================================================================
// HTTP API
// ============================================================================

fn test_config(enforce_admin_role: bool) -> Config {
    let mut config = Config::default();
    config.auth.jwt_secret = Some(JWT_SECRET.into());
    config.auth.enforce_admin_role = enforce_admin_role;
    config.webhook.signing_secret = Some(WEBHOOK_SECRET.into());
    config
}

fn test_app(db: &Database, enforce_admin_role: bool) -> axum::Router {
    let state = AppState::new(
        test_config(enforce_admin_role),
        db.clone(),
        Arc::new(MockGateway::default()),
    )
    .unwrap();
    create_router(state)
}

fn bearer(user: &User) -> String {
    let now = now_timestamp();
    let claims = SessionClaims {
        sub: user.external_id.clone(),
        exp: now + 3600,
        iat: Some(now),
        iss: None,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .unwrap();
    format!("Bearer {}", token)
}

async fn send(app: axum::Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn signed_webhook(body: &str, msg_id: &str) -> Request<Body> {
    let verifier = WebhookVerifier::new(WEBHOOK_SECRET, 300).unwrap();
    let timestamp = now_timestamp();
    let signature = verifier.sign(msg_id, timestamp, body.as_bytes()).unwrap();

    Request::builder()
        .method("POST")
        .uri("/api/webhook")
        .header("content-type", "application/json")
        .header("svix-id", msg_id)
        .header("svix-timestamp", timestamp.to_string())
        .header("svix-signature", signature)
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn api_health() {
    let db = test_db();
    let request = Request::get("/api/health").body(Body::empty()).unwrap();

    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn api_get_book_envelope() {
    let db = test_db();
    let book = create_book(&db, "Dune", "9780306406157", 1999, 5);

    let request = Request::get(format!("/api/books/{}", book.id))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["book"]["title"], "Dune");

    let request = Request::get("/api/books/missing").body(Body::empty()).unwrap();
    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn api_malformed_json_is_validation_error() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);

    let request = Request::post("/api/cart/items")
        .header("authorization", bearer(&user))
        .header("content-type", "application/json")
        .body(Body::from("{\"book_id\": "))
        .unwrap();
    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn api_cart_requires_session() {
    let db = test_db();
    let request = Request::get("/api/cart").body(Body::empty()).unwrap();

    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["kind"], "unauthorized");
}

#[tokio::test]
async fn api_admin_routes_require_admin_role() {
    let db = test_db();
    let customer = create_user(&db, "user_1", &[Role::User]);
    let admin = create_user(&db, "user_2", &[Role::User, Role::Admin]);

    let stats = |user: &User| {
        Request::get("/api/admin/stats")
            .header("authorization", bearer(user))
            .body(Body::empty())
            .unwrap()
    };

    let (status, _) = send(test_app(&db, true), stats(&customer)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = send(test_app(&db, true), stats(&admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["users"], 2);

    let (status, _) = send(test_app(&db, false), stats(&customer)).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn api_webhook_rejects_bad_signature() {
    let db = test_db();
    let mut request = signed_webhook(r#"{"type":"user.deleted","data":{"id":"user_1"}}"#, "msg_1");
    request
        .headers_mut()
        .insert("svix-signature", "v1,AAAA".parse().unwrap());

    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn api_webhook_creates_and_deletes_users() {
    let db = test_db();
    let created = json!({
        "type": "user.created",
        "data": {
            "id": "user_abc",
            "first_name": "Grace",
            "email_addresses": [{ "id": "idn_1", "email_address": "grace@example.com" }],
            "primary_email_address_id": "idn_1"
        }
    })
    .to_string();

    let (status, body) = send(test_app(&db, true), signed_webhook(&created, "msg_1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["external_id"], "user_abc");
    assert!(db.get_user_by_external_id("user_abc").unwrap().is_some());

    let deleted = r#"{"type":"user.deleted","data":{"id":"user_unknown"}}"#;
    let (status, body) = send(test_app(&db, true), signed_webhook(deleted, "msg_2")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["user"].is_null());
}

#[tokio::test]
async fn api_wishlist_move_to_cart() {
    let db = test_db();
    let user = create_user(&db, "user_1", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);
    actions::wishlist::add_to_wishlist(&db, &user.id, &book.id).unwrap();

    let request = Request::post("/api/wishlist/move-to-cart")
        .header("authorization", bearer(&user))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["item_count"], 1);
    assert_eq!(body["data"]["items"][0]["book"]["id"], book.id.as_str());
    assert_eq!(body["data"]["items"][0]["quantity"], 1);

    let stored = db.get_user(&user.id).unwrap().unwrap();
    assert!(stored.wishlist.is_empty());
    assert_eq!(stored.cart.len(), 1);
}

#[tokio::test]
async fn api_vote_hides_other_voters() {
    let db = test_db();
    let author = create_user(&db, "user_1", &[Role::User]);
    let first = create_user(&db, "user_2", &[Role::User]);
    let second = create_user(&db, "user_3", &[Role::User]);
    let book = create_book(&db, "Dune", "9780306406157", 1000, 5);
    let input = ReviewInput {
        rating: 4,
        content: "Sand everywhere".into(),
    };
    let review = actions::reviews::create_review(&db, &author, &book.id, &input).unwrap();
    actions::reviews::vote(&db, &first, &review.id, VoteDirection::Up).unwrap();

    let request = Request::post(format!("/api/reviews/{}/downvote", review.id))
        .header("authorization", bearer(&second))
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(test_app(&db, true), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["upvotes"], 1);
    assert_eq!(body["data"]["downvotes"], 1);
    assert_eq!(body["data"]["my_vote"], "down");
    assert!(body["data"].get("upvoters").is_none());
    assert!(!body.to_string().contains(&first.id));
}
