mod authors;
mod books;
mod orders;
mod publishers;
mod reviews;
mod schema;
mod users;

pub use books::BookFilter;
pub use orders::StoreStats;
pub use schema::Database;

use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// Role granted to a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Regular customer.
    User,
    /// Store administrator.
    Admin,
}

impl Role {
    /// String form used in storage and the CLI.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(AppError::Validation(format!(
                "Unknown role '{}', expected 'user' or 'admin'",
                other
            ))),
        }
    }
}

/// Account status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Normal account.
    Active,
    /// Sign-in refused.
    Suspended,
}

impl AccountStatus {
    /// String form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Suspended => "suspended",
        }
    }
}

impl FromStr for AccountStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(AccountStatus::Active),
            "suspended" => Ok(AccountStatus::Suspended),
            other => Err(AppError::Validation(format!(
                "Unknown account status '{}', expected 'active' or 'suspended'",
                other
            ))),
        }
    }
}

/// Line in a user's cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// Referenced book.
    pub book_id: String,
    /// Quantity, always at least 1.
    pub quantity: u32,
}

/// Customer account, mirrored from the identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Local user ID.
    pub id: String,
    /// Identity-provider user ID.
    pub external_id: String,
    /// Display name.
    pub name: String,
    /// Primary email.
    pub email: String,
    /// Avatar URL.
    pub picture: Option<String>,
    /// Granted roles.
    pub roles: BTreeSet<Role>,
    /// Cart lines.
    pub cart: Vec<CartItem>,
    /// Wishlisted book IDs, no duplicates.
    pub wishlist: Vec<String>,
    /// Account status.
    pub status: AccountStatus,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

impl User {
    /// Whether the user holds the admin role.
    pub fn is_admin(&self) -> bool {
        self.roles.contains(&Role::Admin)
    }
}

/// Book for sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Book {
    /// Book ID.
    pub id: String,
    /// Title.
    pub title: String,
    /// Description.
    pub description: String,
    /// Cover image URL.
    pub cover_image: Option<String>,
    /// Price in minor currency units.
    pub price: i64,
    /// ISBN, unique.
    pub isbn: String,
    /// Publication date (YYYY-MM-DD).
    pub publish_date: Option<String>,
    /// Page count.
    pub page_count: Option<i64>,
    /// Language.
    pub language: Option<String>,
    /// Units in stock.
    pub stock: i64,
    /// Shown on promotional surfaces.
    pub featured: bool,
    /// Author reference.
    pub author_id: String,
    /// Publisher reference.
    pub publisher_id: String,
    /// Categories.
    pub categories: Vec<String>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Literary award held by an author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Award {
    /// Award name.
    pub name: String,
    /// Year received.
    pub year: Option<i32>,
}

/// Author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Author {
    /// Author ID.
    pub id: String,
    /// Name.
    pub name: String,
    /// Biography.
    pub biography: String,
    /// Image URLs.
    pub images: Vec<String>,
    /// Birth date (YYYY-MM-DD).
    pub birth_date: Option<String>,
    /// Death date (YYYY-MM-DD).
    pub death_date: Option<String>,
    /// Birth place.
    pub birth_place: Option<String>,
    /// Website URL.
    pub website: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Genres.
    pub genres: Vec<String>,
    /// Awards.
    pub awards: Vec<Award>,
    /// Shown on promotional surfaces.
    pub featured: bool,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Publisher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publisher {
    /// Publisher ID.
    pub id: String,
    /// Name.
    pub name: String,
    /// Logo URL.
    pub logo: Option<String>,
    /// Short description.
    pub description: String,
    /// Long description.
    pub long_description: Option<String>,
    /// Founding year.
    pub founded_year: Option<i32>,
    /// Headquarters location.
    pub headquarters: Option<String>,
    /// Website URL.
    pub website: Option<String>,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
    /// Imprints.
    pub imprints: Vec<String>,
    /// Shown on promotional surfaces.
    pub featured: bool,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Fulfillment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Placed, not yet shipped.
    Processing,
    /// Handed to the carrier.
    Shipped,
    /// Received by the customer.
    Delivered,
    /// Cancelled.
    Cancelled,
}

impl OrderStatus {
    /// String form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    /// Whether moving to `next` is allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Shipped, OrderStatus::Cancelled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "processing" => Ok(OrderStatus::Processing),
            "shipped" => Ok(OrderStatus::Shipped),
            "delivered" => Ok(OrderStatus::Delivered),
            "cancelled" => Ok(OrderStatus::Cancelled),
            other => Err(AppError::Validation(format!(
                "Unknown order status '{}'",
                other
            ))),
        }
    }
}

/// Payment status of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    /// Awaiting payment.
    Pending,
    /// Payment captured.
    Paid,
    /// Payment returned.
    Refunded,
}

impl PaymentStatus {
    /// String form used in storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// Whether moving to `next` is allowed.
    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        matches!(
            (self, next),
            (PaymentStatus::Pending, PaymentStatus::Paid)
                | (PaymentStatus::Paid, PaymentStatus::Refunded)
        )
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(AppError::Validation(format!(
                "Unknown payment status '{}'",
                other
            ))),
        }
    }
}

/// Ordered line with a price snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// Book reference.
    pub book_id: String,
    /// Title at time of purchase.
    pub title: String,
    /// Quantity.
    pub quantity: u32,
    /// Unit price at time of purchase.
    pub unit_price: i64,
}

/// Postal address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    /// Recipient name.
    pub name: String,
    /// Street line.
    pub line1: String,
    /// Additional street line.
    pub line2: Option<String>,
    /// City.
    pub city: String,
    /// State or region.
    pub state: Option<String>,
    /// Postal code.
    pub postal_code: String,
    /// Country code.
    pub country: String,
}

/// Status change recorded on an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineEvent {
    /// Short label ("Order placed", "Shipped", ...).
    pub label: String,
    /// Optional detail.
    pub note: Option<String>,
    /// Event timestamp.
    pub at: i64,
}

/// Customer order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Order ID.
    pub id: String,
    /// Human-facing order number.
    pub order_number: String,
    /// Owning user.
    pub user_id: String,
    /// Ordered lines.
    pub items: Vec<OrderItem>,
    /// Fulfillment status.
    pub status: OrderStatus,
    /// Sum of line totals.
    pub subtotal: i64,
    /// Shipping fee.
    pub shipping: i64,
    /// Tax.
    pub tax: i64,
    /// Amount charged.
    pub total: i64,
    /// Payment status.
    pub payment_status: PaymentStatus,
    /// Payment method label.
    pub payment_method: String,
    /// Payment-processor intent ID.
    pub payment_intent_id: Option<String>,
    /// Shipping address.
    pub shipping_address: Address,
    /// Billing address.
    pub billing_address: Address,
    /// Status history, oldest first.
    pub timeline: Vec<TimelineEvent>,
    /// Creation timestamp.
    pub created_at: i64,
    /// Last update timestamp.
    pub updated_at: i64,
}

/// Vote cast on a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    /// Helpful.
    Up,
    /// Not helpful.
    Down,
}

/// Book review.
///
/// Vote counts are the sizes of the voter sets and are never stored separately.
/// Serialized output carries the counts only, never who voted.
#[derive(Debug, Clone, PartialEq)]
pub struct Review {
    /// Review ID.
    pub id: String,
    /// Reviewed book.
    pub book_id: String,
    /// Author of the review.
    pub user_id: String,
    /// Rating, 1 to 5.
    pub rating: u8,
    /// Review text.
    pub content: String,
    /// Users who upvoted.
    pub upvoters: BTreeSet<String>,
    /// Users who downvoted.
    pub downvoters: BTreeSet<String>,
    /// Creation timestamp.
    pub created_at: i64,
}

impl Review {
    /// Number of upvotes.
    pub fn upvotes(&self) -> usize {
        self.upvoters.len()
    }

    /// Number of downvotes.
    pub fn downvotes(&self) -> usize {
        self.downvoters.len()
    }

    /// Current vote of a user, if any.
    pub fn vote_of(&self, user_id: &str) -> Option<VoteDirection> {
        if self.upvoters.contains(user_id) {
            Some(VoteDirection::Up)
        } else if self.downvoters.contains(user_id) {
            Some(VoteDirection::Down)
        } else {
            None
        }
    }

    /// Toggle a vote: same direction clears it, the other direction switches it.
    pub fn apply_vote(&mut self, user_id: &str, direction: VoteDirection) {
        let previous = self.vote_of(user_id);
        self.upvoters.remove(user_id);
        self.downvoters.remove(user_id);

        if previous == Some(direction) {
            return;
        }

        match direction {
            VoteDirection::Up => self.upvoters.insert(user_id.to_string()),
            VoteDirection::Down => self.downvoters.insert(user_id.to_string()),
        };
    }
}

impl Serialize for Review {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("Review", 8)?;
        s.serialize_field("id", &self.id)?;
        s.serialize_field("book_id", &self.book_id)?;
        s.serialize_field("user_id", &self.user_id)?;
        s.serialize_field("rating", &self.rating)?;
        s.serialize_field("content", &self.content)?;
        s.serialize_field("upvotes", &self.upvotes())?;
        s.serialize_field("downvotes", &self.downvotes())?;
        s.serialize_field("created_at", &self.created_at)?;
        s.end()
    }
}

/// Timestamp helper.
pub fn now_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Convert timestamp to DateTime.
pub fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(ts, 0).unwrap_or_else(Utc::now)
}

/// New random document ID.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
