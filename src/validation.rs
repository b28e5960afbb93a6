//! Payload schemas for create/update actions.
//!
//! Every action validates its input here before touching the database.

use crate::db::{AccountStatus, Address, Award, OrderStatus, PaymentStatus, Role};
use crate::error::{AppError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use validator::{Validate, ValidationError};

/// Validate a payload, mapping schema failures to [`AppError::Validation`].
pub fn validate_payload<T: Validate>(payload: &T) -> Result<()> {
    payload
        .validate()
        .map_err(|errors| AppError::Validation(errors.to_string().replace('\n', "; ")))
}

fn not_blank(value: &str) -> std::result::Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::new("blank").with_message("must not be blank".into()));
    }
    Ok(())
}

fn iso_date(value: &str) -> std::result::Result<(), ValidationError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map(|_| ())
        .map_err(|_| ValidationError::new("date").with_message("expected YYYY-MM-DD".into()))
}

/// Stored verbatim: non-blank and without surrounding whitespace.
fn trimmed(value: &str) -> std::result::Result<(), ValidationError> {
    not_blank(value)?;
    if value.trim() != value {
        return Err(ValidationError::new("whitespace")
            .with_message("must not start or end with whitespace".into()));
    }
    Ok(())
}

/// ISBN-10 or ISBN-13 in stored form: digits and an optional final `X`, checksum verified.
fn isbn(value: &str) -> std::result::Result<(), ValidationError> {
    let canonical = value
        .char_indices()
        .all(|(i, c)| c.is_ascii_digit() || (c == 'X' && i + 1 == value.len()));
    if canonical && is_valid_isbn(value) {
        Ok(())
    } else {
        Err(ValidationError::new("isbn")
            .with_message("must be an ISBN-10 or ISBN-13 without hyphens or spaces".into()))
    }
}

/// Tag lists are stored as given, so entries must be trimmed, non-empty and
/// unique ignoring case.
fn tag_list(tags: &[String]) -> std::result::Result<(), ValidationError> {
    if normalize_tags(tags) != tags {
        return Err(ValidationError::new("tags").with_message(
            "entries must be non-blank, without surrounding whitespace, and unique ignoring case"
                .into(),
        ));
    }
    Ok(())
}

/// Check an ISBN-10 or ISBN-13 checksum.
pub fn is_valid_isbn(value: &str) -> bool {
    let chars: Vec<char> = value
        .chars()
        .filter(|c| *c != '-' && *c != ' ')
        .collect();

    match chars.len() {
        10 => {
            let mut sum = 0;
            for (i, c) in chars.iter().copied().enumerate() {
                let digit = match (i, c) {
                    (9, 'X' | 'x') => 10,
                    (_, c) => match c.to_digit(10) {
                        Some(d) => d,
                        None => return false,
                    },
                };
                sum += digit * (10 - i as u32);
            }
            sum % 11 == 0
        }
        13 => {
            let mut sum = 0;
            for (i, c) in chars.iter().copied().enumerate() {
                let Some(digit) = c.to_digit(10) else {
                    return false;
                };
                sum += if i % 2 == 0 { digit } else { digit * 3 };
            }
            sum % 10 == 0
        }
        _ => false,
    }
}

/// Trim entries, drop empty ones and duplicates (case-insensitive), keep order.
fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tags.iter()
        .map(|t| t.trim())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// Trim an optional string, treating blank as absent.
pub(crate) fn trim_opt(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Book create/update payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct BookInput {
    /// Title.
    #[validate(length(min = 1, max = 300), custom(function = "trimmed"))]
    pub title: String,
    /// Description.
    #[validate(length(max = 10000))]
    #[serde(default)]
    pub description: String,
    /// Cover image URL.
    #[validate(url(message = "must be a URL"))]
    pub cover_image: Option<String>,
    /// Price in minor currency units.
    #[validate(range(min = 0, max = 100_000_000, message = "must be between 0 and 100000000"))]
    pub price: i64,
    /// ISBN.
    #[validate(custom(function = "isbn"))]
    pub isbn: String,
    /// Publication date.
    #[validate(custom(function = "iso_date"))]
    pub publish_date: Option<String>,
    /// Page count.
    #[validate(range(min = 1, max = 100000))]
    pub page_count: Option<i64>,
    /// Language.
    #[validate(length(min = 1, max = 50), custom(function = "trimmed"))]
    pub language: Option<String>,
    /// Units in stock.
    #[validate(range(min = 0, message = "must not be negative"))]
    #[serde(default)]
    pub stock: i64,
    /// Featured flag.
    #[serde(default)]
    pub featured: bool,
    /// Author reference.
    #[validate(length(min = 1, message = "is required"), custom(function = "trimmed"))]
    pub author_id: String,
    /// Publisher reference.
    #[validate(length(min = 1, message = "is required"), custom(function = "trimmed"))]
    pub publisher_id: String,
    /// Categories.
    #[validate(length(max = 20), custom(function = "tag_list"))]
    #[serde(default)]
    pub categories: Vec<String>,
}

/// Award entry in an author payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AwardInput {
    /// Award name.
    #[validate(length(min = 1, max = 200), custom(function = "trimmed"))]
    pub name: String,
    /// Year received.
    #[validate(range(min = 1000, max = 2100))]
    pub year: Option<i32>,
}

impl From<&AwardInput> for Award {
    fn from(input: &AwardInput) -> Self {
        Award {
            name: input.name.clone(),
            year: input.year,
        }
    }
}

/// Author create/update payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AuthorInput {
    /// Name.
    #[validate(length(min = 1, max = 200), custom(function = "trimmed"))]
    pub name: String,
    /// Biography.
    #[validate(length(max = 20000))]
    #[serde(default)]
    pub biography: String,
    /// Image URLs.
    #[validate(length(max = 10), custom(function = "tag_list"))]
    #[serde(default)]
    pub images: Vec<String>,
    /// Birth date.
    #[validate(custom(function = "iso_date"))]
    pub birth_date: Option<String>,
    /// Death date.
    #[validate(custom(function = "iso_date"))]
    pub death_date: Option<String>,
    /// Birth place.
    #[validate(length(max = 200))]
    pub birth_place: Option<String>,
    /// Website.
    #[validate(url(message = "must be a URL"))]
    pub website: Option<String>,
    /// Contact email.
    #[validate(email(message = "must be an email address"))]
    pub email: Option<String>,
    /// Genres.
    #[validate(length(max = 20), custom(function = "tag_list"))]
    #[serde(default)]
    pub genres: Vec<String>,
    /// Awards.
    #[validate(nested)]
    #[serde(default)]
    pub awards: Vec<AwardInput>,
    /// Featured flag.
    #[serde(default)]
    pub featured: bool,
}

/// Publisher create/update payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PublisherInput {
    /// Name.
    #[validate(length(min = 1, max = 200), custom(function = "trimmed"))]
    pub name: String,
    /// Logo URL.
    #[validate(url(message = "must be a URL"))]
    pub logo: Option<String>,
    /// Short description.
    #[validate(length(max = 2000))]
    #[serde(default)]
    pub description: String,
    /// Long description.
    #[validate(length(max = 20000))]
    pub long_description: Option<String>,
    /// Founding year.
    #[validate(range(min = 1400, max = 2100))]
    pub founded_year: Option<i32>,
    /// Headquarters.
    #[validate(length(max = 200))]
    pub headquarters: Option<String>,
    /// Website.
    #[validate(url(message = "must be a URL"))]
    pub website: Option<String>,
    /// Contact email.
    #[validate(email(message = "must be an email address"))]
    pub email: Option<String>,
    /// Contact phone.
    #[validate(length(max = 40))]
    pub phone: Option<String>,
    /// Imprints.
    #[validate(length(max = 50), custom(function = "tag_list"))]
    #[serde(default)]
    pub imprints: Vec<String>,
    /// Featured flag.
    #[serde(default)]
    pub featured: bool,
}

/// Profile update by the signed-in user.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileUpdate {
    /// Display name.
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub name: Option<String>,
    /// Avatar URL.
    #[validate(url(message = "must be a URL"))]
    pub picture: Option<String>,
}

/// Review create payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ReviewInput {
    /// Rating, 1 to 5.
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub rating: i32,
    /// Review text.
    #[validate(length(min = 1, max = 5000), custom(function = "not_blank"))]
    pub content: String,
}

/// Cart line payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CartItemInput {
    /// Book reference.
    #[validate(length(min = 1, message = "is required"))]
    pub book_id: String,
    /// Quantity.
    #[validate(range(min = 1, max = 1000, message = "must be between 1 and 1000"))]
    #[serde(default = "default_quantity")]
    pub quantity: i64,
}

fn default_quantity() -> i64 {
    1
}

/// Quantity update payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuantityInput {
    /// New quantity.
    #[validate(range(min = 1, max = 1000, message = "must be between 1 and 1000"))]
    pub quantity: i64,
}

/// Postal address payload.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddressInput {
    /// Recipient name.
    #[validate(length(min = 1, max = 200), custom(function = "not_blank"))]
    pub name: String,
    /// Street line.
    #[validate(length(min = 1, max = 300), custom(function = "not_blank"))]
    pub line1: String,
    /// Additional street line.
    #[validate(length(max = 300))]
    pub line2: Option<String>,
    /// City.
    #[validate(length(min = 1, max = 100), custom(function = "not_blank"))]
    pub city: String,
    /// State or region.
    #[validate(length(max = 100))]
    pub state: Option<String>,
    /// Postal code.
    #[validate(length(min = 1, max = 20), custom(function = "not_blank"))]
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    #[validate(length(equal = 2, message = "must be a 2-letter country code"))]
    pub country: String,
}

impl From<&AddressInput> for Address {
    fn from(input: &AddressInput) -> Self {
        Address {
            name: input.name.trim().to_string(),
            line1: input.line1.trim().to_string(),
            line2: trim_opt(&input.line2),
            city: input.city.trim().to_string(),
            state: trim_opt(&input.state),
            postal_code: input.postal_code.trim().to_string(),
            country: input.country.trim().to_uppercase(),
        }
    }
}

/// Checkout payload. Without items, the user's cart is checked out.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CheckoutInput {
    /// Lines to order.
    #[validate(nested)]
    #[serde(default)]
    pub items: Vec<CartItemInput>,
    /// Shipping address.
    #[validate(nested)]
    pub shipping_address: AddressInput,
    /// Billing address (defaults to the shipping address).
    #[validate(nested)]
    pub billing_address: Option<AddressInput>,
    /// Payment method label.
    #[validate(length(min = 1, max = 50))]
    pub payment_method: Option<String>,
}

/// Payment confirmation sent by the client after the payment widget completes.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ConfirmPaymentInput {
    /// Intent returned at checkout.
    #[validate(length(min = 1, max = 255, message = "is required"))]
    pub payment_intent_id: String,
}

/// Admin role assignment.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RolesInput {
    /// Roles to grant. `user` is always kept.
    #[validate(length(min = 1, max = 2, message = "must list at least one role"))]
    pub roles: Vec<Role>,
}

/// Admin account status change.
#[derive(Debug, Clone, Deserialize)]
pub struct StatusInput {
    /// New status.
    pub status: AccountStatus,
}

/// Admin fulfillment status change.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct OrderStatusInput {
    /// Target status.
    pub status: OrderStatus,
    /// Note recorded on the timeline.
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

/// Admin payment status change.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PaymentStatusInput {
    /// Target status.
    pub payment_status: PaymentStatus,
    /// Note recorded on the timeline.
    #[validate(length(max = 500))]
    pub note: Option<String>,
}

impl OrderStatusInput {
    /// Trimmed note.
    pub fn note(&self) -> Option<String> {
        trim_opt(&self.note)
    }
}

impl PaymentStatusInput {
    /// Trimmed note.
    pub fn note(&self) -> Option<String> {
        trim_opt(&self.note)
    }
}
