//! Checkout and order actions.

use super::cart::{positive_quantity, reload};
use super::{ListQuery, Page, found};
use crate::config::{PaymentConfig, StoreConfig};
use crate::db::{
    Address, Database, Order, OrderItem, OrderStatus, PaymentStatus, StoreStats, TimelineEvent,
    User, new_id, now_timestamp,
};
use crate::error::{AppError, Result};
use crate::payment::PaymentGateway;
use crate::pricing::{OrderTotals, subtotal_of};
use crate::validation::{
    CheckoutInput, OrderStatusInput, PaymentStatusInput, trim_opt, validate_payload,
};
use serde::Serialize;

/// Maximum distinct lines in one order.
pub const MAX_ORDER_LINES: usize = 100;

const DEFAULT_PAYMENT_METHOD: &str = "card";

/// Result of a checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResult {
    /// The created order.
    pub order: Order,
    /// Secret for the client-side payment widget.
    pub client_secret: Option<String>,
}

/// Place an order for the payload's items, or for the user's cart when none are given.
///
/// Prices come from the catalog, never from the client. The order is stored before
/// the payment intent is requested, so a gateway failure leaves it Processing/Pending.
pub async fn checkout(
    db: &Database,
    store: &StoreConfig,
    payment: &PaymentConfig,
    gateway: &dyn PaymentGateway,
    user: &User,
    input: &CheckoutInput,
) -> Result<CheckoutResult> {
    validate_payload(input)?;

    let requested: Vec<(String, i64)> = if input.items.is_empty() {
        reload(db, &user.id)?
            .cart
            .into_iter()
            .map(|item| (item.book_id, i64::from(item.quantity)))
            .collect()
    } else {
        input
            .items
            .iter()
            .map(|item| (item.book_id.trim().to_string(), item.quantity))
            .collect()
    };

    let items = price_lines(db, &merge_lines(requested)?)?;
    let subtotal = subtotal_of(items.iter().map(|item| (item.unit_price, item.quantity)))?;
    let totals = OrderTotals::compute(subtotal, store)?;

    let shipping_address = Address::from(&input.shipping_address);
    let billing_address = input
        .billing_address
        .as_ref()
        .map(Address::from)
        .unwrap_or_else(|| shipping_address.clone());

    let now = now_timestamp();
    let mut order = Order {
        id: new_id(),
        order_number: order_number(),
        user_id: user.id.clone(),
        items,
        status: OrderStatus::Processing,
        subtotal: totals.subtotal,
        shipping: totals.shipping,
        tax: totals.tax,
        total: totals.total,
        payment_status: PaymentStatus::Pending,
        payment_method: trim_opt(&input.payment_method)
            .unwrap_or_else(|| DEFAULT_PAYMENT_METHOD.to_string()),
        payment_intent_id: None,
        shipping_address,
        billing_address,
        timeline: vec![TimelineEvent {
            label: "Order placed".into(),
            note: None,
            at: now,
        }],
        created_at: now,
        updated_at: now,
    };

    db.create_order(&order)?;
    tracing::info!(
        order_id = %order.id,
        order_number = %order.order_number,
        user_id = %user.id,
        total = order.total,
        "Order created"
    );

    let intent = gateway
        .create_intent(order.total, &payment.currency, &order.id)
        .await
        .inspect_err(|e| {
            tracing::warn!(order_id = %order.id, error = %e, "Payment intent creation failed");
        })?;

    order.payment_intent_id = Some(intent.id.clone());
    order.updated_at = now_timestamp();
    db.save_order_state(&order)?;

    Ok(CheckoutResult {
        order,
        client_secret: intent.client_secret,
    })
}

/// Record a completed payment after checking the intent with the processor.
///
/// The intent must be the one stored on the order, have succeeded, and match the
/// order's total, currency and ID. On success the order is marked paid, stock is
/// decremented and the ordered books leave the cart. A paid order is returned as is.
pub async fn confirm_payment(
    db: &Database,
    payment: &PaymentConfig,
    gateway: &dyn PaymentGateway,
    user: &User,
    order_id: &str,
    payment_intent_id: &str,
) -> Result<Order> {
    let mut order = get_order(db, user, order_id)?;

    match order.payment_status {
        PaymentStatus::Paid => return Ok(order),
        PaymentStatus::Refunded => {
            return Err(AppError::Conflict(format!(
                "Order {} has been refunded",
                order.order_number
            )));
        }
        PaymentStatus::Pending => {}
    }
    if order.status == OrderStatus::Cancelled {
        return Err(AppError::Conflict(format!(
            "Order {} is cancelled",
            order.order_number
        )));
    }

    if order.payment_intent_id.as_deref() != Some(payment_intent_id) {
        return Err(AppError::Payment(
            "Payment does not belong to this order".into(),
        ));
    }

    let intent = gateway.retrieve_intent(payment_intent_id).await?;
    let mismatch = if !intent.is_succeeded() {
        Some(format!("payment status is '{}'", intent.status))
    } else if intent.amount != order.total {
        Some(format!(
            "charged {} but order total is {}",
            intent.amount, order.total
        ))
    } else if !intent.currency.eq_ignore_ascii_case(&payment.currency) {
        Some(format!("unexpected currency '{}'", intent.currency))
    } else if intent.metadata.get("order_id").map(String::as_str) != Some(order.id.as_str()) {
        Some("intent was created for another order".to_string())
    } else {
        None
    };

    if let Some(reason) = mismatch {
        tracing::warn!(order_id = %order.id, intent_id = %intent.id, %reason, "Payment verification failed");
        return Err(AppError::Payment(format!(
            "Payment could not be verified: {}",
            reason
        )));
    }

    let (from_status, from_payment) = (order.status, order.payment_status);
    let now = now_timestamp();
    order.payment_status = PaymentStatus::Paid;
    order.timeline.push(TimelineEvent {
        label: "Payment received".into(),
        note: None,
        at: now,
    });
    order.updated_at = now;

    if !db.transition_order_state(&order, from_status, from_payment)? {
        tracing::info!(order_id = %order.id, "Order changed during confirmation, returning stored state");
        return found(db.get_order(&order.id)?, "Order", &order.id);
    }

    for item in &order.items {
        db.decrement_stock(&item.book_id, item.quantity)?;
    }

    if let Some(mut owner) = db.get_user(&order.user_id)? {
        owner
            .cart
            .retain(|line| !order.items.iter().any(|item| item.book_id == line.book_id));
        db.save_user_lists(&owner.id, &owner.cart, &owner.wishlist)?;
    }

    tracing::info!(order_id = %order.id, total = order.total, "Payment confirmed");
    Ok(order)
}

/// The user's orders, newest first.
pub fn list_orders(db: &Database, user: &User) -> Result<Vec<Order>> {
    db.get_user_orders(&user.id)
}

/// An order visible to the user: their own, or any for an admin.
pub fn get_order(db: &Database, user: &User, id: &str) -> Result<Order> {
    let order = found(db.get_order(id)?, "Order", id)?;

    if order.user_id != user.id && !user.is_admin() {
        return Err(AppError::NotFound(format!("Order '{}' not found", id)));
    }
    Ok(order)
}

/// Every order, newest first, optionally filtered by status.
pub fn list_all_orders(db: &Database, store: &StoreConfig, query: &ListQuery) -> Result<Page<Order>> {
    let status = query
        .status
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<OrderStatus>)
        .transpose()?;

    let paging = query.paging(store);
    let (items, total) = db.query_orders(status, paging.limit, paging.offset)?;
    Ok(Page::new(items, paging, total))
}

/// Move an order along its fulfillment lifecycle.
pub fn update_order_status(db: &Database, id: &str, input: &OrderStatusInput) -> Result<Order> {
    validate_payload(input)?;
    let mut order = found(db.get_order(id)?, "Order", id)?;

    if !order.status.can_transition_to(input.status) {
        return Err(AppError::Conflict(format!(
            "Cannot change order status from {} to {}",
            order.status, input.status
        )));
    }

    let from_status = order.status;
    let now = now_timestamp();
    order.status = input.status;
    order.timeline.push(TimelineEvent {
        label: status_label(input.status).into(),
        note: input.note(),
        at: now,
    });
    order.updated_at = now;

    if !db.transition_order_state(&order, from_status, order.payment_status)? {
        return Err(AppError::Conflict(format!(
            "Order {} was changed concurrently, retry",
            order.order_number
        )));
    }

    tracing::info!(order_id = %order.id, status = %order.status, "Order status changed");
    Ok(order)
}

/// Change an order's payment status.
pub fn update_payment_status(
    db: &Database,
    id: &str,
    input: &PaymentStatusInput,
) -> Result<Order> {
    validate_payload(input)?;
    let mut order = found(db.get_order(id)?, "Order", id)?;

    if !order.payment_status.can_transition_to(input.payment_status) {
        return Err(AppError::Conflict(format!(
            "Cannot change payment status from {} to {}",
            order.payment_status, input.payment_status
        )));
    }

    let from_payment = order.payment_status;
    let now = now_timestamp();
    order.payment_status = input.payment_status;
    order.timeline.push(TimelineEvent {
        label: payment_label(input.payment_status).into(),
        note: input.note(),
        at: now,
    });
    order.updated_at = now;

    if !db.transition_order_state(&order, order.status, from_payment)? {
        return Err(AppError::Conflict(format!(
            "Order {} was changed concurrently, retry",
            order.order_number
        )));
    }

    tracing::info!(
        order_id = %order.id,
        payment_status = %order.payment_status,
        "Payment status changed"
    );
    Ok(order)
}

/// Dashboard counters.
pub fn store_stats(db: &Database) -> Result<StoreStats> {
    db.store_stats()
}

/// Combine repeated books and check quantities.
fn merge_lines(requested: Vec<(String, i64)>) -> Result<Vec<(String, u32)>> {
    let mut lines: Vec<(String, u32)> = Vec::new();

    for (book_id, quantity) in requested {
        let quantity = positive_quantity(quantity)?;
        match lines.iter_mut().find(|(id, _)| *id == book_id) {
            Some((_, existing)) => *existing = existing.saturating_add(quantity),
            None => lines.push((book_id, quantity)),
        }
    }

    if lines.is_empty() {
        return Err(AppError::Validation("Cannot check out an empty cart".into()));
    }
    if lines.len() > MAX_ORDER_LINES {
        return Err(AppError::Validation(format!(
            "items: at most {} different books per order",
            MAX_ORDER_LINES
        )));
    }
    Ok(lines)
}

/// Snapshot title and price for each line, checking stock.
fn price_lines(db: &Database, lines: &[(String, u32)]) -> Result<Vec<OrderItem>> {
    lines
        .iter()
        .map(|(book_id, quantity)| {
            let book = found(db.get_book(book_id)?, "Book", book_id)?;
            if i64::from(*quantity) > book.stock {
                return Err(AppError::Validation(format!(
                    "Only {} left in stock for '{}'",
                    book.stock.max(0),
                    book.title
                )));
            }
            Ok(OrderItem {
                book_id: book.id,
                title: book.title,
                quantity: *quantity,
                unit_price: book.price,
            })
        })
        .collect()
}

/// Human-facing order number, e.g. `BK-4F1A09C2D7`.
fn order_number() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("BK-{}", id[..10].to_uppercase())
}

fn status_label(status: OrderStatus) -> &'static str {
    match status {
        OrderStatus::Processing => "Processing",
        OrderStatus::Shipped => "Shipped",
        OrderStatus::Delivered => "Delivered",
        OrderStatus::Cancelled => "Order cancelled",
    }
}

fn payment_label(status: PaymentStatus) -> &'static str {
    match status {
        PaymentStatus::Pending => "Payment pending",
        PaymentStatus::Paid => "Payment received",
        PaymentStatus::Refunded => "Payment refunded",
    }
}
