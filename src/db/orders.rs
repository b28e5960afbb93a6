use super::schema::{enum_column, json_column, to_json, write_error};
use crate::db::*;
use crate::error::Result;
use rusqlite::{OptionalExtension, Row, params};
use serde::Serialize;

const ORDER_COLUMNS: &str = "id, order_number, user_id, items_json, status, subtotal, shipping, \
                             tax, total, payment_status, payment_method, payment_intent_id, \
                             shipping_address_json, billing_address_json, timeline_json, \
                             created_at, updated_at";

fn order_from_row(row: &Row<'_>) -> rusqlite::Result<Order> {
    Ok(Order {
        id: row.get(0)?,
        order_number: row.get(1)?,
        user_id: row.get(2)?,
        items: json_column(row, 3)?,
        status: enum_column(row, 4)?,
        subtotal: row.get(5)?,
        shipping: row.get(6)?,
        tax: row.get(7)?,
        total: row.get(8)?,
        payment_status: enum_column(row, 9)?,
        payment_method: row.get(10)?,
        payment_intent_id: row.get(11)?,
        shipping_address: json_column(row, 12)?,
        billing_address: json_column(row, 13)?,
        timeline: json_column(row, 14)?,
        created_at: row.get(15)?,
        updated_at: row.get(16)?,
    })
}

/// Store-wide counters for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    /// Books in the catalog.
    pub books: u64,
    /// Authors.
    pub authors: u64,
    /// Publishers.
    pub publishers: u64,
    /// Registered users.
    pub users: u64,
    /// Orders placed.
    pub orders: u64,
    /// Orders awaiting fulfillment.
    pub processing_orders: u64,
    /// Sum of totals of paid orders.
    pub revenue: i64,
}

impl Database {
    // ========== ORDER OPERATIONS ==========

    /// Insert an order.
    pub fn create_order(&self, order: &Order) -> Result<()> {
        let items = to_json(&order.items)?;
        let shipping_address = to_json(&order.shipping_address)?;
        let billing_address = to_json(&order.billing_address)?;
        let timeline = to_json(&order.timeline)?;

        let conn = self.conn.lock();
        conn.execute(
            "INSERT INTO orders (id, order_number, user_id, items_json, status, subtotal, shipping,
                                 tax, total, payment_status, payment_method, payment_intent_id,
                                 shipping_address_json, billing_address_json, timeline_json,
                                 created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            params![
                order.id,
                order.order_number,
                order.user_id,
                items,
                order.status.as_str(),
                order.subtotal,
                order.shipping,
                order.tax,
                order.total,
                order.payment_status.as_str(),
                order.payment_method,
                order.payment_intent_id,
                shipping_address,
                billing_address,
                timeline,
                order.created_at,
                order.updated_at,
            ],
        )
        .map_err(|e| write_error(&format!("Order '{}'", order.order_number), e))?;
        Ok(())
    }

    /// Persist the mutable part of an order: statuses, intent and timeline.
    pub fn save_order_state(&self, order: &Order) -> Result<bool> {
        let timeline = to_json(&order.timeline)?;

        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE orders SET status = ?1, payment_status = ?2, payment_intent_id = ?3,
                    timeline_json = ?4, updated_at = ?5
             WHERE id = ?6",
            params![
                order.status.as_str(),
                order.payment_status.as_str(),
                order.payment_intent_id,
                timeline,
                order.updated_at,
                order.id,
            ],
        )?;
        Ok(rows > 0)
    }

    /// Persist an order's new state only if it is still in the `from` state.
    ///
    /// Returns `false` when another writer changed either status first.
    pub fn transition_order_state(
        &self,
        order: &Order,
        from_status: OrderStatus,
        from_payment: PaymentStatus,
    ) -> Result<bool> {
        let timeline = to_json(&order.timeline)?;

        let conn = self.conn.lock();
        let rows = conn.execute(
            "UPDATE orders SET status = ?1, payment_status = ?2, payment_intent_id = ?3,
                    timeline_json = ?4, updated_at = ?5
             WHERE id = ?6 AND status = ?7 AND payment_status = ?8",
            params![
                order.status.as_str(),
                order.payment_status.as_str(),
                order.payment_intent_id,
                timeline,
                order.updated_at,
                order.id,
                from_status.as_str(),
                from_payment.as_str(),
            ],
        )?;
        Ok(rows == 1)
    }

    /// Get order by ID.
    pub fn get_order(&self, id: &str) -> Result<Option<Order>> {
        let conn = self.conn.lock();
        let order = conn
            .query_row(
                &format!("SELECT {} FROM orders WHERE id = ?1", ORDER_COLUMNS),
                params![id],
                order_from_row,
            )
            .optional()?;
        Ok(order)
    }

    /// Orders of a user, newest first.
    pub fn get_user_orders(&self, user_id: &str) -> Result<Vec<Order>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM orders WHERE user_id = ?1 ORDER BY created_at DESC, id",
            ORDER_COLUMNS
        ))?;
        let orders = stmt
            .query_map(params![user_id], order_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(orders)
    }

    /// Page of all orders, newest first, optionally filtered by status.
    pub fn query_orders(
        &self,
        status: Option<OrderStatus>,
        limit: u32,
        offset: u32,
    ) -> Result<(Vec<Order>, u64)> {
        let status = status.map(|s| s.as_str());

        let conn = self.conn.lock();
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM orders WHERE ?1 IS NULL OR status = ?1",
            params![status],
            |row| row.get(0),
        )?;

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM orders WHERE ?1 IS NULL OR status = ?1
             ORDER BY created_at DESC, id LIMIT ?2 OFFSET ?3",
            ORDER_COLUMNS
        ))?;
        let orders = stmt
            .query_map(params![status, limit, offset], order_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok((orders, total as u64))
    }

    /// Dashboard counters.
    pub fn store_stats(&self) -> Result<StoreStats> {
        let (orders, processing_orders, revenue) = {
            let conn = self.conn.lock();
            conn.query_row(
                "SELECT COUNT(*),
                        COALESCE(SUM(CASE WHEN status = 'processing' THEN 1 ELSE 0 END), 0),
                        COALESCE(SUM(CASE WHEN payment_status = 'paid' THEN total ELSE 0 END), 0)
                 FROM orders",
                [],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )?
        };

        Ok(StoreStats {
            books: self.count_books()?,
            authors: self.count_authors()?,
            publishers: self.count_publishers()?,
            users: self.count_users()?,
            orders: orders as u64,
            processing_orders: processing_orders as u64,
            revenue,
        })
    }
}
