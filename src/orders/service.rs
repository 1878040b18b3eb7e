//! Order placement: snapshot selected cart lines into an immutable
//! order and clear them from the cart, atomically.

use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::Order;

/// A cart line resolved for checkout, with the catalog data to freeze
/// into the order.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct SelectedLine {
    pub cart_item_id: Uuid,
    pub size_id: Uuid,
    pub quantity: i32,
    pub size_label: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub unit_price: i64,
    pub discount_percent: i32,
}

/// Shipping and payment details for a new order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: Uuid,
    pub order_number: String,
    pub user_id: Uuid,
    pub status: &'static str,
    pub payment_method: String,
    pub total: i64,
    pub voucher_code: Option<String>,
    pub recipient: String,
    pub phone: String,
    pub province: String,
    pub district: String,
    pub ward: String,
    pub street: String,
    pub notes: Option<String>,
}

/// Snapshot line to freeze into `order_items`.
#[derive(Debug, Clone)]
pub struct LineSnapshot {
    pub cart_item_id: Option<Uuid>,
    pub product_id: Uuid,
    pub product_name: String,
    pub size_label: String,
    pub unit_price: i64,
    pub discount_percent: i32,
    pub quantity: i32,
}

pub fn generate_order_number() -> String {
    format!("ORD-{:08}", rand::random::<u32>())
}

/// Load the caller's selected cart lines with current catalog prices.
/// Every requested id must belong to the caller's cart.
pub async fn load_selected_lines(
    pool: &PgPool,
    user_id: Uuid,
    cart_item_ids: &[Uuid],
) -> Result<Vec<SelectedLine>> {
    let lines = sqlx::query_as::<_, SelectedLine>(
        "SELECT ci.id AS cart_item_id, s.id AS size_id, ci.quantity, s.label AS size_label,
                p.id AS product_id, p.name AS product_name, p.price AS unit_price,
                p.discount_percent
         FROM cart_items ci
         JOIN carts c ON ci.cart_id = c.id
         JOIN product_sizes s ON ci.size_id = s.id
         JOIN products p ON s.product_id = p.id
         WHERE c.user_id = $1 AND ci.id = ANY($2)",
    )
    .bind(user_id)
    .bind(cart_item_ids)
    .fetch_all(pool)
    .await?;
    if lines.len() != cart_item_ids.len() {
        return Err(AppError::NotFound("cart item"));
    }
    Ok(lines)
}

/// Create the order with its snapshot items and delete the consumed
/// cart lines, in one transaction. Unselected cart lines are untouched.
pub async fn place_order(pool: &PgPool, new: &NewOrder, lines: &[LineSnapshot]) -> Result<Order> {
    if lines.is_empty() {
        return Err(AppError::BadRequest("no items selected".into()));
    }
    let mut tx = pool.begin().await?;
    let order = sqlx::query_as::<_, Order>(
        "INSERT INTO orders (id, order_number, user_id, status, payment_method, total,
                             voucher_code, recipient, phone, province, district, ward, street,
                             notes, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, NOW(), NOW())
         RETURNING *",
    )
    .bind(new.id)
    .bind(&new.order_number)
    .bind(new.user_id)
    .bind(new.status)
    .bind(&new.payment_method)
    .bind(new.total)
    .bind(&new.voucher_code)
    .bind(&new.recipient)
    .bind(&new.phone)
    .bind(&new.province)
    .bind(&new.district)
    .bind(&new.ward)
    .bind(&new.street)
    .bind(&new.notes)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Order already exists".into())
        }
        _ => e.into(),
    })?;

    for line in lines {
        sqlx::query(
            "INSERT INTO order_items (id, order_id, product_id, product_name, size_label,
                                      unit_price, discount_percent, quantity)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(line.product_id)
        .bind(&line.product_name)
        .bind(&line.size_label)
        .bind(line.unit_price)
        .bind(line.discount_percent)
        .bind(line.quantity)
        .execute(&mut *tx)
        .await?;
    }

    let consumed: Vec<Uuid> = lines.iter().filter_map(|l| l.cart_item_id).collect();
    if !consumed.is_empty() {
        sqlx::query("DELETE FROM cart_items WHERE id = ANY($1)")
            .bind(&consumed)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(order)
}

impl From<&SelectedLine> for LineSnapshot {
    fn from(line: &SelectedLine) -> Self {
        LineSnapshot {
            cart_item_id: Some(line.cart_item_id),
            product_id: line.product_id,
            product_name: line.product_name.clone(),
            size_label: line.size_label.clone(),
            unit_price: line.unit_price,
            discount_percent: line.discount_percent,
            quantity: line.quantity,
        }
    }
}
