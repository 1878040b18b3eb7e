//! Database-backed cart operations for signed-in users.
//!
//! Every multi-statement sequence (find-or-create cart + item write,
//! sync plan application) runs inside one transaction. The at-most-one-
//! line-per-(cart, size) invariant is carried by the `cart_items` unique
//! key, so writes upsert with `ON CONFLICT` instead of search-then-insert.

use std::collections::HashMap;

use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::cart::{self, CartMutation, GuestCart, SizeChange};
use crate::domain::pricing;
use crate::error::{AppError, Result};
use crate::models::{CartItem, CartLine};

async fn find_or_create_cart(tx: &mut Transaction<'_, Postgres>, user_id: Uuid) -> Result<Uuid> {
    let id = sqlx::query_scalar::<_, Uuid>(
        "INSERT INTO carts (id, user_id, created_at, updated_at) VALUES ($1, $2, NOW(), NOW())
         ON CONFLICT (user_id) DO UPDATE SET updated_at = NOW()
         RETURNING id",
    )
    .bind(Uuid::now_v7())
    .bind(user_id)
    .fetch_one(&mut **tx)
    .await?;
    Ok(id)
}

/// Add `quantity` of a size to the user's cart, additively: a repeated
/// add for the same size accumulates into one line.
pub async fn add_item(pool: &PgPool, user_id: Uuid, size_id: Uuid, quantity: i32) -> Result<CartItem> {
    if quantity <= 0 {
        return Err(AppError::BadRequest("quantity must be positive".into()));
    }
    let mut tx = pool.begin().await?;
    let cart_id = find_or_create_cart(&mut tx, user_id).await?;
    let item = sqlx::query_as::<_, CartItem>(
        "INSERT INTO cart_items (id, cart_id, size_id, quantity, created_at) VALUES ($1, $2, $3, $4, NOW())
         ON CONFLICT (cart_id, size_id) DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(cart_id)
    .bind(size_id)
    .bind(quantity)
    .fetch_one(&mut *tx)
    .await
    .map_err(|e| match &e {
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::NotFound("size"),
        _ => e.into(),
    })?;
    tx.commit().await?;
    Ok(item)
}

pub async fn remove_item(pool: &PgPool, user_id: Uuid, size_id: Uuid) -> Result<()> {
    let res = sqlx::query(
        "DELETE FROM cart_items ci USING carts c
         WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.size_id = $2",
    )
    .bind(user_id)
    .bind(size_id)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("cart item"));
    }
    Ok(())
}

/// Set a line's quantity outright; zero or less removes the line.
pub async fn update_quantity(pool: &PgPool, user_id: Uuid, size_id: Uuid, quantity: i32) -> Result<()> {
    if quantity <= 0 {
        return remove_item(pool, user_id, size_id).await;
    }
    let res = sqlx::query(
        "UPDATE cart_items ci SET quantity = $3 FROM carts c
         WHERE ci.cart_id = c.id AND c.user_id = $1 AND ci.size_id = $2",
    )
    .bind(user_id)
    .bind(size_id)
    .bind(quantity)
    .execute(pool)
    .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("cart item"));
    }
    Ok(())
}

/// Move a line to another size of the same product. If a line already
/// exists at the target size, the quantities sum into it and the old
/// line is dropped.
pub async fn change_size(pool: &PgPool, user_id: Uuid, old_size_id: Uuid, new_size_id: Uuid) -> Result<()> {
    if old_size_id == new_size_id {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    let cart_id = sqlx::query_scalar::<_, Uuid>("SELECT id FROM carts WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(AppError::NotFound("cart"))?;
    let moving = sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT id, quantity FROM cart_items WHERE cart_id = $1 AND size_id = $2",
    )
    .bind(cart_id)
    .bind(old_size_id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or(AppError::NotFound("cart item"))?;
    let existing = sqlx::query_scalar::<_, i32>(
        "SELECT quantity FROM cart_items WHERE cart_id = $1 AND size_id = $2",
    )
    .bind(cart_id)
    .bind(new_size_id)
    .fetch_optional(&mut *tx)
    .await?;

    match cart::plan_size_change(moving.1 as u32, existing.map(|q| q as u32)) {
        SizeChange::MergeInto { quantity } => {
            sqlx::query("UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND size_id = $2")
                .bind(cart_id)
                .bind(new_size_id)
                .bind(quantity as i32)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM cart_items WHERE id = $1")
                .bind(moving.0)
                .execute(&mut *tx)
                .await?;
        }
        SizeChange::Repoint => {
            sqlx::query("UPDATE cart_items SET size_id = $2 WHERE id = $1")
                .bind(moving.0)
                .bind(new_size_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| match &e {
                    sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                        AppError::NotFound("size")
                    }
                    _ => e.into(),
                })?;
        }
    }
    tx.commit().await?;
    Ok(())
}

/// Login-time merge of the cookie cart into the database cart: cookie
/// quantities win on conflict, lines the cookie does not mention stay.
/// Cookie entries whose size no longer exists are skipped.
pub async fn sync_from_cookie(pool: &PgPool, user_id: Uuid, guest: &GuestCart) -> Result<()> {
    if guest.is_empty() {
        return Ok(());
    }
    let mut tx = pool.begin().await?;
    let cart_id = find_or_create_cart(&mut tx, user_id).await?;

    let cookie_ids: Vec<Uuid> = guest.keys().copied().collect();
    let live_ids: Vec<Uuid> =
        sqlx::query_scalar::<_, Uuid>("SELECT id FROM product_sizes WHERE id = ANY($1)")
            .bind(&cookie_ids)
            .fetch_all(&mut *tx)
            .await?;
    let skipped = cookie_ids.len() - live_ids.len();
    if skipped > 0 {
        tracing::warn!("cart sync: skipping {skipped} cookie line(s) with unknown sizes");
    }
    let resolvable: GuestCart = guest
        .iter()
        .filter(|(id, _)| live_ids.contains(id))
        .map(|(&id, &qty)| (id, qty))
        .collect();

    let rows = sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT size_id, quantity FROM cart_items WHERE cart_id = $1",
    )
    .bind(cart_id)
    .fetch_all(&mut *tx)
    .await?;
    let db_state: HashMap<Uuid, u32> = rows.into_iter().map(|(id, q)| (id, q as u32)).collect();

    for mutation in cart::reconcile(&db_state, &resolvable) {
        match mutation {
            CartMutation::Insert { size_id, quantity } => {
                sqlx::query(
                    "INSERT INTO cart_items (id, cart_id, size_id, quantity, created_at)
                     VALUES ($1, $2, $3, $4, NOW())",
                )
                .bind(Uuid::now_v7())
                .bind(cart_id)
                .bind(size_id)
                .bind(quantity as i32)
                .execute(&mut *tx)
                .await?;
            }
            CartMutation::SetQuantity { size_id, quantity } => {
                sqlx::query(
                    "UPDATE cart_items SET quantity = $3 WHERE cart_id = $1 AND size_id = $2",
                )
                .bind(cart_id)
                .bind(size_id)
                .bind(quantity as i32)
                .execute(&mut *tx)
                .await?;
            }
        }
    }
    tx.commit().await?;
    Ok(())
}

/// Logout-time mirror: project the database cart to the flat cookie map.
pub async fn project_to_cookie(pool: &PgPool, user_id: Uuid) -> Result<GuestCart> {
    let rows = sqlx::query_as::<_, (Uuid, i32)>(
        "SELECT ci.size_id, ci.quantity FROM cart_items ci
         JOIN carts c ON ci.cart_id = c.id
         WHERE c.user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(|(id, q)| (id, q as u32)).collect())
}

#[derive(sqlx::FromRow)]
struct CartLineRow {
    size_id: Uuid,
    product_id: Uuid,
    product_name: String,
    brand_name: String,
    size_label: String,
    main_image: Option<String>,
    unit_price: i64,
    discount_percent: i32,
    quantity: i32,
    stock: i32,
}

impl From<CartLineRow> for CartLine {
    fn from(row: CartLineRow) -> Self {
        CartLine {
            size_id: row.size_id,
            product_id: row.product_id,
            product_name: row.product_name,
            brand_name: row.brand_name,
            size_label: row.size_label,
            main_image: row.main_image,
            unit_price: row.unit_price,
            sale_price: pricing::sale_price(row.unit_price, row.discount_percent),
            quantity: row.quantity,
            stock: row.stock,
        }
    }
}

/// Denormalized display lines for a signed-in user's cart.
pub async fn cart_lines(pool: &PgPool, user_id: Uuid) -> Result<Vec<CartLine>> {
    let rows = sqlx::query_as::<_, CartLineRow>(
        "SELECT ci.size_id, p.id AS product_id, p.name AS product_name,
                b.name AS brand_name, s.label AS size_label, p.main_image,
                p.price AS unit_price, p.discount_percent, ci.quantity, s.stock
         FROM cart_items ci
         JOIN carts c ON ci.cart_id = c.id
         JOIN product_sizes s ON ci.size_id = s.id
         JOIN products p ON s.product_id = p.id
         JOIN brands b ON p.brand_id = b.id
         WHERE c.user_id = $1 AND p.status = 'active'
         ORDER BY ci.created_at ASC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;
    Ok(rows.into_iter().map(CartLine::from).collect())
}

/// Resolve a raw guest cookie map against the catalog. Size ids that no
/// longer resolve to an active product are silently skipped.
pub async fn resolve_guest_lines(pool: &PgPool, guest: &GuestCart) -> Result<Vec<CartLine>> {
    if guest.is_empty() {
        return Ok(Vec::new());
    }
    let ids: Vec<Uuid> = guest.keys().copied().collect();
    let rows = sqlx::query_as::<_, CartLineRow>(
        "SELECT s.id AS size_id, p.id AS product_id, p.name AS product_name,
                b.name AS brand_name, s.label AS size_label, p.main_image,
                p.price AS unit_price, p.discount_percent, 0 AS quantity, s.stock
         FROM product_sizes s
         JOIN products p ON s.product_id = p.id
         JOIN brands b ON p.brand_id = b.id
         WHERE s.id = ANY($1) AND p.status = 'active'",
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;
    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let quantity = *guest.get(&row.size_id)? as i32;
            let mut line = CartLine::from(row);
            line.quantity = quantity;
            Some(line)
        })
        .collect())
}
