//! Product catalog: public browsing and admin CRUD.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::{ListParams, PaginatedResponse, Product, ProductSize};
use crate::routes::auth::AdminUser;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct ProductDetail {
    #[serde(flatten)]
    pub product: Product,
    pub sizes: Vec<ProductSize>,
}

fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-")
}

async fn list_products(
    State(s): State<AppState>,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Product>>> {
    let (page, per_page) = p.paging();
    let products = sqlx::query_as::<_, Product>(
        "SELECT * FROM products
         WHERE status = 'active'
           AND ($1::uuid IS NULL OR brand_id = $1)
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')
         ORDER BY created_at DESC LIMIT $3 OFFSET $4",
    )
    .bind(p.brand)
    .bind(&p.search)
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM products
         WHERE status = 'active'
           AND ($1::uuid IS NULL OR brand_id = $1)
           AND ($2::text IS NULL OR name ILIKE '%' || $2 || '%')",
    )
    .bind(p.brand)
    .bind(&p.search)
    .fetch_one(&s.db)
    .await?;
    Ok(Json(PaginatedResponse { data: products, total: total.0, page }))
}

async fn get_product(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<ProductDetail>> {
    let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(AppError::NotFound("product"))?;
    let sizes = sqlx::query_as::<_, ProductSize>(
        "SELECT * FROM product_sizes WHERE product_id = $1 ORDER BY label",
    )
    .bind(id)
    .fetch_all(&s.db)
    .await?;
    Ok(Json(ProductDetail { product, sizes }))
}

#[derive(Debug, Deserialize, Validate)]
pub struct SizeInput {
    #[validate(length(min = 1))]
    pub label: String,
    #[validate(range(min = 0))]
    pub stock: i32,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub brand_id: Uuid,
    pub description: Option<String>,
    #[validate(range(min = 0))]
    pub price: i64,
    #[validate(range(min = 0, max = 100))]
    pub discount_percent: i32,
    pub main_image: Option<String>,
    #[serde(default)]
    pub gallery: Vec<String>,
    #[validate]
    pub sizes: Vec<SizeInput>,
}

fn map_product_write_err(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Product slug already exists".into())
        }
        sqlx::Error::Database(db) if db.is_foreign_key_violation() => AppError::NotFound("brand"),
        _ => e.into(),
    }
}

async fn create_product(
    State(s): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<ProductInput>,
) -> Result<(StatusCode, Json<ProductDetail>)> {
    req.validate()?;
    let mut tx = s.db.begin().await?;
    let product = sqlx::query_as::<_, Product>(
        "INSERT INTO products (id, brand_id, name, slug, description, price, discount_percent,
                               main_image, gallery, status, created_at, updated_at)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'active', NOW(), NOW())
         RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(req.brand_id)
    .bind(&req.name)
    .bind(slugify(&req.name))
    .bind(&req.description)
    .bind(req.price)
    .bind(req.discount_percent)
    .bind(&req.main_image)
    .bind(&req.gallery)
    .fetch_one(&mut *tx)
    .await
    .map_err(map_product_write_err)?;

    let mut sizes = Vec::with_capacity(req.sizes.len());
    for size in &req.sizes {
        let row = sqlx::query_as::<_, ProductSize>(
            "INSERT INTO product_sizes (id, product_id, label, stock) VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(product.id)
        .bind(&size.label)
        .bind(size.stock)
        .fetch_one(&mut *tx)
        .await?;
        sizes.push(row);
    }
    tx.commit().await?;
    Ok((StatusCode::CREATED, Json(ProductDetail { product, sizes })))
}

async fn update_product(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductInput>,
) -> Result<Json<ProductDetail>> {
    req.validate()?;
    let mut tx = s.db.begin().await?;
    let product = sqlx::query_as::<_, Product>(
        "UPDATE products SET brand_id = $2, name = $3, description = $4, price = $5,
                             discount_percent = $6, main_image = $7, gallery = $8, updated_at = NOW()
         WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(req.brand_id)
    .bind(&req.name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.discount_percent)
    .bind(&req.main_image)
    .bind(&req.gallery)
    .fetch_optional(&mut *tx)
    .await
    .map_err(map_product_write_err)?
    .ok_or(AppError::NotFound("product"))?;

    // Replace the size set: upsert incoming labels, drop the rest.
    // Dropping a size cascades its cart lines, which is the intent.
    let labels: Vec<String> = req.sizes.iter().map(|sz| sz.label.clone()).collect();
    sqlx::query("DELETE FROM product_sizes WHERE product_id = $1 AND label <> ALL($2)")
        .bind(id)
        .bind(&labels)
        .execute(&mut *tx)
        .await?;
    let mut sizes = Vec::with_capacity(req.sizes.len());
    for size in &req.sizes {
        let row = sqlx::query_as::<_, ProductSize>(
            "INSERT INTO product_sizes (id, product_id, label, stock) VALUES ($1, $2, $3, $4)
             ON CONFLICT (product_id, label) DO UPDATE SET stock = EXCLUDED.stock
             RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(id)
        .bind(&size.label)
        .bind(size.stock)
        .fetch_one(&mut *tx)
        .await?;
        sizes.push(row);
    }
    tx.commit().await?;
    Ok(Json(ProductDetail { product, sizes }))
}

async fn delete_product(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let res = sqlx::query("UPDATE products SET status = 'archived', updated_at = NOW() WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("product"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_products).post(create_product))
        .route("/:id", get(get_product).put(update_product).delete(delete_product))
}
