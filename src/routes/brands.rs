//! Brand catalog: public browsing and admin CRUD.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::models::Brand;
use crate::routes::auth::AdminUser;
use crate::AppState;

async fn list_brands(State(s): State<AppState>) -> Result<Json<Vec<Brand>>> {
    let brands = sqlx::query_as::<_, Brand>("SELECT * FROM brands ORDER BY name")
        .fetch_all(&s.db)
        .await?;
    Ok(Json(brands))
}

async fn get_brand(State(s): State<AppState>, Path(id): Path<Uuid>) -> Result<Json<Brand>> {
    sqlx::query_as::<_, Brand>("SELECT * FROM brands WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .map(Json)
        .ok_or(AppError::NotFound("brand"))
}

#[derive(Debug, Deserialize, Validate)]
pub struct BrandInput {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub logo_url: Option<String>,
}

fn map_brand_write_err(e: sqlx::Error) -> AppError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            AppError::Conflict("Brand already exists".into())
        }
        _ => e.into(),
    }
}

async fn create_brand(
    State(s): State<AppState>,
    _admin: AdminUser,
    Json(req): Json<BrandInput>,
) -> Result<(StatusCode, Json<Brand>)> {
    req.validate()?;
    let slug = req.name.to_lowercase().replace(' ', "-");
    let brand = sqlx::query_as::<_, Brand>(
        "INSERT INTO brands (id, name, slug, logo_url, created_at, updated_at)
         VALUES ($1, $2, $3, $4, NOW(), NOW()) RETURNING *",
    )
    .bind(Uuid::now_v7())
    .bind(&req.name)
    .bind(&slug)
    .bind(&req.logo_url)
    .fetch_one(&s.db)
    .await
    .map_err(map_brand_write_err)?;
    Ok((StatusCode::CREATED, Json(brand)))
}

async fn update_brand(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<BrandInput>,
) -> Result<Json<Brand>> {
    req.validate()?;
    let brand = sqlx::query_as::<_, Brand>(
        "UPDATE brands SET name = $2, logo_url = $3, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.logo_url)
    .fetch_optional(&s.db)
    .await
    .map_err(map_brand_write_err)?
    .ok_or(AppError::NotFound("brand"))?;
    Ok(Json(brand))
}

async fn delete_brand(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let res = sqlx::query("DELETE FROM brands WHERE id = $1")
        .bind(id)
        .execute(&s.db)
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                AppError::Conflict("Brand still has products".into())
            }
            _ => AppError::from(e),
        })?;
    if res.rows_affected() == 0 {
        return Err(AppError::NotFound("brand"));
    }
    Ok(StatusCode::NO_CONTENT)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_brands).post(create_brand))
        .route("/:id", get(get_brand).put(update_brand).delete(delete_brand))
}
