//! Cart endpoints. Signed-in callers hit the database cart; anonymous
//! callers carry their cart in the `cart-items` cookie with the same
//! add/update/remove semantics.

use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use axum_extra::extract::CookieJar;
use serde::Deserialize;
use uuid::Uuid;

use crate::cart::{cookie, service};
use crate::domain::cart::{self as guest, SizeChange};
use crate::error::{AppError, Result};
use crate::models::CartLine;
use crate::routes::auth::AuthUser;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub size_id: Uuid,
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i32,
}

#[derive(Debug, Deserialize)]
pub struct ChangeSizeRequest {
    pub old_size_id: Uuid,
    pub new_size_id: Uuid,
}

async fn lines_for(s: &AppState, user: &Option<AuthUser>, jar: &CookieJar) -> Result<Vec<CartLine>> {
    match user {
        Some(u) => service::cart_lines(&s.db, u.id).await,
        None => service::resolve_guest_lines(&s.db, &cookie::read_guest_cart(jar)).await,
    }
}

async fn get_cart(
    State(s): State<AppState>,
    user: Option<AuthUser>,
    jar: CookieJar,
) -> Result<Json<Vec<CartLine>>> {
    Ok(Json(lines_for(&s, &user, &jar).await?))
}

async fn add_item(
    State(s): State<AppState>,
    user: Option<AuthUser>,
    jar: CookieJar,
    Json(req): Json<AddItemRequest>,
) -> Result<(CookieJar, Json<Vec<CartLine>>)> {
    match &user {
        Some(u) => {
            service::add_item(&s.db, u.id, req.size_id, req.quantity).await?;
            let lines = lines_for(&s, &user, &jar).await?;
            Ok((jar, Json(lines)))
        }
        None => {
            if req.quantity <= 0 {
                return Err(AppError::BadRequest("quantity must be positive".into()));
            }
            let mut cart = cookie::read_guest_cart(&jar);
            guest::guest_add(&mut cart, req.size_id, req.quantity as u32);
            let lines = service::resolve_guest_lines(&s.db, &cart).await?;
            Ok((cookie::write_guest_cart(jar, &cart), Json(lines)))
        }
    }
}

async fn update_item(
    State(s): State<AppState>,
    user: Option<AuthUser>,
    jar: CookieJar,
    Path(size_id): Path<Uuid>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<(CookieJar, Json<Vec<CartLine>>)> {
    match &user {
        Some(u) => {
            service::update_quantity(&s.db, u.id, size_id, req.quantity).await?;
            let lines = lines_for(&s, &user, &jar).await?;
            Ok((jar, Json(lines)))
        }
        None => {
            let mut cart = cookie::read_guest_cart(&jar);
            if !cart.contains_key(&size_id) {
                return Err(AppError::NotFound("cart item"));
            }
            guest::guest_update(&mut cart, size_id, req.quantity.max(0) as u32);
            let lines = service::resolve_guest_lines(&s.db, &cart).await?;
            Ok((cookie::write_guest_cart(jar, &cart), Json(lines)))
        }
    }
}

async fn remove_item(
    State(s): State<AppState>,
    user: Option<AuthUser>,
    jar: CookieJar,
    Path(size_id): Path<Uuid>,
) -> Result<(CookieJar, Json<Vec<CartLine>>)> {
    match &user {
        Some(u) => {
            service::remove_item(&s.db, u.id, size_id).await?;
            let lines = lines_for(&s, &user, &jar).await?;
            Ok((jar, Json(lines)))
        }
        None => {
            let mut cart = cookie::read_guest_cart(&jar);
            if !guest::guest_remove(&mut cart, size_id) {
                return Err(AppError::NotFound("cart item"));
            }
            let lines = service::resolve_guest_lines(&s.db, &cart).await?;
            Ok((cookie::write_guest_cart(jar, &cart), Json(lines)))
        }
    }
}

async fn change_size(
    State(s): State<AppState>,
    user: Option<AuthUser>,
    jar: CookieJar,
    Json(req): Json<ChangeSizeRequest>,
) -> Result<(CookieJar, Json<Vec<CartLine>>)> {
    match &user {
        Some(u) => {
            service::change_size(&s.db, u.id, req.old_size_id, req.new_size_id).await?;
            let lines = lines_for(&s, &user, &jar).await?;
            Ok((jar, Json(lines)))
        }
        None => {
            let mut cart = cookie::read_guest_cart(&jar);
            if req.old_size_id == req.new_size_id {
                let lines = service::resolve_guest_lines(&s.db, &cart).await?;
                return Ok((jar, Json(lines)));
            }
            let moving = cart
                .remove(&req.old_size_id)
                .ok_or(AppError::NotFound("cart item"))?;
            let merged = match guest::plan_size_change(moving, cart.get(&req.new_size_id).copied()) {
                SizeChange::MergeInto { quantity } => quantity,
                SizeChange::Repoint => moving,
            };
            cart.insert(req.new_size_id, merged);
            let lines = service::resolve_guest_lines(&s.db, &cart).await?;
            Ok((cookie::write_guest_cart(jar, &cart), Json(lines)))
        }
    }
}

/// Login transition: fold the cookie cart into the database cart
/// (cookie wins per size), then drop the cookie.
async fn sync(
    State(s): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Vec<CartLine>>)> {
    let guest_cart = cookie::read_guest_cart(&jar);
    service::sync_from_cookie(&s.db, user.id, &guest_cart).await?;
    let lines = service::cart_lines(&s.db, user.id).await?;
    Ok((cookie::clear_guest_cart(jar), Json(lines)))
}

/// Logout transition: mirror the database cart back into the cookie so
/// the session continues anonymously.
async fn mirror(
    State(s): State<AppState>,
    user: AuthUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<Vec<CartLine>>)> {
    let guest_cart = service::project_to_cookie(&s.db, user.id).await?;
    let lines = service::resolve_guest_lines(&s.db, &guest_cart).await?;
    Ok((cookie::write_guest_cart(jar, &guest_cart), Json(lines)))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart))
        .route("/items", post(add_item))
        .route("/items/:size_id", put(update_item).delete(remove_item))
        .route("/size", post(change_size))
        .route("/sync", post(sync))
        .route("/mirror", post(mirror))
}
