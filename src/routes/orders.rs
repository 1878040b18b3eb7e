//! Order lifecycle: customer views and admin management.

use axum::extract::{Path, Query, State};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::events;
use crate::models::{ListParams, Order, OrderItem, OrderStatus, PaginatedResponse};
use crate::routes::auth::{AdminUser, AuthUser};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct OrderDetail {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

async fn list_my_orders(
    State(s): State<AppState>,
    user: AuthUser,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Order>>> {
    let (page, per_page) = p.paging();
    let data = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(user.id)
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders WHERE user_id = $1")
        .bind(user.id)
        .fetch_one(&s.db)
        .await?;
    Ok(Json(PaginatedResponse { data, total: total.0, page }))
}

async fn list_all_orders(
    State(s): State<AppState>,
    _admin: AdminUser,
    Query(p): Query<ListParams>,
) -> Result<Json<PaginatedResponse<Order>>> {
    let (page, per_page) = p.paging();
    let data = sqlx::query_as::<_, Order>(
        "SELECT * FROM orders
         WHERE ($1::text IS NULL OR status = $1)
         ORDER BY created_at DESC LIMIT $2 OFFSET $3",
    )
    .bind(&p.status)
    .bind(per_page as i64)
    .bind(((page - 1) * per_page) as i64)
    .fetch_all(&s.db)
    .await?;
    let total: (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM orders WHERE ($1::text IS NULL OR status = $1)")
            .bind(&p.status)
            .fetch_one(&s.db)
            .await?;
    Ok(Json(PaginatedResponse { data, total: total.0, page }))
}

async fn get_order(
    State(s): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<OrderDetail>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(AppError::NotFound("order"))?;
    if order.user_id != user.id && !user.is_admin() {
        return Err(AppError::Forbidden);
    }
    let items = sqlx::query_as::<_, OrderItem>("SELECT * FROM order_items WHERE order_id = $1")
        .bind(id)
        .fetch_all(&s.db)
        .await?;
    Ok(Json(OrderDetail { order, items }))
}

async fn transition(s: &AppState, order: &Order, next: OrderStatus) -> Result<Order> {
    let current = OrderStatus::parse(&order.status)
        .ok_or_else(|| AppError::Internal(format!("order {} has status {}", order.id, order.status)))?;
    if !current.can_transition_to(next) {
        return Err(AppError::Conflict(format!(
            "cannot move order from {} to {}",
            current.as_str(),
            next.as_str()
        )));
    }
    let updated = sqlx::query_as::<_, Order>(
        "UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(order.id)
    .bind(next.as_str())
    .fetch_one(&s.db)
    .await?;
    events::publish(
        &s.nats,
        events::SUBJECT_ORDER_STATUS_CHANGED,
        &events::OrderStatusChanged {
            order_id: order.id,
            from: current.as_str(),
            to: next.as_str(),
        },
    )
    .await;
    Ok(updated)
}

async fn cancel_order(
    State(s): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Order>> {
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(user.id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(AppError::NotFound("order"))?;
    let updated = transition(&s, &order, OrderStatus::Cancelled).await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

async fn update_status(
    State(s): State<AppState>,
    _admin: AdminUser,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<Order>> {
    let next = OrderStatus::parse(&req.status)
        .ok_or_else(|| AppError::BadRequest(format!("unknown status {}", req.status)))?;
    let order = sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = $1")
        .bind(id)
        .fetch_optional(&s.db)
        .await?
        .ok_or(AppError::NotFound("order"))?;
    let updated = transition(&s, &order, next).await?;
    Ok(Json(updated))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_my_orders))
        .route("/all", get(list_all_orders))
        .route("/:id", get(get_order))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", put(update_status))
}
