//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::BookId;
use domain::{CartItemInput, CartView};

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam};
use crate::state::{AppState, CheckoutStore};

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.get_cart(&principal).await?))
}

/// POST /cart/items
#[tracing::instrument(skip(state, input))]
pub async fn add_item<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CartItemInput>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.add_item(&principal, input).await?))
}

/// PUT /cart/items
#[tracing::instrument(skip(state, input))]
pub async fn update_item<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CartItemInput>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.update_item(&principal, input).await?))
}

/// DELETE /cart/items/{book_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    PathParam(book_id): PathParam<BookId>,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.carts.remove_item(&principal, book_id).await?))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
) -> Result<StatusCode, ApiError> {
    state.carts.clear(&principal).await?;
    Ok(StatusCode::NO_CONTENT)
}
