//! Checkout, payment and order history endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use common::OrderId;
use domain::{CheckoutInput, OrderView, PaymentConfirmInput};
use persistence::Page;
use serde::Deserialize;

use crate::auth::Authenticated;
use crate::error::ApiError;
use crate::extract::{JsonBody, PathParam, QueryParams};
use crate::state::{AppState, CheckoutStore};

/// `?limit=&offset=` query parameters of the listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl From<PageParams> for Page {
    fn from(params: PageParams) -> Self {
        Page::new(params.limit, params.offset)
    }
}

/// POST /orders/checkout
#[tracing::instrument(skip(state))]
pub async fn checkout<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<CheckoutInput>,
) -> Result<(StatusCode, Json<OrderView>), ApiError> {
    let view = state.checkout.checkout(&principal, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// POST /orders/payment
#[tracing::instrument(skip(state))]
pub async fn confirm_payment<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    JsonBody(input): JsonBody<PaymentConfirmInput>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(
        state.payments.confirm_payment(&principal, input).await?,
    ))
}

/// GET /orders
#[tracing::instrument(skip(state))]
pub async fn list<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    Ok(Json(
        state
            .orders
            .list_user_orders(&principal, params.into())
            .await?,
    ))
}

/// GET /orders/all
#[tracing::instrument(skip(state))]
pub async fn list_all<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    QueryParams(params): QueryParams<PageParams>,
) -> Result<Json<Vec<OrderView>>, ApiError> {
    Ok(Json(
        state.orders.list_all_orders(&principal, params.into()).await?,
    ))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: CheckoutStore>(
    State(state): State<Arc<AppState<S>>>,
    Authenticated(principal): Authenticated,
    PathParam(order_id): PathParam<OrderId>,
) -> Result<Json<OrderView>, ApiError> {
    Ok(Json(state.orders.get_order(&principal, order_id).await?))
}
