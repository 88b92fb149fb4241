//! HTTP surface: router, handlers and response envelopes.

mod auth;
mod error;

pub use auth::{AuthUser, Claims, JwtVerifier};

use axum::{
    body::Bytes,
    extract::{rejection::{JsonRejection, QueryRejection}, Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{get, patch, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use uuid::Uuid;

use crate::domain::{Order, OrderStatus, StatusUpdate};
use crate::gateway::SIGNATURE_HEADER;
use crate::orders::{CreateOrderRequest, InitiatePaymentRequest, OrderService, PaymentLinkResponse};
use crate::pagination::{Page, PageInfo, PageParams, PageRequest, SortOrder};
use crate::store::{OrderFilter, OrderSortField};
use crate::{CateringError, Result};

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub auth: Arc<JwtVerifier>,
}

impl AppState {
    pub fn new(orders: OrderService, jwt_secret: &str) -> Self {
        Self { orders: Arc::new(orders), auth: Arc::new(JwtVerifier::new(jwt_secret)) }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { Json(serde_json::json!({"status": "healthy", "service": "catering-orders"})) }))
        .route("/api/orders", get(list_orders).post(create_order))
        .route("/api/orders/payment/initiate", post(initiate_payment))
        .route("/api/orders/payment/verify", post(verify_payment))
        .route("/api/orders/user/:user_id", get(list_user_orders))
        .route("/api/orders/:order_id", get(get_order))
        .route("/api/orders/:order_id/status", patch(update_status))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
}

impl<T> Envelope<T> {
    fn data(data: T) -> Json<Self> {
        Json(Self { success: true, message: None, data: Some(data) })
    }

    fn with_message(data: Option<T>, message: &'static str) -> Json<Self> {
        Json(Self { success: true, message: Some(message), data })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Listing<T> {
    success: bool,
    data: Vec<T>,
    page_info: PageInfo,
}

impl<T> From<Page<T>> for Listing<T> {
    fn from(page: Page<T>) -> Self {
        Self { success: true, data: page.data, page_info: page.page_info }
    }
}

#[derive(Debug, Deserialize)]
pub struct ListOrdersQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub status: Option<String>,
    pub search: Option<String>,
}

fn page_request(params: &PageParams) -> PageRequest<OrderSortField> {
    PageRequest::from_params(params, OrderSortField::default(), SortOrder::Desc).expanded()
}

async fn create_order(
    State(s): State<AppState>,
    user: AuthUser,
    payload: std::result::Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<Envelope<Order>>)> {
    let Json(request) = payload?;
    let order = s.orders.create(user.user_id, request).await?;
    Ok((StatusCode::CREATED, Envelope::with_message(Some(order), "Order created successfully")))
}

async fn get_order(State(s): State<AppState>, Path(order_id): Path<String>) -> Result<Json<Envelope<Order>>> {
    Ok(Envelope::data(s.orders.get(&order_id).await?))
}

async fn list_orders(
    State(s): State<AppState>,
    query: std::result::Result<Query<ListOrdersQuery>, QueryRejection>,
) -> Result<Json<Listing<Order>>> {
    let Query(query) = query?;
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(OrderStatus::parse(raw).ok_or_else(|| CateringError::invalid("status", format!("Unknown order status '{raw}'")))?),
        None => None,
    };
    let filter = OrderFilter {
        user_id: None,
        status,
        search: query.search.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
    };
    let page = s.orders.list(&filter, &page_request(&query.page)).await?;
    Ok(Json(page.into()))
}

async fn list_user_orders(
    State(s): State<AppState>,
    Path(user_id): Path<Uuid>,
    query: std::result::Result<Query<PageParams>, QueryRejection>,
) -> Result<Json<Listing<Order>>> {
    let Query(params) = query?;
    let page = s.orders.list_for_owner(user_id, &page_request(&params)).await?;
    Ok(Json(page.into()))
}

async fn update_status(
    State(s): State<AppState>,
    Path(order_id): Path<String>,
    payload: std::result::Result<Json<StatusUpdate>, JsonRejection>,
) -> Result<Json<Envelope<Order>>> {
    let Json(update) = payload?;
    let order = s.orders.update_status(&order_id, &update).await?;
    Ok(Envelope::with_message(Some(order), "Order status updated"))
}

async fn initiate_payment(
    State(s): State<AppState>,
    _user: AuthUser,
    payload: std::result::Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<Envelope<PaymentLinkResponse>>> {
    let Json(request) = payload?;
    let order_id = request
        .order_id
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| CateringError::invalid("orderId", "Order ID is required"))?;
    Ok(Envelope::data(s.orders.initiate_payment(order_id.trim()).await?))
}

/// Webhook target; also called by the client after the hosted checkout.
async fn verify_payment(State(s): State<AppState>, headers: HeaderMap, body: Bytes) -> Result<Json<Envelope<()>>> {
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
    let outcome = s.orders.verify_payment(&body, signature).await?;
    Ok(Envelope::with_message(None, outcome.message()))
}
