use std::collections::HashMap;

use anyhow::{Context, anyhow};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, SelectableHelper};
use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        aliases::DieselError,
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, AuthUser},
    },
    models::{
        CreateOrderEntity, CreateOrderItemEntity, CreateStatusHistoryEntity, OrderEntity,
        OrderItemEntity, ProductEntity, StatusHistoryEntity,
    },
    order_status::OrderStatus,
    routes::{PageParams, Paginated},
    schema::{cart_items, carts, order_items, order_status_history, orders, products},
};

pub const PAYMENT_METHOD_COD: &str = "COD";
pub const PAYMENT_METHOD_RAZORPAY: &str = "RAZORPAY";
pub const PAYMENT_STATUS_PENDING: &str = "PENDING";
pub const PAYMENT_STATUS_PAID: &str = "PAID";

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    let user_routes = utoipa_axum::router::OpenApiRouter::new()
        .routes(utoipa_axum::routes!(place_order))
        .routes(utoipa_axum::routes!(get_my_orders))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::user_authorization,
        ));

    let admin_routes = utoipa_axum::router::OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_all_orders))
        .routes(utoipa_axum::routes!(update_order_status))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::admin_authorization,
        ));

    user_routes.merge(admin_routes)
}

/// One line of a checkout request. Prices are looked up server-side.
#[derive(Deserialize, Debug, ToSchema)]
pub struct CheckoutItemReq {
    pub product_id: i32,
    pub quantity: i32,
    pub color: String,
    pub size: String,
}

pub fn validate_checkout_items(items: &[CheckoutItemReq]) -> Result<(), String> {
    if items.is_empty() {
        return Err("Order must contain at least one item".into());
    }
    for item in items {
        if item.quantity < 1 {
            return Err("Quantity must be at least 1".into());
        }
        if item.color.trim().is_empty() {
            return Err("Color is required".into());
        }
        if item.size.trim().is_empty() {
            return Err("Size is required".into());
        }
    }
    Ok(())
}

pub fn validate_address(address: &Value) -> Result<(), String> {
    let Some(address) = address.as_object() else {
        return Err("Shipping address is required".into());
    };
    for field in ["line1", "city", "state", "pincode"] {
        let present = address
            .get(field)
            .and_then(Value::as_str)
            .is_some_and(|value| !value.trim().is_empty());
        if !present {
            return Err(format!("Shipping address is missing {field}"));
        }
    }
    Ok(())
}

/// A checkout line with its price resolved from the products table.
#[derive(Debug)]
pub struct OrderLine {
    pub product_id: i32,
    pub quantity: i32,
    pub color: String,
    pub size: String,
    pub unit_price: i64,
}

pub fn lines_total(lines: &[OrderLine]) -> i64 {
    lines
        .iter()
        .map(|line| line.quantity as i64 * line.unit_price)
        .sum()
}

/// Validate checkout items against the catalog and capture unit prices.
pub async fn resolve_order_lines(
    conn: &mut AsyncPgConnection,
    items: &[CheckoutItemReq],
) -> Result<(Vec<OrderLine>, i64), AppError> {
    validate_checkout_items(items).map_err(AppError::BadRequest)?;

    let product_ids: Vec<i32> = items.iter().map(|item| item.product_id).collect();
    let catalog: Vec<ProductEntity> = products::table
        .filter(products::id.eq_any(&product_ids))
        .get_results(conn)
        .await
        .context("Failed to get products")?;
    let catalog: HashMap<i32, ProductEntity> = catalog
        .into_iter()
        .map(|product| (product.id, product))
        .collect();

    let mut lines = Vec::with_capacity(items.len());
    for item in items {
        let product = catalog.get(&item.product_id).ok_or_else(|| {
            AppError::BadRequest(format!("Unknown product {}", item.product_id))
        })?;
        if !product.colors.contains(&item.color) {
            return Err(AppError::BadRequest(format!(
                "Color {} is not offered for product {}",
                item.color, product.id
            )));
        }
        if !product.sizes.contains(&item.size) {
            return Err(AppError::BadRequest(format!(
                "Size {} is not offered for product {}",
                item.size, product.id
            )));
        }
        lines.push(OrderLine {
            product_id: product.id,
            quantity: item.quantity,
            color: item.color.clone(),
            size: item.size.clone(),
            unit_price: product.unit_price,
        });
    }

    let total = lines_total(&lines);
    Ok((lines, total))
}

pub struct NewOrder {
    pub user_id: i32,
    pub lines: Vec<OrderLine>,
    pub address: Value,
    pub payment_method: &'static str,
    pub payment_status: &'static str,
    pub total_amount: i64,
    pub currency: String,
    pub gateway_order_id: Option<String>,
    pub placed_by: String,
    pub reason: &'static str,
}

/// Persist an order with its line items and the first status-history entry,
/// and consume the buyer's cart. Must run inside a transaction.
pub async fn persist_order(
    conn: &mut AsyncPgConnection,
    new_order: NewOrder,
) -> Result<OrderEntity, AppError> {
    let order: OrderEntity = diesel::insert_into(orders::table)
        .values(CreateOrderEntity {
            user_id: new_order.user_id,
            total_amount: new_order.total_amount,
            currency: new_order.currency,
            payment_method: new_order.payment_method.into(),
            payment_status: new_order.payment_status.into(),
            status: OrderStatus::Placed.as_str().into(),
            shipping_address: new_order.address,
            gateway_order_id: new_order.gateway_order_id,
        })
        .returning(OrderEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to create order")?;

    let items: Vec<CreateOrderItemEntity> = new_order
        .lines
        .iter()
        .map(|line| CreateOrderItemEntity {
            order_id: order.id,
            product_id: line.product_id,
            quantity: line.quantity,
            color: line.color.clone(),
            size: line.size.clone(),
            unit_price: line.unit_price,
        })
        .collect();
    diesel::insert_into(order_items::table)
        .values(items)
        .execute(conn)
        .await
        .context("Failed to create order items")?;

    diesel::insert_into(order_status_history::table)
        .values(CreateStatusHistoryEntity {
            order_id: order.id,
            status: OrderStatus::Placed.as_str().into(),
            changed_by: new_order.placed_by,
            reason: Some(new_order.reason.into()),
        })
        .execute(conn)
        .await
        .context("Failed to append status history")?;

    diesel::delete(
        cart_items::table.filter(
            cart_items::cart_id.eq_any(
                carts::table
                    .filter(carts::user_id.eq(new_order.user_id))
                    .select(carts::id),
            ),
        ),
    )
    .execute(conn)
    .await
    .context("Failed to clear cart")?;

    Ok(order)
}

#[derive(Deserialize, ToSchema)]
struct PlaceOrderReq {
    items: Vec<CheckoutItemReq>,
    address: Value,
}

/// Place a cash-on-delivery order for the authenticated user.
#[utoipa::path(
    post,
    path = "/place-order",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    request_body = PlaceOrderReq,
    responses(
        (status = 200, description = "Order placed successfully", body = StdResponse<OrderEntity, String>)
    )
)]
async fn place_order(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PlaceOrderReq>,
) -> Result<impl IntoResponse, AppError> {
    validate_address(&body.address).map_err(AppError::BadRequest)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let order = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let (lines, total) = resolve_order_lines(conn, &body.items).await?;
                let order = persist_order(
                    conn,
                    NewOrder {
                        user_id,
                        lines,
                        address: body.address,
                        payment_method: PAYMENT_METHOD_COD,
                        payment_status: PAYMENT_STATUS_PENDING,
                        total_amount: total,
                        currency: crate::gateway::razorpay::CURRENCY.into(),
                        gateway_order_id: None,
                        placed_by: user_id.to_string(),
                        reason: "Order placed with cash on delivery",
                    },
                )
                .await?;
                Ok::<OrderEntity, AppError>(order)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Order placed successfully"),
    })
}

#[derive(Serialize, ToSchema)]
struct GetOrderRes {
    pub order: OrderEntity,
    pub order_items: Vec<OrderItemEntity>,
    pub status_history: Vec<StatusHistoryEntity>,
}

/// Fetch all orders belonging to the authenticated user, newest first.
#[utoipa::path(
    get,
    path = "/my-orders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    responses(
        (status = 200, description = "List my orders", body = StdResponse<Vec<GetOrderRes>, String>)
    )
)]
async fn get_my_orders(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let my_orders: Vec<OrderEntity> = orders::table
        .filter(orders::user_id.eq(user.id))
        .order_by(orders::updated_at.desc())
        .get_results(conn)
        .await
        .context("Failed to get my orders")?;

    let order_ids: Vec<i32> = my_orders.iter().map(|order| order.id).collect();

    let items: Vec<OrderItemEntity> = order_items::table
        .filter(order_items::order_id.eq_any(&order_ids))
        .get_results(conn)
        .await
        .context("Failed to get order items")?;

    let history: Vec<StatusHistoryEntity> = order_status_history::table
        .filter(order_status_history::order_id.eq_any(&order_ids))
        .order_by(order_status_history::changed_at.asc())
        .get_results(conn)
        .await
        .context("Failed to get status history")?;

    let mut items_by_order: HashMap<i32, Vec<OrderItemEntity>> = HashMap::new();
    for item in items {
        items_by_order.entry(item.order_id).or_default().push(item);
    }
    let mut history_by_order: HashMap<i32, Vec<StatusHistoryEntity>> = HashMap::new();
    for entry in history {
        history_by_order.entry(entry.order_id).or_default().push(entry);
    }

    let orders_with_items: Vec<GetOrderRes> = my_orders
        .into_iter()
        .map(|order| GetOrderRes {
            order_items: items_by_order.remove(&order.id).unwrap_or_default(),
            status_history: history_by_order.remove(&order.id).unwrap_or_default(),
            order,
        })
        .collect();

    Ok(StdResponse {
        data: Some(orders_with_items),
        message: Some("Get my orders successfully"),
    })
}

/// Fetch all orders in the system, paginated. Admin only.
#[utoipa::path(
    get,
    path = "/get-all-orders",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(PageParams),
    responses(
        (status = 200, description = "List all orders", body = StdResponse<Paginated<OrderEntity>, String>)
    )
)]
async fn get_all_orders(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let (offset, limit) = params.to_sql();

    let total: i64 = orders::table
        .count()
        .get_result(conn)
        .await
        .context("Failed to count orders")?;

    let data: Vec<OrderEntity> = orders::table
        .order_by(orders::created_at.desc())
        .offset(offset)
        .limit(limit)
        .get_results(conn)
        .await
        .context("Failed to get orders")?;

    Ok(StdResponse {
        data: Some(Paginated {
            data,
            total,
            page: params.page(),
            limit: params.limit(),
        }),
        message: Some("Get orders successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct UpdateOrderStatusReq {
    status: OrderStatus,
    reason: Option<String>,
}

/// Validate a status change against the lifecycle and produce the single
/// history entry a successful update appends.
fn apply_transition(
    order: &OrderEntity,
    next: OrderStatus,
    changed_by: String,
    reason: Option<String>,
) -> Result<CreateStatusHistoryEntity, AppError> {
    let current: OrderStatus = order.status.parse().map_err(|_| {
        AppError::Other(anyhow!(
            "order {} has unknown status {}",
            order.id,
            order.status
        ))
    })?;

    if !current.can_transition_to(next) {
        return Err(AppError::InvalidTransition {
            from: current.to_string(),
            to: next.to_string(),
        });
    }

    Ok(CreateStatusHistoryEntity {
        order_id: order.id,
        status: next.as_str().into(),
        changed_by,
        reason,
    })
}

#[derive(Serialize, ToSchema)]
struct UpdateOrderStatusRes {
    pub updated_order: OrderEntity,
    pub history_entry: StatusHistoryEntity,
}

/// Transition an order to a new status. Illegal transitions are rejected;
/// valid ones append exactly one status-history entry. Admin only.
#[utoipa::path(
    put,
    path = "/update-order-status/{order_id}",
    tags = ["Orders"],
    security(("bearerAuth" = [])),
    params(
        ("order_id" = i32, Path, description = "Order to transition")
    ),
    request_body = UpdateOrderStatusReq,
    responses(
        (status = 200, description = "Order status updated", body = StdResponse<UpdateOrderStatusRes, String>),
        (status = 409, description = "Illegal status transition")
    )
)]
async fn update_order_status(
    Path(order_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateOrderStatusReq>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let changed_by = user.id.to_string();
    let (updated_order, history_entry) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                // Lock the row so concurrent identical transitions cannot
                // both pass the lifecycle check.
                let order: OrderEntity = orders::table
                    .find(order_id)
                    .for_update()
                    .get_result(conn)
                    .await
                    .map_err(|err| match err {
                        DieselError::NotFound => AppError::NotFound,
                        _ => AppError::Other(err.into()),
                    })?;

                let new_entry = apply_transition(&order, body.status, changed_by, body.reason)?;

                let updated_order: OrderEntity = diesel::update(orders::table.find(order_id))
                    .set((
                        orders::status.eq(body.status.as_str()),
                        orders::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(OrderEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to update order status")?;

                let history_entry: StatusHistoryEntity =
                    diesel::insert_into(order_status_history::table)
                        .values(new_entry)
                        .returning(StatusHistoryEntity::as_returning())
                        .get_result(conn)
                        .await
                        .context("Failed to append status history")?;

                Ok::<(OrderEntity, StatusHistoryEntity), AppError>((updated_order, history_entry))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(UpdateOrderStatusRes {
            updated_order,
            history_entry,
        }),
        message: Some("Order status updated successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn order_with_status(status: &str) -> OrderEntity {
        OrderEntity {
            id: 11,
            user_id: 7,
            total_amount: 119_900,
            currency: "INR".into(),
            payment_method: PAYMENT_METHOD_COD.into(),
            payment_status: PAYMENT_STATUS_PENDING.into(),
            status: status.into(),
            shipping_address: json!({}),
            gateway_order_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn valid_transition_yields_exactly_one_history_entry() {
        let order = order_with_status("PLACED");
        let entry = apply_transition(
            &order,
            OrderStatus::Confirmed,
            "3".into(),
            Some("Stock reserved".into()),
        )
        .unwrap();

        assert_eq!(entry.order_id, order.id);
        assert_eq!(entry.status, "CONFIRMED");
        assert_eq!(entry.changed_by, "3");
        assert_eq!(entry.reason.as_deref(), Some("Stock reserved"));
    }

    #[test]
    fn illegal_transition_is_rejected_before_any_write() {
        let order = order_with_status("PLACED");
        let err = apply_transition(&order, OrderStatus::Shipped, "3".into(), None).unwrap_err();
        assert!(matches!(
            err,
            AppError::InvalidTransition { ref from, ref to } if from == "PLACED" && to == "SHIPPED"
        ));
    }

    #[test]
    fn unknown_stored_status_is_an_internal_error() {
        let order = order_with_status("REFUNDED");
        assert!(matches!(
            apply_transition(&order, OrderStatus::Confirmed, "3".into(), None),
            Err(AppError::Other(_))
        ));
    }

    fn checkout_item(product_id: i32, quantity: i32) -> CheckoutItemReq {
        CheckoutItemReq {
            product_id,
            quantity,
            color: "black".into(),
            size: "M".into(),
        }
    }

    #[test]
    fn checkout_requires_items_with_variant_fields() {
        assert!(validate_checkout_items(&[]).is_err());
        assert!(validate_checkout_items(&[checkout_item(1, 2)]).is_ok());

        let mut missing_color = checkout_item(1, 1);
        missing_color.color = String::new();
        assert!(validate_checkout_items(&[missing_color]).is_err());

        let mut missing_size = checkout_item(1, 1);
        missing_size.size = " ".into();
        assert!(validate_checkout_items(&[missing_size]).is_err());

        assert!(validate_checkout_items(&[checkout_item(1, 0)]).is_err());
    }

    #[test]
    fn address_must_carry_required_fields() {
        let full = json!({
            "line1": "221B MG Road",
            "city": "Bengaluru",
            "state": "Karnataka",
            "pincode": "560001"
        });
        assert!(validate_address(&full).is_ok());

        assert!(validate_address(&json!(null)).is_err());
        assert!(validate_address(&json!("MG Road")).is_err());

        let missing_state = json!({
            "line1": "221B MG Road",
            "city": "Bengaluru",
            "pincode": "560001"
        });
        assert!(validate_address(&missing_state).is_err());

        let blank_city = json!({
            "line1": "221B MG Road",
            "city": "   ",
            "state": "Karnataka",
            "pincode": "560001"
        });
        assert!(validate_address(&blank_city).is_err());
    }

    #[test]
    fn line_totals_use_minor_units() {
        let lines = vec![
            OrderLine {
                product_id: 1,
                quantity: 2,
                color: "black".into(),
                size: "M".into(),
                unit_price: 50_000,
            },
            OrderLine {
                product_id: 2,
                quantity: 1,
                color: "red".into(),
                size: "L".into(),
                unit_price: 19_900,
            },
        ];
        assert_eq!(lines_total(&lines), 119_900);
        assert_eq!(lines_total(&lines[..1]), 100_000);
    }
}
