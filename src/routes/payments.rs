use anyhow::{Context, anyhow};
use axum::{
    Extension, Json,
    extract::State,
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;
use uuid::Uuid;

use crate::{
    core::{
        aliases::DieselError,
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, AuthUser},
    },
    models::{CreateGatewayOrderEntity, GatewayOrderEntity, OrderEntity},
    routes::orders::{
        CheckoutItemReq, NewOrder, PAYMENT_METHOD_RAZORPAY, PAYMENT_STATUS_PAID, persist_order,
        resolve_order_lines, validate_address,
    },
    schema::{gateway_orders, orders},
};

// Lifecycle of a payment attempt in the idempotency ledger.
pub const GATEWAY_ORDER_CREATED: &str = "CREATED";
pub const GATEWAY_ORDER_VERIFIED: &str = "VERIFIED";
pub const GATEWAY_ORDER_FAILED: &str = "FAILED";

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .routes(utoipa_axum::routes!(generate_payment))
        .routes(utoipa_axum::routes!(verify_payment))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::user_authorization,
        ))
}

#[derive(Deserialize, ToSchema)]
struct GeneratePaymentReq {
    /// Amount in minor currency units (paise).
    amount: i64,
}

#[derive(Serialize, ToSchema)]
struct GeneratePaymentRes {
    pub gateway_order_id: String,
    pub amount: i64,
    pub currency: String,
    /// Publishable key for the hosted checkout widget.
    pub key_id: String,
}

/// Create a gateway payment order for a checkout attempt. The attempt is
/// recorded in the ledger before the gateway is called, so a later callback
/// can only ever be settled against a known attempt.
#[utoipa::path(
    post,
    path = "/generate-payment",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = GeneratePaymentReq,
    responses(
        (status = 200, description = "Payment order created", body = StdResponse<GeneratePaymentRes, String>),
        (status = 502, description = "Payment gateway unavailable or misconfigured")
    )
)]
async fn generate_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<GeneratePaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    if body.amount <= 0 {
        return Err(AppError::BadRequest(
            "Amount must be a positive number of minor currency units".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let receipt = format!("rcpt_{}", Uuid::new_v4().simple());
    let attempt: GatewayOrderEntity = diesel::insert_into(gateway_orders::table)
        .values(CreateGatewayOrderEntity {
            user_id: user.id,
            receipt,
            amount: body.amount,
            currency: crate::gateway::razorpay::CURRENCY.into(),
            status: GATEWAY_ORDER_CREATED.into(),
        })
        .returning(GatewayOrderEntity::as_returning())
        .get_result(conn)
        .await
        .context("Failed to record payment attempt")?;

    let gateway_order = match state
        .gateway
        .create_order(attempt.amount, &attempt.receipt)
        .await
    {
        Ok(gateway_order) => gateway_order,
        Err(err) => {
            diesel::update(gateway_orders::table.find(attempt.id))
                .set((
                    gateway_orders::status.eq(GATEWAY_ORDER_FAILED),
                    gateway_orders::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)
                .await
                .context("Failed to mark payment attempt as failed")?;
            return Err(err.into());
        }
    };

    diesel::update(gateway_orders::table.find(attempt.id))
        .set((
            gateway_orders::gateway_order_id.eq(&gateway_order.id),
            gateway_orders::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)
        .await
        .context("Failed to store gateway order id")?;

    Ok(StdResponse {
        data: Some(GeneratePaymentRes {
            gateway_order_id: gateway_order.id,
            amount: gateway_order.amount,
            currency: gateway_order.currency,
            key_id: state.gateway.key_id().into(),
        }),
        message: Some("Payment order created successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct VerifyPaymentReq {
    razorpay_order_id: String,
    razorpay_payment_id: String,
    razorpay_signature: String,
    items: Vec<CheckoutItemReq>,
    address: Value,
}

/// Verify a signed payment callback and persist the order. The ledger row
/// is claimed exactly once, so a replayed callback with a still-valid
/// signature returns the order created the first time instead of a
/// duplicate.
#[utoipa::path(
    post,
    path = "/verify-payment",
    tags = ["Payments"],
    security(("bearerAuth" = [])),
    request_body = VerifyPaymentReq,
    responses(
        (status = 200, description = "Payment verified and order persisted", body = StdResponse<OrderEntity, String>),
        (status = 400, description = "Signature mismatch or invalid payload")
    )
)]
async fn verify_payment(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<VerifyPaymentReq>,
) -> Result<impl IntoResponse, AppError> {
    // The signature is the trust boundary; nothing is persisted before it
    // checks out.
    state.gateway.verify_signature(
        &body.razorpay_order_id,
        &body.razorpay_payment_id,
        &body.razorpay_signature,
    )?;
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
                let claimed: QueryResult<GatewayOrderEntity> = diesel::update(
                    gateway_orders::table
                        .filter(gateway_orders::gateway_order_id.eq(&body.razorpay_order_id))
                        .filter(gateway_orders::user_id.eq(user_id))
                        .filter(gateway_orders::status.eq(GATEWAY_ORDER_CREATED)),
                )
                .set((
                    gateway_orders::status.eq(GATEWAY_ORDER_VERIFIED),
                    gateway_orders::updated_at.eq(diesel::dsl::now),
                ))
                .returning(GatewayOrderEntity::as_returning())
                .get_result(conn)
                .await;

                let attempt = match claimed {
                    Ok(attempt) => attempt,
                    Err(DieselError::NotFound) => {
                        return replayed_callback(conn, user_id, &body.razorpay_order_id).await;
                    }
                    Err(err) => return Err(AppError::Other(err.into())),
                };

                let (lines, total) = resolve_order_lines(conn, &body.items).await?;
                if total != attempt.amount {
                    return Err(AppError::BadRequest(
                        "Order total does not match the paid amount".into(),
                    ));
                }

                let order = persist_order(
                    conn,
                    NewOrder {
                        user_id,
                        lines,
                        address: body.address,
                        payment_method: PAYMENT_METHOD_RAZORPAY,
                        payment_status: PAYMENT_STATUS_PAID,
                        total_amount: total,
                        currency: attempt.currency.clone(),
                        gateway_order_id: Some(body.razorpay_order_id.clone()),
                        placed_by: user_id.to_string(),
                        reason: "Payment verified",
                    },
                )
                .await?;

                diesel::update(gateway_orders::table.find(attempt.id))
                    .set(gateway_orders::order_id.eq(order.id))
                    .execute(conn)
                    .await
                    .context("Failed to link payment attempt to order")?;

                Ok::<OrderEntity, AppError>(order)
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(order),
        message: Some("Payment verified successfully"),
    })
}

/// Order linked by an already-claimed ledger row. Only a VERIFIED attempt
/// can answer a replay, and settling always links an order.
fn replay_order_id(attempt: &GatewayOrderEntity) -> Result<i32, AppError> {
    if attempt.status != GATEWAY_ORDER_VERIFIED {
        return Err(AppError::BadRequest(
            "Payment attempt is not verifiable".into(),
        ));
    }
    attempt.order_id.ok_or_else(|| {
        AppError::Other(anyhow!(
            "verified payment attempt {} has no linked order",
            attempt.id
        ))
    })
}

/// A callback whose ledger row is already claimed. If the first delivery
/// created an order, return it; anything else is a callback for an attempt
/// this service never opened.
async fn replayed_callback(
    conn: &mut diesel_async::AsyncPgConnection,
    user_id: i32,
    razorpay_order_id: &str,
) -> Result<OrderEntity, AppError> {
    let attempt: GatewayOrderEntity = gateway_orders::table
        .filter(gateway_orders::gateway_order_id.eq(razorpay_order_id))
        .filter(gateway_orders::user_id.eq(user_id))
        .get_result(conn)
        .await
        .map_err(|err| match err {
            DieselError::NotFound => {
                AppError::BadRequest("Unknown payment attempt".into())
            }
            _ => AppError::Other(err.into()),
        })?;

    let order_id = replay_order_id(&attempt)?;

    let order: OrderEntity = orders::table
        .find(order_id)
        .get_result(conn)
        .await
        .context("Failed to get order for replayed callback")?;

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn attempt(status: &str, order_id: Option<i32>) -> GatewayOrderEntity {
        GatewayOrderEntity {
            id: Uuid::new_v4(),
            user_id: 7,
            receipt: "rcpt_1".into(),
            gateway_order_id: Some("order_N9yO4qwJ2x".into()),
            amount: 119_900,
            currency: "INR".into(),
            status: status.into(),
            order_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn replayed_callback_settles_on_the_original_order() {
        // A second delivery of a valid callback must answer with the order
        // created the first time, never a new one.
        let settled = attempt(GATEWAY_ORDER_VERIFIED, Some(42));
        assert_eq!(replay_order_id(&settled).unwrap(), 42);
        assert_eq!(replay_order_id(&settled).unwrap(), 42);
    }

    #[test]
    fn unsettled_attempts_cannot_answer_a_replay() {
        assert!(matches!(
            replay_order_id(&attempt(GATEWAY_ORDER_CREATED, None)),
            Err(AppError::BadRequest(_))
        ));
        assert!(matches!(
            replay_order_id(&attempt(GATEWAY_ORDER_FAILED, None)),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn verified_attempt_without_linked_order_is_an_internal_error() {
        assert!(matches!(
            replay_order_id(&attempt(GATEWAY_ORDER_VERIFIED, None)),
            Err(AppError::Other(_))
        ));
    }
}
