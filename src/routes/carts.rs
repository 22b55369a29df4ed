use anyhow::Context;
use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, QueryDsl, QueryResult, SelectableHelper};
use diesel_async::{AsyncConnection, RunQueryDsl};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        aliases::DieselError,
        app_error::{AppError, StdResponse},
        app_state::AppState,
        middleware::{self, AuthUser},
    },
    models::{CartEntity, CartItemEntity, CreateCartEntity, CreateCartItemEntity, ProductEntity},
    schema::{cart_items, carts, products},
};

pub fn routes_with_openapi(state: &AppState) -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_cart))
        .routes(utoipa_axum::routes!(add_item))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::user_authorization,
        ))
}

#[derive(Serialize, ToSchema)]
struct GetCartRes {
    pub cart: Option<CartEntity>,
    pub cart_items: Vec<CartItemEntity>,
    pub total_price: i64,
}

fn cart_total(items: &[CartItemEntity]) -> i64 {
    items
        .iter()
        .map(|item| item.quantity as i64 * item.unit_price)
        .sum()
}

/// Fetch the full cart of a user. The response is authoritative; clients
/// replace their local cart state with it wholesale.
#[utoipa::path(
    get,
    path = "/cart/{user_id}",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    params(
        ("user_id" = i32, Path, description = "Owner of the cart")
    ),
    responses(
        (status = 200, description = "Get cart successfully", body = StdResponse<GetCartRes, String>)
    )
)]
async fn get_cart(
    Path(user_id): Path<i32>,
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<impl IntoResponse, AppError> {
    if user.id != user_id {
        return Err(AppError::ForbiddenResource(
            "Cart belongs to another user".into(),
        ));
    }

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let cart: QueryResult<CartEntity> = carts::table
        .filter(carts::user_id.eq(user_id))
        .get_result(conn)
        .await;

    let cart = match cart {
        Ok(cart) => cart,
        Err(DieselError::NotFound) => {
            // No cart yet; the first add-to-cart creates one.
            return Ok(StdResponse {
                data: Some(GetCartRes {
                    cart: None,
                    cart_items: vec![],
                    total_price: 0,
                }),
                message: Some("Get cart successfully"),
            });
        }
        Err(err) => return Err(AppError::Other(err.into())),
    };

    let items: Vec<CartItemEntity> = cart_items::table
        .filter(cart_items::cart_id.eq(cart.id))
        .get_results(conn)
        .await
        .context("Failed to get cart items")?;

    let total_price = cart_total(&items);

    Ok(StdResponse {
        data: Some(GetCartRes {
            cart: Some(cart),
            cart_items: items,
            total_price,
        }),
        message: Some("Get cart successfully"),
    })
}

#[derive(Deserialize, ToSchema)]
struct AddItemReq {
    pub product_id: i32,
    pub quantity: i32,
    pub color: String,
    pub size: String,
}

#[derive(Serialize, ToSchema)]
struct AddItemRes {
    pub cart: CartEntity,
    pub cart_item: CartItemEntity,
}

fn validate_add_item(body: &AddItemReq) -> Result<(), String> {
    if body.quantity < 1 {
        return Err("Quantity must be at least 1".into());
    }
    if body.color.trim().is_empty() {
        return Err("Color is required".into());
    }
    if body.size.trim().is_empty() {
        return Err("Size is required".into());
    }
    Ok(())
}

/// Upsert a cart line for the authenticated user. The captured unit price
/// comes from the products table, never from the client.
#[utoipa::path(
    post,
    path = "/add",
    tags = ["Carts"],
    security(("bearerAuth" = [])),
    request_body = AddItemReq,
    responses(
        (status = 200, description = "Cart item upserted", body = StdResponse<AddItemRes, String>)
    )
)]
async fn add_item(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<AddItemReq>,
) -> Result<impl IntoResponse, AppError> {
    validate_add_item(&body).map_err(AppError::BadRequest)?;

    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let user_id = user.id;
    let (cart, cart_item) = conn
        .transaction(move |conn| {
            Box::pin(async move {
                let cart: CartEntity = diesel::insert_into(carts::table)
                    .values(CreateCartEntity { user_id })
                    .on_conflict(carts::user_id)
                    .do_update()
                    .set(carts::updated_at.eq(diesel::dsl::now))
                    .returning(CartEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to get or create cart")?;

                let product: ProductEntity = products::table
                    .find(body.product_id)
                    .get_result(conn)
                    .await
                    .map_err(|err| match err {
                        DieselError::NotFound => AppError::BadRequest("Unknown product".into()),
                        _ => AppError::Other(err.into()),
                    })?;

                if !product.colors.contains(&body.color) {
                    return Err(AppError::BadRequest(format!(
                        "Color {} is not offered for this product",
                        body.color
                    )));
                }
                if !product.sizes.contains(&body.size) {
                    return Err(AppError::BadRequest(format!(
                        "Size {} is not offered for this product",
                        body.size
                    )));
                }

                let cart_item: CartItemEntity = diesel::insert_into(cart_items::table)
                    .values(CreateCartItemEntity {
                        cart_id: cart.id,
                        product_id: product.id,
                        color: body.color,
                        size: body.size,
                        quantity: body.quantity,
                        unit_price: product.unit_price,
                    })
                    .on_conflict((
                        cart_items::cart_id,
                        cart_items::product_id,
                        cart_items::color,
                        cart_items::size,
                    ))
                    .do_update()
                    .set((
                        cart_items::quantity.eq(body.quantity),
                        cart_items::unit_price.eq(product.unit_price),
                        cart_items::updated_at.eq(diesel::dsl::now),
                    ))
                    .returning(CartItemEntity::as_returning())
                    .get_result(conn)
                    .await
                    .context("Failed to upsert cart item")?;

                Ok::<(CartEntity, CartItemEntity), AppError>((cart, cart_item))
            })
        })
        .await?;

    Ok(StdResponse {
        data: Some(AddItemRes { cart, cart_item }),
        message: Some("Cart item added successfully"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn item(quantity: i32, unit_price: i64) -> CartItemEntity {
        CartItemEntity {
            cart_id: 1,
            product_id: 1,
            color: "black".into(),
            size: "M".into(),
            quantity,
            unit_price,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn total_is_quantity_times_captured_price() {
        // ₹500 at qty 2 is ₹1000, in paise.
        assert_eq!(cart_total(&[item(2, 50_000)]), 100_000);
        assert_eq!(cart_total(&[item(2, 50_000), item(1, 19_900)]), 119_900);
        assert_eq!(cart_total(&[]), 0);
    }

    #[test]
    fn add_item_requires_color_and_size() {
        let valid = AddItemReq {
            product_id: 1,
            quantity: 1,
            color: "black".into(),
            size: "M".into(),
        };
        assert!(validate_add_item(&valid).is_ok());

        let missing_color = AddItemReq {
            color: "  ".into(),
            ..valid_clone(&valid)
        };
        assert!(validate_add_item(&missing_color).is_err());

        let missing_size = AddItemReq {
            size: String::new(),
            ..valid_clone(&valid)
        };
        assert!(validate_add_item(&missing_size).is_err());

        let zero_quantity = AddItemReq {
            quantity: 0,
            ..valid_clone(&valid)
        };
        assert!(validate_add_item(&zero_quantity).is_err());
    }

    fn valid_clone(req: &AddItemReq) -> AddItemReq {
        AddItemReq {
            product_id: req.product_id,
            quantity: req.quantity,
            color: req.color.clone(),
            size: req.size.clone(),
        }
    }

    // Pool construction is lazy, so no database is needed here.
    #[tokio::test]
    async fn routes_are_registered_at_their_public_paths() {
        let state = AppState {
            db_pool: crate::core::db::create_pool("postgres://localhost/storefront_test")
                .await
                .unwrap(),
            gateway: crate::gateway::razorpay::RazorpayClient::new(
                reqwest::Client::new(),
                &crate::core::config::RazorpayConfig {
                    key_id: String::new(),
                    key_secret: String::new(),
                    base_url: crate::gateway::razorpay::DEFAULT_BASE_URL.into(),
                },
            ),
        };

        let router = routes_with_openapi(&state);
        let paths = &router.get_openapi().paths.paths;
        assert!(paths.contains_key("/add"));
        assert!(paths.contains_key("/cart/{user_id}"));
    }
}
