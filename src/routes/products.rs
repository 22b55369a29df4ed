use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use diesel::{ExpressionMethods, PgArrayExpressionMethods, QueryDsl, pg::Pg};
use diesel_async::RunQueryDsl;
use serde::Deserialize;
use utoipa::IntoParams;
use utoipa_axum::router::OpenApiRouter;

use crate::{
    core::{
        aliases::DieselError,
        app_error::{AppError, StdResponse},
        app_state::AppState,
    },
    models::ProductEntity,
    routes::Paginated,
    schema::products,
};

const SIMILAR_PRODUCTS_LIMIT: i64 = 8;

pub fn routes_with_openapi() -> OpenApiRouter<AppState> {
    utoipa_axum::router::OpenApiRouter::new()
        .routes(utoipa_axum::routes!(get_products_by_category))
        .routes(utoipa_axum::routes!(get_products_by_sub_category))
        .routes(utoipa_axum::routes!(get_similar_products))
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct ProductFilterParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    /// Lower price bound in minor currency units.
    pub min_price: Option<i64>,
    /// Upper price bound in minor currency units.
    pub max_price: Option<i64>,
    pub color: Option<String>,
    pub size: Option<String>,
    /// `price_asc` or `price_desc`; anything else sorts by newest first.
    pub sort: Option<String>,
}

fn filtered(
    slug: &str,
    sub_slug: Option<&str>,
    params: &ProductFilterParams,
) -> products::BoxedQuery<'static, Pg> {
    let mut query = products::table
        .filter(products::category_slug.eq(slug.to_owned()))
        .into_boxed();
    if let Some(sub_slug) = sub_slug {
        query = query.filter(products::sub_category_slug.eq(sub_slug.to_owned()));
    }
    if let Some(min_price) = params.min_price {
        query = query.filter(products::unit_price.ge(min_price));
    }
    if let Some(max_price) = params.max_price {
        query = query.filter(products::unit_price.le(max_price));
    }
    if let Some(color) = &params.color {
        query = query.filter(products::colors.contains(vec![color.clone()]));
    }
    if let Some(size) = &params.size {
        query = query.filter(products::sizes.contains(vec![size.clone()]));
    }
    query
}

async fn list_products(
    state: &AppState,
    slug: &str,
    sub_slug: Option<&str>,
    params: ProductFilterParams,
) -> Result<StdResponse<Paginated<ProductEntity>, &'static str>, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let page = crate::routes::PageParams {
        page: params.page,
        limit: params.limit,
    };
    let (offset, limit) = page.to_sql();

    let total: i64 = filtered(slug, sub_slug, &params)
        .count()
        .get_result(conn)
        .await
        .context("Failed to count products")?;

    let mut query = filtered(slug, sub_slug, &params);
    query = match params.sort.as_deref() {
        Some("price_asc") => query.order_by(products::unit_price.asc()),
        Some("price_desc") => query.order_by(products::unit_price.desc()),
        _ => query.order_by(products::created_at.desc()),
    };

    let data: Vec<ProductEntity> = query
        .offset(offset)
        .limit(limit)
        .get_results(conn)
        .await
        .context("Failed to get products")?;

    Ok(StdResponse {
        data: Some(Paginated {
            data,
            total,
            page: page.page(),
            limit: page.limit(),
        }),
        message: Some("Get products successfully"),
    })
}

/// List products in a category, filtered and paginated.
#[utoipa::path(
    get,
    path = "/products/category/{slug}",
    tags = ["Products"],
    params(
        ("slug" = String, Path, description = "Category slug"),
        ProductFilterParams
    ),
    responses(
        (status = 200, description = "List products in a category", body = StdResponse<Paginated<ProductEntity>, String>)
    )
)]
async fn get_products_by_category(
    Path(slug): Path<String>,
    Query(params): Query<ProductFilterParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    list_products(&state, &slug, None, params).await
}

/// List products in a sub-category, filtered and paginated.
#[utoipa::path(
    get,
    path = "/products/category/{slug}/{sub_slug}",
    tags = ["Products"],
    params(
        ("slug" = String, Path, description = "Category slug"),
        ("sub_slug" = String, Path, description = "Sub-category slug"),
        ProductFilterParams
    ),
    responses(
        (status = 200, description = "List products in a sub-category", body = StdResponse<Paginated<ProductEntity>, String>)
    )
)]
async fn get_products_by_sub_category(
    Path((slug, sub_slug)): Path<(String, String)>,
    Query(params): Query<ProductFilterParams>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    list_products(&state, &slug, Some(&sub_slug), params).await
}

/// Fetch products from the same category as the given one.
#[utoipa::path(
    get,
    path = "/similar-products/{product_id}",
    tags = ["Products"],
    params(
        ("product_id" = i32, Path, description = "Product to find alternatives for")
    ),
    responses(
        (status = 200, description = "List similar products", body = StdResponse<Vec<ProductEntity>, String>)
    )
)]
async fn get_similar_products(
    Path(product_id): Path<i32>,
    State(state): State<AppState>,
) -> Result<impl IntoResponse, AppError> {
    let conn = &mut state
        .db_pool
        .get()
        .await
        .context("Failed to obtain a DB connection pool")?;

    let product: ProductEntity = products::table
        .find(product_id)
        .get_result(conn)
        .await
        .map_err(|err| match err {
            DieselError::NotFound => AppError::NotFound,
            _ => AppError::Other(err.into()),
        })?;

    let similar: Vec<ProductEntity> = products::table
        .filter(products::category_slug.eq(product.category_slug))
        .filter(products::id.ne(product.id))
        .order_by(products::created_at.desc())
        .limit(SIMILAR_PRODUCTS_LIMIT)
        .get_results(conn)
        .await
        .context("Failed to get similar products")?;

    Ok(StdResponse {
        data: Some(similar),
        message: Some("Get similar products successfully"),
    })
}
