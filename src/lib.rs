pub mod core;
pub mod gateway;
pub mod models;
pub mod order_status;
pub mod routes;
pub mod schema;
