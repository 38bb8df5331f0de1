use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::Validate;

use crate::error::{AppError, Result};
use crate::orm::{BoxFuture, Db, Migration, Model, Resource};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i64,
    pub product_id: i64,
    pub order_date: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct OrderInput {
    pub user_id: i64,
    pub product_id: i64,
    #[validate(length(min = 1, max = 20))]
    pub order_date: String,
    #[validate(length(min = 1, max = 20))]
    pub status: String,
}

/// Accepts `2024-03-01`, `2024-03-01T10:30:00`, `2024-03-01 10:30:00` and RFC 3339.
pub fn is_valid_order_date(raw: &str) -> bool {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S").is_ok()
        || NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").is_ok()
        || DateTime::parse_from_rfc3339(raw).is_ok()
}

impl Model for Order {
    fn table_name() -> &'static str {
        "orders"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL REFERENCES users(id),
            product_id INTEGER NOT NULL REFERENCES products(id),
            order_date VARCHAR(20) NOT NULL,
            status VARCHAR(20) NOT NULL
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("user_id".into(), "INTEGER".into()),
            ("product_id".into(), "INTEGER".into()),
            ("order_date".into(), "VARCHAR(20)".into()),
            ("status".into(), "VARCHAR(20)".into()),
        ]
    }
}

impl Resource for Order {
    type Input = OrderInput;
    const LABEL: &'static str = "Order";

    fn to_input(&self) -> OrderInput {
        OrderInput {
            user_id: self.user_id,
            product_id: self.product_id,
            order_date: self.order_date.clone(),
            status: self.status.clone(),
        }
    }

    fn prepare(input: OrderInput, _changed: &Map<String, Value>) -> Result<OrderInput> {
        if !is_valid_order_date(&input.order_date) {
            return Err(AppError::Validation(format!(
                "order_date: '{}' is not a date",
                input.order_date
            )));
        }
        Ok(input)
    }
}

fn migrate_orders(db: Arc<Db>) -> BoxFuture<'static, std::result::Result<(), sqlx::Error>> {
    Order::migrate(db)
}

inventory::submit! { Migration(migrate_orders) }
