use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use crate::orm::{BoxFuture, Db, Migration, Model, Resource};

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub price: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    pub description: String,
    #[validate(range(min = 0.0))]
    pub price: f64,
}

impl Model for Product {
    fn table_name() -> &'static str {
        "products"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS products (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name VARCHAR(255) NOT NULL,
            description TEXT NOT NULL,
            price REAL NOT NULL
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("name".into(), "VARCHAR(255)".into()),
            ("description".into(), "TEXT".into()),
            ("price".into(), "REAL".into()),
        ]
    }
}

impl Resource for Product {
    type Input = ProductInput;
    const LABEL: &'static str = "Product";

    fn to_input(&self) -> ProductInput {
        ProductInput {
            name: self.name.clone(),
            description: self.description.clone(),
            price: self.price,
        }
    }
}

fn migrate_products(db: Arc<Db>) -> BoxFuture<'static, std::result::Result<(), sqlx::Error>> {
    Product::migrate(db)
}

inventory::submit! { Migration(migrate_products) }
