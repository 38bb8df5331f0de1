use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sqlx::FromRow;
use validator::Validate;

use crate::error::Result;
use crate::orm::{BoxFuture, Db, Migration, Model, Resource};
use crate::password;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    /// argon2 hash; never sent back to clients.
    #[serde(skip_serializing)]
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UserInput {
    #[validate(length(min = 1, max = 100))]
    pub first_name: String,
    #[validate(length(min = 1, max = 100))]
    pub last_name: String,
    #[validate(email, length(max = 255))]
    pub email: String,
    #[validate(length(min = 1, max = 255))]
    pub password: String,
}

impl Model for User {
    fn table_name() -> &'static str {
        "users"
    }

    fn create_table_sql() -> String {
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            first_name VARCHAR(100) NOT NULL,
            last_name VARCHAR(100) NOT NULL,
            email VARCHAR(255) NOT NULL UNIQUE,
            password VARCHAR(255) NOT NULL
        )"
        .to_string()
    }

    fn columns() -> Vec<(String, String)> {
        vec![
            ("first_name".into(), "VARCHAR(100)".into()),
            ("last_name".into(), "VARCHAR(100)".into()),
            ("email".into(), "VARCHAR(255)".into()),
            ("password".into(), "VARCHAR(255)".into()),
        ]
    }
}

impl Resource for User {
    type Input = UserInput;
    const LABEL: &'static str = "User";

    fn to_input(&self) -> UserInput {
        UserInput {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            email: self.email.clone(),
            password: self.password.clone(),
        }
    }

    /// Hash the password whenever the client supplied one.
    fn prepare(mut input: UserInput, changed: &Map<String, Value>) -> Result<UserInput> {
        if changed.contains_key("password") {
            input.password = password::hash_password(&input.password)?;
        }
        Ok(input)
    }
}

impl User {
    pub async fn find_by_email(db: &Db, email: &str) -> Result<Option<User>> {
        Ok(sqlx::query_as::<_, User>("SELECT * FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(db.pool())
            .await?)
    }
}

fn migrate_users(db: Arc<Db>) -> BoxFuture<'static, std::result::Result<(), sqlx::Error>> {
    User::migrate(db)
}

inventory::submit! { Migration(migrate_users) }
