use dotenv::dotenv;
use std::env;

use postgres::{Client, NoTls};
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;

pub mod api;
pub mod buffer;
pub mod config;
pub mod error;
pub mod gpx;
pub mod models;
pub mod processor;
pub mod routes;
pub mod session;
pub mod store;

pub use crate::error::{Error, ErrorKind, Result};
pub use crate::store::postgres::{create_db, empty_db};

pub type DbPool = Pool<PostgresConnectionManager<NoTls>>;

pub fn database_url() -> Result<String> {
    dotenv().ok();
    env::var("DATABASE_URL").map_err(|_| Error::Config("DATABASE_URL is not set".to_string()))
}

/// Single connection for the admin binaries.
pub fn establish_connection() -> Result<Client> {
    Ok(Client::connect(&database_url()?, NoTls)?)
}

pub fn create_db_pool(database_url: &str) -> Result<DbPool> {
    let manager = PostgresConnectionManager::new(database_url.parse()?, NoTls);
    Ok(Pool::new(manager)?)
}
