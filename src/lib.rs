mod database {
    pub mod actions;
    pub mod error;
    pub mod form;
    pub mod image;
    pub mod pagination;
    pub mod payload;
    pub mod schema;
    pub mod shopping_list;
}
mod authentication {
    pub mod cryptography;
    pub mod jwt;
    pub mod middleware;
    pub mod password;
    pub mod permissions;
}
mod config;
mod constants;
mod replies;

mod cache {
    pub mod cache;
}

pub use authentication::*;
pub use cache::cache::*;
pub use config::*;
pub use constants::*;
pub use database::*;
pub use replies::*;
