pub mod backup;
pub mod catalog;
pub mod config;
pub mod constants;
pub mod container;
pub mod deploy;
pub mod error;
pub mod health;
pub mod lock;
pub mod restore;
pub mod retention;
pub mod rollback;
pub mod store;

#[cfg(test)]
mod testing;

pub use error::{KeeperError, Result};
