pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub mod adapter;
pub mod archive;
pub mod metadata;
pub mod repository;
pub mod rewrite;
pub mod session;
pub mod storage;

pub use error::Result;
