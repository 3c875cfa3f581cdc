pub mod cache;
pub mod changes;
pub mod cli;
pub mod config;
pub mod db;
pub mod driver;
pub mod error;
pub mod merge;
pub mod model;
pub mod ops;
pub mod persistence;
pub mod query;
pub mod serialization;
pub mod sharding;
