pub mod balance;
pub mod errors;
pub mod models;
pub mod reconciliation;
pub mod services;
pub mod split;
