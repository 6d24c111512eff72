pub mod audit;
pub mod expense;
pub mod friend;
pub mod group;
pub mod money;
pub mod split_result;
pub mod user;
