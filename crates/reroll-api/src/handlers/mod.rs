pub mod account;
pub mod health;
pub mod search;
