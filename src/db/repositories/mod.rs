pub mod account;
pub mod audit;
pub mod document;
pub mod token;
