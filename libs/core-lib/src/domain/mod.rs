pub mod billing;
pub mod inventory;
pub mod scope;
pub mod tenant;
pub mod user;
