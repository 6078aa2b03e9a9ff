pub mod core;
pub mod groups;
pub mod import;
pub mod members;
pub mod notify;
pub mod users;
