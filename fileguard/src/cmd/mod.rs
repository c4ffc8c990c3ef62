pub mod explain;
pub mod hook;
pub mod validate;
