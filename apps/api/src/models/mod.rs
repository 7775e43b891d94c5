pub mod placeholder;
pub mod session;
