pub mod conversation;
pub mod handlers;
pub mod prompts;
pub mod questionnaire;
pub mod service;
pub mod store;
