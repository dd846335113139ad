pub mod health;
pub mod message;
pub mod publisher;
pub mod record;
pub mod response;
pub mod status;
pub mod validation;
