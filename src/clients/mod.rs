pub mod broker;
pub mod database;
pub mod memory;
pub mod rbmq;
pub mod store;
