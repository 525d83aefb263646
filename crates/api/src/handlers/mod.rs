pub mod health;
pub mod push_data;
pub mod queue;
