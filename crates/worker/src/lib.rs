//! 向量生成Worker
//!
//! 认领-处理-完成循环：并发治理、余额准入、失败分类与退避

pub mod concurrency;
pub mod generator;
pub mod sanitize;
pub mod trigger;

pub use concurrency::ConcurrencyGovernor;
pub use generator::VectorGenerator;
pub use trigger::QueueTrigger;
