//! Job queue implementations.

pub mod amqp;
pub mod memory;

pub use amqp::AmqpJobQueue;
pub use memory::MemoryJobQueue;
