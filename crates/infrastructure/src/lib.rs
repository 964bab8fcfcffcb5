//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod channel_batch_event_publisher;
mod file_system_content_store;
mod in_memory_content_store;
mod in_memory_data_source;
mod json_file_data_source;
mod redis_content_store;
mod tracing_sinks;

pub use channel_batch_event_publisher::ChannelBatchEventPublisher;
pub use file_system_content_store::FileSystemContentStore;
pub use in_memory_content_store::InMemoryContentStore;
pub use in_memory_data_source::InMemoryDataSource;
pub use json_file_data_source::JsonFileDataSource;
pub use redis_content_store::RedisContentStore;
pub use tracing_sinks::{TracingMessageSink, TracingProgressSink};
