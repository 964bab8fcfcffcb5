mod content_store;
mod data_source;
mod events;
mod sinks;
mod transform;

pub use content_store::ContentStore;
pub use data_source::DataSource;
pub use events::{BatchEventPublisher, BatchExecutedEvent};
pub use sinks::{MessageSink, ProgressSink};
pub use transform::RowTransform;
