//! Wire protocol for the daemon's two endpoints.
//!
//! Clients talk to the daemon over two TCP listeners: a request/reply
//! endpoint and an update publish endpoint. Both carry multipart frames
//! (length-prefixed parts) whose payloads are JSON envelopes.

pub mod framing;
pub mod message;
pub mod publisher;
pub mod router;

pub use framing::{FramingError, Multipart, MultipartCodec};
pub use message::{
    job_topic, RequestMessage, ResponseMessage, UpdateMessage, JOB_QUEUE_TOPIC, SOURCE_FILES_TOPIC,
};
pub use publisher::{run_publisher, update_channel, UpdatePublisher, UpdateReceiver};
pub use router::run_router;
