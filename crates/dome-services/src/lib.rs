//! dome-services: frame assembly, publishing and the UDP receive loop.

pub mod assembly;
pub mod publisher;
pub mod receiver;
pub mod stats;

pub use assembly::{Accepted, CompletedFrame, Eviction, FrameTable};
pub use publisher::{FramePublisher, FrameSubscriber, PublishedFrame, PublisherClosed};
pub use receiver::{ReceiverError, ReceiverSettings, ReceiverState, VideoReceiver};
pub use stats::{ReceiverStats, StatsSnapshot};
