pub mod pull_stage;
pub mod push_stage;
pub mod ring_buffer;
pub mod spsc;

pub use pull_stage::PullBufferingStage;
pub use push_stage::{PushBufferingStage, PushWriter};
pub use ring_buffer::RingBuffer;
pub use spsc::{spsc_byte_ring, ByteConsumer, ByteProducer};
