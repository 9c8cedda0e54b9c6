//! Local binlog mirror addressable by (segment, offset), and bounded replay over it.

pub mod coordinator;
pub mod replay;
pub mod segment;

pub use coordinator::{BinlogCoordinator, FetchReport};
pub use replay::BinlogReplay;
pub use segment::{
    BinlogEvent, BinlogEventRecord, FIRST_EVENT_POSITION, LocalSegment, RemoteSegment,
    SEGMENT_MAGIC, encode_segment, segment_sequence,
};
