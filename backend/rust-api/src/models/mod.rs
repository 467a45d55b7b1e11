pub mod assignment;
pub mod question;
pub mod snapshot;

pub use assignment::{Assignment, AssignmentTopic, DifficultyCounts};
pub use question::{Difficulty, PoolStats, Question, Topic};
pub use snapshot::{
    instance_id, ExportMetadata, Snapshot, SnapshotRecord, SnapshotResponse, TopicGroup,
};
