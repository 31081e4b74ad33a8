//! Transport-agnostic log streaming.

pub mod build_logs;
pub mod completion;
pub mod dedupe;
pub mod transport;

pub use build_logs::{BuildLogProducer, BuildLogStreamConfig, StreamOutcome};
pub use completion::{CompletionPredicate, PhraseCompletion};
pub use dedupe::RecordDeduper;
pub use transport::{
    EventStreamTransport, LogTransport, SocketTransport, SseFrame, StreamFrame,
};
