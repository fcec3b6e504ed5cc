mod chunker;
mod pipeline;
mod transcript;
mod transitions;

pub use pipeline::{ingest_file, link_cross_session, IngestOutcome};
pub use transcript::{read_transcript_file, Turn};
