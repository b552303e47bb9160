/// skinarb-live — Skin Engine
///
/// Wires the sources, the Steam cache, the profit engine and the result store
/// into one `Engine`. Binaries and host adapters only ever talk to it through
/// `Trigger` and `BlobSink`.

pub mod bridge;
pub mod config;
pub mod engine;
pub mod fanout;

pub use bridge::{BlobSink, FileBlobSink, Trigger, LATEST_BLOB_KEY};
pub use config::{AnalysisMode, Config};
pub use engine::{AnalysisError, AnalysisSummary, Engine};
pub use fanout::{refresh_top_liquid, FanoutReport};
