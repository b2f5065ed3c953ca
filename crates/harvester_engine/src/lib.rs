//! Harvester engine: ledgers, the item pipeline, the persistence worker and batch scheduling.
mod collab;
mod config;
mod decode;
mod error;
mod error_retry;
mod filename;
mod http;
mod ledger;
mod parse;
mod pending;
mod persist;
mod pipeline;
mod retry;
mod runner;
mod scheduler;
mod sink;
mod source;
mod worker;

pub use collab::{
    CollaboratorError, Collaborators, DetailFetcher, ItemSource, RecordSink, Searcher,
};
pub use config::{ConfigError, HarvestSettings};
pub use decode::{decode_body, DecodeError, DecodedBody};
pub use error::{HarvestError, RunExit};
pub use error_retry::{retry_error_listings, RetryOutcome, RetrySummary};
pub use filename::record_filename;
pub use http::{HttpResolver, HttpSettings};
pub use ledger::{
    read_error_listings, write_error_listing, ListedError, MetricsError, MetricsLedger,
};
pub use parse::{HtmlMetaParser, JsonRecordParser, ParseError, RecordParser};
pub use pending::{LedgerError, PendingLedger};
pub use persist::{ensure_state_dir, AtomicFileWriter, PersistError};
pub use pipeline::{ItemOutcome, ItemPipeline, PipelineSettings};
pub use retry::{retry_with_backoff, sleep_or_cancel, Attempt, RetryError};
pub use runner::{BatchReport, BatchRunner};
pub use scheduler::{status, Harvester, StatusReport};
pub use sink::JsonDirSink;
pub use source::LineFileSource;
pub use worker::{PersistenceQueue, PersistenceWorker, WriterSettings, WriterTotals};
