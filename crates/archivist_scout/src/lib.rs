//! Archivist Scout: keeps the archive index in step with the archive directory
//!
//! The archive is a directory tree written by an external downloader: one
//! subdirectory per user, media files named after a numeric post id, and
//! optional JSON or text sidecars. Scout treats that tree as the source of
//! truth and the SQLite index as a derived projection of it.
//!
//! # Components
//!
//! - [`ArchiveSource`]: listing abstraction ([`LocalArchive`], [`MemoryArchive`])
//! - [`parser`]: one content unit to one [`ParsedPost`]
//! - [`ArchiveScanner`]: user directory to parsed posts plus item failures
//! - [`SyncEngine`]: diff against the store, write in one transaction per user
//! - [`ScanScheduler`]: periodic incremental sweeps, overlapping ticks skipped
//! - [`QueryService`]: paginated, newest-first reads
//!
//! # Example
//!
//! ```rust,ignore
//! let db = ArchiveDb::open(&config.database_path).await?;
//! let source = Arc::new(LocalArchive::new(&config.root_data_folder));
//! let engine = SyncEngine::from_config(db, source, &config);
//!
//! let summary = engine.sync_user("alice", SyncMode::Incremental).await?;
//! ```

pub mod cancel;
pub mod config;
pub mod error;
pub mod locks;
pub mod parser;
pub mod query;
pub mod report;
pub mod scanner;
pub mod scheduler;
pub mod source;
pub mod sync;

pub use cancel::CancellationToken;
pub use config::ArchiveConfig;
pub use error::{ParseError, Result, ScoutError};
pub use locks::{UserLockGuard, UserLocks};
pub use parser::ParsedPost;
pub use query::QueryService;
pub use report::{SweepReport, SyncSummary, UserFailure};
pub use scanner::{ArchiveScanner, ScanOutcome, UnitFailure};
pub use scheduler::{ScanScheduler, SchedulerStats, TickOutcome};
pub use source::{ArchiveEntry, ArchiveSource, LocalArchive, MemoryArchive};
pub use sync::{SyncEngine, SyncMode, SyncPlan};
