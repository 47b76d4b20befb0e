//! Export and replay of NFT collections between ledgers.
//!
//! An export copies a collection snapshot and its tokens into local files
//! and can be interrupted and rerun at any point. An import replays those
//! files into a destination ledger, keeping destination token ids equal to
//! source ids, and records its progress so it can resume as well.

pub mod codec;
pub mod error;
pub mod exporter;
pub mod files;
pub mod importer;
pub mod ledger;
pub mod logger;
pub mod snapshot;
pub mod state;
pub mod token_log;
pub mod types;

pub use codec::{JsonPayloadDecoder, NoopDecoder, PayloadDecoder};
pub use error::{DecodeError, LedgerError, MigrationError};
pub use exporter::{ExportOptions, ExportSummary, Exporter, TokenScan};
pub use importer::{DEFAULT_BATCH_SIZE, ImportOptions, ImportSummary, Importer};
pub use ledger::{InMemoryLedger, Ledger, Signer};
pub use logger::Logger;
pub use state::{ImportState, StateStore};
