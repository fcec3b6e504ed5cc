//! Archive export/import: a tar-like container round-tripping the full
//! store, with an optional AES-256-GCM encrypted variant.

mod container;
pub mod crypto;
pub mod export;
pub mod import;

pub use export::{build_archive, ExportEncryption, SchemaSnapshot};
pub use import::{restore_archive, ImportPassphrase, ImportSummary};
