//! idxmngr Ordered Index Store
//!
//! Persistent, ordered key → txId list maps, one file per index:
//!
//! - **types**: `ComparisonOp`, `KeyQuery`, `IndexRecord`, stats
//! - **file**: `.bf` file format (header + checksummed append-only frames)
//! - **tree**: in-memory ordered map answering point and range predicates
//! - **index_store**: `IndexStore` combining both under a single-writer,
//!   multi-reader discipline
//! - **error**: error types
//!
//! # Example
//!
//! ```rust,no_run
//! use idxmngr::store::{IndexStore, KeyQuery, SyncMode};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = IndexStore::open_or_create("data/hardhat/speeding.bf", 64, SyncMode::Batched)?;
//!
//!     store.insert("spd::080::OBU-1::20240101", "0xabc").await?;
//!
//!     let tx_ids = store.search(&KeyQuery::GtEq("spd::060::".into())).await?;
//!     println!("{} matching transactions", tx_ids.len());
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod file;
pub mod index_store;
pub mod tree;
pub mod types;

pub use error::{StoreError, StoreResult};
pub use file::{FileHeader, IndexFile, SyncMode};
pub use index_store::{IndexStore, IndexWriter};
pub use tree::OrderedTree;
pub use types::{ComparisonOp, IndexRecord, InsertOutcome, KeyQuery, StoreStats};
