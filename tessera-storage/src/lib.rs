//! Tessera Storage - Tiered Read Path
//!
//! Row keys, payload codec, batched base-tier reads, the hot-swappable
//! branch tier and the resolver that combines them. [`Store`] exposes one
//! handler per request kind on top of these.

pub mod backend;
pub mod branch;
pub mod fallback;
pub mod keys;
pub mod lmdb;
pub mod memory;
pub mod payload;
pub mod ranking;
pub mod reader;
pub mod resolver;
pub mod store;

pub use backend::{Row, RowSet, RowStore};
pub use branch::{
    BranchCache, BranchCacheLoader, CacheState, DirectorySnapshotSource, Generation, LoadReport,
    ReloadSubscriber, SnapshotNotice, SnapshotReader, SnapshotSource,
};
pub use fallback::{Cell, FallbackRequest, FallbackRows, OversizeFallback};
pub use keys::{AncestorSlot, KeyKind, RowToken};
pub use lmdb::{LmdbRowStore, LmdbStoreError};
pub use memory::InMemoryRowStore;
pub use payload::{unzip_and_decode, zip_and_encode};
pub use ranking::{ObsProp, LOWEST_RANK};
pub use reader::{BatchedReader, CancelHandle, DecodedRows, ReadContext, ReaderConfig};
pub use resolver::{
    MergeOutcome, MergePolicy, PlacesMerge, PopulationsMerge, TieredResolver, TieredRow,
};
pub use store::{apply_limit, triples_to_stat_var, Store};
