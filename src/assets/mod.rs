mod blob_store;
mod linker;

pub use blob_store::{BlobError, BlobStore, FsBlobStore, StoredBlob};
pub use linker::{AssetLinker, LinkState};
