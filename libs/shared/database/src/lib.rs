pub mod storage;

pub use storage::StorageClient;
