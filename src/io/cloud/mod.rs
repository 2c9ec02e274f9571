//! Remote object storage behind a provider-agnostic trait.
//!
//! A [`Context`](crate::Context) receives its [`ObjectStore`] at construction, so
//! pipelines never reach for a globally configured client and tests can swap in
//! [`FakeObjectStore`].
//!
//! ```
//! use stagecache::io::cloud::*;
//!
//! # fn main() -> ObjectStoreResult<()> {
//! let store = FakeObjectStore::new();
//! store.put_object("bucket", "stages/rows.jsonl", b"{}\n")?;
//! assert!(store.object_exists("bucket", "stages/rows.jsonl")?);
//! # Ok(())
//! # }
//! ```
//!
//! Implementing a real provider:
//!
//! ```ignore
//! use stagecache::io::cloud::*;
//! use aws_sdk_s3::Client;
//!
//! struct S3Store {
//!     client: Client,
//!     rt: tokio::runtime::Runtime,
//! }
//!
//! impl ObjectStore for S3Store {
//!     fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> ObjectStoreResult<()> {
//!         self.rt
//!             .block_on(
//!                 self.client
//!                     .put_object()
//!                     .bucket(bucket)
//!                     .key(key)
//!                     .body(data.to_vec().into())
//!                     .send(),
//!             )
//!             .map(|_| ())
//!             .map_err(|e| ObjectStoreError::new(ErrorKind::Network, e.to_string()))
//!     }
//!     // ... get_object, object_exists, delete_object
//! }
//! ```

pub mod fake;
pub mod traits;

pub use fake::*;
pub use traits::*;
