//! Durable ordered key-value storage for tidemark.
//!
//! A [`Storage`] owns one store directory: a SQLite database in WAL mode
//! holding a single `WITHOUT ROWID` table of byte keys and values, and a
//! `LOCK` file that keeps a second handle (from this process or another)
//! from opening the same directory.
//!
//! # Guarantees
//!
//! - `put`, `delete` and `write` are synced to disk before they return.
//! - `delete` writes a tombstone; deleted keys never come back from `get`
//!   or `scan`, even before [`Storage::compact`] purges them.
//! - A [`Snapshot`] is a read transaction: it sees exactly the writes that
//!   committed before it was taken.
//! - A [`Scan`] is lazy and pages through its snapshot in key order.
//!
//! # Example
//!
//! ```no_run
//! use storage::{KeyRange, Storage};
//!
//! let store = Storage::open("data/store")?;
//! store.put(b"a1", b"first")?;
//! store.put(b"a2", b"second")?;
//!
//! for entry in store.scan(KeyRange::prefix(b"a"))? {
//!     let (key, value) = entry?;
//!     println!("{key:?} => {value:?}");
//! }
//! # Ok::<(), storage::Error>(())
//! ```

mod batch;
mod error;
mod lock;
mod pool;
mod range;
mod snapshot;
mod store;

pub use batch::{Op, WriteBatch};
pub use error::{Error, Result};
pub use range::{KeyRange, prefix_successor};
pub use snapshot::{Entry, Scan, Snapshot};
pub use store::{Options, Stats, Storage};
