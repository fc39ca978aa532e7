//! spandb - client-side transactions and value marshalling for a
//! strongly-consistent relational database
//!
//! - `value`: typed wire values and their encoding from and decoding into
//!   application types, with null scalars, null arrays and null elements kept
//!   apart
//! - `statement`: SQL statements whose parameters are checked at construction
//! - `transaction` / `batch`: optimistic read-write transactions and atomic
//!   write batches
//! - `executor`: the trait a database client implements, plus an in-memory
//!   executor over the MVCC `storage` engine
//! - `retry`: replaying transactions that lose a commit-time conflict

pub mod batch;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod retry;
pub mod session;
pub mod statement;
pub mod storage;
pub mod transaction;
pub mod value;

pub use batch::{Batch, BatchState};
pub use config::{QueryOptions, RetryPolicy, SessionConfig};
pub use context::Context;
pub use error::{Error, Result};
pub use executor::{Column, Executor, MemoryExecutor, ResultSet, Row, Rows, Scope};
pub use session::Session;
pub use statement::{Statement, StatementBuilder};
pub use transaction::{Transaction, TransactionState};
pub use value::{FromValue, Native, Shape, ToValue, Type, TypeCode, Value};
