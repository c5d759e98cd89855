//! # batchq
//!
//! Durable, deduplicating batch-job queue over SQLite.
//!
//! Producers [`submit`](db::Db::submit) requests identified by a key derived
//! from the target URI and canonicalized parameters; duplicate submissions
//! collapse onto the existing entry. Workers poll
//! [`next_request`](db::Db::next_request) to claim the oldest pending entry
//! and close it out with finish/abort/fail. All state lives in one SQLite
//! table, so the queue survives restarts and can be inspected externally.
//!
//! ```no_run
//! use batchq::{config::Config, db::Db, model::BatchRequest};
//! use secrecy::ExposeSecret;
//!
//! # async fn run() -> Result<(), batchq::error::Error> {
//! let config = Config::load()?;
//! batchq::telemetry::init_tracing(&config.log_level);
//!
//! let db = Db::connect_with(config.database_url.expose_secret(), config.queue).await?;
//! let status = db
//!     .submit(&BatchRequest::from_encoded("report", "year=2024&area=W06000022"))
//!     .await?;
//! println!("{}", status.to_json());
//! # Ok(())
//! # }
//! ```

pub mod codec;
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod telemetry;
