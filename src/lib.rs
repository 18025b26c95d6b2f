//! # dump_keeper
//!
//! Runs database dump tools for configured backup plans, keeps a bounded
//! number of archives per plan and sweeps stale files out of the work dir.
//!
//! ## Features
//!
//! - **Platform dispatch**: MongoDB via `mongodump`, other platforms reported
//!   as unknown or unimplemented
//! - **Bounded dumps**: every dump runs under the plan's timeout, output is
//!   kept as a log next to the archive
//! - **Retention**: newest N archives and logs per plan are kept
//! - **Janitor**: files older than a day are removed from the work dir
//!
//! ## Quick Start
//!
//! ```no_run
//! use dump_keeper::backup::backup_config::BackupConfig;
//!
//! let config = BackupConfig::load("config.yml")?;
//! let thread_pool = rayon::ThreadPoolBuilder::new().build()?;
//! config.run_all(&thread_pool, chrono::Utc::now())?;
//! config.cleanup()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod backup;
