//! # agent-sync
//!
//! Synchronization of a managed computer against its fleet server.
//!
//! This crate provides:
//! - The ordered synchronization workflow (`SyncOrchestrator`)
//! - Software inventory deltas and the persisted snapshot
//! - Reconciliation of server-assigned printers with the local printing system
//! - The error ledger, lock file and run session
//! - Seams for the server transport, package manager, printing system and
//!   hardware probe, with HTTP, apt, CUPS and command implementations
//!
//! ## Example
//!
//! ```ignore
//! use agent_sync::{Collaborators, Config, HostIdentity, SyncOrchestrator};
//!
//! let config = Config::load()?;
//! let transport = HttpTransport::new(&config)?;
//! let collaborators = Collaborators {
//!     transport: &transport,
//!     pms: pms.as_ref(),
//!     printers: &cups,
//!     hardware: &probe,
//! };
//! let report = SyncOrchestrator::new(&config, collaborators, HostIdentity::detect(&config))
//!     .sync()?;
//! std::process::exit(report.exit_code());
//! ```

pub mod config;
pub mod console;
pub mod devices;
mod error;
pub mod hardware;
pub mod ledger;
pub mod lock;
mod orchestrator;
pub mod pms;
mod session;
pub mod software;
pub mod system;
pub mod transport;

pub use config::{ClientConfig, Config, KeyPaths, Paths};
pub use console::Console;
pub use error::{Result, SyncError, EXIT_PMS_FAILED};
pub use ledger::ErrorLedger;
pub use lock::LockFile;
pub use orchestrator::{Collaborators, SyncOrchestrator, SyncReport, COMMAND};
pub use session::SyncSession;
pub use software::{SnapshotStore, SoftwareDiff, SoftwareHistory};
pub use system::HostIdentity;
pub use transport::{Endpoint, ErrorCode, HttpTransport, Transport, TransportError};
