//! # combat_client
//!
//! Peer runtime for the combat authority layer.
//!
//! A peer process:
//!
//! 1. Connects to NATS and announces itself on `combat.authority.join`.
//! 2. Subscribes to its own inbox, `combat.peer.<peer_id>`.
//! 3. Applies replication messages to a shadow world and skill signals to
//!    its [`PeerSkillHost`](combat_sim::PeerSkillHost).
//! 4. Publishes the host's confirms and requests to `combat.authority.inbox`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use combat_client::{ClientConfig, PeerRunner, content};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> anyhow::Result<()> {
//!     let log = content::EventLog::default();
//!     let mut runner = PeerRunner::new(ClientConfig::new())?;
//!     for def in content::skills(&log) {
//!         runner.register(def);
//!     }
//!     runner.run(|runner| {
//!         runner.request_start(0);
//!     }).await
//! }
//! ```

pub mod config;
pub mod content;
pub mod runner;

pub use config::ClientConfig;
pub use runner::PeerRunner;
