//! # pvkg
//!
//! Grounded question answering over a photovoltaics fact base.
//!
//! Two agents answer questions through an OpenAI-compatible
//! text-generation service:
//!
//! - [`agent::GroundedAgent`] builds a retrieval context from the fact
//!   base and makes one model call, caching answers across restarts.
//! - [`agent::ReasoningAgent`] lets the model call read-only fact-base
//!   tools turn by turn, bounded by an iteration limit and a deadline.
//!
//! Every reasoning answer comes with a [`provenance::ProvenanceRecord`]
//! naming the entities it cites and the facts that support them.
//! [`service::KnowledgeService`] wires everything together.
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use pvkg::agent::{AgentConfig, create_provider};
//! use pvkg::facts::SqliteFactStore;
//! use pvkg::service::KnowledgeService;
//!
//! # async fn run() -> pvkg::Result<()> {
//! let config = AgentConfig::from_env()?;
//! let facts = Arc::new(SqliteFactStore::open_existing(".pvkg/facts.db".as_ref())?);
//! let service = KnowledgeService::new(&config, facts, create_provider(&config)?);
//! let answer = service.ask("What is the bandgap of MAPbI3?").await?;
//! # let _ = answer;
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cache;
pub mod cli;
pub mod error;
pub mod facts;
#[cfg(feature = "mcp")]
pub mod mcp;
pub mod provenance;
pub mod service;

pub use error::{AgentError, CacheError, CommandError, Error, FactError, Result};
pub use provenance::{ProvenanceRecord, ProvenanceRecorder};
pub use service::{KnowledgeService, ReasonedAnswer, ServiceCacheStats};
