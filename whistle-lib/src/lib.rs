//! Whistle - rulebook retrieval and grounded answering for referees
//!
//! # Architecture
//!
//! ```text
//! Rules PDF / comments -> Segmenter -> RuleFragment -> FragmentStore
//!                                                           |
//! Question -> FragmentStore::search <-----------------------+
//!                    |
//!               Orchestrator -> LlmClient -> Answer + cited paragraphs
//! ```
//!
//! # Example
//!
//! ```ignore
//! use whistle_lib::{
//!     answer::Orchestrator,
//!     embed::FastEmbedder,
//!     llm::OpenAiClient,
//!     segment::{NumberedSegmenter, Segmenter},
//!     store::{FragmentStore, MemoryBackend},
//! };
//!
//! let store = FragmentStore::new(FastEmbedder::new(&settings.embedding)?, MemoryBackend::new());
//! store.ensure_collections()?;
//!
//! // Index the rulebook
//! let fragments = NumberedSegmenter.segment(&rules_text);
//! store.add_fragments_batch(&fragments)?;
//!
//! // Answer a question
//! let orchestrator = Orchestrator::new(store, OpenAiClient::new(&settings.llm)?);
//! let reply = orchestrator.handle_question("When is a foul awarded?")?;
//! ```

pub mod answer;
pub mod config;
pub mod embed;
pub mod error;
pub mod fragment;
pub mod ingest;
pub mod llm;
pub mod segment;
pub mod store;

pub use error::{Error, Result};
