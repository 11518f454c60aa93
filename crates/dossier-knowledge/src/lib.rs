//! Dossier Knowledge - structured research knowledge
//!
//! The schema-validated aggregate the extractor stage produces and every
//! later stage consumes:
//! - [`KnowledgeBase`]: title, sources, topics, abstract, conclusion
//! - [`validate`]: reference integrity and id/shape checks
//! - [`parse_knowledge_base`]: narrow, parse and validate a generator payload
//!
//! # Example
//!
//! ```rust,ignore
//! use dossier_knowledge::parse_knowledge_base;
//!
//! let kb = parse_knowledge_base(raw_response)?;
//! for topic in &kb.topics {
//!     println!("{} {}", topic.id, topic.title);
//! }
//! ```

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod error;
pub mod ids;
pub mod model;
pub mod parse;
pub mod validate;

pub use error::{KnowledgeError, Violation};
pub use ids::{IdError, SubtopicId, TopicId};
pub use model::{KnowledgeBase, Source, Subtopic, Topic};
pub use parse::{extract_payload, parse_knowledge_base};
pub use validate::{validate, violations};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
