//! The five pipeline stages

pub mod assembler;
pub mod critic;
pub mod extractor;
pub mod router;
pub mod writer;

pub use assembler::AssemblerStage;
pub use critic::CriticStage;
pub use extractor::ExtractorStage;
pub use router::RouterStage;
pub use writer::{WriterMode, WriterStage};
