//! Word-level n-gram language model.
//!
//! This crate provides a counting language model including:
//! - A real-valued multiset counter (`Counter`)
//! - A multi-level n-gram table with strict backoff prediction (`NgramTable`)
//! - A language model on top of it: training, prediction, generation,
//!   evaluation, fine-tuning, probability/perplexity, and count-based
//!   embeddings and attention (`LanguageModel`)
//! - Snapshot persistence in binary or JSON form
//!
//! Everything is synchronous and owned by a single model instance; callers
//! sharing a model across threads must serialize access themselves.

pub mod config;
pub mod counter;
pub mod error;
pub mod evaluation;
pub mod language_model;
pub mod ngram_table;
pub mod observer;
pub mod persistence;
pub mod tokenizer;

/// I/O utilities (line reading, path helpers, atomic writes).
///
/// Not exposed
pub(crate) mod io;

pub use config::ModelConfig;
pub use counter::Counter;
pub use error::{LmError, Result};
pub use evaluation::{EvaluationReport, TestCase};
pub use language_model::{Attention, LanguageModel};
pub use ngram_table::NgramTable;
pub use observer::{LogObserver, ModelEvent, ModelObserver, NoopObserver};
pub use persistence::{Context, ContextValue, ModelSnapshot};
pub use tokenizer::{SimpleTokenizer, Tokenizer};
