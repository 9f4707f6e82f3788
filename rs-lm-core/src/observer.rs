//! Observation hooks for model state changes.
//!
//! A [`LanguageModel`](crate::language_model::LanguageModel) reports what it
//! does to the observer it was built with. The default observer ignores
//! everything; [`LogObserver`] forwards to the `log` facade so binaries decide
//! verbosity once, at process start.

use std::path::PathBuf;

/// Something the model did.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelEvent {
	Trained { tokens: usize, vocabulary: usize },
	FineTuned { tokens: usize, learning_rate: f64 },
	Evaluated { samples: usize },
	Saved { path: PathBuf },
	Loaded { path: PathBuf, max_n: usize, vocabulary: usize },
	Cleared,
}

/// Receives [`ModelEvent`]s.
pub trait ModelObserver: Send + Sync {
	fn notify(&self, event: &ModelEvent);
}

/// Discards every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopObserver;

impl ModelObserver for NoopObserver {
	fn notify(&self, _event: &ModelEvent) {}
}

/// Writes events through `log`.
///
/// Training and fine-tuning go to `debug`, since they fire once per line
/// when reading a corpus; the rest goes to `info`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogObserver;

impl ModelObserver for LogObserver {
	fn notify(&self, event: &ModelEvent) {
		match event {
			ModelEvent::Trained { tokens, vocabulary } => {
				log::debug!("trained on {tokens} tokens, vocabulary is now {vocabulary}")
			}
			ModelEvent::FineTuned { tokens, learning_rate } => {
				log::debug!("fine-tuned on {tokens} tokens at rate {learning_rate}")
			}
			ModelEvent::Evaluated { samples } => log::info!("evaluated {samples} samples"),
			ModelEvent::Saved { path } => log::info!("model saved to {}", path.display()),
			ModelEvent::Loaded { path, max_n, vocabulary } => log::info!(
				"model loaded from {} (max_n={max_n}, vocabulary={vocabulary})",
				path.display()
			),
			ModelEvent::Cleared => log::info!("model cleared"),
		}
	}
}
