//! Errors raised by the language-model core.
//!
//! Structural violations (bad arguments, unreadable snapshots) are reported
//! through [`LmError`]. Numeric degeneracies such as a perplexity over zero
//! tokens are not errors: they surface as `f64::NAN` in the returned values.

use std::fmt;
use std::io;

/// Errors produced by the counter, the n-gram table and the language model.
///
/// # Variants
///
/// - **InvalidInput**: untyped data could not be read as text (non UTF-8 corpus,
///   non-string request field), or two tables of different order were merged.
/// - **InvalidAmount**: a counter was incremented or decremented by a negative
///   or non-numeric amount.
/// - **InvalidLearningRate**: fine-tuning was requested with a rate outside `(0, 1]`.
/// - **InvalidConfig**: a configuration value is out of range or unparseable.
/// - **Io**: the underlying file system failed.
/// - **Serialization**: a snapshot could not be encoded or decoded.
/// - **CorruptSnapshot**: a decoded snapshot violates the model invariants.
#[derive(Debug)]
pub enum LmError {
	InvalidInput(String),
	InvalidAmount(f64),
	InvalidLearningRate(f64),
	InvalidConfig(String),
	Io(io::Error),
	Serialization(String),
	CorruptSnapshot(String),
}

impl LmError {
	/// Returns `true` when the error was caused by the caller's arguments
	/// rather than by the environment.
	#[must_use]
	pub fn is_caller_error(&self) -> bool {
		matches!(
			self,
			LmError::InvalidInput(_)
				| LmError::InvalidAmount(_)
				| LmError::InvalidLearningRate(_)
				| LmError::InvalidConfig(_)
		)
	}
}

impl fmt::Display for LmError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LmError::InvalidInput(m) => write!(f, "invalid input: {m}"),
			LmError::InvalidAmount(a) => write!(f, "invalid amount {a}: must be a number >= 0"),
			LmError::InvalidLearningRate(r) => {
				write!(f, "invalid learning rate {r}: must be in (0, 1]")
			}
			LmError::InvalidConfig(m) => write!(f, "invalid config: {m}"),
			LmError::Io(e) => write!(f, "i/o error: {e}"),
			LmError::Serialization(m) => write!(f, "serialization error: {m}"),
			LmError::CorruptSnapshot(m) => write!(f, "corrupt snapshot: {m}"),
		}
	}
}

impl std::error::Error for LmError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			LmError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl From<io::Error> for LmError {
	fn from(e: io::Error) -> Self {
		LmError::Io(e)
	}
}

impl From<postcard::Error> for LmError {
	fn from(e: postcard::Error) -> Self {
		LmError::Serialization(e.to_string())
	}
}

impl From<serde_json::Error> for LmError {
	fn from(e: serde_json::Error) -> Self {
		LmError::Serialization(e.to_string())
	}
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, LmError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn caller_errors_are_distinguished_from_environment_errors() {
		assert!(LmError::InvalidAmount(-1.0).is_caller_error());
		assert!(LmError::InvalidLearningRate(0.0).is_caller_error());
		assert!(!LmError::CorruptSnapshot("levels".into()).is_caller_error());
		assert!(!LmError::Io(io::Error::other("disk")).is_caller_error());
	}

	#[test]
	fn display_names_the_offending_value() {
		assert_eq!(
			LmError::InvalidLearningRate(1.5).to_string(),
			"invalid learning rate 1.5: must be in (0, 1]"
		);
	}
}
