use crate::error::{LmError, Result};
use crate::ngram_table::MAX_GRAM;

/// Prefix shared by every environment variable the crate reads.
pub const ENV_PREFIX: &str = "RS_LM_";

/// Default gram length.
pub const DEFAULT_MAX_N: usize = 3;

/// Default embedding size returned by `get_embeddings`.
pub const DEFAULT_EMBEDDING_DIMS: usize = 10;

/// Default number of tokens appended by `generate_text`.
pub const DEFAULT_GENERATE_LENGTH: usize = 10;

/// Token tracked by the precision/recall/F1 counters of `evaluate`.
pub const DEFAULT_EVALUATION_TARGET: &str = "targetWord";

/// Construction parameters of a language model.
///
/// # Responsibilities
/// - Hold the gram length and the defaults of the parameterised operations
/// - Validate values on assignment so a built model never sees a bad one
/// - Read overrides from `RS_LM_*` environment variables
///
/// # Invariants
/// - `max_n` is in `[1, MAX_GRAM]`
/// - `embedding_dims` is at least 1
#[derive(Clone, Debug, PartialEq)]
pub struct ModelConfig {
	/// Largest gram length (clamped).
	max_n: usize,

	/// Default vector size for embeddings.
	embedding_dims: usize,

	/// Default number of generated tokens.
	pub generate_length: usize,

	/// Token counted as the positive class during evaluation.
	pub evaluation_target: String,

	/// Seed of the model's random source. `None` seeds from the OS.
	pub seed: Option<u64>,
}

impl Default for ModelConfig {
	fn default() -> Self {
		Self {
			max_n: DEFAULT_MAX_N,
			embedding_dims: DEFAULT_EMBEDDING_DIMS,
			generate_length: DEFAULT_GENERATE_LENGTH,
			evaluation_target: DEFAULT_EVALUATION_TARGET.to_owned(),
			seed: None,
		}
	}
}

impl ModelConfig {
	/// Default configuration with the given gram length (clamped).
	pub fn with_max_n(max_n: usize) -> Self {
		let mut config = Self::default();
		config.set_max_n(max_n);
		config
	}

	pub fn max_n(&self) -> usize {
		self.max_n
	}

	/// Sets the gram length, clamped to `[1, MAX_GRAM]`.
	pub fn set_max_n(&mut self, max_n: usize) {
		self.max_n = max_n.clamp(1, MAX_GRAM);
	}

	pub fn embedding_dims(&self) -> usize {
		self.embedding_dims
	}

	/// Sets the default embedding size.
	///
	/// # Errors
	/// Returns `InvalidConfig` if `dims` is 0.
	pub fn set_embedding_dims(&mut self, dims: usize) -> Result<()> {
		if dims == 0 {
			return Err(LmError::InvalidConfig("embedding dims must be >= 1".to_owned()));
		}
		self.embedding_dims = dims;
		Ok(())
	}

	/// Builds a configuration from defaults overridden by environment variables.
	///
	/// Reads `RS_LM_MAX_N`, `RS_LM_EMBEDDING_DIMS`, `RS_LM_GENERATE_LENGTH`,
	/// `RS_LM_TARGET` and `RS_LM_SEED`. Unset variables keep their default.
	///
	/// # Errors
	/// Returns `InvalidConfig` if a variable is set but cannot be parsed.
	pub fn from_env() -> Result<Self> {
		let mut config = Self::default();
		if let Some(max_n) = env_parsed::<usize>(&env_key("MAX_N"))? {
			config.set_max_n(max_n);
		}
		if let Some(dims) = env_parsed::<usize>(&env_key("EMBEDDING_DIMS"))? {
			config.set_embedding_dims(dims)?;
		}
		if let Some(length) = env_parsed::<usize>(&env_key("GENERATE_LENGTH"))? {
			config.generate_length = length;
		}
		if let Some(target) = env_string(&env_key("TARGET"))? {
			config.evaluation_target = target;
		}
		config.seed = env_parsed::<u64>(&env_key("SEED"))?;
		Ok(config)
	}
}

/// Returns the full environment variable name for a suffix (`SEED` → `RS_LM_SEED`).
pub fn env_key(suffix: &str) -> String {
	format!("{ENV_PREFIX}{suffix}")
}

/// Reads an environment variable, `None` if unset.
///
/// # Errors
/// Returns `InvalidConfig` if the variable is set but not valid Unicode.
pub fn env_string(key: &str) -> Result<Option<String>> {
	match std::env::var(key) {
		Ok(s) => Ok(Some(s)),
		Err(std::env::VarError::NotPresent) => Ok(None),
		Err(e) => Err(LmError::InvalidConfig(format!("{key}: {e}"))),
	}
}

/// Reads and parses an environment variable, `None` if unset.
///
/// # Errors
/// Returns `InvalidConfig` if the value cannot be parsed into `T`.
pub fn env_parsed<T>(key: &str) -> Result<Option<T>>
where
	T: std::str::FromStr,
	T::Err: std::fmt::Display,
{
	let Some(raw) = env_string(key)? else {
		return Ok(None);
	};
	raw.trim()
		.parse()
		.map(Some)
		.map_err(|e| LmError::InvalidConfig(format!("{key}={raw:?}: {e}")))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_match_documented_values() {
		let config = ModelConfig::default();
		assert_eq!(config.max_n(), 3);
		assert_eq!(config.embedding_dims(), 10);
		assert_eq!(config.generate_length, 10);
		assert_eq!(config.evaluation_target, "targetWord");
		assert_eq!(config.seed, None);
	}

	#[test]
	fn max_n_is_clamped_not_rejected() {
		assert_eq!(ModelConfig::with_max_n(0).max_n(), 1);
		assert_eq!(ModelConfig::with_max_n(42).max_n(), 5);
	}

	#[test]
	fn zero_embedding_dims_is_rejected() {
		let mut config = ModelConfig::default();
		assert!(matches!(config.set_embedding_dims(0), Err(LmError::InvalidConfig(_))));
		assert_eq!(config.embedding_dims(), 10);
	}

	#[test]
	fn env_helpers_read_and_parse() {
		// Keys unique to this test so parallel tests never race on them
		let key = env_key("TEST_ONLY_PARSE");
		assert_eq!(env_parsed::<u64>(&key).unwrap(), None);

		unsafe { std::env::set_var(&key, " 42 ") };
		assert_eq!(env_parsed::<u64>(&key).unwrap(), Some(42));

		unsafe { std::env::set_var(&key, "forty-two") };
		assert!(matches!(env_parsed::<u64>(&key), Err(LmError::InvalidConfig(_))));

		unsafe { std::env::remove_var(&key) };
	}
}
