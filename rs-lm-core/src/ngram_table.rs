use std::collections::HashMap;

use crate::counter::Counter;
use crate::error::{LmError, Result};
use crate::tokenizer::simple_tokenize;

/// Largest gram length a table may hold.
pub const MAX_GRAM: usize = 5;

/// Next-token marker recorded after the last context of a sequence.
pub const END_OF_SEQUENCE: &str = "";

/// One level of the table: context key → next-token counter.
pub type Level = HashMap<String, Counter>;

/// Word-level n-gram counts for every gram length from 1 to `max_n`.
///
/// Level `k` (0-based) holds contexts of `k + 1` tokens, keyed by the tokens
/// joined with single spaces. Each context maps to a [`Counter`] of the
/// tokens that followed it, with [`END_OF_SEQUENCE`] standing for "nothing
/// followed".
///
/// # Responsibilities
/// - Count transitions of a token sequence at every level at once
/// - Predict next tokens with strict backoff from the longest context
/// - Merge with another table of the same order
///
/// # Invariants
/// - `levels.len() == max_n` and `1 <= max_n <= MAX_GRAM`
/// - A (context, next) count equals the number of times the context was
///   followed by that token in training, plus fine-tuning adjustments
#[derive(Clone, Debug, PartialEq)]
pub struct NgramTable {
	max_n: usize,
	levels: Vec<Level>,
}

impl NgramTable {
	/// Creates an empty table. `max_n` is clamped to `[1, MAX_GRAM]`.
	pub fn new(max_n: usize) -> Self {
		let max_n = max_n.clamp(1, MAX_GRAM);
		Self { max_n, levels: vec![Level::new(); max_n] }
	}

	/// Rebuilds a table from raw levels, e.g. after decoding a snapshot.
	///
	/// # Errors
	/// Returns `CorruptSnapshot` if there are no levels or more than `MAX_GRAM`.
	pub fn from_levels(levels: Vec<Level>) -> Result<Self> {
		if levels.is_empty() || levels.len() > MAX_GRAM {
			return Err(LmError::CorruptSnapshot(format!(
				"expected 1 to {MAX_GRAM} levels, got {}",
				levels.len()
			)));
		}
		Ok(Self { max_n: levels.len(), levels })
	}

	pub fn max_n(&self) -> usize {
		self.max_n
	}

	/// Returns level `index` (gram length `index + 1`), if it exists.
	pub fn level(&self, index: usize) -> Option<&Level> {
		self.levels.get(index)
	}

	pub fn levels(&self) -> &[Level] {
		&self.levels
	}

	pub(crate) fn into_levels(self) -> Vec<Level> {
		self.levels
	}

	/// Returns the counter of `context` at level `index`.
	pub fn counter(&self, index: usize, context: &str) -> Option<&Counter> {
		self.levels.get(index)?.get(context)
	}

	/// Returns the counter of `context` at level `index`, creating it if needed.
	///
	/// `index` must be below `max_n`.
	pub(crate) fn counter_entry(&mut self, index: usize, context: String) -> &mut Counter {
		self.levels[index].entry(context).or_default()
	}

	/// Number of distinct contexts across all levels.
	pub fn context_count(&self) -> usize {
		self.levels.iter().map(HashMap::len).sum()
	}

	/// Counts every transition of `tokens` at every gram length.
	///
	/// For each length `n` and each start `i`, the context `tokens[i..i+n]`
	/// is followed by `tokens[i+n]`, or by [`END_OF_SEQUENCE`] at the tail.
	pub fn update_model(&mut self, tokens: &[String]) {
		for (index, context, next) in transitions(tokens, self.max_n) {
			self.levels[index].entry(context).or_default().add(next, 1.0);
		}
	}

	/// Returns the next tokens of the longest matching context, most
	/// frequent first.
	///
	/// Tries the last `min(len, max_n)` tokens of the prefix, then shorter
	/// suffixes. Levels are never blended: the first hit wins. Returns an
	/// empty list when no suffix was ever observed.
	pub fn predict_next_word(&self, prefix: &[String]) -> Vec<String> {
		let longest = prefix.len().min(self.max_n);
		for n in (1..=longest).rev() {
			let context = prefix[prefix.len() - n..].join(" ");
			if let Some(counter) = self.levels[n - 1].get(&context) {
				return counter.most_common(None).into_iter().map(|(token, _)| token).collect();
			}
		}
		Vec::new()
	}

	/// Tokenizes `text` with [`simple_tokenize`] and counts it.
	pub fn learn(&mut self, text: &str) {
		self.update_model(&simple_tokenize(text));
	}

	/// Merges another table into this one.
	///
	/// # Errors
	/// Returns `InvalidInput` if the tables have different orders.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		if self.max_n != other.max_n {
			return Err(LmError::InvalidInput(format!(
				"cannot merge a table of order {} into one of order {}",
				other.max_n, self.max_n
			)));
		}

		for (level, other_level) in self.levels.iter_mut().zip(&other.levels) {
			for (context, counter) in other_level {
				if let Some(existing) = level.get_mut(context) {
					existing.merge(counter);
				} else {
					level.insert(context.clone(), counter.clone());
				}
			}
		}

		Ok(())
	}
}

/// Yields `(level index, context key, next token)` for every gram length up
/// to `max_n` and every start position of `tokens`.
pub(crate) fn transitions(tokens: &[String], max_n: usize) -> impl Iterator<Item = (usize, String, String)> + '_ {
	(1..=max_n).flat_map(move |n| {
		let starts = (tokens.len() + 1).saturating_sub(n);
		(0..starts).map(move |i| {
			let context = tokens[i..i + n].join(" ");
			let next = tokens.get(i + n).cloned().unwrap_or_else(|| END_OF_SEQUENCE.to_owned());
			(n - 1, context, next)
		})
	})
}
