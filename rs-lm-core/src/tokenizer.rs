//! Word tokenization.
//!
//! The model itself only ever uses [`simple_tokenize`]. The [`Tokenizer`]
//! trait is the seam for callers who bring their own language-aware
//! tokenizer and want to feed its output to the model.

/// Splits text into tokens and joins tokens back into text.
pub trait Tokenizer {
	fn tokenize(&self, text: &str) -> Vec<String>;

	fn detokenize(&self, tokens: &[String]) -> String;
}

/// The model's built-in tokenizer, see [`simple_tokenize`].
#[derive(Clone, Copy, Debug, Default)]
pub struct SimpleTokenizer;

impl Tokenizer for SimpleTokenizer {
	fn tokenize(&self, text: &str) -> Vec<String> {
		simple_tokenize(text)
	}

	fn detokenize(&self, tokens: &[String]) -> String {
		tokens.join(" ")
	}
}

/// Lowercases `text`, strips every character that is not a word character,
/// whitespace or an apostrophe, then splits on whitespace.
///
/// Word characters are Unicode alphanumerics and `_`.
///
/// Example: `"Don't STOP, me-now!"` → `["don't", "stop", "menow"]`
pub fn simple_tokenize(text: &str) -> Vec<String> {
	let cleaned: String = text
		.trim()
		.chars()
		.flat_map(char::to_lowercase)
		.filter(|c| c.is_alphanumeric() || *c == '_' || *c == '\'' || c.is_whitespace())
		.collect();
	cleaned.split_whitespace().map(str::to_owned).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_punctuation_but_keeps_apostrophes() {
		assert_eq!(simple_tokenize("  Don't STOP, me-now! "), vec!["don't", "stop", "menow"]);
	}

	#[test]
	fn empty_and_blank_text_yield_no_tokens() {
		assert!(simple_tokenize("").is_empty());
		assert!(simple_tokenize(" \t\n ").is_empty());
		assert!(simple_tokenize("?!.").is_empty());
	}

	#[test]
	fn detokenize_joins_with_single_spaces() {
		let tokens = SimpleTokenizer.tokenize("Hello,   world");
		assert_eq!(SimpleTokenizer.detokenize(&tokens), "hello world");
	}
}
