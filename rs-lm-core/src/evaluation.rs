//! Scoring helpers behind [`LanguageModel::evaluate`](crate::language_model::LanguageModel::evaluate).

use serde::{Deserialize, Serialize};

use crate::counter::Counter;

/// One evaluation sample.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TestCase {
	pub input: String,
	pub reference: String,
}

impl TestCase {
	pub fn new(input: impl Into<String>, reference: impl Into<String>) -> Self {
		Self { input: input.into(), reference: reference.into() }
	}
}

/// Dataset-level metrics.
///
/// Averages over an empty dataset are NaN; `f1_score` is then 0.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationReport {
	pub average_perplexity: f64,
	pub average_bleu: f64,
	pub accuracy: f64,
	pub precision: f64,
	pub recall: f64,
	pub f1_score: f64,
	pub samples: usize,
}

/// Unigram precision of `candidate` against `reference`, each candidate
/// token matching at most as many times as it occurs in the reference.
///
/// NaN for an empty candidate.
pub fn bleu1_precision(candidate: &[String], reference: &[String]) -> f64 {
	let mut remaining = Counter::from_items(reference.iter().cloned());
	let mut matches = 0usize;
	for token in candidate {
		if remaining.contains(token) {
			matches += 1;
			remaining.remove_amount(token, 1.0);
		}
	}
	matches as f64 / candidate.len() as f64
}

/// True/false positive and false negative tallies for one target token.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Confusion {
	pub true_positives: usize,
	pub false_positives: usize,
	pub false_negatives: usize,
}

impl Confusion {
	/// Records one sample where the target was (or was not) present in the
	/// input and in the reference.
	pub fn record(&mut self, in_input: bool, in_reference: bool) {
		match (in_input, in_reference) {
			(true, true) => self.true_positives += 1,
			(true, false) => self.false_positives += 1,
			(false, true) => self.false_negatives += 1,
			(false, false) => {}
		}
	}

	/// `tp / (tp + fp)`, 0 without any positive prediction.
	pub fn precision(&self) -> f64 {
		ratio(self.true_positives, self.true_positives + self.false_positives)
	}

	/// `tp / (tp + fn)`, 0 without any positive reference.
	pub fn recall(&self) -> f64 {
		ratio(self.true_positives, self.true_positives + self.false_negatives)
	}

	/// Harmonic mean of precision and recall, 0 when both are 0.
	pub fn f1(&self) -> f64 {
		let (p, r) = (self.precision(), self.recall());
		if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 }
	}
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
	if denominator == 0 { 0.0 } else { numerator as f64 / denominator as f64 }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::tokenizer::simple_tokenize;

	#[test]
	fn bleu1_clips_by_reference_counts() {
		let candidate = simple_tokenize("the the the cat");
		let reference = simple_tokenize("the cat sat");
		assert_eq!(bleu1_precision(&candidate, &reference), 0.5);
	}

	#[test]
	fn bleu1_of_empty_candidate_is_nan() {
		assert!(bleu1_precision(&[], &simple_tokenize("anything")).is_nan());
	}

	#[test]
	fn confusion_metrics() {
		let mut confusion = Confusion::default();
		confusion.record(true, true);
		confusion.record(true, false);
		confusion.record(false, true);
		confusion.record(false, false);
		assert_eq!(confusion.precision(), 0.5);
		assert_eq!(confusion.recall(), 0.5);
		assert_eq!(confusion.f1(), 0.5);
		assert_eq!(Confusion::default().f1(), 0.0);
	}
}
