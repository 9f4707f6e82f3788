use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::config::ModelConfig;
use crate::error::{LmError, Result};
use crate::evaluation::{bleu1_precision, Confusion, EvaluationReport, TestCase};
use crate::io::{build_output_path, read_lines};
use crate::ngram_table::{transitions, NgramTable, END_OF_SEQUENCE};
use crate::observer::{ModelEvent, ModelObserver, NoopObserver};
use crate::persistence::{store_for_path, Context, ModelSnapshot, TableSnapshot};
use crate::tokenizer::{simple_tokenize, Tokenizer};

/// Weight given to a position none of whose contexts was ever observed.
const UNSEEN_ATTENTION_WEIGHT: f64 = 0.1;

/// Lowest count a fine-tuned (context, next) pair may fall to.
const FINE_TUNE_FLOOR: f64 = 0.1;

/// Number of predictions quoted by `explain_prediction`.
const EXPLAINED_PREDICTIONS: usize = 3;

/// Per-position attention weights of an input.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Attention {
	pub input: String,
	pub tokens: Vec<String>,
	pub weights: Vec<f64>,
}

/// A word-level n-gram language model.
///
/// The model owns one [`NgramTable`], the set of tokens it was trained on
/// and a free-form context map. Every read operation (prediction,
/// generation, probability, embeddings, attention) is answered from the
/// same table; training and fine-tuning write into it.
///
/// All text is tokenized with [`simple_tokenize`].
///
/// # Invariants
/// - `config.max_n() == table.max_n()`
/// - `vocabulary` holds every token passed to a training method since the
///   last clear or load
pub struct LanguageModel {
	table: NgramTable,
	vocabulary: HashSet<String>,
	context: Context,
	config: ModelConfig,
	rng: StdRng,
	observer: Arc<dyn ModelObserver>,
}

impl Default for LanguageModel {
	fn default() -> Self {
		Self::new(ModelConfig::default())
	}
}

impl fmt::Debug for LanguageModel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("LanguageModel")
			.field("max_n", &self.table.max_n())
			.field("contexts", &self.table.context_count())
			.field("vocabulary", &self.vocabulary.len())
			.field("context", &self.context)
			.finish()
	}
}

impl LanguageModel {
	/// Creates an empty model with a fresh table of `config.max_n()` levels.
	pub fn new(config: ModelConfig) -> Self {
		let table = NgramTable::new(config.max_n());
		Self::with_table(table, config)
	}

	/// Creates a model around an existing table.
	///
	/// The table's order wins over `config.max_n()`.
	pub fn with_table(table: NgramTable, mut config: ModelConfig) -> Self {
		config.set_max_n(table.max_n());
		let rng = match config.seed {
			Some(seed) => StdRng::seed_from_u64(seed),
			None => StdRng::from_os_rng(),
		};
		Self {
			table,
			vocabulary: HashSet::new(),
			context: Context::new(),
			config,
			rng,
			observer: Arc::new(NoopObserver),
		}
	}

	/// Replaces the observer notified of state changes.
	pub fn with_observer(mut self, observer: Arc<dyn ModelObserver>) -> Self {
		self.observer = observer;
		self
	}

	/// Loads the binary cache next to a corpus, or builds it.
	///
	/// `data/corpus.txt` is cached as `data/corpus.bin`. When the cache
	/// exists it is loaded and `config.max_n()` is superseded by the cached
	/// order; otherwise every line of the corpus is trained and the cache is
	/// written for the next run. `observer` sees the training or the load.
	pub fn from_corpus<P: AsRef<Path>>(
		corpus: P,
		config: ModelConfig,
		observer: Arc<dyn ModelObserver>,
	) -> Result<Self> {
		let cache = build_output_path(&corpus, "bin")?;
		let mut model = Self::new(config).with_observer(observer);
		if cache.exists() {
			model.load_model(&cache)?;
		} else {
			model.train_file(&corpus)?;
			model.save_model(&cache)?;
		}
		Ok(model)
	}

	pub fn max_n(&self) -> usize {
		self.table.max_n()
	}

	pub fn config(&self) -> &ModelConfig {
		&self.config
	}

	pub fn table(&self) -> &NgramTable {
		&self.table
	}

	/// Tokenizes `text` and counts it.
	pub fn train(&mut self, text: &str) {
		let tokens = simple_tokenize(text);
		self.train_tokens(&tokens);
	}

	/// Counts an already tokenized sequence.
	pub fn train_tokens(&mut self, tokens: &[String]) {
		self.table.update_model(tokens);
		self.vocabulary.extend(tokens.iter().cloned());
		self.observer.notify(&ModelEvent::Trained {
			tokens: tokens.len(),
			vocabulary: self.vocabulary.len(),
		});
	}

	/// Tokenizes `text` with a caller-supplied tokenizer and counts it.
	pub fn train_with(&mut self, tokenizer: &dyn Tokenizer, text: &str) {
		let tokens = tokenizer.tokenize(text);
		self.train_tokens(&tokens);
	}

	/// Trains every line of a UTF-8 text file as its own sequence.
	///
	/// Returns the number of lines read.
	///
	/// # Errors
	/// `Io` if the file cannot be read, `InvalidInput` if it is not UTF-8.
	pub fn train_file<P: AsRef<Path>>(&mut self, path: P) -> Result<usize> {
		let lines = read_lines(path)?;
		for line in &lines {
			self.train(line);
		}
		Ok(lines.len())
	}

	/// Returns up to `count` next tokens for `prefix`, most likely first.
	pub fn predict(&self, prefix: &str, count: usize) -> Vec<String> {
		let mut predictions = self.table.predict_next_word(&simple_tokenize(prefix));
		predictions.truncate(count);
		predictions
	}

	/// Extends `start` greedily by at most `length` tokens.
	///
	/// Each step appends the top prediction for the last `max_n` tokens.
	/// Generation stops early when nothing is predicted or when the end of
	/// sequence is the most likely continuation. The result always begins
	/// with `start` unchanged.
	pub fn generate_text(&self, start: &str, length: usize) -> String {
		let mut generated = start.to_owned();
		let mut tokens = simple_tokenize(start);

		for _ in 0..length {
			let window = &tokens[tokens.len().saturating_sub(self.max_n())..];
			match self.table.predict_next_word(window).into_iter().next() {
				Some(next) if next != END_OF_SEQUENCE => {
					generated.push(' ');
					generated.push_str(&next);
					tokens.push(next);
				}
				_ => break,
			}
		}

		generated
	}

	/// Shallow-merges `partial` into the context map; its keys win.
	pub fn set_context(&mut self, partial: Context) {
		self.context.extend(partial);
	}

	pub fn context(&self) -> &Context {
		&self.context
	}

	pub fn vocabulary(&self) -> &HashSet<String> {
		&self.vocabulary
	}

	pub fn vocabulary_size(&self) -> usize {
		self.vocabulary.len()
	}

	/// Relative frequency of `word` after `context`.
	///
	/// The level is chosen by the number of tokens in `context` (0-based, so
	/// a one-token context is looked up among two-token contexts) and is not
	/// clamped to the table's order. The key is `context` exactly as given,
	/// not its tokenized form. A missing level, key or word yields 0.
	pub fn get_probability(&self, word: &str, context: &str) -> f64 {
		let index = simple_tokenize(context).len();
		match self.table.counter(index, context) {
			Some(counter) => {
				let total = counter.total();
				if total > 0.0 { counter.get(word) / total } else { 0.0 }
			}
			None => 0.0,
		}
	}

	/// `exp(-mean(ln p))` over the tokens of `text`, each token conditioned
	/// on up to `max_n - 1` preceding tokens through [`Self::get_probability`].
	///
	/// Zero probabilities count as `f64::EPSILON`. NaN when `text` has no tokens.
	pub fn perplexity(&self, text: &str) -> f64 {
		let tokens = simple_tokenize(text);
		let history = self.max_n() - 1;

		let log_sum: f64 = tokens
			.iter()
			.enumerate()
			.map(|(i, token)| {
				let context = tokens[i.saturating_sub(history)..i].join(" ");
				let probability = self.get_probability(token, &context);
				if probability > 0.0 { probability.ln() } else { f64::EPSILON.ln() }
			})
			.sum();

		(-log_sum / tokens.len() as f64).exp()
	}

	/// Scores the model on `test_data`.
	///
	/// Per sample: perplexity of the input, BLEU-1 precision of the input
	/// against the reference, whether the top prediction after all but the
	/// last input token equals the last reference token, and whether the
	/// configured target token occurs in the input and/or the reference.
	/// Averages over an empty dataset are NaN.
	pub fn evaluate(&self, test_data: &[TestCase]) -> EvaluationReport {
		let target = self.config.evaluation_target.as_str();
		let mut perplexity_sum = 0.0;
		let mut bleu_sum = 0.0;
		let mut accurate = 0usize;
		let mut confusion = Confusion::default();

		for case in test_data {
			let input = simple_tokenize(&case.input);
			let reference = simple_tokenize(&case.reference);

			perplexity_sum += self.perplexity(&case.input);
			bleu_sum += bleu1_precision(&input, &reference);

			let prefix = &input[..input.len().saturating_sub(1)];
			let predicted = self.table.predict_next_word(prefix).into_iter().next();
			if predicted.as_ref() == reference.last() {
				accurate += 1;
			}

			confusion.record(
				input.iter().any(|t| t == target),
				reference.iter().any(|t| t == target),
			);
		}

		let samples = test_data.len() as f64;
		self.observer.notify(&ModelEvent::Evaluated { samples: test_data.len() });

		EvaluationReport {
			average_perplexity: perplexity_sum / samples,
			average_bleu: bleu_sum / samples,
			accuracy: accurate as f64 / samples,
			precision: confusion.precision(),
			recall: confusion.recall(),
			f1_score: confusion.f1(),
			samples: test_data.len(),
		}
	}

	/// Nudges the counts of every transition in `text`.
	///
	/// Known pairs counted above `max_n` lose `learning_rate`, the others
	/// gain it, and none ends below 0.1. Unknown pairs are created with a
	/// count of `learning_rate`.
	///
	/// # Errors
	/// Returns `InvalidLearningRate` unless `0 < learning_rate <= 1`.
	pub fn fine_tune(&mut self, text: &str, learning_rate: f64) -> Result<()> {
		if !(learning_rate > 0.0 && learning_rate <= 1.0) {
			return Err(LmError::InvalidLearningRate(learning_rate));
		}

		let tokens = simple_tokenize(text);
		let ceiling = self.max_n() as f64;

		for (index, context, next) in transitions(&tokens, self.max_n()) {
			let counter = self.table.counter_entry(index, context);
			if counter.contains(&next) {
				if counter.get(&next) > ceiling {
					counter.decrement(&next, learning_rate)?;
				} else {
					counter.increment(next.as_str(), learning_rate)?;
				}
				let adjusted = counter.get(&next);
				if adjusted < FINE_TUNE_FLOOR {
					counter.increment(next, FINE_TUNE_FLOOR - adjusted)?;
				}
			} else {
				counter.increment(next, learning_rate)?;
			}
		}

		self.observer.notify(&ModelEvent::FineTuned { tokens: tokens.len(), learning_rate });
		Ok(())
	}

	/// A `dims`-sized vector describing `word` from the table's counts.
	///
	/// For a known word, every context containing it adds its total count at
	/// `((n - 1) * 3 + position % 3) % dims`, where `n` is the gram length and
	/// `position` the word's first index in the context; the result is
	/// scaled to unit length (a random unit vector if it is all zeros).
	/// An unknown word gets `dims` uniform values in `[0, 1)`, not normalized.
	pub fn get_embeddings(&mut self, word: &str, dims: usize) -> Vec<f64> {
		if dims == 0 {
			return Vec::new();
		}
		if !self.vocabulary.contains(word) {
			return (0..dims).map(|_| self.rng.random::<f64>()).collect();
		}

		let mut embedding = vec![0.0; dims];
		for (index, level) in self.table.levels().iter().enumerate() {
			for (context, counter) in level {
				if let Some(position) = context.split(' ').position(|t| t == word) {
					embedding[(index * 3 + position % 3) % dims] += counter.total();
				}
			}
		}

		if normalize(&mut embedding) {
			embedding
		} else {
			random_unit_vector(&mut self.rng, dims)
		}
	}

	/// Weights each token of `input` by how often the contexts ending at it
	/// were observed, scaled to sum to 1.
	///
	/// A position sums the totals of its backward contexts of length 1 to
	/// `min(max_n, position + 1)`; a position with no observed context
	/// weighs 0.1. Zero or one token yields one weight of 1 per token.
	pub fn attention_weights(&self, input: &str) -> Attention {
		let tokens = simple_tokenize(input);
		let weights = if tokens.len() <= 1 {
			vec![1.0; tokens.len()]
		} else {
			let mut weights: Vec<f64> = (0..tokens.len()).map(|i| self.position_weight(&tokens, i)).collect();
			let sum: f64 = weights.iter().sum();
			weights.iter_mut().for_each(|w| *w /= sum);
			weights
		};
		Attention { input: input.to_owned(), tokens, weights }
	}

	fn position_weight(&self, tokens: &[String], position: usize) -> f64 {
		let mut weight = 0.0;
		let mut observed = false;
		for n in 1..=self.max_n().min(position + 1) {
			let context = tokens[position + 1 - n..=position].join(" ");
			if let Some(counter) = self.table.counter(n - 1, &context) {
				weight += counter.total();
				observed = true;
			}
		}
		if observed { weight } else { UNSEEN_ATTENTION_WEIGHT }
	}

	/// One-line, human-readable summary of the top predictions for `prefix`.
	pub fn explain_prediction(&self, prefix: &str) -> String {
		let predictions = self.predict(prefix, EXPLAINED_PREDICTIONS);
		format!(
			"Based on the context \"{prefix}\", the most likely next words are: {}",
			predictions.join(", ")
		)
	}

	/// Adds another model's counts and vocabulary to this one.
	///
	/// # Errors
	/// Returns `InvalidInput` if the models have different orders.
	pub fn merge(&mut self, other: &Self) -> Result<()> {
		self.table.merge(&other.table)?;
		self.vocabulary.extend(other.vocabulary.iter().cloned());
		Ok(())
	}

	/// Captures the model state. Vocabulary is sorted for stable output.
	pub fn snapshot(&self) -> ModelSnapshot {
		let mut vocabulary: Vec<String> = self.vocabulary.iter().cloned().collect();
		vocabulary.sort();
		ModelSnapshot {
			ngram_table: TableSnapshot { levels: self.table.clone().into_levels() },
			max_n: self.max_n(),
			vocabulary,
			context: self.context.clone(),
		}
	}

	/// Replaces table, vocabulary and context with the snapshot's.
	///
	/// # Errors
	/// Returns `CorruptSnapshot` if the snapshot is inconsistent; the model
	/// is left untouched in that case.
	pub fn restore(&mut self, snapshot: ModelSnapshot) -> Result<()> {
		snapshot.validate()?;
		self.table = NgramTable::from_levels(snapshot.ngram_table.levels)?;
		self.config.set_max_n(snapshot.max_n);
		self.vocabulary = snapshot.vocabulary.into_iter().collect();
		self.context = snapshot.context;
		Ok(())
	}

	/// Writes the model to `path`; `.json` paths are written as JSON, any
	/// other as compact binary.
	pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<()> {
		let path = path.as_ref();
		store_for_path(path).save(path, &self.snapshot())?;
		self.observer.notify(&ModelEvent::Saved { path: path.to_path_buf() });
		Ok(())
	}

	/// Replaces the model with the one stored at `path`.
	pub fn load_model<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
		let path = path.as_ref();
		let snapshot = store_for_path(path).load(path)?;
		self.restore(snapshot)?;
		self.observer.notify(&ModelEvent::Loaded {
			path: path.to_path_buf(),
			max_n: self.max_n(),
			vocabulary: self.vocabulary.len(),
		});
		Ok(())
	}

	/// Forgets everything learned; the order is kept.
	pub fn clear_model(&mut self) {
		self.table = NgramTable::new(self.max_n());
		self.vocabulary.clear();
		self.context.clear();
		self.observer.notify(&ModelEvent::Cleared);
	}
}

/// Scales `vector` to unit length. Returns `false` if it is all zeros.
fn normalize(vector: &mut [f64]) -> bool {
	let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
	if norm == 0.0 {
		return false;
	}
	vector.iter_mut().for_each(|v| *v /= norm);
	true
}

fn random_unit_vector(rng: &mut StdRng, dims: usize) -> Vec<f64> {
	loop {
		let mut vector: Vec<f64> = (0..dims).map(|_| rng.random_range(-1.0..1.0)).collect();
		if normalize(&mut vector) {
			return vector;
		}
	}
}
