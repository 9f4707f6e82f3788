use std::sync::Arc;

use rs_lm_core::persistence::{JsonStore, SnapshotStore};
use rs_lm_core::{Context, ContextValue, LanguageModel, LmError, LogObserver, ModelConfig, TestCase};

const CORPUS: &str = "the cat sat on the mat
the dog sat on the rug
a cat chased the dog
the dog chased a ball";

fn trained(max_n: usize) -> LanguageModel {
	let mut config = ModelConfig::with_max_n(max_n);
	config.seed = Some(1);
	let mut model = LanguageModel::new(config).with_observer(Arc::new(LogObserver));
	for line in CORPUS.lines() {
		model.train(line);
	}
	model
}

#[test]
fn train_predict_generate() {
	let model = trained(3);
	// "the dog" also ends a line, so the end-of-sequence marker ranks between the two
	assert_eq!(model.predict("the dog", 3), vec!["sat", "", "chased"]);
	assert_eq!(model.predict("a cat", 1), vec!["chased"]);
	assert_eq!(model.generate_text("A cat", 10), "A cat chased the dog");
}

#[test]
fn save_load_preserves_predictions() {
	let dir = tempfile::tempdir().unwrap();
	let mut model = trained(3);
	model.set_context(Context::from([("source".to_owned(), ContextValue::from("corpus"))]));
	model.fine_tune("the dog sat on the mat", 0.25).unwrap();

	let path = dir.path().join("snapshots/model.bin");
	model.save_model(&path).unwrap();

	let mut restored = LanguageModel::default();
	restored.load_model(&path).unwrap();
	assert_eq!(restored.vocabulary_size(), model.vocabulary_size());
	for prefix in ["the", "the dog", "on the", "a cat chased"] {
		assert_eq!(restored.predict(prefix, 5), model.predict(prefix, 5), "{prefix}");
	}
	assert_eq!(restored.context(), model.context());
}

#[test]
fn json_snapshot_is_readable_by_the_store() {
	let dir = tempfile::tempdir().unwrap();
	let model = trained(2);
	let path = dir.path().join("model.json");
	model.save_model(&path).unwrap();

	let snapshot = JsonStore.load(&path).unwrap();
	assert_eq!(snapshot.max_n, 2);
	assert_eq!(snapshot.ngram_table.levels.len(), 2);
	assert_eq!(snapshot.vocabulary.len(), model.vocabulary_size());
	assert_eq!(snapshot.ngram_table.levels[0]["cat"].get("sat"), 1.0);
}

#[test]
fn evaluation_and_diagnostics() {
	let mut model = trained(3);
	let report = model.evaluate(&[
		TestCase::new("the cat sat", "the cat sat"),
		TestCase::new("the dog chased", "the dog sat"),
	]);
	assert_eq!(report.samples, 2);
	assert_eq!(report.accuracy, 1.0);
	assert!((report.average_bleu - 5.0 / 6.0).abs() < 1e-9);

	let embedding = model.get_embeddings("dog", 8);
	let norm: f64 = embedding.iter().map(|v| v * v).sum::<f64>().sqrt();
	assert!((norm - 1.0).abs() < 1e-9);

	let attention = model.attention_weights("the dog chased a cat");
	assert_eq!(attention.weights.len(), 5);
	assert!((attention.weights.iter().sum::<f64>() - 1.0).abs() < 1e-9);
}

#[test]
fn invalid_learning_rate_is_reported() {
	let mut model = trained(2);
	let err = model.fine_tune("the cat", 0.0).unwrap_err();
	assert!(matches!(err, LmError::InvalidLearningRate(r) if r == 0.0));
	assert!(err.is_caller_error());
}
