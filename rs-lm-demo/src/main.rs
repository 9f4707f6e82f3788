use std::path::Path;
use std::sync::Arc;

use rs_lm_core::{LanguageModel, LogObserver, ModelConfig, TestCase};

const SAMPLE: &str = "the quick brown fox jumps over the lazy dog
the lazy dog sleeps in the sun
a quick brown dog runs after the fox";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    // Settings come from RS_LM_* variables, e.g. RS_LM_MAX_N=4
    let config = ModelConfig::from_env()?;

    // Train from a corpus file when given one.
    // Its `.bin` cache is written next to it and reused on the next run
    let corpus = std::env::args().nth(1);
    // Run with RUST_LOG=debug to see every trained line
    let observer = Arc::new(LogObserver);
    let mut model = match corpus.as_deref() {
        Some(path) if Path::new(path).exists() => LanguageModel::from_corpus(path, config, observer)?,
        _ => {
            let mut model = LanguageModel::new(config).with_observer(observer);
            for line in SAMPLE.lines() {
                model.train(line);
            }
            model
        }
    };

    println!("max_n: {}, vocabulary: {}", model.max_n(), model.vocabulary_size());

    // Top 3 continuations, most likely first
    println!("after 'the lazy': {:?}", model.predict("the lazy", 3));
    println!("{}", model.explain_prediction("the quick"));
    println!("generated: {}", model.generate_text("The quick", model.config().generate_length));

    // Learning rate must be in (0, 1]
    match model.fine_tune("the lazy cat", 0.0) {
        Ok(_) => println!("Should not happen"),
        Err(e) => println!("rejected: {e}"),
    }
    model.fine_tune("the lazy cat sleeps", 0.5)?;
    println!("after fine-tuning 'the lazy': {:?}", model.predict("the lazy", 3));

    let report = model.evaluate(&[
        TestCase::new("the quick brown fox", "the quick brown fox"),
        TestCase::new("the lazy dog sleeps", "the lazy dog runs"),
    ]);
    println!(
        "perplexity: {:.3e}, bleu-1: {:.3}, accuracy: {:.3}, f1: {:.3}",
        report.average_perplexity, report.average_bleu, report.accuracy, report.f1_score
    );

    let dims = model.config().embedding_dims();
    println!("embedding of 'dog': {:?}", model.get_embeddings("dog", dims));

    let attention = model.attention_weights("the quick brown dog");
    for (token, weight) in attention.tokens.iter().zip(&attention.weights) {
        println!("{token:>8} {weight:.3}");
    }

    Ok(())
}
