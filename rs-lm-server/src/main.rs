use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use actix_cors::Cors;
use actix_web::{delete, get, middleware, post, put, web, App, HttpResponse, HttpServer, Responder};

use rs_lm_core::config::{env_key, env_parsed, env_string};
use rs_lm_core::{Context, LanguageModel, LmError, LogObserver, ModelConfig, TestCase};
use serde::Deserialize;
use serde_json::{json, Value};

/// Query parameters of `/v1/predict`
#[derive(Deserialize)]
struct PredictParams {
	prefix: String,
	count: Option<usize>,
}

/// Query parameters of `/v1/generate`
#[derive(Deserialize)]
struct GenerateParams {
	start: String,
	length: Option<usize>,
}

#[derive(Deserialize)]
struct ProbabilityParams {
	word: String,
	context: String,
}

#[derive(Deserialize)]
struct TextParams {
	text: String,
}

#[derive(Deserialize)]
struct EmbeddingParams {
	word: String,
	dims: Option<usize>,
}

#[derive(Deserialize)]
struct AttentionParams {
	input: String,
}

#[derive(Deserialize)]
struct ExplainParams {
	prefix: String,
}

/// Body of `/v1/train`. The field is untyped so that a non-string value is
/// reported as invalid input rather than a generic parse failure.
#[derive(Deserialize)]
struct TrainBody {
	text: Value,
}

#[derive(Deserialize)]
struct FineTuneBody {
	text: Value,
	learning_rate: f64,
}

/// Where the server listens and where it keeps its snapshot.
struct ServerConfig {
	address: String,
	port: u16,
	model_path: Option<PathBuf>,
}

impl ServerConfig {
	/// Reads `RS_LM_ADDR`, `RS_LM_PORT` and `RS_LM_MODEL`.
	fn from_env() -> Result<Self, LmError> {
		Ok(Self {
			address: env_string(&env_key("ADDR"))?.unwrap_or_else(|| "127.0.0.1".to_owned()),
			port: env_parsed(&env_key("PORT"))?.unwrap_or(5000),
			model_path: env_string(&env_key("MODEL"))?.map(PathBuf::from),
		})
	}
}

struct SharedData {
	model: LanguageModel,
	model_path: Option<PathBuf>,
}

type Shared = web::Data<Mutex<SharedData>>;

/// Maps a core error to a response: caller mistakes are 400, the rest 500.
fn error_response(e: &LmError) -> HttpResponse {
	if e.is_caller_error() {
		HttpResponse::BadRequest().body(e.to_string())
	} else {
		HttpResponse::InternalServerError().body(e.to_string())
	}
}

fn as_text<'a>(value: &'a Value, field: &str) -> Result<&'a str, LmError> {
	value
		.as_str()
		.ok_or_else(|| LmError::InvalidInput(format!("`{field}` must be a string, got {value}")))
}

/// Locks the shared model or returns a 500 from the handler.
macro_rules! lock_or_500 {
	($data:expr) => {
		match $data.lock() {
			Ok(m) => m,
			Err(_) => return HttpResponse::InternalServerError().body("Model lock failed"),
		}
	};
}

/// HTTP POST endpoint `/v1/train`
///
/// Trains the model on the `text` field of the JSON body.
#[post("/v1/train")]
async fn post_train(data: Shared, body: web::Json<TrainBody>) -> impl Responder {
	let text = match as_text(&body.text, "text") {
		Ok(t) => t,
		Err(e) => return error_response(&e),
	};
	let mut shared_data = lock_or_500!(data);
	shared_data.model.train(text);
	HttpResponse::Ok().json(json!({ "vocabularySize": shared_data.model.vocabulary_size() }))
}

#[get("/v1/predict")]
async fn get_predict(data: Shared, query: web::Query<PredictParams>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	HttpResponse::Ok().json(shared_data.model.predict(&query.prefix, query.count.unwrap_or(1)))
}

/// HTTP GET endpoint `/v1/generate`
///
/// Returns the generated text as the response body.
#[get("/v1/generate")]
async fn get_generated(data: Shared, query: web::Query<GenerateParams>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	let length = query.length.unwrap_or(shared_data.model.config().generate_length);
	HttpResponse::Ok().body(shared_data.model.generate_text(&query.start, length))
}

#[get("/v1/probability")]
async fn get_probability(data: Shared, query: web::Query<ProbabilityParams>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	HttpResponse::Ok().json(shared_data.model.get_probability(&query.word, &query.context))
}

/// NaN (no tokens) is returned as `null`.
#[get("/v1/perplexity")]
async fn get_perplexity(data: Shared, query: web::Query<TextParams>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	HttpResponse::Ok().json(shared_data.model.perplexity(&query.text))
}

#[post("/v1/evaluate")]
async fn post_evaluate(data: Shared, body: web::Json<Vec<TestCase>>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	HttpResponse::Ok().json(shared_data.model.evaluate(&body))
}

#[post("/v1/fine_tune")]
async fn post_fine_tune(data: Shared, body: web::Json<FineTuneBody>) -> impl Responder {
	let text = match as_text(&body.text, "text") {
		Ok(t) => t,
		Err(e) => return error_response(&e),
	};
	let mut shared_data = lock_or_500!(data);
	match shared_data.model.fine_tune(text, body.learning_rate) {
		Ok(()) => HttpResponse::Ok().body("Model fine-tuned"),
		Err(e) => error_response(&e),
	}
}

#[get("/v1/embeddings")]
async fn get_embeddings(data: Shared, query: web::Query<EmbeddingParams>) -> impl Responder {
	let mut shared_data = lock_or_500!(data);
	let dims = query.dims.unwrap_or(shared_data.model.config().embedding_dims());
	HttpResponse::Ok().json(shared_data.model.get_embeddings(&query.word, dims))
}

#[get("/v1/attention")]
async fn get_attention(data: Shared, query: web::Query<AttentionParams>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	HttpResponse::Ok().json(shared_data.model.attention_weights(&query.input))
}

#[get("/v1/explain")]
async fn get_explain(data: Shared, query: web::Query<ExplainParams>) -> impl Responder {
	let shared_data = lock_or_500!(data);
	HttpResponse::Ok().body(shared_data.model.explain_prediction(&query.prefix))
}

/// Vocabulary, sorted.
#[get("/v1/vocabulary")]
async fn get_vocabulary(data: Shared) -> impl Responder {
	let shared_data = lock_or_500!(data);
	let mut words: Vec<&String> = shared_data.model.vocabulary().iter().collect();
	words.sort();
	HttpResponse::Ok().json(json!({ "size": words.len(), "words": words }))
}

/// Merges a JSON object into the model context.
///
/// Values are strings, numbers, booleans or lists of those; `null` and
/// nested objects are rejected with a 400.
#[put("/v1/context")]
async fn put_context(data: Shared, body: web::Json<Context>) -> impl Responder {
	let mut shared_data = lock_or_500!(data);
	shared_data.model.set_context(body.into_inner());
	HttpResponse::Ok().json(shared_data.model.context())
}

/// Saves the model to the path configured with `RS_LM_MODEL`.
#[post("/v1/save")]
async fn post_save(data: Shared) -> impl Responder {
	let shared_data = lock_or_500!(data);
	let Some(path) = &shared_data.model_path else {
		return HttpResponse::BadRequest().body("No model path configured (set RS_LM_MODEL)");
	};
	match shared_data.model.save_model(path) {
		Ok(()) => HttpResponse::Ok().body(format!("Model saved to {}", path.display())),
		Err(e) => error_response(&e),
	}
}

#[delete("/v1/model")]
async fn delete_model(data: Shared) -> impl Responder {
	let mut shared_data = lock_or_500!(data);
	shared_data.model.clear_model();
	HttpResponse::Ok().body("Model cleared")
}

/// Main entry point for the server.
///
/// Builds the model from `RS_LM_*` settings, loads the snapshot at
/// `RS_LM_MODEL` when it exists, wraps the model in a `Mutex` and starts an
/// Actix-web HTTP server.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
	env_logger::init();

	let server_config = ServerConfig::from_env().map_err(std::io::Error::other)?;
	let model_config = ModelConfig::from_env().map_err(std::io::Error::other)?;

	let mut model = LanguageModel::new(model_config).with_observer(Arc::new(LogObserver));
	if let Some(path) = server_config.model_path.as_ref().filter(|p| p.exists()) {
		model.load_model(path).map_err(std::io::Error::other)?;
	}

	let shared_model = web::Data::new(Mutex::new(SharedData {
		model,
		model_path: server_config.model_path,
	}));

	log::info!("listening on {}:{}", server_config.address, server_config.port);
	HttpServer::new(move || {
		App::new()
			.wrap(middleware::Logger::default())
			.wrap(Cors::permissive())
			.app_data(shared_model.clone())
			.service(post_train)
			.service(get_predict)
			.service(get_generated)
			.service(get_probability)
			.service(get_perplexity)
			.service(post_evaluate)
			.service(post_fine_tune)
			.service(get_embeddings)
			.service(get_attention)
			.service(get_explain)
			.service(get_vocabulary)
			.service(put_context)
			.service(post_save)
			.service(delete_model)
	})
		.bind((server_config.address.as_str(), server_config.port))?
		.run()
		.await
}

#[cfg(test)]
mod tests {
	use super::*;
	use actix_web::http::StatusCode;
	use actix_web::test::{call_and_read_body_json, call_service, init_service, TestRequest};

	fn shared(model: LanguageModel) -> Shared {
		web::Data::new(Mutex::new(SharedData { model, model_path: None }))
	}

	#[test]
	fn non_string_text_is_invalid_input() {
		assert_eq!(as_text(&json!("hi"), "text").unwrap(), "hi");
		let err = as_text(&json!(42), "text").unwrap_err();
		assert!(matches!(err, LmError::InvalidInput(_)));
		assert_eq!(error_response(&err).status(), StatusCode::BAD_REQUEST);
	}

	#[actix_web::test]
	async fn evaluate_without_samples_has_null_averages() {
		let app = init_service(App::new().app_data(shared(LanguageModel::default())).service(post_evaluate)).await;
		let req = TestRequest::post().uri("/v1/evaluate").set_json(json!([])).to_request();
		let report: Value = call_and_read_body_json(&app, req).await;
		assert!(report["averagePerplexity"].is_null());
		assert!(report["averageBleu"].is_null());
		assert!(report["accuracy"].is_null());
		assert_eq!(report["f1Score"], 0.0);
		assert_eq!(report["samples"], 0);
	}

	#[actix_web::test]
	async fn train_then_predict() {
		let app = init_service(
			App::new()
				.app_data(shared(LanguageModel::default()))
				.service(post_train)
				.service(get_predict),
		)
		.await;

		let req = TestRequest::post()
			.uri("/v1/train")
			.set_json(json!({ "text": "the cat sat" }))
			.to_request();
		let trained: Value = call_and_read_body_json(&app, req).await;
		assert_eq!(trained["vocabularySize"], 3);

		let req = TestRequest::get().uri("/v1/predict?prefix=the%20cat&count=2").to_request();
		let predicted: Vec<String> = call_and_read_body_json(&app, req).await;
		assert_eq!(predicted, vec!["sat"]);

		let req = TestRequest::post().uri("/v1/train").set_json(json!({ "text": 42 })).to_request();
		assert_eq!(call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
	}

	#[actix_web::test]
	async fn context_is_echoed_as_plain_json() {
		let app = init_service(App::new().app_data(shared(LanguageModel::default())).service(put_context)).await;

		let body = json!({ "lang": "en", "tags": [1.5, true] });
		let req = TestRequest::put().uri("/v1/context").set_json(&body).to_request();
		let context: Value = call_and_read_body_json(&app, req).await;
		assert_eq!(context, body);

		let req = TestRequest::put().uri("/v1/context").set_json(json!({ "user": null })).to_request();
		assert_eq!(call_service(&app, req).await.status(), StatusCode::BAD_REQUEST);
	}
}
