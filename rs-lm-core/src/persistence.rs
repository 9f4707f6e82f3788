//! Model snapshots and the stores that read and write them.
//!
//! A [`ModelSnapshot`] is the complete serializable state of a language
//! model. Two encodings are provided: compact `postcard` binary
//! ([`PostcardStore`]) and pretty JSON ([`JsonStore`]).

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::Path;

use serde::de::{self, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LmError, Result};
use crate::io::write_atomic;
use crate::ngram_table::{Level, MAX_GRAM};

/// A value stored in the model's free-form context map.
///
/// The set of shapes is closed so that binary snapshots, which carry no
/// type information, can be decoded. Human-readable formats write the bare
/// value (`"en"`, `1.5`, `true`, `[..]`); binary formats write a variant tag
/// first.
#[derive(Clone, Debug, PartialEq)]
pub enum ContextValue {
	Text(String),
	Number(f64),
	Flag(bool),
	List(Vec<ContextValue>),
}

/// Tagged binary form of [`ContextValue`]. Variant order is the wire format.
#[derive(Serialize)]
#[serde(rename = "ContextValue")]
enum TaggedRef<'a> {
	Text(&'a str),
	Number(f64),
	Flag(bool),
	List(&'a [ContextValue]),
}

#[derive(Deserialize)]
#[serde(rename = "ContextValue")]
enum Tagged {
	Text(String),
	Number(f64),
	Flag(bool),
	List(Vec<ContextValue>),
}

impl Serialize for ContextValue {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		if serializer.is_human_readable() {
			match self {
				ContextValue::Text(text) => serializer.serialize_str(text),
				ContextValue::Number(number) => serializer.serialize_f64(*number),
				ContextValue::Flag(flag) => serializer.serialize_bool(*flag),
				ContextValue::List(items) => serializer.collect_seq(items),
			}
		} else {
			let tagged = match self {
				ContextValue::Text(text) => TaggedRef::Text(text),
				ContextValue::Number(number) => TaggedRef::Number(*number),
				ContextValue::Flag(flag) => TaggedRef::Flag(*flag),
				ContextValue::List(items) => TaggedRef::List(items),
			};
			tagged.serialize(serializer)
		}
	}
}

impl<'de> Deserialize<'de> for ContextValue {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		if !deserializer.is_human_readable() {
			return Ok(match Tagged::deserialize(deserializer)? {
				Tagged::Text(text) => ContextValue::Text(text),
				Tagged::Number(number) => ContextValue::Number(number),
				Tagged::Flag(flag) => ContextValue::Flag(flag),
				Tagged::List(items) => ContextValue::List(items),
			});
		}

		struct PlainVisitor;

		impl<'de> Visitor<'de> for PlainVisitor {
			type Value = ContextValue;

			fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str("a string, number, boolean or list")
			}

			fn visit_bool<E: de::Error>(self, value: bool) -> std::result::Result<ContextValue, E> {
				Ok(ContextValue::Flag(value))
			}

			fn visit_i64<E: de::Error>(self, value: i64) -> std::result::Result<ContextValue, E> {
				Ok(ContextValue::Number(value as f64))
			}

			fn visit_u64<E: de::Error>(self, value: u64) -> std::result::Result<ContextValue, E> {
				Ok(ContextValue::Number(value as f64))
			}

			fn visit_f64<E: de::Error>(self, value: f64) -> std::result::Result<ContextValue, E> {
				Ok(ContextValue::Number(value))
			}

			fn visit_str<E: de::Error>(self, value: &str) -> std::result::Result<ContextValue, E> {
				Ok(ContextValue::Text(value.to_owned()))
			}

			fn visit_string<E: de::Error>(self, value: String) -> std::result::Result<ContextValue, E> {
				Ok(ContextValue::Text(value))
			}

			fn visit_seq<A: SeqAccess<'de>>(self, mut access: A) -> std::result::Result<ContextValue, A::Error> {
				let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
				while let Some(item) = access.next_element()? {
					items.push(item);
				}
				Ok(ContextValue::List(items))
			}
		}

		deserializer.deserialize_any(PlainVisitor)
	}
}

impl From<&str> for ContextValue {
	fn from(value: &str) -> Self {
		ContextValue::Text(value.to_owned())
	}
}

impl From<String> for ContextValue {
	fn from(value: String) -> Self {
		ContextValue::Text(value)
	}
}

impl From<f64> for ContextValue {
	fn from(value: f64) -> Self {
		ContextValue::Number(value)
	}
}

impl From<bool> for ContextValue {
	fn from(value: bool) -> Self {
		ContextValue::Flag(value)
	}
}

/// Caller-owned tags attached to a model.
pub type Context = BTreeMap<String, ContextValue>;

/// Serialized n-gram table: one `context -> {next: count}` map per level.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TableSnapshot {
	pub levels: Vec<Level>,
}

/// Complete state of a language model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModelSnapshot {
	pub ngram_table: TableSnapshot,
	pub max_n: usize,
	pub vocabulary: Vec<String>,
	pub context: Context,
}

impl ModelSnapshot {
	/// Checks the invariants a decoded snapshot must hold.
	///
	/// # Errors
	/// Returns `CorruptSnapshot` if `max_n` is outside `[1, MAX_GRAM]` or
	/// does not match the number of levels.
	pub fn validate(&self) -> Result<()> {
		if !(1..=MAX_GRAM).contains(&self.max_n) {
			return Err(LmError::CorruptSnapshot(format!(
				"max_n {} outside 1..={MAX_GRAM}",
				self.max_n
			)));
		}
		if self.ngram_table.levels.len() != self.max_n {
			return Err(LmError::CorruptSnapshot(format!(
				"max_n is {} but the table has {} levels",
				self.max_n,
				self.ngram_table.levels.len()
			)));
		}
		Ok(())
	}
}

/// Reads and writes snapshots at a path.
pub trait SnapshotStore {
	fn save(&self, path: &Path, snapshot: &ModelSnapshot) -> Result<()>;

	fn load(&self, path: &Path) -> Result<ModelSnapshot>;
}

/// Compact binary snapshots (`postcard`).
#[derive(Clone, Copy, Debug, Default)]
pub struct PostcardStore;

impl SnapshotStore for PostcardStore {
	fn save(&self, path: &Path, snapshot: &ModelSnapshot) -> Result<()> {
		let bytes = postcard::to_stdvec(snapshot)?;
		write_atomic(path, &bytes)
	}

	fn load(&self, path: &Path) -> Result<ModelSnapshot> {
		let bytes = fs::read(path)?;
		let snapshot: ModelSnapshot = postcard::from_bytes(&bytes)?;
		snapshot.validate()?;
		Ok(snapshot)
	}
}

/// Human-readable snapshots (`serde_json`).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonStore;

impl SnapshotStore for JsonStore {
	fn save(&self, path: &Path, snapshot: &ModelSnapshot) -> Result<()> {
		let bytes = serde_json::to_vec_pretty(snapshot)?;
		write_atomic(path, &bytes)
	}

	fn load(&self, path: &Path) -> Result<ModelSnapshot> {
		let bytes = fs::read(path)?;
		let snapshot: ModelSnapshot = serde_json::from_slice(&bytes)?;
		snapshot.validate()?;
		Ok(snapshot)
	}
}

/// Picks the store for a path: JSON for a `.json` extension, binary otherwise.
pub fn store_for_path(path: &Path) -> Box<dyn SnapshotStore> {
	let is_json = path
		.extension()
		.is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
	if is_json { Box::new(JsonStore) } else { Box::new(PostcardStore) }
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::counter::Counter;

	fn snapshot() -> ModelSnapshot {
		let mut unigrams = Level::new();
		unigrams.insert("hello".to_owned(), Counter::from_items(["world", "there", "world"]));
		let mut context = Context::new();
		context.insert("lang".to_owned(), "en".into());
		context.insert("tags".to_owned(), ContextValue::List(vec![1.5.into(), true.into()]));
		ModelSnapshot {
			ngram_table: TableSnapshot { levels: vec![unigrams, Level::new()] },
			max_n: 2,
			vocabulary: vec!["hello".to_owned(), "there".to_owned(), "world".to_owned()],
			context,
		}
	}

	#[test]
	fn both_stores_round_trip_a_snapshot() {
		let dir = tempfile::tempdir().unwrap();
		let original = snapshot();
		for name in ["model.bin", "model.json"] {
			let path = dir.path().join(name);
			let store = store_for_path(&path);
			store.save(&path, &original).unwrap();
			assert_eq!(store.load(&path).unwrap(), original, "{name}");
		}
	}

	#[test]
	fn json_layout_uses_documented_field_names() {
		let json = serde_json::to_value(snapshot()).unwrap();
		assert_eq!(json["maxN"], 2);
		assert_eq!(json["ngramTable"]["levels"][0]["hello"]["world"], 2.0);
		assert_eq!(json["vocabulary"][1], "there");
	}

	#[test]
	fn json_context_holds_plain_values() {
		let json = serde_json::to_value(snapshot()).unwrap();
		assert_eq!(json["context"]["lang"], "en");
		assert_eq!(json["context"]["tags"], serde_json::json!([1.5, true]));
	}

	#[test]
	fn hand_written_json_snapshot_loads() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("written.json");
		let text = r#"{
			"ngramTable": { "levels": [ { "hello": { "world": 2.0, "there": 1 } } ] },
			"maxN": 1,
			"vocabulary": ["hello", "there", "world"],
			"context": { "lang": "en", "version": 3, "beta": false, "tags": ["a", 1.5] }
		}"#;
		fs::write(&path, text).unwrap();

		let loaded = JsonStore.load(&path).unwrap();
		assert_eq!(loaded.context["lang"], ContextValue::from("en"));
		assert_eq!(loaded.context["version"], ContextValue::Number(3.0));
		assert_eq!(loaded.context["beta"], ContextValue::Flag(false));
		assert_eq!(loaded.context["tags"], ContextValue::List(vec!["a".into(), 1.5.into()]));
		assert_eq!(loaded.ngram_table.levels[0]["hello"].get("there"), 1.0);
	}

	#[test]
	fn json_context_rejects_null_and_objects() {
		for value in ["null", r#"{ "nested": 1 }"#] {
			let parsed: serde_json::Result<Context> = serde_json::from_str(&format!(r#"{{ "key": {value} }}"#));
			assert!(parsed.is_err(), "{value}");
		}
	}

	#[test]
	fn binary_context_keeps_every_shape() {
		let context = snapshot().context;
		let bytes = postcard::to_stdvec(&context).unwrap();
		let decoded: Context = postcard::from_bytes(&bytes).unwrap();
		assert_eq!(decoded, context);
	}

	#[test]
	fn loading_rejects_inconsistent_snapshots() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("broken.json");

		let mut broken = snapshot();
		broken.max_n = 3;
		JsonStore.save(&path, &broken).unwrap();
		assert!(matches!(JsonStore.load(&path), Err(LmError::CorruptSnapshot(_))));

		broken.max_n = 0;
		broken.ngram_table.levels.clear();
		assert!(matches!(broken.validate(), Err(LmError::CorruptSnapshot(_))));
	}

	#[test]
	fn garbage_is_a_serialization_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("garbage.json");
		fs::write(&path, "{ not json").unwrap();
		assert!(matches!(JsonStore.load(&path), Err(LmError::Serialization(_))));
	}
}
