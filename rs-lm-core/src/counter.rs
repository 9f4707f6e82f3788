use std::collections::HashMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{LmError, Result};

/// A multiset of strings with real-valued counts.
///
/// A `Counter` is the outgoing-edge table of one n-gram context: it maps
/// every token observed after the context to how often it was observed.
/// Counts are `f64` from the start because fine-tuning adds fractional
/// adjustments.
///
/// ## Responsibilities:
/// - Accumulate and remove occurrences
/// - Rank items by frequency, breaking ties by first-seen order
/// - Combine with another counter (merge, subtract)
///
/// ## Invariants
/// - Every stored count is strictly positive; an item whose count drops to
///   zero or below is removed, never stored as zero
/// - `entries` keeps items in first-seen order and `index` maps each item to
///   its slot in `entries`
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Counter {
	entries: Vec<(String, f64)>,
	index: HashMap<String, usize>,
}

impl Counter {
	/// Creates an empty counter.
	pub fn new() -> Self {
		Self::default()
	}

	/// Builds a counter from a list of items, counting each occurrence once.
	pub fn from_items<I, S>(items: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let mut counter = Self::new();
		for item in items {
			counter.add(item.into(), 1.0);
		}
		counter
	}

	/// Builds a counter from `(item, count)` pairs, in order.
	///
	/// # Errors
	/// Returns `InvalidAmount` if a count is negative or not a number.
	pub fn from_counts<I, S>(counts: I) -> Result<Self>
	where
		I: IntoIterator<Item = (S, f64)>,
		S: Into<String>,
	{
		let mut counter = Self::new();
		for (item, count) in counts {
			counter.increment(item, count)?;
		}
		Ok(counter)
	}

	/// Adds `amount` to the count of `item`.
	///
	/// # Errors
	/// Returns `InvalidAmount` if `amount` is negative or NaN.
	pub fn increment(&mut self, item: impl Into<String>, amount: f64) -> Result<()> {
		check_amount(amount)?;
		self.add(item.into(), amount);
		Ok(())
	}

	/// Subtracts `amount` from the count of `item`, removing the item when
	/// its count reaches zero or below.
	///
	/// # Errors
	/// Returns `InvalidAmount` if `amount` is negative or NaN.
	pub fn decrement(&mut self, item: &str, amount: f64) -> Result<()> {
		check_amount(amount)?;
		self.remove_amount(item, amount);
		Ok(())
	}

	/// Returns the count of `item`, or `0.0` if absent.
	pub fn get(&self, item: &str) -> f64 {
		self.index.get(item).map_or(0.0, |&slot| self.entries[slot].1)
	}

	/// Returns `true` if `item` has a positive count.
	pub fn contains(&self, item: &str) -> bool {
		self.index.contains_key(item)
	}

	/// Sum of all stored counts.
	pub fn total(&self) -> f64 {
		self.entries.iter().map(|(_, count)| count).sum()
	}

	/// Number of distinct items.
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Iterates over `(item, count)` pairs in first-seen order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
		self.entries.iter().map(|(item, count)| (item.as_str(), *count))
	}

	/// Returns the items sorted by count, highest first.
	///
	/// The sort is stable, so items with equal counts keep their first-seen
	/// order. With `Some(limit)` only the first `limit` pairs are returned.
	pub fn most_common(&self, limit: Option<usize>) -> Vec<(String, f64)> {
		let mut ranked = self.entries.clone();
		ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
		if let Some(limit) = limit {
			ranked.truncate(limit);
		}
		ranked
	}

	/// Expands the counter into a sequence where each item is repeated
	/// `floor(count)` times. Fractional parts are dropped.
	pub fn elements(&self) -> Vec<String> {
		self.entries
			.iter()
			.flat_map(|(item, count)| std::iter::repeat_n(item.clone(), count.floor() as usize))
			.collect()
	}

	/// Returns a new counter holding `self - other`, item by item, without
	/// keeping any item whose count falls to zero or below.
	pub fn subtract(&self, other: &Counter) -> Counter {
		let mut result = self.clone();
		for (item, count) in other.iter() {
			result.remove_amount(item, count);
		}
		result
	}

	/// Adds every count of `other` into this counter.
	///
	/// Items new to this counter are appended in `other`'s order.
	pub fn merge(&mut self, other: &Counter) {
		for (item, count) in other.iter() {
			self.add(item.to_owned(), count);
		}
	}

	/// Unchecked increment for amounts already known to be valid.
	pub(crate) fn add(&mut self, item: String, amount: f64) {
		match self.index.get(&item) {
			Some(&slot) => self.entries[slot].1 += amount,
			None if amount > 0.0 => {
				self.index.insert(item.clone(), self.entries.len());
				self.entries.push((item, amount));
			}
			// A zero increment on an absent item would store a zero count
			None => {}
		}
	}

	/// Unchecked removal; `amount` must be a valid count.
	pub(crate) fn remove_amount(&mut self, item: &str, amount: f64) {
		let Some(&slot) = self.index.get(item) else {
			return;
		};
		self.entries[slot].1 -= amount;
		if self.entries[slot].1 <= 0.0 {
			self.entries.remove(slot);
			self.index.remove(item);
			for (moved, _) in &self.entries[slot..] {
				if let Some(position) = self.index.get_mut(moved) {
					*position -= 1;
				}
			}
		}
	}
}

fn check_amount(amount: f64) -> Result<()> {
	if amount.is_nan() || amount < 0.0 {
		return Err(LmError::InvalidAmount(amount));
	}
	Ok(())
}

/// Serialized as an ordered `item -> count` map, so the first-seen order used
/// as a tie-break survives a save/load cycle.
impl Serialize for Counter {
	fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
		let mut map = serializer.serialize_map(Some(self.entries.len()))?;
		for (item, count) in &self.entries {
			map.serialize_entry(item, count)?;
		}
		map.end()
	}
}

impl<'de> Deserialize<'de> for Counter {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
		struct CounterVisitor;

		impl<'de> Visitor<'de> for CounterVisitor {
			type Value = Counter;

			fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
				f.write_str("a map of items to non-negative counts")
			}

			fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Counter, A::Error> {
				let mut counter = Counter::new();
				while let Some((item, count)) = access.next_entry::<String, f64>()? {
					counter.increment(item, count).map_err(serde::de::Error::custom)?;
				}
				Ok(counter)
			}
		}

		deserializer.deserialize_map(CounterVisitor)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn most_common_sorts_by_count_and_keeps_first_seen_order_on_ties() {
		let counter = Counter::from_items(["a", "b", "a", "c", "b", "b"]);
		assert_eq!(
			counter.most_common(None),
			vec![("b".to_owned(), 3.0), ("a".to_owned(), 2.0), ("c".to_owned(), 1.0)]
		);

		let tied = Counter::from_items(["z", "y", "x"]);
		let items: Vec<String> = tied.most_common(Some(2)).into_iter().map(|(item, _)| item).collect();
		assert_eq!(items, vec!["z", "y"]);
	}

	#[test]
	fn from_counts_keeps_the_given_order() {
		let counter = Counter::from_counts([("b", 1.0), ("a", 2.5), ("c", 1.0)]).unwrap();
		let items: Vec<(&str, f64)> = counter.iter().collect();
		assert_eq!(items, vec![("b", 1.0), ("a", 2.5), ("c", 1.0)]);
		assert_eq!(counter.most_common(Some(2)), vec![("a".to_owned(), 2.5), ("b".to_owned(), 1.0)]);
		assert_eq!(counter.total(), 4.5);

		assert!(matches!(
			Counter::from_counts([("ok", 1.0), ("bad", -2.0)]),
			Err(LmError::InvalidAmount(amount)) if amount == -2.0
		));
	}

	#[test]
	fn decrement_removes_items_that_reach_zero() {
		let mut counter = Counter::from_items(["a", "a", "b"]);
		counter.decrement("a", 2.0).unwrap();
		assert_eq!(counter.get("a"), 0.0);
		assert!(!counter.contains("a"));

		counter.decrement("b", 5.0).unwrap();
		assert_eq!(counter.get("b"), 0.0);
		assert!(counter.is_empty());
	}

	#[test]
	fn removal_keeps_remaining_order_and_lookups_consistent() {
		let mut counter = Counter::from_items(["a", "b", "c", "d"]);
		counter.decrement("b", 1.0).unwrap();
		counter.increment("d", 0.5).unwrap();
		assert_eq!(counter.get("c"), 1.0);
		assert_eq!(counter.get("d"), 1.5);
		let items: Vec<&str> = counter.iter().map(|(item, _)| item).collect();
		assert_eq!(items, vec!["a", "c", "d"]);
	}

	#[test]
	fn negative_or_nan_amounts_are_rejected() {
		let mut counter = Counter::new();
		assert!(matches!(counter.increment("a", -1.0), Err(LmError::InvalidAmount(_))));
		assert!(matches!(counter.decrement("a", f64::NAN), Err(LmError::InvalidAmount(_))));
		assert!(counter.is_empty());
	}

	#[test]
	fn zero_increment_does_not_store_an_entry() {
		let mut counter = Counter::new();
		counter.increment("a", 0.0).unwrap();
		assert!(!counter.contains("a"));
	}

	#[test]
	fn fractional_counts_accumulate_and_elements_truncate() {
		let mut counter = Counter::new();
		counter.increment("a", 2.7).unwrap();
		counter.increment("b", 0.4).unwrap();
		assert!((counter.total() - 3.1).abs() < 1e-9);
		assert_eq!(counter.elements(), vec!["a", "a"]);
	}

	#[test]
	fn subtract_drops_non_positive_results() {
		let left = Counter::from_items(["a", "a", "b", "c"]);
		let right = Counter::from_items(["a", "b", "b", "d"]);
		let diff = left.subtract(&right);
		assert_eq!(diff.get("a"), 1.0);
		assert!(!diff.contains("b"));
		assert_eq!(diff.get("c"), 1.0);
		assert!(!diff.contains("d"));
		// the operands are untouched
		assert_eq!(left.get("b"), 1.0);
	}

	#[test]
	fn merge_sums_counts() {
		let mut left = Counter::from_items(["a"]);
		left.merge(&Counter::from_items(["b", "a"]));
		assert_eq!(left.get("a"), 2.0);
		assert_eq!(left.get("b"), 1.0);
	}

	#[test]
	fn serialized_form_preserves_insertion_order() {
		let counter = Counter::from_items(["how", "again", "how"]);
		let json = serde_json::to_string(&counter).unwrap();
		assert_eq!(json, r#"{"how":2.0,"again":1.0}"#);
		let back: Counter = serde_json::from_str(&json).unwrap();
		assert_eq!(back, counter);
	}
}
