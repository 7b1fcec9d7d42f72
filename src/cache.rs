//! Cache for computed feedback weight vectors.
//!
//! Keyed by index name plus the concatenated feedback texts; a hit
//! returns the weight vector together with the report lines the original
//! computation produced, so they can be replayed into the live report.

use ahash::AHashMap;

use crate::weight::WeightVector;

/// Storage for feedback weight vectors and their report snippets.
pub trait FeedbackCache: Send {
    fn get(&self, index_name: &str, key: &str) -> Option<(WeightVector, String)>;

    fn save(&mut self, index_name: &str, key: &str, vector: &WeightVector, snippet: &str);
}

/// In-memory feedback cache.
#[derive(Debug, Default)]
pub struct MemoryFeedbackCache {
    entries: AHashMap<(String, String), (WeightVector, String)>,
}

impl MemoryFeedbackCache {
    pub fn new() -> Self {
        MemoryFeedbackCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FeedbackCache for MemoryFeedbackCache {
    fn get(&self, index_name: &str, key: &str) -> Option<(WeightVector, String)> {
        self.entries
            .get(&(index_name.to_string(), key.to_string()))
            .cloned()
    }

    fn save(&mut self, index_name: &str, key: &str, vector: &WeightVector, snippet: &str) {
        self.entries.insert(
            (index_name.to_string(), key.to_string()),
            (vector.clone(), snippet.to_string()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let mut cache = MemoryFeedbackCache::new();
        assert!(cache.get("news", "good words").is_none());

        let mut vector = WeightVector::new(4);
        vector.add(2, 1.5);
        cache.save("news", "good words", &vector, "report lines\n");

        let (cached_vector, snippet) = cache.get("news", "good words").unwrap();
        assert_eq!(cached_vector, vector);
        assert_eq!(snippet, "report lines\n");

        // A different index does not hit.
        assert!(cache.get("other", "good words").is_none());
    }
}
