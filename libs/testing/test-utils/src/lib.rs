//! Shared test utilities for domain testing
//!
//! This crate provides reusable test infrastructure for the domain crates:
//! - `TestDatabase`: PostGIS + pgvector container with migrations applied (feature: "postgres")
//! - `TestDataBuilder`: Deterministic test data generation (always available)
//! - `bag_of_words`: Deterministic text vectors for fake embedding providers
//! - `assertions`: Custom assertion helpers (always available)
//!
//! # Features
//!
//! - `postgres` (default): Enables PostgreSQL test infrastructure
//!
//! # Usage
//!
//! ```rust,no_run
//! use test_utils::{TestDatabase, TestDataBuilder};
//!
//! #[tokio::test]
//! async fn my_postgres_test() {
//!     let db = TestDatabase::new().await;
//!     let builder = TestDataBuilder::from_test_name("my_test");
//!
//!     let title = builder.name("incident", "spill");
//!     let (longitude, latitude) = builder.offset_point(13.4, 52.5, 250.0, 0.0);
//! }
//! ```

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use uuid::Uuid;

#[cfg(feature = "postgres")]
mod postgres;

#[cfg(feature = "postgres")]
pub use postgres::TestDatabase;

/// Mean Earth radius used by the haversine formula, in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_008.8;

/// Builder for test data with deterministic randomization
///
/// This ensures tests are reproducible by using seeded random data.
pub struct TestDataBuilder {
    seed: u64,
}

impl TestDataBuilder {
    /// Create a new builder with a seed (for deterministic tests)
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Create from test name (generates seed from test name hash)
    ///
    /// # Example
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::from_test_name("test_create_incident");
    /// ```
    pub fn from_test_name(name: &str) -> Self {
        let mut hasher = DefaultHasher::new();
        name.hash(&mut hasher);
        Self::new(hasher.finish())
    }

    /// Deterministic UUID derived from the seed
    pub fn id(&self) -> Uuid {
        let bytes = self.seed.to_le_bytes();
        let mut uuid_bytes = [0u8; 16];
        uuid_bytes[..8].copy_from_slice(&bytes);
        uuid_bytes[8..16].copy_from_slice(&bytes);
        Uuid::from_bytes(uuid_bytes)
    }

    /// Generate a unique name for testing
    ///
    /// ```
    /// use test_utils::TestDataBuilder;
    ///
    /// let builder = TestDataBuilder::new(7);
    /// assert_eq!(builder.name("incident", "main"), "test-incident-7-main");
    /// ```
    pub fn name(&self, prefix: &str, suffix: &str) -> String {
        format!("test-{}-{}-{}", prefix, self.seed, suffix)
    }

    /// Incident category unique to this builder, lowercase so it survives normalization
    pub fn incident_type(&self, suffix: &str) -> String {
        format!("type_{}_{}", self.seed, suffix.to_lowercase())
    }

    /// Move a point by the given meters east and north on a spherical Earth
    ///
    /// Returns `(longitude, latitude)`. Accurate to well under a meter for
    /// offsets of a few kilometers away from the poles.
    pub fn offset_point(
        &self,
        longitude: f64,
        latitude: f64,
        east_meters: f64,
        north_meters: f64,
    ) -> (f64, f64) {
        let d_lat = (north_meters / EARTH_RADIUS_METERS).to_degrees();
        let d_lon =
            (east_meters / (EARTH_RADIUS_METERS * latitude.to_radians().cos())).to_degrees();
        (longitude + d_lon, latitude + d_lat)
    }
}

/// Unit-length vector built by hashing each lowercase word of `text` into one of
/// `dimension` buckets
///
/// Identical texts map to identical vectors, and texts sharing words are closer
/// in cosine distance than unrelated ones.
pub fn bag_of_words(text: &str, dimension: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dimension];
    if dimension == 0 {
        return vector;
    }

    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % dimension as u64) as usize] += 1.0;
    }

    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        vector[0] = 1.0;
    } else {
        vector.iter_mut().for_each(|v| *v /= norm);
    }
    vector
}

/// Test assertion helpers
pub mod assertions {
    use uuid::Uuid;

    /// Assert that two UUIDs are equal with a nice error message
    pub fn assert_uuid_eq(actual: Uuid, expected: Uuid, context: &str) {
        assert_eq!(
            actual, expected,
            "{}: expected UUID {}, got {}",
            context, expected, actual
        );
    }

    /// Assert that an optional value is Some
    pub fn assert_some<T>(value: Option<T>, context: &str) -> T {
        value.unwrap_or_else(|| panic!("{}: expected Some, got None", context))
    }

    /// Assert that a sequence never decreases
    pub fn assert_non_decreasing(values: &[f64], context: &str) {
        for pair in values.windows(2) {
            assert!(
                pair[0] <= pair[1],
                "{}: {} is followed by smaller {} in {:?}",
                context,
                pair[0],
                pair[1],
                values
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_builder_deterministic() {
        let builder1 = TestDataBuilder::new(42);
        let builder2 = TestDataBuilder::new(42);

        assert_eq!(builder1.id(), builder2.id());
        assert_eq!(
            builder1.name("incident", "test"),
            builder2.name("incident", "test")
        );
    }

    #[test]
    fn test_data_builder_different_names() {
        let builder1 = TestDataBuilder::from_test_name("test1");
        let builder2 = TestDataBuilder::from_test_name("test2");

        assert_ne!(builder1.id(), builder2.id());
    }

    #[test]
    fn test_offset_point_moves_north() {
        let builder = TestDataBuilder::new(1);
        let (lon, lat) = builder.offset_point(10.0, 0.0, 0.0, 111_195.08);
        assert!((lon - 10.0).abs() < 1e-12);
        assert!((lat - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_incident_type_is_lowercase() {
        let builder = TestDataBuilder::new(3);
        assert_eq!(builder.incident_type("Oil"), "type_3_oil");
    }

    #[test]
    fn test_bag_of_words_is_unit_and_deterministic() {
        let a = bag_of_words("Oil spill near the harbor", 64);
        let b = bag_of_words("oil SPILL near the harbor", 64);
        assert_eq!(a, b);

        let norm: f32 = a.iter().map(|v| v * v).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_bag_of_words_without_words_is_not_zero() {
        let v = bag_of_words("!!!", 8);
        assert_eq!(v[0], 1.0);
    }

    #[test]
    fn test_assert_non_decreasing_accepts_ties() {
        assertions::assert_non_decreasing(&[1.0, 1.0, 2.5], "ties");
    }

    #[test]
    #[should_panic]
    fn test_assert_non_decreasing_rejects_drop() {
        assertions::assert_non_decreasing(&[2.0, 1.0], "drop");
    }
}
