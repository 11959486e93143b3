//! Integration tests for the Incidents domain
//!
//! These tests use a real PostGIS + pgvector database via testcontainers to ensure:
//! - Spatial queries agree with geodesic distances and polygon membership
//! - Vector search ranks by cosine distance
//! - The `updated_at` token rejects stale writes, including concurrent ones
//!
//! Run with `cargo test -- --ignored` on a host with Docker.

use domain_incidents::*;
use std::sync::Arc;
use test_utils::{TestDataBuilder, TestDatabase, assertions::*, bag_of_words};
use uuid::Uuid;

const CENTER: (f64, f64) = (-0.1276, 51.5072);

fn input(builder: &TestDataBuilder, title: &str, description: &str, lon: f64, lat: f64) -> CreateIncident {
    CreateIncident {
        title: builder.name("incident", title),
        description: description.to_string(),
        incident_type: builder.incident_type("spill"),
        severity: 3,
        longitude: lon,
        latitude: lat,
        status: IncidentStatus::Reported,
        reporter_info: None,
        metadata: None,
        reported_at: None,
    }
}

fn embed(text: &str) -> Embedding {
    Embedding::new(bag_of_words(text, migration::EMBEDDING_DIMENSION))
}

async fn insert(repo: &PgIncidentRepository, input: CreateIncident) -> Incident {
    let embedding = embed(&input.description);
    repo.create(Incident::new(input), embedding).await.unwrap()
}

fn scoped(builder: &TestDataBuilder) -> IncidentFilter {
    IncidentFilter {
        incident_type: Some(builder.incident_type("spill")),
        ..Default::default()
    }
}

// ============================================================================
// Repository Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_create_and_get_incident() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("create_and_get");

    let mut create = input(&builder, "main", "Oil slick near the pier", CENTER.0, CENTER.1);
    create.reporter_info = Some(ReporterInfo {
        name: Some("Sam".to_string()),
        email: Some("sam@example.com".to_string()),
        phone: None,
    });
    create.metadata = Some(serde_json::json!({"photos": 2}));

    let created = insert(&repo, create).await;
    assert_eq!(created.status, IncidentStatus::Reported);
    assert_eq!(created.metadata, Some(serde_json::json!({"photos": 2})));

    let retrieved = repo.get_by_id(created.id).await.unwrap();
    let retrieved = assert_some(retrieved, "incident should exist");

    assert_uuid_eq(retrieved.id, created.id, "retrieved incident id");
    assert_eq!(retrieved, created);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_list_pages_are_prefixes() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("list_pages");

    for i in 0..6 {
        insert(&repo, input(&builder, &format!("r{}", i), "Smoke", 10.0, 50.0)).await;
    }

    let filter = scoped(&builder);
    assert_eq!(repo.count(&filter).await.unwrap(), 6);

    let mut previous: Vec<Uuid> = Vec::new();
    for limit in 1..=6 {
        let page = repo.list(&filter, Page::new(limit, 0)).await.unwrap();
        let ids: Vec<Uuid> = page.iter().map(|i| i.id).collect();
        assert_eq!(ids.len() as u64, limit);
        assert_eq!(&ids[..previous.len()], previous.as_slice(), "limit {}", limit);
        previous = ids;
    }

    let tail = repo.list(&filter, Page::new(10, 4)).await.unwrap();
    assert_eq!(tail.len(), 2);
    assert_eq!(tail[0].id, previous[4]);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_delete_incident() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("delete");

    let created = insert(&repo, input(&builder, "gone", "Dead fish", 1.0, 1.0)).await;

    assert!(repo.delete(created.id).await.unwrap());
    assert!(!repo.delete(created.id).await.unwrap());
    assert!(repo.get_by_id(created.id).await.unwrap().is_none());
}

// ============================================================================
// Spatial Search Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_proximity_search_orders_by_geodesic_distance() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("proximity");

    for (label, east) in [("far", 900.0), ("near", 100.0), ("middle", 400.0), ("outside", 5_000.0)] {
        let (lon, lat) = builder.offset_point(CENTER.0, CENTER.1, east, 0.0);
        insert(&repo, input(&builder, label, "Chemical smell", lon, lat)).await;
    }

    let center = GeoPoint::new(CENTER.0, CENTER.1).unwrap();
    let circle = SearchCircle::new(center, 1_000.0).unwrap();
    let hits = repo
        .search_within_radius(&circle, &scoped(&builder), Page::new(10, 0))
        .await
        .unwrap();

    let titles: Vec<String> = hits.iter().map(|h| h.incident.title.clone()).collect();
    assert_eq!(
        titles,
        ["near", "middle", "far"].map(|t| builder.name("incident", t))
    );

    let distances: Vec<f64> = hits.iter().map(|h| h.distance_meters).collect();
    assert_non_decreasing(&distances, "proximity distances");

    // Spheroid vs sphere differ by well under 1%
    for (hit, expected) in hits.iter().zip([100.0, 400.0, 900.0]) {
        assert!(
            (hit.distance_meters - expected).abs() < expected * 0.01,
            "{} vs {}",
            hit.distance_meters,
            expected
        );
        assert!(circle.contains(&hit.incident.location()));
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_proximity_limit_is_monotonic() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("proximity_limit");

    for i in 0..5 {
        let (lon, lat) = builder.offset_point(CENTER.0, CENTER.1, 0.0, 50.0 * (i + 1) as f64);
        insert(&repo, input(&builder, &format!("p{}", i), "Noise", lon, lat)).await;
    }

    let circle = SearchCircle::new(GeoPoint::new(CENTER.0, CENTER.1).unwrap(), 10_000.0).unwrap();
    let all = repo
        .search_within_radius(&circle, &scoped(&builder), Page::new(5, 0))
        .await
        .unwrap();

    for limit in 1..5 {
        let some = repo
            .search_within_radius(&circle, &scoped(&builder), Page::new(limit, 0))
            .await
            .unwrap();
        assert_eq!(some.as_slice(), &all[..limit as usize]);
    }
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_polygon_search_respects_holes_and_winding() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("polygon");

    insert(&repo, input(&builder, "inside", "Algae", 2.0, 2.0)).await;
    insert(&repo, input(&builder, "in_hole", "Algae", 5.0, 5.0)).await;
    insert(&repo, input(&builder, "edge", "Algae", 10.0, 5.0)).await;
    insert(&repo, input(&builder, "outside", "Algae", 12.0, 5.0)).await;

    let hole = serde_json::json!([[4.0, 4.0], [4.0, 6.0], [6.0, 6.0], [6.0, 4.0], [4.0, 4.0]]);
    let counter_clockwise = serde_json::json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0], [0.0, 0.0]], hole]
    });
    let clockwise = serde_json::json!({
        "type": "Polygon",
        "coordinates": [[[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0], [0.0, 0.0]], hole]
    });

    let mut results = Vec::new();
    for geometry in [counter_clockwise, clockwise] {
        let geometry: geojson::Geometry = serde_json::from_value(geometry).unwrap();
        let polygon = SearchPolygon::from_geojson(&geometry).unwrap();

        let found = repo
            .search_within_polygon(&polygon, &scoped(&builder), Page::new(10, 0))
            .await
            .unwrap();

        for incident in &found {
            assert!(polygon.covers(&incident.location()));
        }

        let mut titles: Vec<String> = found.into_iter().map(|i| i.title).collect();
        titles.sort();
        results.push(titles);
    }

    let mut expected = vec![builder.name("incident", "edge"), builder.name("incident", "inside")];
    expected.sort();
    assert_eq!(results[0], expected);
    assert_eq!(results[1], expected);
}

// ============================================================================
// Similarity Search Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_similarity_search_ranks_by_cosine_distance() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("similarity");

    let exact = "Thick black oil washing onto the beach";
    insert(&repo, input(&builder, "exact", exact, 1.0, 1.0)).await;
    insert(&repo, input(&builder, "related", "Oil drums leaking near the beach", 1.0, 1.0)).await;
    insert(&repo, input(&builder, "unrelated", "Loud construction noise at night", 1.0, 1.0)).await;

    let hits = repo
        .search_similar(&embed(exact), &scoped(&builder), Page::new(3, 0))
        .await
        .unwrap();

    assert_eq!(hits.len(), 3);
    assert_eq!(hits[0].incident.title, builder.name("incident", "exact"));
    assert!(hits[0].distance.abs() < 1e-4);

    let distances: Vec<f64> = hits.iter().map(|h| h.distance).collect();
    assert_non_decreasing(&distances, "cosine distances");
    for hit in &hits {
        assert!((hit.similarity - (1.0 - hit.distance)).abs() < 1e-9);
    }
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_stale_update_is_rejected() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("stale_update");

    let created = insert(&repo, input(&builder, "v1", "Foam", 3.0, 3.0)).await;

    let mut first = created.clone();
    first.status = IncidentStatus::Verified;
    let first = repo.update(first, None, created.updated_at).await.unwrap();
    let first = assert_some(first, "first update should win");
    assert!(first.updated_at > created.updated_at);

    let mut second = created.clone();
    second.severity = 5;
    assert!(repo.update(second, None, created.updated_at).await.unwrap().is_none());

    let stored = repo.get_by_id(created.id).await.unwrap().unwrap();
    assert_eq!(stored.status, IncidentStatus::Verified);
    assert_eq!(stored.severity, 3);
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_concurrent_updates_single_winner() {
    let db = TestDatabase::new().await;
    let repo = PgIncidentRepository::new(db.connection());
    let builder = TestDataBuilder::from_test_name("concurrent_updates");

    let created = insert(&repo, input(&builder, "race", "Burning tyres", 4.0, 4.0)).await;

    let mut handles = vec![];
    for severity in 1..=5 {
        let repo_clone = PgIncidentRepository::new(db.connection());
        let mut incident = created.clone();
        incident.severity = severity;
        let token = created.updated_at;

        handles.push(tokio::spawn(async move {
            repo_clone.update(incident, None, token).await
        }));
    }

    let results: Vec<_> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.is_some()).count();
    assert_eq!(winners, 1, "exactly one update should apply");
}

#[tokio::test]
#[ignore = "requires Docker"]
async fn test_service_update_keeps_embedding_when_description_unchanged() {
    struct WordEmbedder;

    #[async_trait::async_trait]
    impl EmbeddingProvider for WordEmbedder {
        fn model_name(&self) -> String {
            "bag-of-words".to_string()
        }

        fn dimension(&self) -> usize {
            migration::EMBEDDING_DIMENSION
        }

        async fn embed(&self, text: &str) -> IncidentResult<Embedding> {
            Ok(embed(text))
        }
    }

    let db = TestDatabase::new().await;
    let service = IncidentService::new(PgIncidentRepository::new(db.connection()), Arc::new(WordEmbedder));
    let builder = TestDataBuilder::from_test_name("service_update");

    let description = "Sewage overflow into the canal";
    let created = service
        .create_incident(input(&builder, "sewage", description, 5.0, 5.0))
        .await
        .unwrap();

    let updated = service
        .update_incident(
            created.id,
            UpdateIncident {
                status: Some(IncidentStatus::InProgress),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.status, IncidentStatus::InProgress);

    let hits = service
        .search_similar(description, scoped(&builder), Page::new(1, 0))
        .await
        .unwrap();
    assert_eq!(hits[0].incident.id, created.id);
    assert!(hits[0].distance.abs() < 1e-4);

    service.delete_incident(created.id).await.unwrap();
    assert!(matches!(
        service.update_incident(created.id, UpdateIncident::default()).await,
        Err(IncidentError::NotFound(_))
    ));
}
