use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};
use uuid::Uuid;
use validator::Validate;

use crate::embedding::{Embedding, EmbeddingProvider};
use crate::error::{IncidentError, IncidentResult};
use crate::geometry::{GeoPoint, SearchArea, SearchCircle};
use crate::models::{
    CreateIncident, Incident, IncidentFilter, Page, ProximityHit, SimilarityHit, UpdateIncident,
};
use crate::repository::IncidentRepository;

pub const DEFAULT_STORAGE_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_EMBEDDING_TIMEOUT: Duration = Duration::from_secs(15);

const MAX_QUERY_CHARS: usize = 2000;

/// Business logic for incident reports
///
/// Every storage and embedding call runs under its own deadline; an expired
/// deadline surfaces as [`IncidentError::Timeout`].
pub struct IncidentService<R: IncidentRepository> {
    repository: Arc<R>,
    embedder: Arc<dyn EmbeddingProvider>,
    storage_timeout: Duration,
    embedding_timeout: Duration,
}

impl<R: IncidentRepository> Clone for IncidentService<R> {
    fn clone(&self) -> Self {
        Self {
            repository: Arc::clone(&self.repository),
            embedder: Arc::clone(&self.embedder),
            storage_timeout: self.storage_timeout,
            embedding_timeout: self.embedding_timeout,
        }
    }
}

impl<R: IncidentRepository> IncidentService<R> {
    pub fn new(repository: R, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            repository: Arc::new(repository),
            embedder,
            storage_timeout: DEFAULT_STORAGE_TIMEOUT,
            embedding_timeout: DEFAULT_EMBEDDING_TIMEOUT,
        }
    }

    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    pub fn with_embedding_timeout(mut self, timeout: Duration) -> Self {
        self.embedding_timeout = timeout;
        self
    }

    async fn storage<T>(
        &self,
        operation: &'static str,
        call: impl Future<Output = IncidentResult<T>>,
    ) -> IncidentResult<T> {
        match tokio::time::timeout(self.storage_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                warn!(operation, timeout = ?self.storage_timeout, "Storage call timed out");
                Err(IncidentError::Timeout(format!(
                    "storage call '{}' exceeded {:?}",
                    operation, self.storage_timeout
                )))
            }
        }
    }

    /// Embed `text` and check the vector against the configured dimension
    async fn embed(&self, text: &str) -> IncidentResult<Embedding> {
        let embedding = tokio::time::timeout(self.embedding_timeout, self.embedder.embed(text))
            .await
            .map_err(|_| {
                warn!(timeout = ?self.embedding_timeout, "Embedding call timed out");
                IncidentError::Timeout(format!(
                    "embedding call exceeded {:?}",
                    self.embedding_timeout
                ))
            })??;

        let expected = self.embedder.dimension();
        if embedding.dimension() != expected {
            return Err(IncidentError::Internal(format!(
                "Embedding model '{}' returned {} dimensions, expected {}",
                self.embedder.model_name(),
                embedding.dimension(),
                expected
            )));
        }
        if !embedding.is_finite() {
            return Err(IncidentError::Internal(
                "Embedding contains non-finite values".to_string(),
            ));
        }

        Ok(embedding)
    }

    fn check_query(filter: &IncidentFilter, page: Page) -> IncidentResult<()> {
        filter.validate()?;
        page.validate()?;
        Ok(())
    }

    /// Validate, embed the description and store a new report
    #[instrument(skip(self, input), fields(incident_type = %input.incident_type))]
    pub async fn create_incident(&self, input: CreateIncident) -> IncidentResult<Incident> {
        input.validate()?;
        GeoPoint::new(input.longitude, input.latitude)?;

        let incident = Incident::new(input);
        let embedding = self.embed(&incident.description).await?;

        self.storage("create", self.repository.create(incident, embedding))
            .await
    }

    #[instrument(skip(self))]
    pub async fn get_incident(&self, id: Uuid) -> IncidentResult<Incident> {
        self.storage("get", self.repository.get_by_id(id))
            .await?
            .ok_or(IncidentError::NotFound(id))
    }

    /// One page of incidents, newest first, plus the total matching count
    #[instrument(skip(self))]
    pub async fn list_incidents(
        &self,
        filter: IncidentFilter,
        page: Page,
    ) -> IncidentResult<(Vec<Incident>, u64)> {
        Self::check_query(&filter, page)?;

        tokio::try_join!(
            self.storage("list", self.repository.list(&filter, page)),
            self.storage("count", self.repository.count(&filter)),
        )
    }

    #[instrument(skip(self))]
    pub async fn count_incidents(&self, filter: IncidentFilter) -> IncidentResult<u64> {
        filter.validate()?;
        self.storage("count", self.repository.count(&filter)).await
    }

    /// Partial update guarded by the row's `updated_at`
    ///
    /// Re-embeds only when the description changes. If the row was modified
    /// or deleted after it was read, fails with [`IncidentError::Conflict`].
    #[instrument(skip(self, input))]
    pub async fn update_incident(&self, id: Uuid, input: UpdateIncident) -> IncidentResult<Incident> {
        input.validate()?;

        let current = self.get_incident(id).await?;
        let mut updated = current.clone();
        updated.apply_update(input)?;

        let embedding = if updated.description != current.description {
            Some(self.embed(&updated.description).await?)
        } else {
            None
        };

        self.storage(
            "update",
            self.repository.update(updated, embedding, current.updated_at),
        )
        .await?
        .ok_or(IncidentError::Conflict(id))
    }

    #[instrument(skip(self))]
    pub async fn delete_incident(&self, id: Uuid) -> IncidentResult<()> {
        let deleted = self.storage("delete", self.repository.delete(id)).await?;

        if !deleted {
            return Err(IncidentError::NotFound(id));
        }

        Ok(())
    }

    /// Incidents within `radius_meters` of `center`, nearest first
    #[instrument(skip(self))]
    pub async fn search_proximity(
        &self,
        center: GeoPoint,
        radius_meters: f64,
        filter: IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<ProximityHit>> {
        let circle = SearchCircle::new(center, radius_meters)?;
        Self::check_query(&filter, page)?;

        self.storage(
            "search_proximity",
            self.repository.search_within_radius(&circle, &filter, page),
        )
        .await
    }

    /// Incidents inside the area
    ///
    /// Polygons return newest first; circles return nearest first.
    #[instrument(skip(self, area))]
    pub async fn search_area(
        &self,
        area: SearchArea,
        filter: IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<Incident>> {
        Self::check_query(&filter, page)?;

        match area {
            SearchArea::Polygon(polygon) => {
                self.storage(
                    "search_area",
                    self.repository.search_within_polygon(&polygon, &filter, page),
                )
                .await
            }
            SearchArea::Circle(circle) => {
                let hits = self
                    .storage(
                        "search_area",
                        self.repository.search_within_radius(&circle, &filter, page),
                    )
                    .await?;
                Ok(hits.into_iter().map(|h| h.incident).collect())
            }
        }
    }

    /// Incidents whose descriptions are closest to `query` by cosine distance
    #[instrument(skip(self, query), fields(query_len = query.len()))]
    pub async fn search_similar(
        &self,
        query: &str,
        filter: IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<SimilarityHit>> {
        if query.trim().is_empty() {
            return Err(IncidentError::Validation("query must not be blank".to_string()));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(IncidentError::Validation(format!(
                "query must be at most {} characters",
                MAX_QUERY_CHARS
            )));
        }
        Self::check_query(&filter, page)?;

        let embedding = self.embed(query).await?;

        self.storage(
            "search_similar",
            self.repository.search_similar(&embedding, &filter, page),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::MockEmbeddingProvider;
    use crate::geometry::SearchPolygon;
    use crate::models::IncidentStatus;
    use crate::repository::MockIncidentRepository;
    use async_trait::async_trait;
    use mockall::predicate::{always, eq};

    fn embedder(dimension: usize) -> MockEmbeddingProvider {
        let mut mock = MockEmbeddingProvider::new();
        mock.expect_dimension().return_const(dimension);
        mock.expect_model_name().return_const("test-model".to_string());
        mock
    }

    fn create_input() -> CreateIncident {
        CreateIncident {
            title: "Dead fish".to_string(),
            description: "Dozens of dead fish along the canal bank".to_string(),
            incident_type: "Water_Pollution".to_string(),
            severity: 4,
            longitude: 4.89,
            latitude: 52.37,
            status: IncidentStatus::Reported,
            reporter_info: None,
            metadata: None,
            reported_at: None,
        }
    }

    fn service(
        repo: MockIncidentRepository,
        embedder: MockEmbeddingProvider,
    ) -> IncidentService<MockIncidentRepository> {
        IncidentService::new(repo, Arc::new(embedder))
    }

    #[tokio::test]
    async fn test_create_embeds_description() {
        let mut embedder = embedder(3);
        embedder
            .expect_embed()
            .with(eq("Dozens of dead fish along the canal bank"))
            .times(1)
            .returning(|_| Ok(Embedding::new(vec![0.1, 0.2, 0.3])));

        let mut repo = MockIncidentRepository::new();
        repo.expect_create()
            .withf(|incident, embedding| {
                incident.incident_type == "water_pollution" && embedding.dimension() == 3
            })
            .times(1)
            .returning(|incident, _| Ok(incident));

        let created = service(repo, embedder)
            .create_incident(create_input())
            .await
            .unwrap();
        assert_eq!(created.incident_type, "water_pollution");
    }

    #[tokio::test]
    async fn test_create_rejects_wrong_dimension_before_storage() {
        let mut embedder = embedder(384);
        embedder
            .expect_embed()
            .returning(|_| Ok(Embedding::new(vec![0.1, 0.2, 0.3])));

        let err = service(MockIncidentRepository::new(), embedder)
            .create_incident(create_input())
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Internal(ref m) if m.contains("384")));
    }

    #[tokio::test]
    async fn test_create_invalid_input_never_embeds() {
        let mut input = create_input();
        input.latitude = f64::NAN;

        let err = service(MockIncidentRepository::new(), MockEmbeddingProvider::new())
            .create_incident(input)
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_embedding_outage_is_retryable() {
        let mut embedder = embedder(3);
        embedder
            .expect_embed()
            .returning(|_| Err(IncidentError::EmbeddingUnavailable("connection refused".into())));

        let err = service(MockIncidentRepository::new(), embedder)
            .create_incident(create_input())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_get_by_id().returning(|_| Ok(None));

        let id = Uuid::now_v7();
        let err = service(repo, MockEmbeddingProvider::new())
            .get_incident(id)
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::NotFound(found) if found == id));
    }

    #[tokio::test]
    async fn test_update_without_description_change_skips_embedding() {
        let existing = Incident::new(create_input());
        let id = existing.id;
        let token = existing.updated_at;

        let mut repo = MockIncidentRepository::new();
        let stored = existing.clone();
        repo.expect_get_by_id()
            .with(eq(id))
            .returning(move |_| Ok(Some(stored.clone())));
        repo.expect_update()
            .withf(move |incident, embedding, expected| {
                incident.severity == 5 && embedding.is_none() && *expected == token
            })
            .times(1)
            .returning(|incident, _, _| Ok(Some(incident)));

        let updated = service(repo, MockEmbeddingProvider::new())
            .update_incident(
                id,
                UpdateIncident {
                    severity: Some(5),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.severity, 5);
    }

    #[tokio::test]
    async fn test_update_with_new_description_re_embeds() {
        let existing = Incident::new(create_input());
        let id = existing.id;

        let mut embedder = embedder(2);
        embedder
            .expect_embed()
            .with(eq("Fish kill spreading to the harbour"))
            .times(1)
            .returning(|_| Ok(Embedding::new(vec![0.5, 0.5])));

        let mut repo = MockIncidentRepository::new();
        repo.expect_get_by_id()
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_update()
            .withf(|_, embedding, _| embedding.is_some())
            .returning(|incident, _, _| Ok(Some(incident)));

        service(repo, embedder)
            .update_incident(
                id,
                UpdateIncident {
                    description: Some("Fish kill spreading to the harbour".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_lost_race_is_conflict() {
        let existing = Incident::new(create_input());
        let id = existing.id;

        let mut repo = MockIncidentRepository::new();
        repo.expect_get_by_id()
            .returning(move |_| Ok(Some(existing.clone())));
        repo.expect_update().returning(|_, _, _| Ok(None));

        let err = service(repo, MockEmbeddingProvider::new())
            .update_incident(
                id,
                UpdateIncident {
                    status: Some(IncidentStatus::Verified),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_update_rejects_merged_coordinate_out_of_range() {
        let existing = Incident::new(create_input());
        let id = existing.id;

        let mut repo = MockIncidentRepository::new();
        repo.expect_get_by_id()
            .returning(move |_| Ok(Some(existing.clone())));

        let err = service(repo, MockEmbeddingProvider::new())
            .update_incident(
                id,
                UpdateIncident {
                    longitude: Some(181.0),
                    ..Default::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_delete().returning(|_| Ok(false));

        let err = service(repo, MockEmbeddingProvider::new())
            .delete_incident(Uuid::now_v7())
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_returns_total_count() {
        let mut repo = MockIncidentRepository::new();
        repo.expect_list()
            .with(always(), eq(Page::new(2, 0)))
            .returning(|_, _| {
                Ok(vec![
                    Incident::new(create_input()),
                    Incident::new(create_input()),
                ])
            });
        repo.expect_count().returning(|_| Ok(7));

        let (items, total) = service(repo, MockEmbeddingProvider::new())
            .list_incidents(IncidentFilter::default(), Page::new(2, 0))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(total, 7);
    }

    #[tokio::test]
    async fn test_invalid_page_is_rejected_without_storage() {
        let service = service(MockIncidentRepository::new(), MockEmbeddingProvider::new());

        for page in [Page::new(0, 0), Page::new(101, 0), Page::new(10, 1 << 63)] {
            let err = service
                .list_incidents(IncidentFilter::default(), page)
                .await
                .unwrap_err();
            assert!(matches!(err, IncidentError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_proximity_rejects_bad_radius_without_storage() {
        let service = service(MockIncidentRepository::new(), MockEmbeddingProvider::new());
        let center = GeoPoint::new(0.0, 0.0).unwrap();

        for radius in [-1.0, f64::INFINITY, 20_037_510.0] {
            let err = service
                .search_proximity(center, radius, IncidentFilter::default(), Page::new(10, 0))
                .await
                .unwrap_err();
            assert!(matches!(err, IncidentError::Validation(_)));
        }
    }

    #[tokio::test]
    async fn test_self_intersecting_polygon_never_reaches_storage() {
        // No expectations: any repository call panics
        let service = service(MockIncidentRepository::new(), MockEmbeddingProvider::new());

        let bowtie: geojson::Geometry = serde_json::from_value(serde_json::json!({
            "type": "Polygon",
            "coordinates": [[[0.0, 0.0], [1.0, 1.0], [1.0, 0.0], [0.0, 1.0], [0.0, 0.0]]]
        }))
        .unwrap();

        let err = SearchPolygon::from_geojson(&bowtie).map(SearchArea::Polygon);
        assert!(matches!(err, Err(IncidentError::Validation(_))));

        // A valid area with an invalid filter is also stopped before storage
        let area = SearchArea::Polygon(SearchPolygon::from_bbox([0.0, 0.0, 1.0, 1.0]).unwrap());
        let filter = IncidentFilter {
            min_severity: Some(9),
            ..Default::default()
        };
        let err = service
            .search_area(area, filter, Page::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_area_circle_maps_hits_to_incidents() {
        let incident = Incident::new(create_input());
        let expected = incident.clone();

        let mut repo = MockIncidentRepository::new();
        repo.expect_search_within_radius().returning(move |_, _, _| {
            Ok(vec![ProximityHit {
                incident: incident.clone(),
                distance_meters: 3.0,
            }])
        });

        let circle = SearchCircle::new(GeoPoint::new(4.89, 52.37).unwrap(), 50.0).unwrap();
        let found = service(repo, MockEmbeddingProvider::new())
            .search_area(
                SearchArea::Circle(circle),
                IncidentFilter::default(),
                Page::new(10, 0),
            )
            .await
            .unwrap();
        assert_eq!(found, vec![expected]);
    }

    #[tokio::test]
    async fn test_similar_rejects_blank_query_without_embedding() {
        let err = service(MockIncidentRepository::new(), MockEmbeddingProvider::new())
            .search_similar("   ", IncidentFilter::default(), Page::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Validation(_)));
    }

    #[tokio::test]
    async fn test_similar_passes_query_embedding_to_repository() {
        let mut embedder = embedder(2);
        embedder
            .expect_embed()
            .returning(|_| Ok(Embedding::new(vec![1.0, 0.0])));

        let mut repo = MockIncidentRepository::new();
        repo.expect_search_similar()
            .withf(|embedding, _, page| embedding.as_slice() == [1.0, 0.0] && page.limit == 3)
            .returning(|_, _, _| Ok(vec![]));

        let hits = service(repo, embedder)
            .search_similar("oil slick", IncidentFilter::default(), Page::new(3, 0))
            .await
            .unwrap();
        assert!(hits.is_empty());
    }

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        fn model_name(&self) -> String {
            "slow".to_string()
        }

        fn dimension(&self) -> usize {
            1
        }

        async fn embed(&self, _text: &str) -> IncidentResult<Embedding> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Embedding::new(vec![1.0]))
        }
    }

    #[tokio::test]
    async fn test_embedding_deadline_is_timeout() {
        let service = IncidentService::new(MockIncidentRepository::new(), Arc::new(SlowEmbedder))
            .with_embedding_timeout(Duration::from_millis(20));

        let err = service
            .search_similar("anything", IncidentFilter::default(), Page::new(10, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, IncidentError::Timeout(_)));
        assert!(err.is_retryable());
    }
}
