use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::embedding::Embedding;
use crate::error::IncidentResult;
use crate::geometry::{SearchCircle, SearchPolygon};
use crate::models::{Incident, IncidentFilter, Page, ProximityHit, SimilarityHit};

/// Persistence and query layer for incidents
///
/// Inputs are already validated by the service; implementations only
/// translate them into storage queries.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait IncidentRepository: Send + Sync {
    /// Insert a new incident with its description embedding
    async fn create(&self, incident: Incident, embedding: Embedding) -> IncidentResult<Incident>;

    async fn get_by_id(&self, id: Uuid) -> IncidentResult<Option<Incident>>;

    /// Newest first
    async fn list(&self, filter: &IncidentFilter, page: Page) -> IncidentResult<Vec<Incident>>;

    async fn count(&self, filter: &IncidentFilter) -> IncidentResult<u64>;

    /// Write `incident` only if the stored row still has `expected_updated_at`.
    ///
    /// `None` means the row changed or vanished in between. A `None`
    /// embedding keeps the stored one.
    async fn update(
        &self,
        incident: Incident,
        embedding: Option<Embedding>,
        expected_updated_at: DateTime<Utc>,
    ) -> IncidentResult<Option<Incident>>;

    /// Returns false when nothing was deleted
    async fn delete(&self, id: Uuid) -> IncidentResult<bool>;

    /// Incidents within the circle, nearest first
    async fn search_within_radius(
        &self,
        circle: &SearchCircle,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<ProximityHit>>;

    /// Incidents inside or on the polygon boundary, newest first
    async fn search_within_polygon(
        &self,
        polygon: &SearchPolygon,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<Incident>>;

    /// Nearest embeddings by cosine distance
    async fn search_similar(
        &self,
        embedding: &Embedding,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<SimilarityHit>>;
}

#[derive(Debug, Clone)]
struct StoredIncident {
    incident: Incident,
    embedding: Embedding,
}

/// In-memory implementation of IncidentRepository (for development/testing)
///
/// Distances use the haversine formula, so they differ from PostGIS
/// spheroid distances by up to about 0.5%.
#[derive(Debug, Default, Clone)]
pub struct InMemoryIncidentRepository {
    incidents: Arc<RwLock<HashMap<Uuid, StoredIncident>>>,
}

impl InMemoryIncidentRepository {
    pub fn new() -> Self {
        Self {
            incidents: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

fn newest_first(a: &Incident, b: &Incident) -> Ordering {
    b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id))
}

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items
        .into_iter()
        .skip(page.offset as usize)
        .take(page.limit as usize)
        .collect()
}

#[async_trait]
impl IncidentRepository for InMemoryIncidentRepository {
    async fn create(&self, incident: Incident, embedding: Embedding) -> IncidentResult<Incident> {
        let mut incidents = self.incidents.write().await;
        incidents.insert(
            incident.id,
            StoredIncident {
                incident: incident.clone(),
                embedding,
            },
        );

        tracing::info!(incident_id = %incident.id, "Created incident");
        Ok(incident)
    }

    async fn get_by_id(&self, id: Uuid) -> IncidentResult<Option<Incident>> {
        let incidents = self.incidents.read().await;
        Ok(incidents.get(&id).map(|s| s.incident.clone()))
    }

    async fn list(&self, filter: &IncidentFilter, page: Page) -> IncidentResult<Vec<Incident>> {
        let incidents = self.incidents.read().await;

        let mut result: Vec<Incident> = incidents
            .values()
            .map(|s| &s.incident)
            .filter(|i| filter.matches(i))
            .cloned()
            .collect();
        result.sort_by(newest_first);

        Ok(paginate(result, page))
    }

    async fn count(&self, filter: &IncidentFilter) -> IncidentResult<u64> {
        let incidents = self.incidents.read().await;
        Ok(incidents
            .values()
            .filter(|s| filter.matches(&s.incident))
            .count() as u64)
    }

    async fn update(
        &self,
        incident: Incident,
        embedding: Option<Embedding>,
        expected_updated_at: DateTime<Utc>,
    ) -> IncidentResult<Option<Incident>> {
        let mut incidents = self.incidents.write().await;

        let Some(stored) = incidents.get_mut(&incident.id) else {
            return Ok(None);
        };
        if stored.incident.updated_at != expected_updated_at {
            return Ok(None);
        }

        stored.incident = incident.clone();
        if let Some(embedding) = embedding {
            stored.embedding = embedding;
        }

        tracing::info!(incident_id = %incident.id, "Updated incident");
        Ok(Some(incident))
    }

    async fn delete(&self, id: Uuid) -> IncidentResult<bool> {
        let mut incidents = self.incidents.write().await;

        if incidents.remove(&id).is_some() {
            tracing::info!(incident_id = %id, "Deleted incident");
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn search_within_radius(
        &self,
        circle: &SearchCircle,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<ProximityHit>> {
        let incidents = self.incidents.read().await;

        let mut hits: Vec<ProximityHit> = incidents
            .values()
            .map(|s| &s.incident)
            .filter(|i| filter.matches(i))
            .filter_map(|i| {
                let distance_meters = circle.center.distance_meters(&i.location());
                (distance_meters <= circle.radius_meters).then(|| ProximityHit {
                    incident: i.clone(),
                    distance_meters,
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance_meters
                .total_cmp(&b.distance_meters)
                .then_with(|| newest_first(&a.incident, &b.incident))
        });

        Ok(paginate(hits, page))
    }

    async fn search_within_polygon(
        &self,
        polygon: &SearchPolygon,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<Incident>> {
        let incidents = self.incidents.read().await;

        let mut result: Vec<Incident> = incidents
            .values()
            .map(|s| &s.incident)
            .filter(|i| filter.matches(i) && polygon.covers(&i.location()))
            .cloned()
            .collect();
        result.sort_by(newest_first);

        Ok(paginate(result, page))
    }

    async fn search_similar(
        &self,
        embedding: &Embedding,
        filter: &IncidentFilter,
        page: Page,
    ) -> IncidentResult<Vec<SimilarityHit>> {
        let incidents = self.incidents.read().await;

        let mut hits: Vec<SimilarityHit> = incidents
            .values()
            .filter(|s| filter.matches(&s.incident))
            .filter_map(|s| {
                embedding
                    .cosine_distance(&s.embedding)
                    .map(|d| SimilarityHit::new(s.incident.clone(), d))
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .total_cmp(&b.distance)
                .then_with(|| newest_first(&a.incident, &b.incident))
        });

        Ok(paginate(hits, page))
    }
}
