use sea_orm_migration::{prelude::*, schema::*};

/// Output dimension of all-MiniLM-L6-v2
pub const EMBEDDING_DIMENSION: usize = 384;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(Incidents::Table)
                    .if_not_exists()
                    .col(pk_uuid(Incidents::Id))
                    .col(string_len(Incidents::Title, 255))
                    .col(text(Incidents::Description))
                    .col(string_len(Incidents::IncidentType, 100))
                    .col(small_integer(Incidents::Severity))
                    .col(double(Incidents::Longitude))
                    .col(double(Incidents::Latitude))
                    .col(
                        ColumnDef::new(Incidents::Location)
                            .custom(Alias::new("geography(Point, 4326)"))
                            .not_null(),
                    )
                    .col(string_len(Incidents::Status, 32).default("reported"))
                    .col(json_binary_null(Incidents::ReporterInfo))
                    .col(json_binary_null(Incidents::Metadata))
                    .col(
                        ColumnDef::new(Incidents::DescriptionEmbedding)
                            .custom(Alias::new(format!("vector({})", EMBEDDING_DIMENSION)))
                            .null(),
                    )
                    .col(
                        timestamp_with_time_zone(Incidents::ReportedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Incidents::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(Incidents::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        let db = manager.get_connection();

        db.execute_unprepared(
            r#"
            ALTER TABLE incidents
                ADD CONSTRAINT incidents_severity_range CHECK (severity BETWEEN 1 AND 5),
                ADD CONSTRAINT incidents_longitude_range CHECK (longitude BETWEEN -180 AND 180),
                ADD CONSTRAINT incidents_latitude_range CHECK (latitude BETWEEN -90 AND 90),
                ADD CONSTRAINT incidents_status_valid CHECK (
                    status IN ('reported', 'verified', 'in_progress', 'resolved', 'dismissed')
                )
            "#,
        )
        .await?;

        // Proximity queries (ST_DWithin / ST_Distance on geography)
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_incidents_location ON incidents USING GIST (location)",
        )
        .await?;

        // Area queries run ST_Covers against location::geometry
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_incidents_location_geom ON incidents USING GIST ((location::geometry))",
        )
        .await?;

        // Similarity queries order by description_embedding <=> $query
        db.execute_unprepared(
            "CREATE INDEX IF NOT EXISTS idx_incidents_embedding_hnsw ON incidents USING hnsw (description_embedding vector_cosine_ops)",
        )
        .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_incident_type")
                    .table(Incidents::Table)
                    .col(Incidents::IncidentType)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_status")
                    .table(Incidents::Table)
                    .col(Incidents::Status)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_incidents_created_at")
                    .table(Incidents::Table)
                    .col(Incidents::CreatedAt)
                    .to_owned(),
            )
            .await?;

        db.execute_unprepared(
            r#"
            CREATE TRIGGER incidents_touch_updated_at
                BEFORE UPDATE ON incidents
                FOR EACH ROW
                EXECUTE FUNCTION util.touch_updated_at()
            "#,
        )
        .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .get_connection()
            .execute_unprepared("DROP TRIGGER IF EXISTS incidents_touch_updated_at ON incidents")
            .await?;

        manager
            .drop_table(Table::drop().table(Incidents::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum Incidents {
    Table,
    Id,
    Title,
    Description,
    IncidentType,
    Severity,
    Longitude,
    Latitude,
    Location,
    Status,
    ReporterInfo,
    Metadata,
    DescriptionEmbedding,
    ReportedAt,
    CreatedAt,
    UpdatedAt,
}
