//! Database repository for product categories.

use crate::db::{
    errors::{DbError, Result},
    handlers::repository::Repository,
    models::categories::{CategoryCreateDBRequest, CategoryDBResponse, CategoryUpdateDBRequest},
};
use crate::types::{CategoryId, abbrev_uuid};
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgConnection};
use std::collections::HashMap;
use tracing::instrument;
use uuid::Uuid;

/// Categories are few; listing is alphabetical and unpaginated unless asked.
#[derive(Debug, Clone, Default)]
pub struct CategoryFilter {
    pub skip: i64,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, FromRow)]
struct Category {
    pub id: CategoryId,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<Category> for CategoryDBResponse {
    fn from(c: Category) -> Self {
        Self {
            id: c.id,
            name: c.name,
            slug: c.slug,
            description: c.description,
            image_url: c.image_url,
            created_at: c.created_at,
        }
    }
}

pub struct Categories<'c> {
    db: &'c mut PgConnection,
}

impl<'c> Categories<'c> {
    pub fn new(db: &'c mut PgConnection) -> Self {
        Self { db }
    }

    #[instrument(skip(self), err)]
    pub async fn get_by_slug(&mut self, slug: &str) -> Result<Option<CategoryDBResponse>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE slug = $1")
            .bind(slug)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(category.map(Into::into))
    }

    #[instrument(skip(self), err)]
    pub async fn count(&mut self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM categories")
            .fetch_one(&mut *self.db)
            .await?;
        Ok(count)
    }
}

#[async_trait::async_trait]
impl<'c> Repository for Categories<'c> {
    type CreateRequest = CategoryCreateDBRequest;
    type UpdateRequest = CategoryUpdateDBRequest;
    type Response = CategoryDBResponse;
    type Id = CategoryId;
    type Filter = CategoryFilter;

    #[instrument(skip(self, request), fields(slug = %request.slug), err)]
    async fn create(&mut self, request: &Self::CreateRequest) -> Result<Self::Response> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            INSERT INTO categories (id, name, slug, description, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&request.name)
        .bind(&request.slug)
        .bind(&request.description)
        .bind(&request.image_url)
        .fetch_one(&mut *self.db)
        .await?;

        Ok(category.into())
    }

    #[instrument(skip(self), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn get_by_id(&mut self, id: Self::Id) -> Result<Option<Self::Response>> {
        let category = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut *self.db)
            .await?;

        Ok(category.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_bulk(&mut self, ids: Vec<Self::Id>) -> Result<HashMap<Self::Id, Self::Response>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories WHERE id = ANY($1)")
            .bind(&ids)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(categories.into_iter().map(|c| (c.id, c.into())).collect())
    }

    #[instrument(skip(self, filter), err)]
    async fn list(&mut self, filter: &Self::Filter) -> Result<Vec<Self::Response>> {
        let categories = sqlx::query_as::<_, Category>("SELECT * FROM categories ORDER BY name LIMIT $1 OFFSET $2")
            .bind(filter.limit)
            .bind(filter.skip)
            .fetch_all(&mut *self.db)
            .await?;

        Ok(categories.into_iter().map(Into::into).collect())
    }

    /// Products in a deleted category are kept and become uncategorized.
    #[instrument(skip(self), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn delete(&mut self, id: Self::Id) -> Result<bool> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id)
            .execute(&mut *self.db)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(category_id = %abbrev_uuid(&id)), err)]
    async fn update(&mut self, id: Self::Id, request: &Self::UpdateRequest) -> Result<Self::Response> {
        let category = sqlx::query_as::<_, Category>(
            r#"
            UPDATE categories SET
                name = COALESCE($2, name),
                slug = COALESCE($3, slug),
                description = COALESCE($4, description),
                image_url = COALESCE($5, image_url)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&request.name)
        .bind(&request.slug)
        .bind(&request.description)
        .bind(&request.image_url)
        .fetch_optional(&mut *self.db)
        .await?
        .ok_or(DbError::NotFound)?;

        Ok(category.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn request(name: &str, slug: &str) -> CategoryCreateDBRequest {
        CategoryCreateDBRequest {
            name: name.to_string(),
            slug: slug.to_string(),
            description: None,
            image_url: None,
        }
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_category_crud(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Categories::new(&mut conn);

        let rings = repo.create(&request("Rings", "rings")).await.unwrap();
        repo.create(&request("Bangles", "bangles")).await.unwrap();

        let listed = repo.list(&CategoryFilter::default()).await.unwrap();
        assert_eq!(listed.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["Bangles", "Rings"]);

        let by_slug = repo.get_by_slug("rings").await.unwrap().unwrap();
        assert_eq!(by_slug.id, rings.id);

        let updated = repo
            .update(
                rings.id,
                &CategoryUpdateDBRequest {
                    description: Some("Engagement and daily wear".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Rings");
        assert_eq!(updated.description.as_deref(), Some("Engagement and daily wear"));

        assert!(repo.delete(rings.id).await.unwrap());
        assert!(!repo.delete(rings.id).await.unwrap());
        assert!(repo.get_by_id(rings.id).await.unwrap().is_none());
    }

    #[sqlx::test]
    #[test_log::test]
    async fn test_duplicate_slug_is_rejected(pool: PgPool) {
        let mut conn = pool.acquire().await.unwrap();
        let mut repo = Categories::new(&mut conn);

        repo.create(&request("Necklaces", "necklaces")).await.unwrap();
        let err = repo.create(&request("Necklace Sets", "necklaces")).await.unwrap_err();
        match err {
            DbError::UniqueViolation { constraint, .. } => assert_eq!(constraint.as_deref(), Some("categories_slug_unique")),
            other => panic!("expected unique violation, got {other:?}"),
        }
    }
}
