//! Read-only ranking queries over the finished star schema.

use crate::dimension::name_ids;
use crate::normalize::match_key;
use crate::schema::DIM_GENRE;
use crate::store::Store;
use crate::Result;
use serde::{Deserialize, Serialize};

pub const DEFAULT_LIMIT: i64 = 10;
pub const MAX_LIMIT: i64 = 100;

/// Optional genre/year restriction plus top-N size
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RankingFilter {
    pub genre: Option<String>,
    pub year: Option<i32>,
    pub limit: Option<i64>,
}

/// Genre restriction after resolving the requested name against `Dim_Genre`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenreScope {
    Any,
    Only(i64),
    /// Requested genre has no dimension member
    Unknown,
}

impl GenreScope {
    fn genre_id(self) -> Option<i64> {
        match self {
            GenreScope::Only(id) => Some(id),
            GenreScope::Any | GenreScope::Unknown => None,
        }
    }
}

impl RankingFilter {
    fn genre_key(&self) -> Option<String> {
        self.genre.as_deref().and_then(match_key)
    }

    async fn genre_scope(&self, store: &Store) -> Result<GenreScope> {
        let Some(key) = self.genre_key() else {
            return Ok(GenreScope::Any);
        };
        let mut conn = store.pool().acquire().await?;
        let ids = name_ids(&mut *conn, DIM_GENRE).await?;
        Ok(ids.get(&key).map_or(GenreScope::Unknown, |&id| GenreScope::Only(id)))
    }

    fn effective_limit(&self) -> i64 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct MovieRanking {
    pub title: String,
    pub year: Option<String>,
    pub total_revenue: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct GenreRanking {
    pub genre_name: String,
    pub total_revenue: i64,
}

/// Movies by summed revenue, highest first.
///
/// The genre filter keeps movies bridged to that genre; a movie's revenue is
/// counted once however many genres it has.
pub async fn top_movies(store: &Store, filter: &RankingFilter) -> Result<Vec<MovieRanking>> {
    let scope = filter.genre_scope(store).await?;
    if scope == GenreScope::Unknown {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as(
        r#"
        SELECT m.title AS title, m.year AS year, SUM(fr.revenue) AS total_revenue
        FROM fact_revenue fr
        JOIN dim_movies m ON fr.movie_id = m.movie_id
        JOIN dim_date d ON fr.date_id = d.date_id
        WHERE (?1 IS NULL OR d.year = ?1)
          AND (?2 IS NULL OR EXISTS (
                SELECT 1
                FROM Bridge_Movie_Genre b
                WHERE b.movie_id = m.movie_id AND b.genre_id = ?2
          ))
        GROUP BY m.movie_id, m.title, m.year
        ORDER BY total_revenue DESC, m.title
        LIMIT ?3
        "#,
    )
    .bind(filter.year)
    .bind(scope.genre_id())
    .bind(filter.effective_limit())
    .fetch_all(store.pool())
    .await?;
    Ok(rows)
}

/// Genres by summed revenue of their movies, highest first.
pub async fn top_genres(store: &Store, filter: &RankingFilter) -> Result<Vec<GenreRanking>> {
    let scope = filter.genre_scope(store).await?;
    if scope == GenreScope::Unknown {
        return Ok(Vec::new());
    }
    let rows = sqlx::query_as(
        r#"
        SELECT g.genre_name AS genre_name, SUM(fr.revenue) AS total_revenue
        FROM fact_revenue fr
        JOIN Bridge_Movie_Genre b ON fr.movie_id = b.movie_id
        JOIN Dim_Genre g ON b.genre_id = g.genre_id
        JOIN dim_date d ON fr.date_id = d.date_id
        WHERE (?1 IS NULL OR d.year = ?1)
          AND (?2 IS NULL OR g.genre_id = ?2)
        GROUP BY g.genre_id, g.genre_name
        ORDER BY total_revenue DESC, g.genre_name
        LIMIT ?3
        "#,
    )
    .bind(filter.year)
    .bind(scope.genre_id())
    .bind(filter.effective_limit())
    .fetch_all(store.pool())
    .await?;
    Ok(rows)
}

pub async fn genres(store: &Store) -> Result<Vec<String>> {
    let names = sqlx::query_scalar("SELECT genre_name FROM Dim_Genre ORDER BY genre_name")
        .fetch_all(store.pool())
        .await?;
    Ok(names)
}

pub async fn years(store: &Store) -> Result<Vec<i32>> {
    let years = sqlx::query_scalar("SELECT DISTINCT year FROM dim_date ORDER BY year")
        .fetch_all(store.pool())
        .await?;
    Ok(years)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_limit_defaults_and_clamps() {
        assert_eq!(RankingFilter::default().effective_limit(), DEFAULT_LIMIT);
        let f = RankingFilter { limit: Some(0), ..Default::default() };
        assert_eq!(f.effective_limit(), 1);
        let f = RankingFilter { limit: Some(5000), ..Default::default() };
        assert_eq!(f.effective_limit(), MAX_LIMIT);
    }

    #[test]
    fn test_genre_key_uses_match_key() {
        let f = RankingFilter { genre: Some("  Sci-Fi. ".into()), ..Default::default() };
        assert_eq!(f.genre_key().as_deref(), Some("sci-fi"));
        let f = RankingFilter { genre: Some("AÇÃO".into()), ..Default::default() };
        assert_eq!(f.genre_key(), match_key("Ação"));
        let f = RankingFilter { genre: Some("".into()), ..Default::default() };
        assert_eq!(f.genre_key(), None);
    }
}
