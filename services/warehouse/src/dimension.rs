//! Dimension loading with surrogate-key assignment.
//!
//! Each load computes the staged natural keys missing from the dimension and
//! appends only those, numbered from `max(id) + 1` in natural-key order.
//! Members already present are never updated or renumbered.

use crate::normalize::{clean_label, match_key, split_multi};
use crate::schema::{Attribute, NameDimension, DIM_DISTRIBUTION, DIM_MOVIES, STG_MOVIES, STG_REVENUES};
use crate::store::Store;
use crate::{LoadCounts, Result};
use sqlx::SqliteConnection;
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::{debug, info};

/// Natural key of a movie: case-folded title plus release year
pub type MovieKey = (String, Option<String>);

/// Descriptive attributes stored with a new movie member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieMember {
    pub title: String,
    pub year: Option<String>,
    pub rated: Option<String>,
    pub released: Option<String>,
    pub runtime: Option<String>,
}

fn clean_year(raw: Option<&str>) -> Option<String> {
    raw.and_then(clean_label)
}

fn movie_key(title: &str, year: Option<&str>) -> Option<MovieKey> {
    match_key(title).map(|key| (key, clean_year(year)))
}

async fn next_surrogate_id(
    conn: &mut SqliteConnection,
    table: &str,
    id_column: &str,
) -> Result<i64> {
    let max: i64 = sqlx::query_scalar(&format!(
        "SELECT COALESCE(MAX({}), 0) FROM {}",
        id_column, table
    ))
    .fetch_one(&mut *conn)
    .await?;
    Ok(max + 1)
}

/// Collapse labels to their match keys, keeping the first label seen per key.
fn candidate_labels<I>(labels: I) -> BTreeMap<String, String>
where
    I: IntoIterator<Item = String>,
{
    let mut candidates = BTreeMap::new();
    for label in labels {
        if let (Some(key), Some(clean)) = (match_key(&label), clean_label(&label)) {
            candidates.entry(key).or_insert(clean);
        }
    }
    candidates
}

/// Append the labels whose match key is not yet in `dim`.
pub(crate) async fn insert_novel_names<I>(
    conn: &mut SqliteConnection,
    dim: NameDimension,
    labels: I,
) -> Result<LoadCounts>
where
    I: IntoIterator<Item = String>,
{
    let candidates = candidate_labels(labels);

    let existing: HashSet<String> = name_ids(&mut *conn, dim).await?.into_keys().collect();
    let mut next_id = next_surrogate_id(&mut *conn, dim.table, dim.id_column).await?;

    let insert = format!(
        "INSERT INTO {} ({}, {}) VALUES (?, ?)",
        dim.table, dim.id_column, dim.name_column
    );

    let mut counts = LoadCounts::default();
    for (key, label) in candidates {
        if existing.contains(&key) {
            counts.skipped += 1;
            continue;
        }
        sqlx::query(&insert)
            .bind(next_id)
            .bind(&label)
            .execute(&mut *conn)
            .await?;
        debug!("{}: {} -> {}", dim.table, label, next_id);
        next_id += 1;
        counts.inserted += 1;
    }
    Ok(counts)
}

/// Match key -> surrogate id for every member of `dim`
pub async fn name_ids(conn: &mut SqliteConnection, dim: NameDimension) -> Result<HashMap<String, i64>> {
    let rows: Vec<(i64, String)> = sqlx::query_as(&format!(
        "SELECT {}, {} FROM {}",
        dim.id_column, dim.name_column, dim.table
    ))
    .fetch_all(&mut *conn)
    .await?;

    Ok(rows
        .into_iter()
        .filter_map(|(id, name)| match_key(&name).map(|key| (key, id)))
        .collect())
}

/// Case-folded title -> every movie id carrying that title
pub async fn movie_ids_by_title(conn: &mut SqliteConnection) -> Result<HashMap<String, Vec<i64>>> {
    let rows: Vec<(i64, String)> =
        sqlx::query_as(&format!("SELECT movie_id, title FROM {} ORDER BY movie_id", DIM_MOVIES))
            .fetch_all(&mut *conn)
            .await?;

    let mut index: HashMap<String, Vec<i64>> = HashMap::new();
    for (id, title) in rows {
        if let Some(key) = match_key(&title) {
            index.entry(key).or_default().push(id);
        }
    }
    Ok(index)
}

/// Resolve a title to exactly one movie id. Zero or several matches yield `None`.
pub fn resolve_unique_title(index: &HashMap<String, Vec<i64>>, title: &str) -> Option<i64> {
    let key = match_key(title)?;
    match index.get(&key).map(Vec::as_slice) {
        Some([id]) => Some(*id),
        _ => None,
    }
}

/// Load novel distributors from revenue staging.
pub async fn load_distribution_dimension(store: &Store) -> Result<LoadCounts> {
    let mut tx = store.begin().await?;

    let staged: Vec<Option<String>> =
        sqlx::query_scalar(&format!("SELECT distributor FROM {}", STG_REVENUES))
            .fetch_all(&mut *tx)
            .await?;

    let counts = insert_novel_names(&mut *tx, DIM_DISTRIBUTION, staged.into_iter().flatten()).await?;
    tx.commit().await?;

    info!(
        "Loaded {}: {} new, {} already present",
        DIM_DISTRIBUTION.table, counts.inserted, counts.skipped
    );
    Ok(counts)
}

/// Load novel entity names for a multi-valued attribute (genre, director, ...).
pub async fn load_attribute_dimension(store: &Store, attribute: Attribute) -> Result<LoadCounts> {
    let dim = attribute.dimension();
    let mut tx = store.begin().await?;

    let staged: Vec<Option<String>> = sqlx::query_scalar(&format!(
        "SELECT \"{}\" FROM {}",
        attribute.staging_column(),
        STG_MOVIES
    ))
    .fetch_all(&mut *tx)
    .await?;

    let tokens = staged.iter().flatten().flat_map(|raw| split_multi(raw));
    let counts = insert_novel_names(&mut *tx, dim, tokens).await?;
    tx.commit().await?;

    info!(
        "Loaded {}: {} new, {} already present",
        dim.table, counts.inserted, counts.skipped
    );
    Ok(counts)
}

/// Load novel movies from metadata staging.
///
/// Natural key is (title, year). The first staged row for a new key supplies
/// its descriptive attributes. Rows without a usable title are ignored.
pub async fn load_movie_dimension(store: &Store) -> Result<LoadCounts> {
    let mut tx = store.begin().await?;

    let staged: Vec<(Option<String>, Option<String>, Option<String>, Option<String>, Option<String>)> =
        sqlx::query_as(&format!(
            "SELECT \"Title\", \"Year\", \"Rated\", \"Released\", \"Runtime\" FROM {} ORDER BY rowid",
            STG_MOVIES
        ))
        .fetch_all(&mut *tx)
        .await?;

    let mut candidates: BTreeMap<MovieKey, MovieMember> = BTreeMap::new();
    for (title, year, rated, released, runtime) in staged {
        let Some(title) = title else { continue };
        let (Some(key), Some(clean_title)) = (movie_key(&title, year.as_deref()), clean_label(&title)) else {
            continue;
        };
        candidates.entry(key).or_insert_with(|| MovieMember {
            title: clean_title,
            year: clean_year(year.as_deref()),
            rated,
            released,
            runtime,
        });
    }

    let existing_rows: Vec<(String, Option<String>)> =
        sqlx::query_as(&format!("SELECT title, year FROM {}", DIM_MOVIES))
            .fetch_all(&mut *tx)
            .await?;
    let existing: HashSet<MovieKey> = existing_rows
        .iter()
        .filter_map(|(title, year)| movie_key(title, year.as_deref()))
        .collect();

    let mut next_id = next_surrogate_id(&mut *tx, DIM_MOVIES, "movie_id").await?;
    let mut counts = LoadCounts::default();

    for (key, member) in candidates {
        if existing.contains(&key) {
            counts.skipped += 1;
            continue;
        }
        sqlx::query(&format!(
            "INSERT INTO {} (movie_id, title, year, rated, released, runtime) VALUES (?, ?, ?, ?, ?, ?)",
            DIM_MOVIES
        ))
        .bind(next_id)
        .bind(&member.title)
        .bind(&member.year)
        .bind(&member.rated)
        .bind(&member.released)
        .bind(&member.runtime)
        .execute(&mut *tx)
        .await?;
        next_id += 1;
        counts.inserted += 1;
    }

    tx.commit().await?;
    info!(
        "Loaded {}: {} new, {} already present",
        DIM_MOVIES, counts.inserted, counts.skipped
    );
    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_labels_dedupes_by_match_key() {
        let candidates = candidate_labels(vec![
            "Warner Bros.".to_string(),
            "warner bros".to_string(),
            "  Lionsgate ".to_string(),
            "N/A".to_string(),
        ]);
        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates["warner bros"], "Warner Bros");
        assert_eq!(candidates["lionsgate"], "Lionsgate");
    }

    #[test]
    fn test_candidate_labels_ordered_by_key() {
        let candidates = candidate_labels(vec!["Zeta".into(), "alpha".into(), "Mid".into()]);
        let keys: Vec<&String> = candidates.keys().collect();
        assert_eq!(keys, vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_movie_key_normalizes_title_and_year() {
        assert_eq!(
            movie_key(" The Matrix. ", Some(" 1999 ")),
            Some(("the matrix".to_string(), Some("1999".to_string())))
        );
        assert_eq!(movie_key("Heat", Some("N/A")), Some(("heat".to_string(), None)));
        assert_eq!(movie_key("  ", Some("1999")), None);
    }

    #[test]
    fn test_resolve_unique_title() {
        let mut index = HashMap::new();
        index.insert("heat".to_string(), vec![1]);
        index.insert("dune".to_string(), vec![2, 3]);

        assert_eq!(resolve_unique_title(&index, "Heat."), Some(1));
        assert_eq!(resolve_unique_title(&index, "Dune"), None);
        assert_eq!(resolve_unique_title(&index, "Alien"), None);
    }
}
