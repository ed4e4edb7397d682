//! Bridge relations between movies and their multi-valued attributes.

use crate::dimension::{movie_ids_by_title, name_ids, resolve_unique_title};
use crate::normalize::{match_key, split_multi};
use crate::schema::{Attribute, STG_MOVIES};
use crate::store::Store;
use crate::{LoadCounts, Result};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info};

/// Fill the bridge for `attribute` with the (movie, entity) pairs not yet present.
///
/// A staged title matching zero or several movies contributes nothing, and
/// neither does a token with no entity row. Both are counted as unresolved.
pub async fn load_bridge(store: &Store, attribute: Attribute) -> Result<LoadCounts> {
    let dim = attribute.dimension();
    let bridge = attribute.bridge_table();
    let mut tx = store.begin().await?;

    let staged: Vec<(Option<String>, Option<String>)> = sqlx::query_as(&format!(
        "SELECT \"Title\", \"{}\" FROM {}",
        attribute.staging_column(),
        STG_MOVIES
    ))
    .fetch_all(&mut *tx)
    .await?;

    let movies = movie_ids_by_title(&mut *tx).await?;
    let entities = name_ids(&mut *tx, dim).await?;

    let mut counts = LoadCounts::default();
    let mut pairs: BTreeSet<(i64, i64)> = BTreeSet::new();

    for (title, raw) in staged {
        let (Some(title), Some(raw)) = (title, raw) else {
            continue;
        };
        let tokens = split_multi(&raw);
        if tokens.is_empty() {
            continue;
        }
        let Some(movie_id) = resolve_unique_title(&movies, &title) else {
            debug!("{}: no unique movie for title '{}'", bridge, title);
            counts.unresolved += tokens.len() as u64;
            continue;
        };
        for token in tokens {
            match match_key(&token).and_then(|key| entities.get(&key)) {
                Some(&entity_id) => {
                    pairs.insert((movie_id, entity_id));
                }
                None => {
                    debug!("{}: no {} row for '{}'", bridge, attribute.label(), token);
                    counts.unresolved += 1;
                }
            }
        }
    }

    let existing_rows: Vec<(i64, i64)> = sqlx::query_as(&format!(
        "SELECT movie_id, {} FROM {}",
        dim.id_column, bridge
    ))
    .fetch_all(&mut *tx)
    .await?;
    let existing: HashSet<(i64, i64)> = existing_rows.into_iter().collect();

    let insert = format!(
        "INSERT INTO {} (movie_id, {}) VALUES (?, ?)",
        bridge, dim.id_column
    );
    for (movie_id, entity_id) in pairs {
        if existing.contains(&(movie_id, entity_id)) {
            counts.skipped += 1;
            continue;
        }
        sqlx::query(&insert)
            .bind(movie_id)
            .bind(entity_id)
            .execute(&mut *tx)
            .await?;
        counts.inserted += 1;
    }

    tx.commit().await?;
    info!(
        "Loaded {}: {} new, {} already present, {} unresolved",
        bridge, counts.inserted, counts.skipped, counts.unresolved
    );
    Ok(counts)
}
