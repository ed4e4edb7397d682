//! Relation declarations for the star schema.
//!
//! Staging relations are transient and reloaded each run. Dimension, bridge
//! and fact relations only ever grow.

use crate::store::Store;
use crate::Result;
use tracing::info;

pub const STG_REVENUES: &str = "stg_revenues";
pub const STG_MOVIES: &str = "stg_movies";
pub const DIM_DATE: &str = "dim_date";
pub const DIM_MOVIES: &str = "dim_movies";
pub const FACT_REVENUE: &str = "fact_revenue";
pub const ETL_RUNS: &str = "etl_runs";

/// Flattened OMDb fields the movie staging relation declares.
///
/// Flattened keys outside this set are dropped at staging time.
pub const STAGING_MOVIE_COLUMNS: &[&str] = &[
    "Title",
    "Year",
    "Rated",
    "Released",
    "Runtime",
    "Genre",
    "Director",
    "Writer",
    "Actors",
    "Plot",
    "Language",
    "Country",
    "Awards",
    "Poster",
    "Ratings_0_Source",
    "Ratings_0_Value",
    "Ratings_1_Source",
    "Ratings_1_Value",
    "Ratings_2_Source",
    "Ratings_2_Value",
    "Metascore",
    "imdbRating",
    "imdbVotes",
    "imdbID",
    "Type",
    "DVD",
    "BoxOffice",
    "Production",
    "Website",
    "Response",
];

/// A single-name dimension: `(id INTEGER PK, name TEXT UNIQUE)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameDimension {
    pub table: &'static str,
    pub id_column: &'static str,
    pub name_column: &'static str,
}

pub const DIM_DISTRIBUTION: NameDimension = NameDimension {
    table: "dim_distribution",
    id_column: "distribution_id",
    name_column: "name",
};

pub const DIM_GENRE: NameDimension = NameDimension {
    table: "Dim_Genre",
    id_column: "genre_id",
    name_column: "genre_name",
};

pub const DIM_DIRECTOR: NameDimension = NameDimension {
    table: "Dim_Director",
    id_column: "director_id",
    name_column: "director_name",
};

pub const DIM_WRITER: NameDimension = NameDimension {
    table: "Dim_Writer",
    id_column: "writer_id",
    name_column: "writer_name",
};

pub const DIM_ACTOR: NameDimension = NameDimension {
    table: "Dim_Actor",
    id_column: "actor_id",
    name_column: "actor_name",
};

/// Multi-valued movie attribute with its entity dimension and bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Attribute {
    Genre,
    Director,
    Writer,
    Actor,
}

impl Attribute {
    pub const ALL: [Attribute; 4] = [
        Attribute::Genre,
        Attribute::Director,
        Attribute::Writer,
        Attribute::Actor,
    ];

    /// Column in `stg_movies` holding the delimited list
    pub fn staging_column(self) -> &'static str {
        match self {
            Attribute::Genre => "Genre",
            Attribute::Director => "Director",
            Attribute::Writer => "Writer",
            Attribute::Actor => "Actors",
        }
    }

    pub fn dimension(self) -> NameDimension {
        match self {
            Attribute::Genre => DIM_GENRE,
            Attribute::Director => DIM_DIRECTOR,
            Attribute::Writer => DIM_WRITER,
            Attribute::Actor => DIM_ACTOR,
        }
    }

    pub fn bridge_table(self) -> &'static str {
        match self {
            Attribute::Genre => "Bridge_Movie_Genre",
            Attribute::Director => "Bridge_Movie_Director",
            Attribute::Writer => "Bridge_Movie_Writer",
            Attribute::Actor => "Bridge_Movie_Actor",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Attribute::Genre => "genre",
            Attribute::Director => "director",
            Attribute::Writer => "writer",
            Attribute::Actor => "actor",
        }
    }
}

fn staging_ddl() -> String {
    let movie_columns = STAGING_MOVIE_COLUMNS
        .iter()
        .map(|c| format!("\"{}\" TEXT", c))
        .collect::<Vec<_>>()
        .join(",\n            ");

    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {STG_REVENUES} (
            id TEXT,
            date TEXT,
            title TEXT,
            revenue INTEGER,
            theaters INTEGER,
            distributor TEXT
        );
        CREATE TABLE IF NOT EXISTS {STG_MOVIES} (
            {movie_columns}
        );
        "#
    )
}

fn name_dimension_ddl(dim: NameDimension) -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {table} (
            {id} INTEGER PRIMARY KEY,
            {name} TEXT NOT NULL UNIQUE
        );
        "#,
        table = dim.table,
        id = dim.id_column,
        name = dim.name_column,
    )
}

fn bridge_ddl(attribute: Attribute) -> String {
    let dim = attribute.dimension();
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {bridge} (
            movie_id INTEGER NOT NULL,
            {id} INTEGER NOT NULL,
            PRIMARY KEY (movie_id, {id}),
            FOREIGN KEY (movie_id) REFERENCES {DIM_MOVIES}(movie_id),
            FOREIGN KEY ({id}) REFERENCES {table}({id})
        );
        "#,
        bridge = attribute.bridge_table(),
        id = dim.id_column,
        table = dim.table,
    )
}

fn dimension_ddl() -> String {
    let mut sql = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {DIM_DATE} (
            date_id INTEGER PRIMARY KEY,
            full_date TEXT NOT NULL,
            year INTEGER NOT NULL,
            month INTEGER NOT NULL,
            day INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS {DIM_MOVIES} (
            movie_id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            year TEXT,
            rated TEXT,
            released TEXT,
            runtime TEXT,
            UNIQUE (title, year)
        );
        "#
    );

    sql.push_str(&name_dimension_ddl(DIM_DISTRIBUTION));
    for attribute in Attribute::ALL {
        sql.push_str(&name_dimension_ddl(attribute.dimension()));
    }
    for attribute in Attribute::ALL {
        sql.push_str(&bridge_ddl(attribute));
    }
    sql
}

fn fact_ddl() -> String {
    format!(
        r#"
        CREATE TABLE IF NOT EXISTS {FACT_REVENUE} (
            revenue_id TEXT PRIMARY KEY,
            movie_id INTEGER NOT NULL,
            date_id INTEGER NOT NULL,
            distribution_id INTEGER NOT NULL,
            revenue INTEGER NOT NULL,
            theaters INTEGER,
            FOREIGN KEY (movie_id) REFERENCES {DIM_MOVIES}(movie_id),
            FOREIGN KEY (date_id) REFERENCES {DIM_DATE}(date_id),
            FOREIGN KEY (distribution_id) REFERENCES {dist}({dist_id})
        );
        CREATE TABLE IF NOT EXISTS {ETL_RUNS} (
            run_id TEXT PRIMARY KEY,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL,
            detail TEXT NOT NULL DEFAULT '{{}}'
        );
        "#,
        dist = DIM_DISTRIBUTION.table,
        dist_id = DIM_DISTRIBUTION.id_column,
    )
}

/// Create every relation if it does not exist yet. Safe to call on each run.
pub async fn create_relations(store: &Store) -> Result<()> {
    let mut tx = store.begin().await?;
    for (label, ddl) in [
        ("staging", staging_ddl()),
        ("dimension", dimension_ddl()),
        ("fact", fact_ddl()),
    ] {
        sqlx::raw_sql(&ddl).execute(&mut *tx).await?;
        info!("Created {} relations", label);
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_relations_is_repeatable() {
        let store = Store::open_in_memory().await.unwrap();
        create_relations(&store).await.unwrap();
        create_relations(&store).await.unwrap();

        for table in [STG_REVENUES, STG_MOVIES, DIM_DATE, DIM_MOVIES, FACT_REVENUE, ETL_RUNS] {
            assert_eq!(store.count(table).await.unwrap(), 0, "{}", table);
        }
        for attribute in Attribute::ALL {
            assert_eq!(store.count(attribute.dimension().table).await.unwrap(), 0);
            assert_eq!(store.count(attribute.bridge_table()).await.unwrap(), 0);
        }
    }

    #[tokio::test]
    async fn test_name_dimension_rejects_duplicate_name() {
        let store = Store::open_in_memory().await.unwrap();
        create_relations(&store).await.unwrap();

        sqlx::query("INSERT INTO Dim_Genre (genre_id, genre_name) VALUES (1, 'Drama')")
            .execute(store.pool())
            .await
            .unwrap();
        let dup = sqlx::query("INSERT INTO Dim_Genre (genre_id, genre_name) VALUES (2, 'Drama')")
            .execute(store.pool())
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_bridge_enforces_foreign_keys() {
        let store = Store::open_in_memory().await.unwrap();
        create_relations(&store).await.unwrap();

        let orphan = sqlx::query("INSERT INTO Bridge_Movie_Genre (movie_id, genre_id) VALUES (1, 1)")
            .execute(store.pool())
            .await;
        assert!(orphan.is_err());
    }

    #[test]
    fn test_attribute_mapping() {
        assert_eq!(Attribute::Actor.staging_column(), "Actors");
        assert_eq!(Attribute::Genre.dimension(), DIM_GENRE);
        assert_eq!(Attribute::Writer.bridge_table(), "Bridge_Movie_Writer");
    }
}
