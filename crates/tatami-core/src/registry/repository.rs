//! Competition, category and participant storage.

use sqlx::Row;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use tracing::debug;

use crate::category::{CategoryBin, CategoryRow, Discipline, Sex};
use crate::sheet::ParticipantRecord;
use crate::{Error, Result};

/// A participant row ready for insertion.
#[derive(Debug, Clone, PartialEq)]
pub struct NewParticipant {
    /// Full name.
    pub full_name: String,
    /// Age in years.
    pub age: u32,
    /// Weight in kg; kumite only.
    pub weight: Option<f64>,
    /// Kyu grade.
    pub kyu: u32,
    /// Dan grade.
    pub dan: u32,
    /// Home city.
    pub city: String,
    /// Coach name.
    pub coach: String,
    /// Competition the participant registers for.
    pub competition_id: i64,
    /// Resolved categories, kata first.
    pub category_ids: Vec<i64>,
}

impl NewParticipant {
    /// Combines a classified record with its competition and categories.
    #[must_use]
    pub fn from_record(
        record: &ParticipantRecord,
        competition_id: i64,
        category_ids: Vec<i64>,
    ) -> Self {
        Self {
            full_name: record.full_name.clone(),
            age: record.age,
            weight: record.kumite.map(|k| k.weight),
            kyu: record.kyu,
            dan: record.dan,
            city: record.city.clone(),
            coach: record.coach.clone(),
            competition_id,
            category_ids,
        }
    }
}

/// A stored participant, as read back for a competition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredParticipant {
    /// Full name.
    pub full_name: String,
    /// Resolved categories.
    pub category_ids: Vec<i64>,
}

/// Repository for the registration database.
#[derive(Debug, Clone)]
pub struct RegistryRepository {
    pool: SqlitePool,
}

impl RegistryRepository {
    /// Connects to `url` and creates missing tables.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Create an in-memory repository for testing.
    ///
    /// # Errors
    ///
    /// Returns an error if the database connection fails or schema creation fails.
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;

        let repo = Self { pool };
        repo.initialize().await?;
        Ok(repo)
    }

    /// Initialize database schema.
    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS competition (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                uuid TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                held_on TEXT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS karate_category (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                discipline TEXT NOT NULL,
                sex TEXT NOT NULL,
                age_lower INTEGER NOT NULL,
                age_upper INTEGER,
                kyu_lower INTEGER,
                kyu_upper INTEGER,
                weight_lower INTEGER,
                weight_upper INTEGER,
                group_kata INTEGER NOT NULL DEFAULT 0
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS karate_participant (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                full_name TEXT NOT NULL,
                age INTEGER NOT NULL,
                weight REAL,
                kyu INTEGER NOT NULL DEFAULT 0,
                dan INTEGER NOT NULL DEFAULT 0,
                city TEXT NOT NULL,
                coach TEXT NOT NULL DEFAULT '',
                competition_id INTEGER NOT NULL REFERENCES competition(id),
                category_ids TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Looks up a competition by the UUID printed in its registration sheet.
    ///
    /// # Errors
    ///
    /// Returns an error if the database query fails.
    pub async fn competition_id(&self, uuid: &str) -> Result<Option<i64>> {
        let row = sqlx::query("SELECT id FROM competition WHERE uuid = ?")
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| row.get("id")))
    }

    /// Registers a competition. Returns its id.
    ///
    /// # Errors
    ///
    /// Returns an error if the UUID is already taken or the query fails.
    pub async fn add_competition(
        &self,
        uuid: &str,
        title: &str,
        held_on: chrono::NaiveDate,
    ) -> Result<i64> {
        let result = sqlx::query("INSERT INTO competition (uuid, title, held_on) VALUES (?, ?, ?)")
            .bind(uuid)
            .bind(title)
            .bind(held_on.format("%Y-%m-%d").to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.last_insert_rowid())
    }

    /// Stores a category definition under its own id.
    ///
    /// # Errors
    ///
    /// Returns an error if the id is taken or the query fails.
    pub async fn add_category(&self, category: &CategoryRow) -> Result<()> {
        sqlx::query(
            r"
            INSERT INTO karate_category
                (id, discipline, sex, age_lower, age_upper, kyu_lower, kyu_upper,
                 weight_lower, weight_upper, group_kata)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
        )
        .bind(category.id)
        .bind(category.discipline.as_str())
        .bind(category.sex.as_str())
        .bind(category.age.lower())
        .bind(category.age.upper())
        .bind(category.kyu.map(|k| k.lower()))
        .bind(category.kyu.and_then(|k| k.upper()))
        .bind(category.weight.map(|w| w.lower()))
        .bind(category.weight.and_then(|w| w.upper()))
        .bind(category.group_kata)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Reads every category definition.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row names an unknown
    /// discipline or sex.
    pub async fn categories(&self) -> Result<Vec<CategoryRow>> {
        let rows = sqlx::query(
            r"
            SELECT id, discipline, sex, age_lower, age_upper, kyu_lower, kyu_upper,
                   weight_lower, weight_upper, group_kata
            FROM karate_category
            ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await?;

        let categories = rows.iter().map(row_to_category).collect::<Result<Vec<_>>>()?;
        debug!(count = categories.len(), "Loaded categories");
        Ok(categories)
    }

    /// Inserts one participant. Returns the stored name.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub async fn insert_participant(&self, participant: &NewParticipant) -> Result<String> {
        let category_ids = serde_json::to_string(&participant.category_ids)?;

        let row = sqlx::query(
            r"
            INSERT INTO karate_participant
                (full_name, age, weight, kyu, dan, city, coach, competition_id, category_ids)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            RETURNING full_name
            ",
        )
        .bind(&participant.full_name)
        .bind(i64::from(participant.age))
        .bind(participant.weight)
        .bind(i64::from(participant.kyu))
        .bind(i64::from(participant.dan))
        .bind(&participant.city)
        .bind(&participant.coach)
        .bind(participant.competition_id)
        .bind(category_ids)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("full_name"))
    }

    /// Participants registered for a competition, in insertion order.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or stored category ids are malformed.
    pub async fn participants(&self, competition_id: i64) -> Result<Vec<StoredParticipant>> {
        let rows = sqlx::query(
            r"
            SELECT full_name, category_ids
            FROM karate_participant
            WHERE competition_id = ?
            ORDER BY id ASC
            ",
        )
        .bind(competition_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let ids: String = row.get("category_ids");
                Ok(StoredParticipant {
                    full_name: row.get("full_name"),
                    category_ids: serde_json::from_str(&ids)?,
                })
            })
            .collect()
    }
}

fn row_to_category(row: &SqliteRow) -> Result<CategoryRow> {
    let id: i64 = row.get("id");
    let discipline: String = row.get("discipline");
    let sex: String = row.get("sex");

    let discipline = Discipline::parse(&discipline)
        .ok_or_else(|| Error::InvalidData(format!("category {id}: discipline {discipline:?}")))?;
    let sex = Sex::parse(&sex)
        .ok_or_else(|| Error::InvalidData(format!("category {id}: sex {sex:?}")))?;

    let bin = |lower: Option<i32>, upper: Option<i32>| {
        lower.map(|lower| CategoryBin::with_bounds(lower, upper))
    };

    Ok(CategoryRow {
        id,
        discipline,
        sex,
        age: CategoryBin::with_bounds(row.get("age_lower"), row.get("age_upper")),
        kyu: bin(row.get("kyu_lower"), row.get("kyu_upper")),
        weight: bin(row.get("weight_lower"), row.get("weight_upper")),
        group_kata: row.get("group_kata"),
    })
}
