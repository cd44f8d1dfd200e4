//! PostgreSQL loader for normalized records.
//!
//! Each table is replaced wholesale inside its own transaction: existing rows
//! are deleted, then the new rows go in through parameterized multi-row
//! `INSERT` statements of at most [`INSERT_CHUNK_ROWS`] rows each.

use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::query_builder::Separated;
use sqlx::{Postgres, QueryBuilder};

use crate::error::Result;
use crate::sources::{CourseSearchOutput, GradesOutput, RatingsOutput};

/// Rows per `INSERT` statement.
pub const INSERT_CHUNK_ROWS: usize = 500;

/// Embedded migrations creating the output tables.
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Rows written to one table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLoad {
    pub table: &'static str,
    pub rows: u64,
}

type Row<'q, 'args> = Separated<'q, 'args, Postgres, &'static str>;

pub struct PostgresLoader {
    pool: PgPool,
}

impl PostgresLoader {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `database_url` and bring the schema up to date.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .connect(database_url)
            .await?;
        let loader = Self::new(pool);
        loader.migrate().await?;
        Ok(loader)
    }

    pub async fn migrate(&self) -> Result<()> {
        migrator()
            .run(&self.pool)
            .await
            .map_err(sqlx::Error::from)?;
        Ok(())
    }

    /// Replace the contents of `table` with `rows`.
    ///
    /// `bind` pushes one row's values, in `columns` order.
    #[tracing::instrument(skip(self, columns, rows, bind), fields(rows = rows.len()))]
    async fn replace_table<'r, T, F>(
        &self,
        table: &'static str,
        columns: &'static str,
        rows: &'r [T],
        mut bind: F,
    ) -> Result<TableLoad>
    where
        T: Sync,
        F: FnMut(&mut Row<'_, 'r>, &'r T),
    {
        let mut tx = self.pool.begin().await?;

        let delete = format!("DELETE FROM {table}");
        sqlx::query(&delete).execute(&mut *tx).await?;

        let mut inserted = 0u64;
        for chunk in rows.chunks(INSERT_CHUNK_ROWS) {
            let mut builder: QueryBuilder<'r, Postgres> =
                QueryBuilder::new(format!("INSERT INTO {table} ({columns}) "));
            builder.push_values(chunk, |mut row, record| bind(&mut row, record));
            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        tracing::info!(table, rows = inserted, "Replaced table contents");

        Ok(TableLoad {
            table,
            rows: inserted,
        })
    }

    pub async fn load_course_search(&self, output: &CourseSearchOutput) -> Result<Vec<TableLoad>> {
        let courses = self
            .replace_table(
                "courses",
                "course_id, subject_code, course_designation, full_course_designation, title, \
                 description, prerequisites, minimum_credits, maximum_credits, general_education, \
                 ethnic_studies, letters_and_science_credits, social_science, humanities, \
                 biological_science, physical_science, natural_science, literature, level",
                &output.courses,
                |row, c| {
                    row.push_bind(c.course_id.as_deref())
                        .push_bind(c.subject_code.as_deref())
                        .push_bind(c.course_designation.as_deref())
                        .push_bind(c.full_course_designation.as_deref())
                        .push_bind(c.title.as_deref())
                        .push_bind(c.description.as_deref())
                        .push_bind(c.prerequisites.as_deref())
                        .push_bind(c.minimum_credits)
                        .push_bind(c.maximum_credits)
                        .push_bind(c.general_education.as_deref())
                        .push_bind(c.ethnic_studies.as_deref())
                        .push_bind(c.letters_and_science_credits.as_deref())
                        .push_bind(c.social_science.as_deref())
                        .push_bind(c.humanities.as_deref())
                        .push_bind(c.biological_science.as_deref())
                        .push_bind(c.physical_science.as_deref())
                        .push_bind(c.natural_science.as_deref())
                        .push_bind(c.literature.as_deref())
                        .push_bind(c.level.as_deref());
                },
            )
            .await?;

        let sections = self
            .replace_table(
                "sections",
                "section_id, course_id, subject_code, catalog_number, status, available_seats, \
                 waitlist_total, capacity, enrolled, instruction_mode, is_asynchronous",
                &output.sections,
                |row, s| {
                    row.push_bind(s.section_id.as_deref())
                        .push_bind(s.course_id.as_deref())
                        .push_bind(s.subject_code.as_deref())
                        .push_bind(s.catalog_number.as_deref())
                        .push_bind(s.status.as_str())
                        .push_bind(s.available_seats)
                        .push_bind(s.waitlist_total)
                        .push_bind(s.capacity)
                        .push_bind(s.enrolled)
                        .push_bind(s.instruction_mode.as_str())
                        .push_bind(s.is_asynchronous);
                },
            )
            .await?;

        let instructors: Vec<(Option<&str>, &str)> = output
            .sections
            .iter()
            .flat_map(|s| {
                s.instructors
                    .iter()
                    .filter(|name| !name.trim().is_empty())
                    .map(move |name| (s.section_id.as_deref(), name.as_str()))
            })
            .collect();
        let section_instructors = self
            .replace_table(
                "section_instructors",
                "section_id, instructor_name",
                &instructors,
                |row, (section_id, name)| {
                    row.push_bind(*section_id).push_bind(*name);
                },
            )
            .await?;

        let meetings = self
            .replace_table(
                "section_meetings",
                "section_id, meeting_type, meeting_number, meeting_days, start_time, end_time, \
                 building_name, room, location, monday_meeting_start, monday_meeting_end, \
                 tuesday_meeting_start, tuesday_meeting_end, wednesday_meeting_start, \
                 wednesday_meeting_end, thursday_meeting_start, thursday_meeting_end, \
                 friday_meeting_start, friday_meeting_end",
                &output.meetings,
                |row, m| {
                    row.push_bind(m.section_id.as_deref())
                        .push_bind(m.meeting_type.as_deref())
                        .push_bind(m.meeting_number)
                        .push_bind(m.meeting_days.as_deref())
                        .push_bind(m.start_time.as_deref())
                        .push_bind(m.end_time.as_deref())
                        .push_bind(m.building_name.as_deref())
                        .push_bind(m.room.as_deref())
                        .push_bind(m.location.as_deref())
                        .push_bind(m.monday_start)
                        .push_bind(m.monday_end)
                        .push_bind(m.tuesday_start)
                        .push_bind(m.tuesday_end)
                        .push_bind(m.wednesday_start)
                        .push_bind(m.wednesday_end)
                        .push_bind(m.thursday_start)
                        .push_bind(m.thursday_end)
                        .push_bind(m.friday_start)
                        .push_bind(m.friday_end);
                },
            )
            .await?;

        Ok(vec![courses, sections, section_instructors, meetings])
    }

    pub async fn load_grades(&self, output: &GradesOutput) -> Result<TableLoad> {
        self.replace_table(
            "course_grades",
            "course_uuid, course_name, title, cumulative_gpa, most_recent_gpa, \
             median_letter_grade, a_pct, ab_pct, b_pct, bc_pct, c_pct, d_pct, f_pct",
            &output.rows,
            |row, r| {
                let s = &r.summary;
                row.push_bind(s.course_uuid.as_deref())
                    .push_bind(r.course_name.as_str())
                    .push_bind(r.title.as_deref())
                    .push_bind(s.cumulative_gpa)
                    .push_bind(s.most_recent_gpa)
                    .push_bind(s.median_letter_grade.map(|g| g.as_str()))
                    .push_bind(s.a_pct)
                    .push_bind(s.ab_pct)
                    .push_bind(s.b_pct)
                    .push_bind(s.bc_pct)
                    .push_bind(s.c_pct)
                    .push_bind(s.d_pct)
                    .push_bind(s.f_pct);
            },
        )
        .await
    }

    pub async fn load_ratings(&self, output: &RatingsOutput) -> Result<TableLoad> {
        self.replace_table(
            "professors",
            "professor_id, legacy_id, first_name, last_name, department, avg_rating, \
             num_ratings, avg_difficulty, would_take_again_percent",
            &output.professors,
            |row, p| {
                row.push_bind(p.id.as_deref())
                    .push_bind(p.legacy_id.as_deref())
                    .push_bind(p.first_name.as_deref())
                    .push_bind(p.last_name.as_deref())
                    .push_bind(p.department.as_deref())
                    .push_bind(p.avg_rating)
                    .push_bind(p.num_ratings)
                    .push_bind(p.avg_difficulty)
                    .push_bind(p.would_take_again_percent);
            },
        )
        .await
    }
}
