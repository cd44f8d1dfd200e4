use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::Instrument;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursefetch::domain::MeetingTimePolicy;
use coursefetch::output::{write_course_search_csv, write_grades_csv, write_ratings_csv};
use coursefetch::{
    BatchPlan, BatchStats, CourseSearchConfig, GradesConfig, RatingsConfig, ReqwestHttpClient,
    RetryPolicy, scrape_courses, scrape_grades, scrape_ratings,
};

#[derive(Parser, Debug)]
#[command(name = "coursefetch")]
#[command(about = "Scrape course, section, grade and rating data into CSV (and optionally PostgreSQL)")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    common: CommonArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Directory the CSV files are written to
    #[arg(long, global = true, default_value = ".", env = "COURSEFETCH_OUT_DIR")]
    out_dir: PathBuf,

    /// Prefix prepended to every CSV file name
    #[arg(long, global = true, default_value = "")]
    prefix: String,

    /// Total attempts per request, including the first
    #[arg(long, global = true)]
    max_attempts: Option<u32>,

    /// Delay before the first retry in milliseconds
    #[arg(long, global = true)]
    base_delay_ms: Option<u64>,

    /// Maximum number of concurrent fetches per batch
    #[arg(long, global = true)]
    batch_size: Option<usize>,

    /// Delay between task starts within a batch in milliseconds
    #[arg(long, global = true)]
    stagger_ms: Option<u64>,

    /// Pause between batches in milliseconds
    #[arg(long, global = true)]
    batch_delay_ms: Option<u64>,

    /// Per-attempt request timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    /// Also load the records into this PostgreSQL database
    #[cfg(feature = "postgres")]
    #[arg(long, global = true, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Courses, sections and meetings from the enrollment search API
    Courses {
        #[arg(long, env = "COURSEFETCH_BASE_URL")]
        base_url: Option<String>,

        /// Term code, e.g. 1262
        #[arg(long)]
        term: Option<String>,

        /// Only fetch sections for the first N courses
        #[arg(long)]
        limit: Option<usize>,

        /// Subtract this many hours from source meeting times before
        /// formatting them (e.g. 6 turns 09:30 into 03:30)
        #[arg(long, allow_negative_numbers = true)]
        shift_back_hours: Option<i64>,
    },
    /// Grade distributions from the grades API
    Grades {
        #[arg(long, env = "GRADES_BASE_URL")]
        base_url: Option<String>,

        #[arg(long, env = "GRADES_API_TOKEN", hide_env_values = true)]
        api_token: Option<String>,

        /// Courses per listing page
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// Professor ratings from the ratings GraphQL service
    Ratings {
        #[arg(long, env = "RATINGS_ENDPOINT")]
        endpoint: Option<String>,

        /// School node id to search within
        #[arg(long)]
        school_id: Option<String>,

        /// Teachers per page
        #[arg(long)]
        page_size: Option<u32>,
    },
}

impl Commands {
    fn name(&self) -> &'static str {
        match self {
            Commands::Courses { .. } => "courses",
            Commands::Grades { .. } => "grades",
            Commands::Ratings { .. } => "ratings",
        }
    }
}

impl CommonArgs {
    fn retry(&self, mut policy: RetryPolicy) -> RetryPolicy {
        if let Some(max_attempts) = self.max_attempts {
            policy.max_attempts = max_attempts;
        }
        if let Some(base_delay_ms) = self.base_delay_ms {
            policy.base_delay_ms = base_delay_ms;
        }
        policy
    }

    fn batch(&self, mut plan: BatchPlan) -> BatchPlan {
        if let Some(batch_size) = self.batch_size {
            plan.batch_size = batch_size;
        }
        if let Some(stagger_ms) = self.stagger_ms {
            plan.intra_batch_stagger_ms = stagger_ms;
        }
        if let Some(batch_delay_ms) = self.batch_delay_ms {
            plan.inter_batch_delay_ms = batch_delay_ms;
        }
        plan
    }

    fn timeout(&self, default: u64) -> u64 {
        self.timeout_ms.unwrap_or(default)
    }

    #[cfg(feature = "postgres")]
    async fn loader(&self) -> anyhow::Result<Option<coursefetch::PostgresLoader>> {
        let Some(url) = self.database_url.as_deref() else {
            return Ok(None);
        };
        let loader = coursefetch::PostgresLoader::connect(url)
            .await
            .context("failed to connect to PostgreSQL")?;
        Ok(Some(loader))
    }
}

fn print_stats(label: &str, stats: &BatchStats) {
    println!(
        "{label}: {} succeeded, {} failed ({} total)",
        stats.succeeded,
        stats.failed,
        stats.total()
    );
}

fn print_paths<'a>(paths: impl IntoIterator<Item = &'a PathBuf>) {
    for path in paths {
        println!("wrote {}", path.display());
    }
}

async fn run(cli: Cli, client: ReqwestHttpClient) -> anyhow::Result<()> {
    let common = &cli.common;

    match cli.command {
        Commands::Courses {
            base_url,
            term,
            limit,
            shift_back_hours,
        } => {
            let defaults = CourseSearchConfig::default();
            let config = CourseSearchConfig {
                base_url: base_url.unwrap_or(defaults.base_url),
                term_code: term.unwrap_or(defaults.term_code),
                course_limit: limit,
                retry: common.retry(defaults.retry),
                batch: common.batch(defaults.batch),
                timeout_ms: common.timeout(defaults.timeout_ms),
                time_policy: shift_back_hours
                    .map(|hours| MeetingTimePolicy::FixedOffset { hours })
                    .unwrap_or(defaults.time_policy),
                ..defaults
            };

            let output = scrape_courses(&client, &config)
                .await
                .context("course search failed")?;
            println!(
                "{} courses, {} sections, {} meetings",
                output.courses.len(),
                output.sections.len(),
                output.meetings.len()
            );
            print_stats("enrollment packages", &output.stats);

            let paths = write_course_search_csv(&common.out_dir, &common.prefix, &output)
                .context("failed to write course search CSV files")?;
            print_paths(&paths);

            #[cfg(feature = "postgres")]
            if let Some(loader) = common.loader().await? {
                for load in loader
                    .load_course_search(&output)
                    .await
                    .context("failed to load course search tables")?
                {
                    println!("loaded {} rows into {}", load.rows, load.table);
                }
            }
        }
        Commands::Grades {
            base_url,
            api_token,
            per_page,
        } => {
            let defaults = GradesConfig::default();
            let config = GradesConfig {
                base_url: base_url.unwrap_or(defaults.base_url),
                api_token: api_token.or(defaults.api_token),
                per_page: per_page.unwrap_or(defaults.per_page),
                retry: common.retry(defaults.retry),
                batch: common.batch(defaults.batch),
                timeout_ms: common.timeout(defaults.timeout_ms),
            };

            let output = scrape_grades(&client, &config)
                .await
                .context("grades scrape failed")?;
            println!(
                "{} courses listed, {} grade rows",
                output.courses_listed,
                output.rows.len()
            );
            print_stats("grade distributions", &output.stats);

            let path = write_grades_csv(&common.out_dir, &common.prefix, &output)
                .context("failed to write grades CSV")?;
            print_paths([&path]);

            #[cfg(feature = "postgres")]
            if let Some(loader) = common.loader().await? {
                let load = loader
                    .load_grades(&output)
                    .await
                    .context("failed to load grades table")?;
                println!("loaded {} rows into {}", load.rows, load.table);
            }
        }
        Commands::Ratings {
            endpoint,
            school_id,
            page_size,
        } => {
            let defaults = RatingsConfig::default();
            let config = RatingsConfig {
                endpoint: endpoint.unwrap_or(defaults.endpoint),
                school_id: school_id.unwrap_or(defaults.school_id),
                page_size: page_size.unwrap_or(defaults.page_size),
                retry: common.retry(defaults.retry),
                timeout_ms: common.timeout(defaults.timeout_ms),
                ..defaults
            };

            let output = scrape_ratings(&client, &config)
                .await
                .context("ratings scrape failed")?;
            println!(
                "{} professors over {} pages",
                output.professors.len(),
                output.pages
            );

            let path = write_ratings_csv(&common.out_dir, &common.prefix, &output)
                .context("failed to write ratings CSV")?;
            print_paths([&path]);

            #[cfg(feature = "postgres")]
            if let Some(loader) = common.loader().await? {
                let load = loader
                    .load_ratings(&output)
                    .await
                    .context("failed to load professors table")?;
                println!("loaded {} rows into {}", load.rows, load.table);
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coursefetch=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    let client = reqwest::Client::builder()
        .user_agent(concat!("coursefetch/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;
    let client = ReqwestHttpClient::with_client(client);

    let run_id = uuid::Uuid::new_v4();
    let span = tracing::info_span!("run", %run_id, command = cli.command.name());
    run(cli, client).instrument(span).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_back_hours_flag() {
        let cli = Cli::try_parse_from(["coursefetch", "courses", "--shift-back-hours", "6"]).unwrap();
        match cli.command {
            Commands::Courses { shift_back_hours, .. } => assert_eq!(shift_back_hours, Some(6)),
            other => panic!("expected courses, got {other:?}"),
        }

        let cli = Cli::try_parse_from(["coursefetch", "courses", "--shift-back-hours", "-2"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Courses { shift_back_hours: Some(-2), .. }
        ));

        assert!(Cli::try_parse_from(["coursefetch", "courses", "--utc-offset-hours", "6"]).is_err());
    }
}
