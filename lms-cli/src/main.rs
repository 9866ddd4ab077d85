//! LMS Cache CLI
//!
//! Command-line interface for the LMS course-enrollment cache.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lms_cache::{CacheConfig, RefreshOrchestrator};
use lms_client::LmsClient;
use lms_core::types::{CourseRecord, LmsUser};
use lms_core::CourseStore;
use lms_store::FileCourseStore;

/// Default snapshot file for the course cache.
const DEFAULT_STORE_PATH: &str = "lms-courses.cache";

/// LMS Cache - stale-while-revalidate cache for LMS course enrollments
#[derive(Parser)]
#[command(name = "lms-cache")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Cache snapshot file
    #[arg(long, global = true, env = "LMS_CACHE_FILE", default_value = DEFAULT_STORE_PATH)]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List a user's courses, refreshing the cache as needed
    Courses {
        /// Application user id (owner of the cached rows)
        user_id: String,
        /// Numeric user id on the LMS
        #[arg(long, env = "LMS_USER_ID")]
        lms_user_id: u64,
        /// LMS base URL
        #[arg(long, env = "LMS_BASE_URL")]
        base_url: Option<String>,
        /// LMS web-service token
        #[arg(long, env = "LMS_TOKEN", hide_env_values = true)]
        token: Option<String>,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
        /// Seconds to let a background refresh finish before exiting
        #[arg(long, default_value = "20")]
        grace: u64,
    },

    /// Drop every cached cohort of a user
    Invalidate {
        /// Application user id
        user_id: String,
    },

    /// Show what the cache file holds
    Stats,

    /// Fetch the public site configuration of an LMS
    SiteInfo {
        /// LMS base URL
        #[arg(long, env = "LMS_BASE_URL")]
        base_url: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "lms_cache=debug,lms_client=debug,lms_store=debug,info"
    } else {
        "lms_cache=info,warn"
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    match cli.command {
        Commands::Courses {
            user_id,
            lms_user_id,
            base_url,
            token,
            json,
            grace,
        } => {
            let mut user = LmsUser::new(user_id, lms_user_id);
            if let Some(url) = base_url {
                user = user.with_base_url(url);
            }
            if let Some(token) = token {
                user = user.with_token(token);
            }
            cmd_courses(&cli.store, &user, json, Duration::from_secs(grace)).await
        }
        Commands::Invalidate { user_id } => cmd_invalidate(&cli.store, &user_id).await,
        Commands::Stats => cmd_stats(&cli.store).await,
        Commands::SiteInfo { base_url } => cmd_site_info(&base_url).await,
    }
}

async fn open_store(path: &Path) -> Result<Arc<FileCourseStore>> {
    let store = FileCourseStore::open(path)
        .await
        .with_context(|| format!("Failed to open cache file {}", path.display()))?;
    Ok(Arc::new(store))
}

/// List a user's courses
async fn cmd_courses(store_path: &Path, user: &LmsUser, json: bool, grace: Duration) -> Result<()> {
    let config = CacheConfig::from_env().context("Invalid cache configuration")?;
    let store = open_store(store_path).await?;
    let orchestrator = RefreshOrchestrator::from_config(&config, store)
        .context("Failed to build LMS client")?;

    let courses = orchestrator.get_user_courses(user).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&courses)?);
    } else {
        print_courses(&user.id, &courses);
    }

    // The process is about to exit; give a stale-triggered refresh a chance to land.
    let aborted = orchestrator.shutdown(grace).await;
    if aborted > 0 {
        eprintln!("{} background refresh abandoned", "⚠️ ".yellow());
    }

    let stats = orchestrator.stats();
    tracing::debug!(?stats, "Orchestrator counters");
    Ok(())
}

fn print_courses(user_id: &str, courses: &[CourseRecord]) {
    if courses.is_empty() {
        println!("{} {}", "No courses for".yellow(), user_id);
        return;
    }

    println!("{} {} ({})", "📚 Courses for".cyan().bold(), user_id, courses.len());
    for record in courses {
        let teacher = if record.teacher.is_empty() {
            String::new()
        } else {
            format!(" ({})", record.teacher)
        };
        println!("   {} {}{}", format!("[{}]", record.course_id).dimmed(), record.name, teacher.dimmed());
    }
    if let Some(cached_at) = courses.iter().map(|r| r.cached_at).min() {
        println!("\n   {} {}", "Cached at:".dimmed(), cached_at.to_rfc3339());
    }
}

/// Drop a user's cached courses
async fn cmd_invalidate(store_path: &Path, user_id: &str) -> Result<()> {
    let store = open_store(store_path).await?;
    let removed = store
        .remove_owner(user_id)
        .await
        .context("Failed to update cache file")?;

    if removed == 0 {
        println!("{} {}", "Nothing cached for".yellow(), user_id);
    } else {
        println!("{} {} cohort(s) of {}", "✅ Removed".green(), removed, user_id);
    }
    Ok(())
}

/// Summarize the cache file
async fn cmd_stats(store_path: &Path) -> Result<()> {
    let store = open_store(store_path).await?;
    let stats = store.stats();

    println!("{} {}", "📊 Cache file:".cyan().bold(), store.path().display());
    println!("   {} {}", "Cohorts:".dimmed(), stats.cohorts);
    println!("   {} {}", "Courses:".dimmed(), stats.records);
    match stats.oldest_cached_at {
        Some(oldest) => println!("   {} {}", "Oldest:".dimmed(), oldest.to_rfc3339()),
        None => println!("   {} -", "Oldest:".dimmed()),
    }
    Ok(())
}

/// Fetch public site configuration
async fn cmd_site_info(base_url: &str) -> Result<()> {
    let config = CacheConfig::from_env().context("Invalid cache configuration")?;
    let client = LmsClient::with_config(config.client).context("Failed to build LMS client")?;

    let info = client
        .fetch_site_info(base_url)
        .await
        .context("Failed to fetch site info")?;

    if !info.is_object() {
        bail!("LMS returned unexpected site info: {}", info);
    }

    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_courses() {
        let cli = Cli::try_parse_from([
            "lms-cache",
            "--store",
            "/tmp/courses.cache",
            "courses",
            "alice",
            "--lms-user-id",
            "42",
            "--base-url",
            "https://moodle.example.org",
            "--token",
            "secret",
        ])
        .unwrap();

        assert_eq!(cli.store, PathBuf::from("/tmp/courses.cache"));
        match cli.command {
            Commands::Courses {
                user_id,
                lms_user_id,
                base_url,
                grace,
                ..
            } => {
                assert_eq!(user_id, "alice");
                assert_eq!(lms_user_id, 42);
                assert_eq!(base_url.as_deref(), Some("https://moodle.example.org"));
                assert_eq!(grace, 20);
            }
            _ => panic!("expected courses command"),
        }
    }
}
