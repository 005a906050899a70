use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use secrecy::SecretString;
use serde::Serialize;
use trivia::auth::{AuthError, Authenticator};
use trivia::db::queries::categories::{create_category, get_all_categories};
use trivia::db::queries::questions::{delete_question, get_question};
use trivia::db::{establish_connection, run_migrations};
use trivia::quiz::{grade, sample_questions, QuizFilters};
use trivia::settings::{SessionBackend, Settings};
use trivia::telemetry::{init_tracing, render_metrics};
use trivia::transfer::{export_questions, import_file};

#[derive(Parser)]
#[clap(author, version, about, long_about = None)]
struct Cli {
    /// Database path, overrides DB_PATH
    #[clap(long)]
    db_path: Option<String>,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an admin account, reading the password from stdin
    AddUser { username: String },
    /// List categories
    Categories,
    /// Create a category
    AddCategory { name: String },
    /// Import questions from a CSV file
    Import { path: PathBuf },
    /// Export every question to a CSV file
    Export { path: PathBuf },
    /// Draw a random quiz and print it as JSON
    Quiz {
        #[clap(long, default_value_t = QuizFilters::DEFAULT_COUNT)]
        count: u32,
        /// Category id, 0 for any
        #[clap(long, default_value_t = 0)]
        category: i64,
        /// easy, medium or hard; empty for any
        #[clap(long, default_value = "")]
        difficulty: String,
    },
    /// Print one question with its answers as JSON
    Show { id: i64 },
    /// Delete a question with its answers
    Delete { id: i64 },
    /// Check an answer
    Grade { question: i64, answer: i64 },
    /// Log in, reading the password from stdin, and print the session
    Login { username: String },
    /// Print the account a session token belongs to
    Whoami { token: String },
    /// End a session
    Logout { token: String },
    /// Drop expired sessions from the configured session backend
    PruneSessions,
    /// Print process metrics in the Prometheus text format
    Metrics,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = Settings::load().context("Cannot load settings")?;
    if let Some(db_path) = cli.db_path {
        settings.db_path = db_path;
    }

    let pool = establish_connection(&settings.db_path, settings.max_connections)
        .await
        .context("Cannot connect to DB")?;
    tracing::info!("Running db migrations...");
    run_migrations(&pool).await.context("Cannot run migrations")?;
    if settings.session_backend == SessionBackend::Memory {
        tracing::warn!("Memory session backend: sessions end with this process");
    }
    let auth = Authenticator::from_settings(pool.clone(), &settings);

    match cli.command {
        Commands::AddUser { username } => {
            let password = read_password()?;
            let user = auth.credentials().provision(&username, &password).await?;
            print_json(&user)?;
        }
        Commands::Categories => print_json(&get_all_categories(&pool).await?)?,
        Commands::AddCategory { name } => print_json(&create_category(&pool, &name).await?)?,
        Commands::Import { path } => {
            let summary = import_file(&pool, &path)
                .await
                .with_context(|| format!("Cannot import {}", path.display()))?;
            println!("imported {}, skipped {}", summary.imported, summary.skipped);
        }
        Commands::Export { path } => {
            let count = export_questions(&pool, &path)
                .await
                .with_context(|| format!("Cannot export to {}", path.display()))?;
            println!("exported {count}");
        }
        Commands::Quiz {
            count,
            category,
            difficulty,
        } => {
            let filters = QuizFilters::from_raw(count, category, &difficulty)?;
            print_json(&sample_questions(&pool, &filters).await?)?;
        }
        Commands::Show { id } => match get_question(&pool, id).await? {
            Some(question) => print_json(&question)?,
            None => bail!("question {id} not found"),
        },
        Commands::Delete { id } => {
            if !delete_question(&pool, id).await? {
                bail!("question {id} not found");
            }
        }
        Commands::Grade { question, answer } => match grade(&pool, question, answer).await? {
            Some(true) => println!("correct"),
            Some(false) => println!("incorrect"),
            None => bail!("question {question} not found"),
        },
        Commands::Login { username } => {
            let password = read_password()?;
            match auth.login(&username, &password).await {
                Ok(issued) => print_json(&issued)?,
                Err(AuthError::InvalidCredentials) => bail!("invalid username or password"),
                Err(e) => return Err(e.into()),
            }
        }
        Commands::Whoami { token } => match auth.resolve_session(&token).await? {
            Some(user) => print_json(&user)?,
            None => bail!("session is invalid or expired"),
        },
        Commands::Logout { token } => auth.logout(&token).await?,
        Commands::PruneSessions => {
            let pruned = auth.sessions().prune_expired().await?;
            println!("pruned {pruned}");
        }
        Commands::Metrics => print!("{}", render_metrics()),
    }
    Ok(())
}

fn read_password() -> anyhow::Result<SecretString> {
    let mut line = String::new();
    std::io::stdin()
        .lock()
        .read_line(&mut line)
        .context("Cannot read password from stdin")?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("password must not be empty");
    }
    Ok(SecretString::from(password.to_owned()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
