use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use askalytics_backend::ExecutionMode;
use askalytics_core::{classifier, vocabulary, AnalyticsEngine, MainConfig};
use askalytics_schema::Utterance;

#[derive(Parser)]
#[command(
    name = "askalytics",
    version,
    about = "Ask your web analytics questions in plain language"
)]
struct Cli {
    #[arg(
        long,
        default_value = "~/.askalytics",
        help = "Config root directory (contains config/main.yaml)"
    )]
    config_root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a question and print the synthesized answer
    Ask {
        question: String,
        #[arg(long, help = "Resolve relative dates against this date instead of today")]
        now: Option<NaiveDate>,
        #[arg(long, help = "Force the deterministic simulated backend")]
        simulate: bool,
        #[arg(long, help = "Print the full response object as JSON")]
        json: bool,
        #[arg(long, help = "Override the configured GA4 property id")]
        property: Option<String>,
    },
    /// Show how a question classifies without executing it
    Classify { question: String },
    /// Print the metric and dimension vocabulary tables
    Vocab,
    /// Show routing mode and backend configuration
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config_root)?;

    match cli.command {
        Commands::Ask {
            question,
            now,
            simulate,
            json,
            property,
        } => {
            let engine = AnalyticsEngine::from_config(&config);
            if simulate {
                engine.router().set_mode(ExecutionMode::Simulated);
            }
            let mut ctx = config.query_context(now);
            if property.is_some() {
                ctx.property_id = property;
            }

            let response = engine.answer(&question, &ctx).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&response)?);
            } else {
                println!("{}", response.response);
                println!();
                println!(
                    "  intent: {}  confidence: {:.2}  took: {:.3}s  rows: {}",
                    response.query_type,
                    response.confidence,
                    response.execution_time,
                    response.data.len()
                );
                for suggestion in &response.suggestions {
                    println!("  - {suggestion}");
                }
            }
        }
        Commands::Classify { question } => {
            let result = classifier::classify(&Utterance::new(question));
            println!("{} ({:.2})", result.intent, result.confidence);
        }
        Commands::Vocab => {
            println!("metrics:");
            for synonym in vocabulary::METRIC_SYNONYMS {
                println!("  {} -> {}", synonym.term, synonym.canonical);
            }
            println!("dimensions:");
            for synonym in vocabulary::DIMENSION_SYNONYMS {
                println!("  {} -> {}", synonym.term, synonym.canonical);
            }
        }
        Commands::Status => {
            println!("mode: {:?}", config.routing.mode);
            println!(
                "property: {}",
                config.ga4.property_id.as_deref().unwrap_or("(unset)")
            );
            println!(
                "routing: warehouse past {} days or {}+ dimensions",
                config.routing.wide_range_days, config.routing.high_dimensionality
            );
            println!(
                "retry: {} attempts, {}ms base backoff, {}s deadline",
                config.routing.max_attempts,
                config.routing.base_backoff_ms,
                config.routing.call_timeout_secs
            );
        }
    }

    Ok(())
}

fn load_config(config_root: &Path) -> Result<MainConfig> {
    let root = expand_home(config_root);
    let path = root.join("config").join("main.yaml");
    if path.exists() {
        MainConfig::load(&path)
    } else {
        tracing::info!(
            path = %path.display(),
            "no config found, using defaults with the simulated backend"
        );
        let mut config = MainConfig::default();
        config.routing.mode = ExecutionMode::Simulated;
        Ok(config)
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Some(raw) = path.to_str() else {
        return path.to_path_buf();
    };
    if let Some(rest) = raw.strip_prefix("~") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(format!("{home}{rest}"));
        }
    }
    path.to_path_buf()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expand_home_rewrites_tilde_prefix() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_home(Path::new("~/.askalytics")),
            PathBuf::from("/home/tester/.askalytics")
        );
        assert_eq!(
            expand_home(Path::new("/etc/askalytics")),
            PathBuf::from("/etc/askalytics")
        );
    }
}
