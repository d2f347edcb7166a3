use anyhow::{Context, Result};
use clap::Parser;
use eatfeed::{Config, Feed, HttpFetcher, Listener, Registry};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{Instant, Interval};

/// Get the config directory path (~/.config/eatfeed/)
fn get_config_dir(home: &std::path::Path) -> PathBuf {
    home.join(".config").join("eatfeed")
}

#[derive(Parser, Debug)]
#[command(name = "eatfeed", about = "RSS/Atom feed aggregator")]
struct Args {
    /// Configuration file (default: ~/.config/eatfeed/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Refresh every feed once, print a summary and exit
    #[arg(long)]
    once: bool,

    /// Subscribe to a feed before refreshing
    #[arg(long, value_name = "URL")]
    add: Option<String>,
}

/// Reports refresh activity through `tracing`.
struct LogListener;

impl Listener for LogListener {
    fn feed_loaded(&mut self, feed: &Feed) {
        match feed.error_message() {
            Some(error) => tracing::warn!(feed = %feed.title(), error = %error, "Feed failed"),
            None => tracing::info!(
                feed = %feed.title(),
                items = feed.items().len(),
                unread = feed.unread_count(),
                "Feed refreshed"
            ),
        }
    }

    fn loading_progress(&mut self, fraction: f32) {
        tracing::debug!(progress = %format!("{:.0}%", fraction * 100.0), "Refreshing");
    }
}

fn print_summary(registry: &Registry) {
    for feed in registry.feeds() {
        match feed.error_message() {
            Some(error) => println!("{}  [error: {}]", feed.title(), error),
            None => println!(
                "{}  ({} unread / {})",
                feed.title(),
                feed.unread_count(),
                feed.items().len()
            ),
        }
    }
    println!("{} unread in {} feeds", registry.unread_total(), registry.len());
}

/// Next tick of the refresh timer, or never when it is disabled.
async fn tick(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let home = PathBuf::from(std::env::var("HOME").context("HOME environment variable not set")?);
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| get_config_dir(&home).join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config '{}'", config_path.display()))?;

    let client = reqwest::Client::builder()
        .user_agent(config.user_agent.as_str())
        .build()
        .context("Failed to build HTTP client")?;
    let fetcher = Arc::new(HttpFetcher::new(client, config.max_response_bytes));

    let mut registry = Registry::new(fetcher, config.refresh_options());
    registry.add_listener(Box::new(LogListener));

    let subscriptions = config.subscriptions_path(&home);
    registry.load(&subscriptions);

    if let Some(url) = &args.add {
        let id = registry.add(url, "", None);
        tracing::info!(feed = %id, url = %url, "Subscribed");
    }

    registry.refresh_all();

    if args.once {
        registry.wait_idle().await;
        print_summary(&registry);
        registry.save(&subscriptions);
        return Ok(());
    }

    let mut timer = config
        .refresh_interval()
        .map(|period| tokio::time::interval_at(Instant::now() + period, period));
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            Some(completion) = registry.next_completion() => {
                registry.complete(completion);
            }
            _ = tick(&mut timer) => {
                // Save first so a crash mid-refresh loses nothing.
                registry.save(&subscriptions);
                registry.refresh_all();
            }
            result = &mut shutdown => {
                if let Err(e) = result {
                    tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                break;
            }
        }
    }

    registry.save(&subscriptions);
    Ok(())
}
