use std::{sync::Arc, time::Duration};

use clap::{Parser, Subcommand};
use confessions::{
    AppResult, ConfessionThread, Confession, FeedSync, SessionStore,
    config::Config,
    location::{Coordinates, NominatimGeocoder, pick_location},
    remote::SupabaseClient,
};
use mockable::DefaultClock;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};
use uuid::Uuid;

const FEED_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Parser)]
#[command(about = "Anonymous confessions from the command line")]
struct Cli {
    #[arg(long, env = "CONFESSIONS_EMAIL")]
    email: String,

    #[arg(long, env = "CONFESSIONS_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an account.
    Signup,
    /// Show the trending and recent feeds.
    Feed,
    /// Post today's confession.
    Post {
        content: String,
        #[arg(long, requires = "longitude", allow_negative_numbers = true)]
        latitude: Option<f64>,
        #[arg(long, requires = "latitude", allow_negative_numbers = true)]
        longitude: Option<f64>,
    },
    /// Like a confession.
    Like { id: Uuid },
    /// Show one confession with its comments.
    Show { id: Uuid },
    /// Comment on a confession.
    Comment { id: Uuid, text: String },
}

#[tokio::main]
async fn main() -> AppResult<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let backend = Arc::new(SupabaseClient::from_config(&config)?);
    let session = SessionStore::new(backend.clone(), backend.clone());

    if let Command::Signup = cli.command {
        session.register(&cli.email, &cli.password).await?;
        match session.identity() {
            Some(identity) => info!("account ready: u/{}", identity.id),
            None => info!("check {} for a confirmation link", cli.email),
        }
        return Ok(());
    }

    let feed = FeedSync::attach(backend.clone(), Arc::new(DefaultClock), &session);
    session.authenticate(&cli.email, &cli.password).await?;

    let mut updates = feed.watch();
    tokio::time::timeout(FEED_TIMEOUT, updates.wait_for(|state| !state.loading))
        .await
        .map_err(|_| "timed out waiting for the feed")?
        .map_err(|_| "feed closed")?;

    match cli.command {
        Command::Signup => {}
        Command::Feed => {
            let state = feed.state();
            if let Some(error) = &state.error {
                return Err(error.as_str().into());
            }
            print_section("Trending", &state.trending);
            print_section("Recent", &state.recent);
            if state.can_post_today {
                println!("You can post a confession today.");
            }
        }
        Command::Post { content, latitude, longitude } => {
            let location = match latitude.zip(longitude) {
                Some((latitude, longitude)) => {
                    let geocoder = NominatimGeocoder::new(&config.nominatim_url, Coordinates { latitude, longitude })?;
                    Some(pick_location(&geocoder).await?)
                }
                None => None,
            };
            feed.create_confession(&content, location).await?;
            println!("Your confession has been posted anonymously");
        }
        Command::Like { id } => {
            feed.like_confession(id).await?;
            if let Some(liked) = feed.state().confessions.iter().find(|c| c.id == id) {
                println!("{} likes", liked.likes);
            }
        }
        Command::Show { id } => {
            let thread = ConfessionThread::new(backend.clone());
            thread.load(id).await?;
            let state = thread.state();
            if let Some(confession) = &state.confession {
                print_confession(confession, false);
            }
            if state.comments.is_empty() {
                println!("  No comments yet. Be the first to comment!");
            }
            for comment in &state.comments {
                println!("  > {} ({})", comment.content, comment.created_at.date());
            }
        }
        Command::Comment { id, text } => {
            let thread = ConfessionThread::new(backend.clone());
            thread.load(id).await?;
            let comment = thread.submit_comment(session.identity().as_ref(), &text).await?;
            println!("commented {}", comment.id);
        }
    }

    Ok(())
}

fn print_section(title: &str, confessions: &[Confession]) {
    println!("== {title}");
    if confessions.is_empty() {
        println!("  nothing here yet");
    }
    for confession in confessions {
        print_confession(confession, true);
    }
}

fn print_confession(confession: &Confession, preview: bool) {
    let content = if preview { confession.preview() } else { confession.content.clone() };
    println!("[{}] {} likes, {}", confession.id, confession.likes, confession.created_at.date());
    println!("  {content}");
    if let Some(place) = &confession.location_name {
        println!("  @ {place}");
    }
}
