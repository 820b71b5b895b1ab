use std::time::Duration;

use tracing::info;

use drift_reader::config::Config;
use drift_reader::error::Result;
use drift_reader::session::Session;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging to stderr (info and above by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();

    // Check for --once flag (single refresh cycle instead of polling)
    let once = args.len() >= 2 && args[1] == "--once";

    // Load configuration
    let config = Config::load()?;

    let session = Session::connect(&config).await?;
    print_summary(&session);

    // Surface fetch and mutation failures on stderr
    let mut notices = session.notices().subscribe();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            eprintln!("{notice}");
        }
    });

    if once {
        return run_refresh(&session).await;
    }

    let interval = Duration::from_secs(u64::from(config.refresh_interval_minutes) * 60);
    loop {
        tokio::time::sleep(interval).await;
        run_refresh(&session).await?;
    }
}

async fn run_refresh(session: &Session) -> Result<()> {
    if let Err(e) = session.refresh().await {
        // Only staleness escapes refresh; transport problems became
        // notices already.
        eprintln!("Error: {e}");
        return Err(e);
    }
    print_summary(session);
    Ok(())
}

fn print_summary(session: &Session) {
    let snapshot = session.snapshot();
    let unread = snapshot.items.iter().filter(|i| !i.read).count();
    info!(
        feeds = snapshot.feeds.len(),
        items = snapshot.items.len(),
        unread,
        "cache state"
    );
    for feed in &snapshot.feeds {
        let count = snapshot
            .items
            .iter()
            .filter(|i| i.feed_id == feed.id && !i.read)
            .count();
        if count > 0 {
            info!("{}: {} unread", feed.display_title(), count);
        }
    }
}
