use std::sync::Arc;

use eris_audio::{
    audio::OpusTranscoderFactory,
    common::{
        logger,
        types::{AnyResult, ChannelId, GuildId, UserId},
    },
    configs::Config,
    log_println,
    player::{PlaybackEvent, SessionDeps},
    server::SessionRegistry,
    sources::{MusicService, SourceManager},
    voice::RtpConnector,
};
use tracing::{error, info, warn};

/// Guild and channel the demo plays into; RTP ignores both.
const DEMO_GUILD: &str = "local";
const DEMO_CHANNEL: ChannelId = ChannelId(1);
const DEMO_USER: UserId = UserId(0);

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            log_println!("{}; falling back to built-in defaults", e);
            Config::default()
        }
    };
    logger::init(&config);

    let queries: Vec<String> = std::env::args().skip(1).collect();
    if queries.is_empty() {
        log_println!("usage: eris-audio <file, url or search terms>...");
        return Ok(());
    }

    let sources = Arc::new(SourceManager::new(&config.sources));
    info!("sources: {}", sources.names().join(", "));

    let (events_tx, events_rx) = flume::unbounded();
    let registry = SessionRegistry::new(SessionDeps {
        service: sources.clone(),
        encoders: Arc::new(OpusTranscoderFactory::new(config.encoder.clone())),
        connector: Arc::new(RtpConnector::new(config.sink.clone())?),
        config: config.player.clone(),
        events: Some(events_tx),
    });

    let guild = GuildId::from(DEMO_GUILD);
    registry.open(&guild);

    let mut queued = 0usize;
    for query in &queries {
        match sources.search(query, 1).await {
            Ok(found) => match found.into_iter().next() {
                Some(track) => {
                    info!("queued {}", track);
                    registry.enqueue(&guild, track, DEMO_USER, "console")?;
                    queued += 1;
                }
                None => warn!("nothing found for '{}'", query),
            },
            Err(e) => warn!("search for '{}' failed: {}", query, e),
        }
    }
    if queued == 0 {
        error!("no playable tracks");
        return Ok(());
    }

    registry.join(&guild, DEMO_CHANNEL).await?;

    let mut ended = 0usize;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
            event = events_rx.recv_async() => {
                let Ok(event) = event else { break };
                log_event(&event);
                if matches!(event, PlaybackEvent::TrackEnd { .. }) {
                    ended += 1;
                    if ended >= queued {
                        break;
                    }
                }
            }
        }
    }

    if let Err(e) = registry.leave(&guild).await {
        warn!("leave failed: {}", e);
    }
    Ok(())
}

fn log_event(event: &PlaybackEvent) {
    match serde_json::to_string(event) {
        Ok(json) => info!("event: {}", json),
        Err(e) => warn!("unserializable event: {}", e),
    }
}
