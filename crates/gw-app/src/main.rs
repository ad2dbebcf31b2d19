//! Terminal host for the groundwater map
//!
//! Mounts a map session on the headless provider and drives it from
//! stdin. Commands:
//!
//! ```text
//! search <place>     resolve a place and fly to it
//! click <lat> <lng>  click the map at a coordinate
//! markers            list the markers on the map
//! token <token>      switch to another access token
//! quit               tear the map down and exit
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{info, warn};

use gw_core::events::events::{LocationSelected, Notification, NotificationLevel};
use gw_core::{
    Coordinate, EventBus, Geocoder, HeadlessProvider, LocationEventBridge, MapSessionManager,
    MarkerStyle, SessionError,
};
use gw_data::{AppConfig, MapboxGeocoder};

const TOKEN_ENV: &str = "MAPBOX_TOKEN";

type Input = Lines<BufReader<Stdin>>;

/// A mounted map and the clicks coming out of it
struct Mounted {
    bridge: Arc<LocationEventBridge>,
    clicks: UnboundedReceiver<Coordinate>,
}

enum Command {
    Search(String),
    Click(Coordinate),
    Markers,
    Token(String),
    Help,
    Quit,
}

fn parse_command(line: &str) -> Result<Option<Command>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (verb, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
    let rest = rest.trim();
    let command = match verb {
        "search" => Command::Search(rest.to_string()),
        "click" => {
            let mut parts = rest
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|p| !p.is_empty());
            let (Some(lat), Some(lng), None) = (parts.next(), parts.next(), parts.next()) else {
                return Err("usage: click <lat> <lng>".to_string());
            };
            let lat: f64 = lat.parse().map_err(|_| format!("invalid latitude '{}'", lat))?;
            let lng: f64 = lng.parse().map_err(|_| format!("invalid longitude '{}'", lng))?;
            Command::Click(Coordinate::new(lat, lng).map_err(|e| e.to_string())?)
        }
        "markers" => Command::Markers,
        "token" if !rest.is_empty() => Command::Token(rest.to_string()),
        "token" => return Err("usage: token <access token>".to_string()),
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(format!("unknown command '{}', try 'help'", other)),
    };
    Ok(Some(command))
}

async fn prompt(input: &mut Input, text: &str) -> Result<Option<String>> {
    let mut stdout = tokio::io::stdout();
    stdout.write_all(text.as_bytes()).await?;
    stdout.flush().await?;
    Ok(input.next_line().await?)
}

/// Open a session, asking again while the token is rejected
async fn mount(
    manager: &MapSessionManager,
    geocoder: &Arc<dyn Geocoder>,
    input: &mut Input,
    mut token: Option<String>,
) -> Result<Option<Mounted>> {
    loop {
        let candidate = match token.take() {
            Some(token) => token,
            None => match prompt(input, "Mapbox access token: ").await? {
                Some(line) => line,
                None => return Ok(None),
            },
        };

        match manager.initialize(&candidate).await {
            Ok(session) => {
                let clicks = session
                    .take_clicks()
                    .context("click stream of a fresh session was already taken")?;
                let bridge = Arc::new(LocationEventBridge::new(session, geocoder.clone()));
                return Ok(Some(Mounted { bridge, clicks }));
            }
            Err(SessionError::Credential(e)) => println!("Token rejected: {}", e),
            Err(e) => return Err(e).context("failed to open the map"),
        }
    }
}

fn print_markers(bridge: &LocationEventBridge) {
    let markers = bridge.session().markers();
    println!("{} markers:", markers.len());
    for marker in markers {
        let popup = marker.popup();
        let mut detail = popup.lines.join(", ");
        if let MarkerStyle::Dot { severity } = marker.style() {
            detail = format!("{} [{}]", detail, severity.color_token());
        }
        println!(
            "  {:?} {} at {} {}",
            marker.category, popup.title, marker.coordinate, detail
        );
    }
}

fn print_help() {
    println!("Commands: search <place> | click <lat> <lng> | markers | token <token> | quit");
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = AppConfig::from_env().context("failed to load configuration")?;
    let session_config = config.session_config().context("failed to load seed points")?;
    let geocoder: Arc<dyn Geocoder> = Arc::new(MapboxGeocoder::new(&config.geocoding)?);

    let events = Arc::new(EventBus::new());
    events.subscribe_fn::<LocationSelected, _>(|event: &LocationSelected| {
        match serde_json::to_string(&event.location()) {
            Ok(json) => println!("location: {}", json),
            Err(e) => warn!("Failed to encode selected location: {}", e),
        }
    });
    events.subscribe_fn::<Notification, _>(|note: &Notification| {
        let tag = match note.level {
            NotificationLevel::Success => "ok",
            NotificationLevel::Info => "info",
            NotificationLevel::Error => "error",
        };
        println!("[{}] {}", tag, note.message);
    });

    let provider = Arc::new(HeadlessProvider::untraced());
    let manager = MapSessionManager::new(provider.clone(), events, Arc::new(session_config));

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let token = std::env::var(TOKEN_ENV).ok();
    let Some(mut mounted) = mount(&manager, &geocoder, &mut input, token).await? else {
        info!("No access token supplied, exiting");
        return Ok(());
    };

    info!("Map ready");
    print_help();

    loop {
        tokio::select! {
            line = input.next_line() => {
                let Some(line) = line? else { break };
                match parse_command(&line) {
                    Ok(None) => {}
                    Ok(Some(Command::Search(query))) => {
                        let bridge = mounted.bridge.clone();
                        tokio::spawn(async move {
                            bridge.search(&query).await;
                        });
                    }
                    Ok(Some(Command::Click(coordinate))) => {
                        if provider.simulate_click(coordinate) == 0 {
                            println!("The map is not accepting clicks");
                        }
                    }
                    Ok(Some(Command::Markers)) => print_markers(&mounted.bridge),
                    Ok(Some(Command::Token(token))) => {
                        // The manager disposes the current session first
                        match mount(&manager, &geocoder, &mut input, Some(token)).await? {
                            Some(next) => mounted = next,
                            None => break,
                        }
                    }
                    Ok(Some(Command::Help)) => print_help(),
                    Ok(Some(Command::Quit)) => break,
                    Err(message) => println!("{}", message),
                }
            }
            Some(coordinate) = mounted.clicks.recv() => {
                mounted.bridge.on_map_clicked(coordinate);
            }
        }
    }

    mounted.bridge.dispose();
    info!("Map torn down");
    Ok(())
}
