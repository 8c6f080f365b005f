use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use accessnav::api::BackendClient;
use accessnav::geolocation::{FixedPositionSource, UnsupportedPositionSource};
use accessnav::map_sync::MarkerKind;
use accessnav::models::{
    MobilityMode, NewAccessibilityPoint, PointQuery, PointType, TravelMode,
    accessibility::sort_by_distance,
};
use accessnav::speech::CommandSpeechBackend;
use accessnav::{
    AccessNavConfig, AccessNavError, AuthToken, DirectionsPresenter, DirectionsView,
    GeolocationOptions, GeolocationWatcher, HeadlessMap, LatLng, MapSynchronizer, PlaceInput,
    PositionSource, PreferencesStore, PreferencesUpdate, RouteOrchestrator, RouteState,
    SpeechBackend, SpeechEvent, SpeechSession, logging,
};
use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

const VOICE_LIST_TIMEOUT: Duration = Duration::from_secs(5);

/// Accessible navigation from the command line
#[derive(Parser, Debug)]
#[command(name = "accessnav", author, version, about, long_about = None)]
struct Cli {
    /// Configuration file (defaults to <config dir>/accessnav/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Bearer token from the identity provider
    #[arg(long, global = true, env = "ACCESSNAV_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Current position as "lat,lng", used for "My Location"
    #[arg(long, global = true, value_parser = parse_lat_lng)]
    position: Option<LatLng>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compute an accessible route
    Route(RouteArgs),

    /// Manage saved routes
    #[command(subcommand)]
    Saved(SavedCommand),

    /// Show or change routing preferences
    #[command(subcommand)]
    Prefs(PrefsCommand),

    /// Accessibility points reported by users
    #[command(subcommand)]
    Points(PointsCommand),

    /// List speech voices available on this system
    Voices,
}

#[derive(Args, Debug)]
struct RouteArgs {
    /// Start address, "lat,lng" or "My Location"
    origin: String,

    /// Destination address or "lat,lng"
    destination: String,

    /// Travel mode for this request
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Plan for a wheelchair user
    #[arg(long)]
    wheelchair: bool,

    /// Allow routes with stairs
    #[arg(long)]
    allow_stairs: bool,

    #[command(flatten)]
    output: OutputArgs,

    /// Save the computed route under this name
    #[arg(long)]
    save: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct OutputArgs {
    /// Read the directions aloud
    #[arg(long)]
    speak: bool,

    /// Voice to speak with (see `accessnav voices`)
    #[arg(long)]
    voice: Option<String>,

    /// Print the route, map view and directions as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Subcommand, Debug)]
enum SavedCommand {
    /// List saved routes
    List,
    /// Load a saved route and show its directions
    Show {
        id: String,
        #[command(flatten)]
        output: OutputArgs,
    },
    /// Delete a saved route
    Delete { id: String },
}

#[derive(Subcommand, Debug)]
enum PrefsCommand {
    /// Show the stored preferences
    Get,
    /// Change stored preferences
    Set(PrefsSetArgs),
}

#[derive(Args, Debug)]
struct PrefsSetArgs {
    #[arg(long, value_enum)]
    mobility: Option<MobilityArg>,
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,
    #[arg(long)]
    avoid_stairs: Option<bool>,
    #[arg(long)]
    accessible_transit: Option<bool>,
    /// Preferred voice
    #[arg(long, conflicts_with = "clear_voice")]
    voice: Option<String>,
    /// Go back to the default voice
    #[arg(long)]
    clear_voice: bool,
}

#[derive(Subcommand, Debug)]
enum PointsCommand {
    /// Report an accessibility point
    Add {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// ramp, elevator, stairs, accessible-entrance, accessible-toilet, obstacle...
        #[arg(long = "type")]
        point_type: PointType,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        image_url: Option<String>,
        #[arg(long)]
        source: Option<String>,
    },
    /// List points near a position
    List {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// Radius in meters
        #[arg(long)]
        radius: Option<u32>,
        #[arg(long = "type")]
        point_type: Option<PointType>,
    },
    /// Show a single point
    Show { id: String },
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    Walking,
    Transit,
}

impl From<ModeArg> for TravelMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Walking => TravelMode::Walking,
            ModeArg::Transit => TravelMode::Transit,
        }
    }
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum MobilityArg {
    Standard,
    Wheelchair,
}

impl From<MobilityArg> for MobilityMode {
    fn from(mobility: MobilityArg) -> Self {
        match mobility {
            MobilityArg::Standard => MobilityMode::Standard,
            MobilityArg::Wheelchair => MobilityMode::Wheelchair,
        }
    }
}

fn parse_lat_lng(value: &str) -> Result<LatLng, String> {
    match PlaceInput::parse(value) {
        PlaceInput::Coordinates(position) => Ok(position),
        PlaceInput::Address(_) => Err(format!("expected \"lat,lng\", got \"{value}\"")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = match AccessNavConfig::load_from_path(cli.config.clone()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e.user_message());
            std::process::exit(2);
        }
    };

    logging::init(&config.logging, cli.verbose);
    debug!("Configuration loaded");

    if let Err(e) = run(cli, config).await {
        match e.downcast_ref::<AccessNavError>() {
            Some(err) => eprintln!("Error: {}", err.user_message()),
            None => eprintln!("Error: {e:#}"),
        }
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli, config: AccessNavConfig) -> anyhow::Result<()> {
    let client = BackendClient::new(&config)?;
    let token = cli
        .token
        .clone()
        .or_else(|| config.auth.token.clone())
        .and_then(AuthToken::new);

    match cli.command {
        Commands::Route(args) => {
            route_command(&config, client, token, cli.position, args).await
        }
        Commands::Saved(command) => saved_command(&config, client, token, command).await,
        Commands::Prefs(command) => prefs_command(&client, token, command).await,
        Commands::Points(command) => points_command(&client, token, command).await,
        Commands::Voices => voices_command(&config).await,
    }
}

fn require_token(token: Option<&AuthToken>) -> Result<&AuthToken, AccessNavError> {
    token.ok_or_else(|| {
        AccessNavError::validation(
            "This command needs a sign-in token (--token or ACCESSNAV_AUTH__TOKEN).",
        )
    })
}

fn geolocation_watcher(config: &AccessNavConfig, position: Option<LatLng>) -> GeolocationWatcher {
    let source: Arc<dyn PositionSource> =
        match position.or(config.geolocation.fixed_position) {
            Some(position) => Arc::new(FixedPositionSource::new(position)),
            None => Arc::new(UnsupportedPositionSource),
        };
    GeolocationWatcher::new(source, GeolocationOptions::from(&config.geolocation))
}

async fn speech_session(config: &AccessNavConfig, wanted: bool) -> Arc<SpeechSession> {
    if !wanted {
        return Arc::new(SpeechSession::new(None));
    }
    let backend = CommandSpeechBackend::probe(&config.speech).await;
    let session =
        SpeechSession::new(backend.map(|b| Arc::new(b) as Arc<dyn SpeechBackend>));
    if session.is_supported() {
        session.spawn_voice_refresh();
        let mut voices = session.subscribe_voices();
        let _ = tokio::time::timeout(VOICE_LIST_TIMEOUT, voices.wait_for(|v| !v.is_empty())).await;
    }
    Arc::new(session)
}

async fn route_command(
    config: &AccessNavConfig,
    client: BackendClient,
    token: Option<AuthToken>,
    position: Option<LatLng>,
    args: RouteArgs,
) -> anyhow::Result<()> {
    let store = PreferencesStore::default();
    let (preferences, speech) = futures::join!(
        store.load(&client, token.as_ref()),
        speech_session(config, args.output.speak)
    );
    if let Some(warning) = store.last_error() {
        eprintln!("{warning}");
    }

    let overrides = PreferencesUpdate {
        travel_mode: args.mode.map(Into::into),
        mobility_mode: args.wheelchair.then_some(MobilityMode::Wheelchair),
        avoid_stairs: args.allow_stairs.then_some(false),
        ..PreferencesUpdate::default()
    };
    let preferences = preferences.merged(&overrides);

    let watcher = Arc::new(geolocation_watcher(config, position));
    let orchestrator = RouteOrchestrator::new(client, Some(watcher));

    orchestrator
        .request_route(&args.origin, &args.destination, &preferences)
        .await?;

    let voice = args.output.voice.clone().or(preferences.voice_uri.clone());
    present(config, &orchestrator.state(), &args.output, speech, voice).await?;

    if let Some(name) = args.save {
        let receipt = orchestrator
            .save_current_route(&name, require_token(token.as_ref())?)
            .await?;
        println!("{} (id {})", receipt.message, receipt.route_id);
    }
    Ok(())
}

async fn saved_command(
    config: &AccessNavConfig,
    client: BackendClient,
    token: Option<AuthToken>,
    command: SavedCommand,
) -> anyhow::Result<()> {
    let token = require_token(token.as_ref())?;

    match command {
        SavedCommand::List => {
            let routes = client.list_routes(token).await?;
            if routes.is_empty() {
                println!("No saved routes.");
            }
            for route in routes {
                let created = route
                    .created_at
                    .map(|at| at.format("%Y-%m-%d").to_string())
                    .unwrap_or_default();
                println!(
                    "{}  {}  {} -> {}  {}",
                    route.id, route.name, route.origin.address, route.destination.address, created
                );
            }
        }
        SavedCommand::Show { id, output } => {
            let store = PreferencesStore::default();
            let (preferences, speech) = futures::join!(
                store.load(&client, Some(token)),
                speech_session(config, output.speak)
            );
            let orchestrator = RouteOrchestrator::new(client.clone(), None);
            orchestrator.load_saved_route(&id, token).await?;

            let voice = output.voice.clone().or(preferences.voice_uri.clone());
            present(config, &orchestrator.state(), &output, speech, voice).await?;
        }
        SavedCommand::Delete { id } => {
            let receipt = client.delete_route(&id, token).await?;
            match receipt {
                Some(receipt) if !receipt.message.is_empty() => println!("{}", receipt.message),
                _ => println!("Route {id} deleted."),
            }
        }
    }
    Ok(())
}

async fn prefs_command(
    client: &BackendClient,
    token: Option<AuthToken>,
    command: PrefsCommand,
) -> anyhow::Result<()> {
    let store = PreferencesStore::default();
    store.load(client, token.as_ref()).await;
    if let Some(warning) = store.last_error() {
        eprintln!("{warning}");
    }

    if let PrefsCommand::Set(args) = command {
        let update = PreferencesUpdate {
            mobility_mode: args.mobility.map(Into::into),
            avoid_stairs: args.avoid_stairs,
            wheelchair_accessible_transit: args.accessible_transit,
            travel_mode: args.mode.map(Into::into),
            voice_uri: if args.clear_voice {
                Some(None)
            } else {
                args.voice.map(Some)
            },
        };
        if update.is_empty() {
            anyhow::bail!("Nothing to change; pass at least one preference flag");
        }
        store.update(client, token.as_ref(), &update).await?;
        info!("Preferences updated");
    }

    println!("{}", serde_json::to_string_pretty(store.current().as_ref())?);
    Ok(())
}

async fn points_command(
    client: &BackendClient,
    token: Option<AuthToken>,
    command: PointsCommand,
) -> anyhow::Result<()> {
    match command {
        PointsCommand::Add {
            lat,
            lng,
            point_type,
            description,
            image_url,
            source,
        } => {
            if !LatLng::new(lat, lng).is_valid() {
                return Err(AccessNavError::validation("Latitude and longitude are out of range.").into());
            }
            let point = NewAccessibilityPoint {
                lat,
                lng,
                point_type,
                description,
                image_url,
                source,
            };
            let receipt = client
                .add_accessibility_point(&point, require_token(token.as_ref())?)
                .await?;
            println!("{} (id {})", receipt.message, receipt.point_id);
        }
        PointsCommand::List {
            lat,
            lng,
            radius,
            point_type,
        } => {
            let center = LatLng::new(lat, lng);
            let query = PointQuery {
                radius,
                point_type,
                ..PointQuery::near(center)
            };
            let mut points = client.list_accessibility_points(&query).await?;
            sort_by_distance(&mut points, &center);
            if points.is_empty() {
                println!("No accessibility points found nearby.");
            }
            for point in points {
                println!(
                    "{}  {:<20} {:>7.0} m  {}",
                    point.id,
                    point.point_type.as_str(),
                    point.location().distance_km(&center) * 1000.0,
                    point.description.as_deref().unwrap_or("")
                );
            }
        }
        PointsCommand::Show { id } => {
            let point = client.get_accessibility_point(&id).await?;
            println!("{}", serde_json::to_string_pretty(&point)?);
        }
    }
    Ok(())
}

async fn voices_command(config: &AccessNavConfig) -> anyhow::Result<()> {
    let speech = speech_session(config, true).await;
    if let Err(e) = speech.ensure_supported() {
        println!("{}", e.user_message());
        return Ok(());
    }
    let voices = speech.voices();
    if voices.is_empty() {
        println!("No voices reported by {}.", config.speech.command);
    }
    for voice in voices.iter() {
        println!("{:<12} {:<30} {}", voice.uri, voice.display_name, voice.language);
    }
    Ok(())
}

/// Print map view and directions for the active route, optionally reading them aloud
async fn present(
    config: &AccessNavConfig,
    state: &RouteState,
    output: &OutputArgs,
    speech: Arc<SpeechSession>,
    voice: Option<String>,
) -> anyhow::Result<()> {
    let mut map = MapSynchronizer::new(HeadlessMap::default(), config.map.clone());
    map.sync(state.route.as_ref());

    let mut presenter = DirectionsPresenter::new(Arc::clone(&speech), voice);
    presenter.set_route(state.route.as_ref());

    if output.json {
        let document = json!({
            "route": state.route.as_deref(),
            "map": map.surface(),
            "directions": presenter.view(),
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&document).context("Failed to encode output")?
        );
    } else {
        print_map(map.surface());
        print_directions(presenter.view());
    }

    if output.speak {
        match speech.ensure_supported() {
            Ok(()) => speak_all(&mut presenter, &speech).await,
            Err(e) => eprintln!("Audio directions are off. {}", e.user_message()),
        }
    }
    Ok(())
}

fn print_map(map: &HeadlessMap) {
    if let Some(viewport) = map.viewport {
        println!("Map: centered on {} at zoom {}", viewport.center, viewport.zoom);
    }
    for marker in &map.markers {
        let label = match marker.kind {
            MarkerKind::Origin => "Start",
            MarkerKind::Destination => "End",
        };
        println!("  {label}: {}", marker.position);
    }
}

fn print_directions(view: &DirectionsView) {
    match view {
        DirectionsView::Unavailable => println!("Direction details are currently unavailable."),
        DirectionsView::Steps { summary, steps } => {
            if let (Some(from), Some(to)) = (&summary.start_address, &summary.end_address) {
                println!("\n{from} -> {to}");
            }
            println!("Total Distance: {}", summary.distance_text);
            println!("Approx. Duration: {}\n", summary.duration_text);
            for step in steps {
                println!("{:>3}. {}", step.index + 1, step.plain_text);
                if let Some(distance) = &step.distance_text {
                    println!("     {distance}");
                }
            }
        }
    }
}

/// Read every step aloud, waiting for each utterance to end
async fn speak_all(presenter: &mut DirectionsPresenter, speech: &SpeechSession) {
    let mut events = speech.subscribe_events();
    let count = presenter.view().steps().len();

    for index in 0..count {
        presenter.select_step(index, false);
        let Some(id) = presenter.play_current() else {
            continue;
        };
        loop {
            match events.recv().await {
                Ok(
                    SpeechEvent::Finished(done)
                    | SpeechEvent::Failed(done)
                    | SpeechEvent::Cancelled(done),
                ) if done == id => break,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => return,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_route_command() {
        let cli = Cli::try_parse_from([
            "accessnav",
            "route",
            "123 Main St",
            "456 Oak Ave",
            "--mode",
            "transit",
            "--wheelchair",
        ])
        .unwrap();
        let Commands::Route(args) = cli.command else {
            panic!("expected route command");
        };
        assert_eq!(args.origin, "123 Main St");
        assert!(matches!(args.mode, Some(ModeArg::Transit)));
        assert!(args.wheelchair);
        assert!(!args.output.speak);
    }

    #[test]
    fn test_position_flag() {
        let cli =
            Cli::try_parse_from(["accessnav", "--position", "6.52,3.37", "voices"]).unwrap();
        assert_eq!(cli.position, Some(LatLng::new(6.52, 3.37)));
        assert!(Cli::try_parse_from(["accessnav", "--position", "Lagos", "voices"]).is_err());
    }
}
