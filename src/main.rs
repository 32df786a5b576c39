//! Showrunner operator console wiring the catalog, score and snapshot
//! collaborators to the three game engines.

use std::{env, sync::Arc};

use anyhow::Context;
use serde::Serialize;
use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use showrunner::{
    config::AppConfig,
    dao::{
        catalog::{CatalogService, InMemoryCatalog},
        kv::FileKvStore,
        scores::{InMemoryScoreService, ScoreService},
    },
    error::ServiceError,
    services::{
        ActionOutcome, Collaborators, board_service::BoardEngine, image_service::ImageRevealEngine,
        notifier::Notifier, score_ledger::ScoreLedger, word_service::WordRevealEngine,
    },
    state::content::GameMode,
};

mod console;

use console::{Command, USAGE};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let demo = env::args().skip(1).any(|arg| arg == "--demo");
    let config = AppConfig::load();
    let (catalog, scores) = build_services(&config, demo)?;

    let notifier = Arc::new(Notifier::default());
    let collaborators = Collaborators {
        catalog,
        ledger: Arc::new(ScoreLedger::new(scores).with_call_timeout(config.call_timeout)),
        kv: Arc::new(FileKvStore::new(config.snapshot_path.clone())),
        notifier: notifier.clone(),
    };
    info!(
        demo,
        snapshot = %config.snapshot_path.display(),
        "collaborators ready"
    );

    tokio::spawn(print_notices(notifier));

    let mut console = Console::new(collaborators, &config);
    console.activate(GameMode::ImageReveal).await;
    println!("{USAGE}");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading stdin")? {
        match Command::parse(&line) {
            Ok(None) => {}
            Ok(Some(Command::Quit)) => break,
            Ok(Some(command)) => console.run(command, &mut lines).await,
            Err(err) => println!("{err:#}"),
        }
    }

    info!("console closed");
    Ok(())
}

type Services = (Arc<dyn CatalogService>, Arc<dyn ScoreService>);

/// In-memory fakes for `--demo`, the HTTP services otherwise.
fn build_services(config: &AppConfig, demo: bool) -> anyhow::Result<Services> {
    if demo {
        return Ok((
            Arc::new(InMemoryCatalog::demo()),
            Arc::new(InMemoryScoreService::new()),
        ));
    }
    http_services(config)
}

#[cfg(feature = "http-services")]
fn http_services(config: &AppConfig) -> anyhow::Result<Services> {
    use showrunner::dao::http::{HttpConfig, HttpServices};

    let http = HttpConfig::new(config.api_base_url.clone())
        .with_timeout(config.call_timeout)
        .with_env_override();
    info!(base_url = %http.base_url, "using HTTP catalog and score services");
    let services = HttpServices::connect(http).context("building HTTP client")?;
    Ok((Arc::new(services.clone()), Arc::new(services)))
}

#[cfg(not(feature = "http-services"))]
fn http_services(_config: &AppConfig) -> anyhow::Result<Services> {
    anyhow::bail!("built without the `http-services` feature; run with --demo")
}

/// Print every notice until the hub goes away.
async fn print_notices(notifier: Arc<Notifier>) {
    let mut notices = notifier.subscribe();
    loop {
        match notices.recv().await {
            Ok(notice) => {
                let mode = notice.mode.map(GameMode::key).unwrap_or("-");
                println!("[{:?}] ({mode}) {}", notice.level, notice.message);
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "notice printer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// Engines plus the mode the operator is driving.
struct Console {
    image: ImageRevealEngine,
    word: WordRevealEngine,
    board: BoardEngine,
    ledger: Arc<ScoreLedger>,
    image_points: i32,
    mode: GameMode,
    initialized: Vec<GameMode>,
}

impl Console {
    fn new(collaborators: Collaborators, config: &AppConfig) -> Self {
        Self {
            image: ImageRevealEngine::new(collaborators.clone(), config),
            word: WordRevealEngine::new(collaborators.clone(), config),
            ledger: collaborators.ledger.clone(),
            board: BoardEngine::new(collaborators, config),
            image_points: config.image_points,
            mode: GameMode::ImageReveal,
            initialized: Vec::new(),
        }
    }

    /// Switch mode, initializing the engine the first time it is used.
    async fn activate(&mut self, mode: GameMode) {
        self.mode = mode;
        println!("mode: {mode}");
        if self.initialized.contains(&mode) {
            return;
        }
        let outcome = match mode {
            GameMode::ImageReveal => self.image.initialize().await,
            GameMode::WordReveal => self.word.initialize().await,
            GameMode::Board => self.board.initialize().await,
        };
        // A failed start still leaves a usable engine; the operator can retry.
        self.initialized.push(mode);
        report(outcome);
    }

    async fn run(&mut self, command: Command, lines: &mut Lines<BufReader<Stdin>>) {
        match command {
            Command::Mode(mode) => self.activate(mode).await,
            Command::Help => println!("{USAGE}"),
            Command::View => self.print_view().await,
            Command::Scores => self.print_scores().await,
            Command::ResetScores => self.reset_scores(lines).await,
            Command::Quit => {}
            command => report(self.dispatch(command).await),
        }
    }

    async fn dispatch(&self, command: Command) -> Result<ActionOutcome, ServiceError> {
        match (self.mode, command) {
            (GameMode::ImageReveal, Command::Start) => self.image.start_round().await,
            (GameMode::ImageReveal, Command::Reveal) => self.image.proceed_to_reveal().await,
            (GameMode::ImageReveal, Command::Buzz(team)) => self.image.team_buzzes(team).await,
            (GameMode::ImageReveal, Command::Correct(points)) => {
                self.image
                    .operator_verdict(true, points.unwrap_or(self.image_points))
                    .await
            }
            (GameMode::ImageReveal, Command::Wrong) => self.image.operator_verdict(false, 0).await,
            (GameMode::ImageReveal, Command::Scoreboard) => self.image.view_scoreboard().await,
            (GameMode::ImageReveal, Command::Filter(filter)) => {
                self.image.set_category_filter(filter).await
            }
            (GameMode::ImageReveal, Command::Reset) => self.image.reset_game().await,

            (GameMode::WordReveal, Command::Start) => self.word.start_round().await,
            (GameMode::WordReveal, Command::Buzz(team)) => self.word.team_buzzes(team).await,
            (GameMode::WordReveal, Command::Correct(_)) => self.word.operator_verdict(true).await,
            (GameMode::WordReveal, Command::Wrong) => self.word.operator_verdict(false).await,
            (GameMode::WordReveal, Command::Scoreboard) => self.word.view_scoreboard().await,
            (GameMode::WordReveal, Command::Filter(filter)) => {
                self.word.set_category_filter(filter).await
            }
            (GameMode::WordReveal, Command::Reset) => self.word.reset_game().await,

            (GameMode::Board, Command::Start) => self.board.start_new_round().await,
            (GameMode::Board, Command::Lottery(option)) => {
                self.board.select_lottery_option(option).await
            }
            (GameMode::Board, Command::Remove(team)) => self.board.remove_team(team).await,
            (GameMode::Board, Command::Skip) => self.board.skip_removal().await,
            (GameMode::Board, Command::Buzz(team)) => self.board.team_buzzes(team).await,
            (GameMode::Board, Command::Correct(_)) => self.board.operator_verdict(true).await,
            (GameMode::Board, Command::Wrong) => self.board.operator_verdict(false).await,
            (GameMode::Board, Command::Tile(pos)) => self.board.select_board_tile(pos).await,
            (GameMode::Board, Command::Confirm) => self.board.confirm_tile_action().await,
            (GameMode::Board, Command::Scoreboard) => self.board.view_scoreboard().await,
            (GameMode::Board, Command::Filter(filter)) => {
                self.board.set_category_filter(filter).await
            }
            (GameMode::Board, Command::Reset) => self.board.reset_game().await,

            (mode, command) => Ok(ActionOutcome::Ignored(format!(
                "{command:?} is not available in {mode} mode"
            ))),
        }
    }

    async fn print_view(&self) {
        match self.mode {
            GameMode::ImageReveal => print_json(&self.image.view().await),
            GameMode::WordReveal => print_json(&self.word.view().await),
            GameMode::Board => print_json(&self.board.view().await),
        }
    }

    async fn print_scores(&self) {
        match self.ledger.refresh().await {
            Ok(scores) => {
                for (team, points) in scores.iter() {
                    println!("{:<8} {points}", team.display_name());
                }
            }
            Err(err) => println!("failed to fetch scores: {err}"),
        }
    }

    async fn reset_scores(&self, lines: &mut Lines<BufReader<Stdin>>) {
        println!("reset every team score? type `yes` to confirm");
        let answer = match lines.next_line().await {
            Ok(line) => line.unwrap_or_default(),
            Err(err) => {
                warn!(error = %err, "failed to read confirmation");
                String::new()
            }
        };
        match self.ledger.reset_all(|| answer.trim() == "yes").await {
            Ok(true) => println!("scores reset"),
            Ok(false) => println!("score reset cancelled"),
            Err(err) => println!("score reset failed: {err}"),
        }
    }
}

fn report(outcome: Result<ActionOutcome, ServiceError>) {
    match outcome {
        Ok(ActionOutcome::Applied) => println!("ok"),
        Ok(ActionOutcome::Ignored(reason)) => println!("ignored: {reason}"),
        Err(err) => println!("failed: {err}"),
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(error = %err, "failed to encode view"),
    }
}

/// Configure tracing; `RUST_LOG` overrides the default `info` filter.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
