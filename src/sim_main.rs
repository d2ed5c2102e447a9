//! Chipwager simulator
//!
//! Plays many rounds against an in-memory ledger and reports the empirical
//! return to player next to the theoretical one.

use chipwager::{
    games::roulette::{Color, Parity},
    games::RouletteBet,
    BetParameters, BlackjackAction, CasinoConfig, CasinoEngine, CasinoError, CasinoResult,
    ConfigLoader, GameType, InMemoryLedgerStore, SessionState,
};
use clap::{Parser, Subcommand};
use std::{path::PathBuf, sync::Arc, time::Instant};
use tracing::{info, warn};

/// Chipwager simulation CLI
#[derive(Parser)]
#[command(name = "chipwager-sim")]
#[command(about = "Simulate casino rounds and measure return to player")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Seed for a reproducible run
    #[arg(short, long)]
    seed: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Play single-round games and report empirical RTP
    Play {
        /// slots, dice or roulette
        #[arg(short, long, default_value = "slots")]
        game: GameType,

        #[arg(short, long, default_value = "100000")]
        rounds: u64,

        #[arg(short, long, default_value = "10")]
        bet: u64,

        /// Dice target sum
        #[arg(long, default_value = "7")]
        target: u8,

        /// Roulette bet: a number, red/black, even/odd, dozen:N or column:N
        #[arg(long, default_value = "red")]
        roulette: String,
    },

    /// Play blackjack hands, hitting below a fixed score
    Blackjack {
        #[arg(short, long, default_value = "10000")]
        rounds: u64,

        #[arg(short, long, default_value = "10")]
        bet: u64,

        /// Player stands at or above this score
        #[arg(long, default_value = "17")]
        stand_on: u8,
    },

    /// Print theoretical RTP for every single-round bet type
    Rtp,

    /// Write the default configuration as TOML
    DumpConfig {
        #[arg(short, long, default_value = "chipwager.toml")]
        out: PathBuf,
    },
}

const PLAYER: &str = "simulator";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "chipwager=debug" } else { "chipwager=warn,chipwager_sim=info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    match cli.command {
        Commands::Play {
            game,
            rounds,
            bet,
            target,
            roulette,
        } => {
            let params = match game {
                GameType::Slots => BetParameters::Slots,
                GameType::Dice => BetParameters::Dice { target },
                GameType::Roulette => BetParameters::Roulette {
                    bet: parse_roulette_bet(&roulette)?,
                },
                GameType::Blackjack => {
                    return Err("use the blackjack subcommand for blackjack".into());
                }
            };
            let engine = build_engine(config, cli.seed)?;
            run_rounds(&engine, &params, rounds, bet).await?;
        }
        Commands::Blackjack {
            rounds,
            bet,
            stand_on,
        } => {
            let engine = build_engine(config, cli.seed)?;
            run_blackjack(&engine, rounds, bet, stand_on).await?;
        }
        Commands::Rtp => print_rtp_table(config)?,
        Commands::DumpConfig { out } => {
            ConfigLoader::new().save(&config, &out.to_string_lossy())?;
            println!("Wrote {}", out.display());
        }
    }

    Ok(())
}

fn build_engine(config: CasinoConfig, seed: Option<u64>) -> CasinoResult<CasinoEngine> {
    let store = Arc::new(InMemoryLedgerStore::new());
    let mut builder = CasinoEngine::builder(config, store);
    if let Some(seed) = seed {
        builder = builder.with_seed(seed);
    }
    builder.build()
}

fn parse_roulette_bet(raw: &str) -> Result<RouletteBet, String> {
    let raw = raw.trim().to_lowercase();
    let bet = match raw.as_str() {
        "red" => RouletteBet::Color(Color::Red),
        "black" => RouletteBet::Color(Color::Black),
        "even" => RouletteBet::Parity(Parity::Even),
        "odd" => RouletteBet::Parity(Parity::Odd),
        other => {
            let parse = |s: &str| s.parse::<u8>().map_err(|_| format!("invalid roulette bet '{}'", other));
            match other.split_once(':') {
                Some(("dozen", n)) => RouletteBet::Dozen(parse(n)?),
                Some(("column", n)) => RouletteBet::Column(parse(n)?),
                Some(("number", n)) => RouletteBet::Number(parse(n)?),
                _ => RouletteBet::Number(parse(other)?),
            }
        }
    };
    bet.validate().map_err(|e| e.to_string())?;
    Ok(bet)
}

async fn run_rounds(engine: &CasinoEngine, params: &BetParameters, rounds: u64, bet: u64) -> CasinoResult<()> {
    let bankroll = rounds.saturating_mul(bet);
    engine.deposit(PLAYER, bankroll).await?;

    let started = Instant::now();
    let mut wagered: u64 = 0;
    let mut paid: u64 = 0;
    let mut wins: u64 = 0;

    for _ in 0..rounds {
        let round = engine.play(PLAYER, bet, params).await?;
        wagered += bet;
        paid += round.payout;
        if round.result.is_win() {
            wins += 1;
        }
    }

    let elapsed = started.elapsed();
    let empirical = paid as f64 / wagered.max(1) as f64;
    let theoretical = engine.generator().expected_return(params);
    info!(rounds, elapsed_ms = elapsed.as_millis() as u64, "Simulation finished");

    println!("Game:              {}", params.game_type());
    println!("Rounds:            {}", rounds);
    println!("Wagered:           {}", wagered);
    println!("Paid out:          {}", paid);
    println!("Win rate:          {:.2}%", wins as f64 / rounds.max(1) as f64 * 100.0);
    println!("Empirical RTP:     {:.4}", empirical);
    println!("Theoretical RTP:   {:.4}", theoretical);
    println!("Final balance:     {}", engine.balance(PLAYER).await?);
    println!("Rounds/sec:        {:.0}", rounds as f64 / elapsed.as_secs_f64().max(1e-9));
    Ok(())
}

async fn run_blackjack(engine: &CasinoEngine, rounds: u64, bet: u64, stand_on: u8) -> CasinoResult<()> {
    engine.deposit(PLAYER, rounds.saturating_mul(bet)).await?;

    let mut paid: u64 = 0;
    let mut naturals: u64 = 0;

    for _ in 0..rounds {
        let mut view = engine.start_blackjack(PLAYER, bet).await?;
        if view.state == SessionState::Settled {
            naturals += 1;
        }
        while view.state == SessionState::PlayerTurn {
            let action = if view.player_score < stand_on {
                BlackjackAction::Hit
            } else {
                BlackjackAction::Stand
            };
            view = match engine.act(&view.session_id, action).await {
                Ok(view) => view,
                Err(e @ CasinoError::IllegalAction { .. }) => {
                    warn!(error = %e, "Unexpected blackjack state");
                    break;
                }
                Err(e) => return Err(e),
            };
        }
        paid += view.payout.unwrap_or(0);
    }

    let wagered = rounds.saturating_mul(bet);
    let stats = engine.player_stats(PLAYER).await?;
    println!("Hands:             {}", rounds);
    println!("Naturals:          {}", naturals);
    println!("Won / lost:        {} / {}", stats.games_won, stats.games_lost);
    println!("Wagered:           {}", wagered);
    println!("Paid out:          {}", paid);
    println!("Empirical RTP:     {:.4}", paid as f64 / wagered.max(1) as f64);
    Ok(())
}

fn print_rtp_table(config: CasinoConfig) -> CasinoResult<()> {
    let engine = build_engine(config, Some(0))?;
    let generator = engine.generator();

    println!("{:<24} {:>8}", "Bet", "RTP");
    println!("{:<24} {:>8.4}", "slots", generator.expected_return(&BetParameters::Slots));
    for target in 2..=12u8 {
        let params = BetParameters::Dice { target };
        println!("{:<24} {:>8.4}", format!("dice {}", target), generator.expected_return(&params));
    }
    for bet in [
        RouletteBet::Number(17),
        RouletteBet::Color(Color::Red),
        RouletteBet::Parity(Parity::Even),
        RouletteBet::Dozen(1),
        RouletteBet::Column(1),
    ] {
        let params = BetParameters::Roulette { bet };
        println!("{:<24} {:>8.4}", format!("roulette {}", bet), generator.expected_return(&params));
    }
    Ok(())
}
