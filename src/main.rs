//! Wagerpool node
//!
//! `serve` runs the engine with the VRF oracle and the HTTP API,
//! `simulate` plays a batch of bets in-process and prints the outcome,
//! `inspect` lists the bets persisted in a data directory. With storage
//! enabled, `serve` and `simulate` both continue the ledger kept there.

use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, RngCore, SeedableRng};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};
use wagerpool::{
    api::{ApiServer, AppState},
    bank::InMemoryBank,
    common::{config::ConfigLoader, traits::SystemClock},
    config::WagerConfig,
    engine::{Collaborators, NewBet, WagerEngine},
    games::{build_game, VrfOracle},
    registry::StaticTokenRegistry,
    storage::LedgerStorage,
    Address, Amount, Asset, CallContext,
};

type CliResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Escrow account of the in-process bank
const ESCROW: Address = Address([0xe5; 20]);

#[derive(Parser)]
#[command(name = "wagerpool")]
#[command(about = "Multiplayer wager engine with verifiable randomness")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the engine and serve the HTTP API
    Serve {
        /// Hex-encoded 32-byte VRF seed; a random key is used when absent
        #[arg(long)]
        vrf_seed: Option<String>,
    },

    /// Play bets end to end against an in-memory bank
    Simulate {
        /// Number of bets to play
        #[arg(short, long, default_value = "100")]
        bets: usize,

        /// Number of distinct players
        #[arg(short, long, default_value = "4")]
        players: u64,

        /// Buy-in per seat
        #[arg(short, long, default_value = "1000")]
        amount: Amount,

        /// Seed for seating order and the VRF key
        #[arg(short, long, default_value = "7")]
        seed: u64,
    },

    /// List bets persisted in the data directory
    Inspect {
        /// Number of bets to show, newest first
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Write the effective configuration to a TOML file
    WriteConfig {
        #[arg(short, long, default_value = "wagerpool.toml")]
        output: PathBuf,
    },
}

#[tokio::main]
async fn main() -> CliResult {
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "wagerpool=debug,tower_http=debug"
    } else {
        "wagerpool=info,tower_http=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_path(path);
    }
    let config = loader.load()?;

    match cli.command {
        Commands::Serve { vrf_seed } => serve(config, vrf_seed).await,
        Commands::Simulate {
            bets,
            players,
            amount,
            seed,
        } => simulate(config, bets, players, amount, seed),
        Commands::Inspect { limit } => inspect(&config, limit),
        Commands::WriteConfig { output } => {
            loader.save(&config, &output.to_string_lossy())?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }
    }
}

fn build_oracle(vrf_seed: Option<String>) -> Result<VrfOracle, Box<dyn std::error::Error + Send + Sync>> {
    let Some(seed) = vrf_seed else {
        warn!("no VRF seed given, generating an ephemeral key");
        return Ok(VrfOracle::new_random());
    };
    let bytes = hex::decode(seed.trim_start_matches("0x"))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| "VRF seed must be 32 bytes")?;
    Ok(VrfOracle::from_seed(&seed)?)
}

/// Restores from the data directory when storage is enabled and moves the
/// oracle past every handle the ledger already used
fn open_engine(
    config: &WagerConfig,
    oracle: &VrfOracle,
    collaborators: Collaborators,
) -> Result<WagerEngine, Box<dyn std::error::Error + Send + Sync>> {
    let game = build_game(&config.game);
    let engine = if config.storage.enabled {
        let storage = LedgerStorage::open(&config.storage)?;
        WagerEngine::restore(config, game, collaborators, storage)?
    } else {
        WagerEngine::new(config, game, collaborators)
    };

    oracle.resume_after(engine.last_request_id()?);
    let stranded = engine.snapshot()?.randomness.outstanding();
    if stranded > 0 {
        warn!(stranded, "requests issued before the restart will not be answered; refund them after the cooldown");
    }
    Ok(engine)
}

async fn serve(config: WagerConfig, vrf_seed: Option<String>) -> CliResult {
    let oracle = Arc::new(build_oracle(vrf_seed)?);
    let bank = Arc::new(InMemoryBank::new(ESCROW));
    let collaborators = Collaborators {
        registry: Arc::new(StaticTokenRegistry::from_config(&config.tokens, &config.admin)),
        oracle: oracle.clone(),
        transfers: bank,
        clock: Arc::new(SystemClock),
    };
    let engine = Arc::new(open_engine(&config, &oracle, collaborators)?);

    info!(
        game = engine.game().name(),
        vrf_public_key = %oracle.public_key_hex(),
        tokens = config.tokens.len(),
        "engine ready"
    );

    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(oracle.clone().run(tx));
    tokio::spawn(engine.clone().run_fulfillments(rx));

    let state = Arc::new(AppState {
        engine,
        node_id: config.api.node_id.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        vrf_public_key: Some(oracle.public_key_hex()),
    });
    ApiServer::new(config.api, state).run().await
}

fn simulate(config: WagerConfig, bets: usize, players: u64, amount: Amount, seed: u64) -> CliResult {
    if players < 2 {
        return Err("simulate needs at least two players".into());
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut vrf_seed = [0u8; 32];
    rng.fill_bytes(&mut vrf_seed);
    let oracle = Arc::new(VrfOracle::from_seed(&vrf_seed)?);
    let bank = Arc::new(InMemoryBank::new(ESCROW));
    let engine = open_engine(
        &config,
        &oracle,
        Collaborators {
            registry: Arc::new(StaticTokenRegistry::from_config(&config.tokens, &config.admin)),
            oracle: oracle.clone(),
            transfers: bank.clone(),
            clock: Arc::new(SystemClock),
        },
    )?;

    // The bank starts empty; back what a restored ledger already owes
    let carried = engine.snapshot()?.escrowed(&Asset::Native);
    if carried > 0 {
        info!(carried, "funding escrow for the restored ledger");
        bank.mint_native(ESCROW, carried);
    }

    let addresses: Vec<Address> = (1..=players).map(Address::from_low_u64).collect();
    let float = amount.saturating_mul(bets as Amount).saturating_mul(4);
    for player in &addresses {
        bank.mint_native(*player, float);
    }

    let token = engine.token_config(&Asset::Native)?;
    let cost = engine.randomness_config()?.request_cost(token.callback_gas);

    let mut seating = addresses.clone();
    for _ in 0..bets {
        seating.shuffle(&mut rng);
        let creator = seating[0];
        let bet_id = engine.create_bet(
            CallContext::new(creator).with_value(amount),
            NewBet {
                asset: Asset::Native,
                amount,
                ..Default::default()
            },
        )?;

        let max_seats = engine.max_seats(bet_id)?;
        let table = rng.gen_range(2..=max_seats.min(seating.len()));
        let mut launched = false;
        for (offset, joiner) in seating.iter().enumerate().take(table).skip(1) {
            let fills = offset + 1 == max_seats;
            let value = if fills { amount + cost } else { amount };
            if fills {
                bank.mint_native(*joiner, cost);
            }
            launched = engine
                .join_seats(CallContext::new(*joiner).with_value(value), bet_id, 1)?
                .is_some();
        }
        if !launched {
            bank.mint_native(creator, cost);
            engine.launch(CallContext::new(creator).with_value(cost), bet_id)?;
        }

        for bundle in oracle.fulfill_all() {
            engine.on_random_fulfilled(bundle.request_id, bundle.output)?;
        }
    }

    let mut claimed: Amount = 0;
    for player in &addresses {
        claimed += engine.claim_all(*player)?.iter().map(|(_, amount)| *amount).sum::<Amount>();
    }
    let (treasury, team) = engine.withdraw_house_edge(Asset::Native)?;
    let token = engine.token_config(&Asset::Native)?;
    let counters = engine.metrics().snapshot();

    println!("Simulation summary");
    println!("  game:            {}", engine.game().name());
    println!("  bets resolved:   {}", counters.bets_resolved);
    println!("  seats sold:      {}", counters.seats_joined + counters.bets_created);
    println!("  paid to players: {}", claimed);
    println!("  treasury:        {}", treasury);
    println!("  team:            {}", team);
    println!("  dividends:       {}", token.split.dividend);
    println!("  escrow left:     {}", bank.balance(&ESCROW, &Asset::Native));
    if config.storage.enabled {
        println!("  ledger stored:   {} (last bet {})", config.storage.data_directory, engine.last_bet_id()?);
    }
    for player in &addresses {
        println!("  {} -> {}", player, bank.balance(player, &Asset::Native));
    }
    Ok(())
}

fn inspect(config: &WagerConfig, limit: usize) -> CliResult {
    let storage = LedgerStorage::open(&config.storage)?;
    let records = storage.recent_bets(limit)?;
    if records.is_empty() {
        println!("No bets stored in {}", config.storage.data_directory);
        return Ok(());
    }

    println!("{:>8}  {:<20}  {:>6}  {:>12}  {:>12}", "bet", "status", "seats", "pot", "payout");
    for record in records {
        println!(
            "{:>8}  {:<20}  {:>6}  {:>12}  {:>12}",
            record.bet.id,
            format!("{:?}", record.status),
            record.bet.seats.len(),
            record.bet.pot,
            record.bet.payout
        );
    }
    Ok(())
}
