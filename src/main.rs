//! Lapidary - slot-staking and timed-production backend

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lapidary::{
    config::Args,
    db::schemas::LIVE_VIEW_COLLECTION,
    db::MongoClient,
    live::{LiveAggregator, RebuildScheduler, Rebuilder},
    logging::AuditLogger,
    nats::{spawn_trigger_subscriber, NatsClient},
    ownership::{AssetOwnershipValidator, OwnershipConfig},
    payments::PaymentEmitter,
    production::{EngineConfig, SlotProductionEngine},
    server::{self, AppState},
    staking::StakeStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("lapidary={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Lapidary - staking & production");
    info!("======================================");
    info!("Node ID: {}", args.node_id);
    info!("Listen: {}", args.listen);
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("MongoDB: {}", args.mongodb_uri);
    info!("NATS: {}", args.nats.nats_url);
    info!("Oracle endpoints: {}", args.oracle_endpoint_list().len());
    info!("Debounce window: {}ms", args.rebuild_debounce_ms);
    info!("======================================");

    // Connect to MongoDB (optional in dev mode)
    let mongo = match MongoClient::new(&args.mongodb_uri, &args.mongodb_db).await {
        Ok(client) => {
            info!("MongoDB connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("MongoDB connection failed (dev mode, continuing without): {}", e);
                None
            } else {
                error!("MongoDB connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    // Connect to NATS (optional in dev mode; payment intents drop without it)
    let nats = match NatsClient::new(&args.nats, &format!("lapidary-{}", args.node_id)).await {
        Ok(client) => {
            info!("NATS connected successfully");
            Some(client)
        }
        Err(e) => {
            if args.dev_mode {
                warn!("NATS connection failed (dev mode, continuing without): {}", e);
                None
            } else {
                error!("NATS connection failed: {}", e);
                std::process::exit(1);
            }
        }
    };

    let audit = Arc::new(AuditLogger::new(
        args.audit_log_path.clone().map(PathBuf::from),
    ));

    let validator = Arc::new(AssetOwnershipValidator::new(
        OwnershipConfig {
            endpoints: args.oracle_endpoint_list(),
            request_timeout: args.oracle_timeout(),
            collection: args.asset_collection.clone(),
        },
        Arc::clone(&audit),
    )?);

    let payments = Arc::new(PaymentEmitter::new(
        nats.clone(),
        &args.payment_subject,
        &args.payment_destination,
    ));

    // Domain services need MongoDB; without it only health routes answer
    let state = match mongo {
        Some(mongo) => {
            let aggregator = Arc::new(
                LiveAggregator::new(mongo.clone(), Arc::clone(&audit)).await?,
            );

            let scheduler = RebuildScheduler::new(
                Arc::clone(&aggregator) as Arc<dyn Rebuilder>,
                args.rebuild_debounce(),
                Duration::from_secs(args.fanout_lookback_secs),
                args.fanout_max_accounts,
            );

            let stake_store = Arc::new(
                StakeStore::new(
                    mongo.clone(),
                    Arc::clone(&validator),
                    Arc::clone(&audit),
                    Some(scheduler.clone()),
                )
                .await?,
            );

            let engine = Arc::new(
                SlotProductionEngine::new(
                    mongo.clone(),
                    Arc::clone(&stake_store),
                    Arc::clone(&payments),
                    Some(scheduler.clone()),
                    EngineConfig {
                        mining_duration: Duration::from_secs(args.mining_duration_secs),
                        polishing_duration: Duration::from_secs(args.polishing_duration_secs),
                    },
                )
                .await?,
            );

            let live_views = mongo.collection(LIVE_VIEW_COLLECTION).await?;

            // External writers announce themselves on the trigger subjects
            if let Some(ref nats) = nats {
                let _trigger_handle =
                    spawn_trigger_subscriber(nats.clone(), scheduler.clone());
            } else {
                warn!("NATS not configured; external write triggers disabled");
            }

            info!("Domain services initialized");

            AppState {
                args: args.clone(),
                mongo: Some(mongo),
                nats,
                audit,
                stake_store: Some(stake_store),
                engine: Some(engine),
                aggregator: Some(aggregator),
                scheduler: Some(scheduler),
                live_views: Some(live_views),
            }
        }
        None => {
            warn!("Running without persistence; domain routes answer 503");
            let mut state = AppState::bare(args.clone(), audit);
            state.nats = nats;
            state
        }
    };

    // Run the server
    if let Err(e) = server::run(Arc::new(state)).await {
        error!("Server error: {:?}", e);
        std::process::exit(1);
    }

    Ok(())
}
