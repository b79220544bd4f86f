use anyhow::Context;
use cadence_core::CadenceConfig;
use cadence_engine::{spawn_flusher, EngagementEngine, FileSnapshotStore, InboundMessage, SnapshotStore};
use cadence_expression::{OutcomeReport, TickOutcome, TriggerIntent};
use cadence_limbic::MessageContext;
use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::watch;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod command;

use command::{Command, HELP};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, env = "CADENCE_CONFIG", default_value = "cadence.toml")]
    config: PathBuf,

    /// Seed for reproducible decisions
    #[arg(long)]
    seed: Option<u64>,

    /// Seconds between proactive ticks
    #[arg(long, default_value_t = 30)]
    tick_secs: u64,

    /// Snapshot file to restore from and flush to
    #[arg(long)]
    state: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long)]
    log_json: bool,
}

fn init_logging(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn prompt() -> anyhow::Result<()> {
    print!("> ");
    std::io::stdout().flush()?;
    Ok(())
}

fn print_intent(intent: &TriggerIntent) {
    println!(
        "[proactive] {} p={:.3} score={:.1} band={:?} escalation={:?}",
        intent.conversation_id, intent.probability, intent.interaction_score, intent.band, intent.escalation
    );
}

struct Session {
    engine: Arc<EngagementEngine>,
    store: Option<Arc<dyn SnapshotStore>>,
}

impl Session {
    /// Returns false when the session should end.
    async fn handle(&self, cmd: Command) -> anyhow::Result<bool> {
        let engine = &self.engine;
        let now = engine.now();
        match cmd {
            Command::Message {
                conv,
                user,
                bypass,
                text,
            } => {
                let mood = engine.observe_message(&conv, InboundMessage::new(&user, &text), now);
                let d = engine.evaluate_reply(&conv, &user, now, bypass);
                match d.final_probability {
                    Some(p) => println!(
                        "engage={} p={:.3} draw={:.3} mood={}",
                        d.engage,
                        p,
                        d.draw.unwrap_or_default(),
                        mood
                    ),
                    None => println!(
                        "engage={} bypass={:?} judgment={} mood={}",
                        d.engage, d.bypass, d.requires_judgment, mood
                    ),
                }
            }
            Command::Reply { conv, user, text } => {
                let ctx = MessageContext {
                    display_name: None,
                    text: text.as_deref(),
                };
                match engine.on_attention_event_with(&conv, &user, true, ctx, now) {
                    Some(e) => println!(
                        "attention={:.2} emotion={:.2}{}",
                        e.attention,
                        e.emotion,
                        if e.boosted { "" } else { " (no boost)" }
                    ),
                    None => println!("attention tracking disabled"),
                }
            }
            Command::NoReply { conv, user } => {
                engine.on_attention_event(&conv, &user, false, now);
                if let Some(a) = engine.attention(&conv, &user, now) {
                    println!("attention={:.2}", a.attention);
                }
            }
            Command::Tick(Some(conv)) => match engine.tick(&conv, now) {
                TickOutcome::Triggered(intent) => print_intent(&intent),
                other => println!("{:?}", other),
            },
            Command::Tick(None) => {
                let intents = engine.tick_all(now);
                if intents.is_empty() {
                    println!("no proactive intents");
                }
                intents.iter().for_each(print_intent);
            }
            Command::Sent { conv, ok } => {
                if !engine.report_proactive_send(&conv, ok, now) {
                    println!("no pending intent in {}", conv);
                }
            }
            Command::Outcome { conv, engaged } => {
                match engine.report_proactive_outcome(&conv, engaged, None, None, now) {
                    Some(OutcomeReport::Success { gained, score }) => {
                        println!("success +{:.1}, score now {:.1}", gained, score)
                    }
                    Some(OutcomeReport::Failure(r)) => match r.cooldown_until {
                        Some(until) => println!(
                            "failure {}/{}, cooling down until {}",
                            r.consecutive_failures, r.budget, until
                        ),
                        None => println!("failure {}/{}", r.consecutive_failures, r.budget),
                    },
                    None => println!("nothing awaiting an outcome in {}", conv),
                }
            }
            Command::Status(conv) => {
                let Some(state) = engine.proactive_state(&conv) else {
                    println!("unknown conversation {}", conv);
                    return Ok(true);
                };
                println!(
                    "phase={} score={:.1} failures={}/{} mood={}",
                    state.phase,
                    state.interaction_score(),
                    state.consecutive_failures(),
                    state.total_failures(),
                    engine.mood(&conv, now)
                );
                if let Some(params) = engine.adaptive_parameters(&conv) {
                    println!(
                        "band={:?} silence={:.0}s p={:.3} budget={} cooldown={:.0}s escalation={:?}",
                        params.band,
                        params.silence_threshold_secs,
                        params.probability,
                        params.max_consecutive_failures,
                        params.cooldown_secs,
                        engine.escalation_tier(&conv).unwrap_or_default()
                    );
                }
            }
            Command::Reset(Some(conv)) => engine.reset_conversation(&conv),
            Command::Reset(None) => engine.reset_all(),
            Command::Snapshot => match &self.store {
                Some(store) => {
                    store
                        .save(&engine.snapshot())
                        .await
                        .context("Failed to write snapshot")?;
                    println!("snapshot written");
                }
                None => println!("{}", engine.snapshot().to_json()?),
            },
            Command::Help => println!("{}", HELP),
            Command::Quit => return Ok(false),
        }
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_logging(args.log_json);

    let mut config = CadenceConfig::load_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    if args.seed.is_some() {
        config.seed = args.seed;
    }
    if args.state.is_some() {
        config.persistence.snapshot_path = args.state.clone();
    }
    let flush_every = Duration::from_secs(config.persistence.flush_interval_secs.max(1));
    let snapshot_path = config.persistence.snapshot_path.clone();

    let engine = Arc::new(EngagementEngine::new(config).context("Invalid configuration")?);
    info!("Cadence engine ready");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut flusher = None;
    let store: Option<Arc<dyn SnapshotStore>> = match snapshot_path {
        Some(path) => {
            let store: Arc<dyn SnapshotStore> = Arc::new(FileSnapshotStore::new(&path));
            if engine.load_from(store.as_ref()).await? {
                info!("Restored state from {}", path.display());
            }
            flusher = Some(spawn_flusher(
                Arc::clone(&engine),
                Arc::clone(&store),
                flush_every,
                shutdown_rx,
            ));
            Some(store)
        }
        None => None,
    };
    let session = Session {
        engine: Arc::clone(&engine),
        store,
    };

    println!("Cadence online. Type 'help' for commands, 'quit' to exit.");
    prompt()?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ticker = tokio::time::interval(Duration::from_secs(args.tick_secs.max(1)));
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let now = engine.now();
                engine.sweep(now);
                for intent in engine.tick_all(now) {
                    println!();
                    print_intent(&intent);
                    prompt()?;
                }
            }
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                match Command::parse(&line) {
                    Ok(Some(cmd)) => match session.handle(cmd).await {
                        Ok(true) => {}
                        Ok(false) => break,
                        Err(e) => {
                            error!("Command failed: {:#}", e);
                        }
                    },
                    Ok(None) => {}
                    Err(msg) => println!("{}", msg),
                }
                prompt()?;
            }
        }
    }

    if let Err(e) = shutdown_tx.send(true) {
        debug!("Shutdown signal not delivered: {}", e);
    }
    if let Some(handle) = flusher {
        handle.await.context("Snapshot flusher panicked")?;
    }
    Ok(())
}
