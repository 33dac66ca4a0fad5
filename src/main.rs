use std::sync::Arc;

use modsense::config::BotConfig;
use modsense::llm::{self, LlmConfig};
use modsense::moderation::cache::{JudgmentCache, SystemClock};
use modsense::moderation::{AiJudge, AutomodService, DecisionEngine, MessageContext, ModerationOutcome};
use modsense::storage::{LibSqlStore, ModStore, PolicyPatch};
use modsense::transport::{ChatTransport, LoggingTransport};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export OPENAI_API_KEY=sk-...");
        std::process::exit(1);
    });

    eprintln!("🛡️  modsense v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Type a message and press Enter to moderate it. /quit to exit.\n");

    let mut llm_config = LlmConfig::new(config.api_key.clone());
    llm_config.model = config.model.clone();
    llm_config.api_base = config.api_base.clone();
    llm_config.timeout = config.tuning.judge_timeout;
    let provider = llm::create_provider(&llm_config)?;

    let store: Arc<dyn ModStore> = Arc::new(
        LibSqlStore::new_local(&config.db_path)
            .await
            .unwrap_or_else(|e| {
                eprintln!(
                    "Error: Failed to open database at {}: {e}",
                    config.db_path.display()
                );
                std::process::exit(1);
            }),
    );

    let transport: Arc<dyn ChatTransport> = Arc::new(LoggingTransport);

    let cache = JudgmentCache::with_settings(
        config.tuning.cache_ttl,
        config.tuning.cache_capacity,
        Box::new(SystemClock),
    );
    let judge = AiJudge::with_cache(provider, cache);
    let engine = DecisionEngine::new(judge);
    let service = AutomodService::new(engine, store.clone(), transport);

    // The demo community runs with moderation switched on
    store
        .update_policy(
            "demo",
            PolicyPatch {
                enabled: Some(true),
                ..Default::default()
            },
        )
        .await?;

    let stdin = std::io::stdin();
    let mut line = String::new();
    let mut counter: u64 = 0;
    loop {
        line.clear();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let text = line.trim();
        if text.is_empty() {
            continue;
        }
        if text == "/quit" {
            break;
        }

        counter += 1;
        let ctx = MessageContext::new(format!("m{counter}"), "demo", "console", "operator");
        match service.handle_message(text, &ctx).await? {
            ModerationOutcome::Skipped(reason) => {
                println!("skipped ({reason:?})");
            }
            ModerationOutcome::Clean(judgment) => {
                println!("clean ({}): {}", judgment.source.label(), judgment.reason);
            }
            ModerationOutcome::Enforced {
                judgment,
                plan,
                report,
            } => {
                println!(
                    "violation ({}, severity {}/10): {} -> {} [deleted={} timeout={:?} warnings={:?}]",
                    judgment.source.label(),
                    plan.severity,
                    plan.reason,
                    plan.action,
                    report.deleted,
                    report.timed_out_for,
                    report.warning_total,
                );
            }
        }
    }

    Ok(())
}
