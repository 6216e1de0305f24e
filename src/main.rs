use std::fs;
use std::path::PathBuf;
use std::rc::Rc;
use std::time::Duration;

use anyhow::{anyhow, Context as AnyhowContext, Result};
use serde_json::Value as JsonValue;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use weave::{Browser, HeadlessBrowser, Logic, Runtime, RuntimeConfig, StrategyQueue, TreePatcher};

const USAGE: &str = "usage: weave <logic.json> <markup.html> [run-ms] [event:element-id ...]";
const DEFAULT_RUN_MS: u64 = 3_000;

fn main() {
    let subscriber_result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .try_init();
    if subscriber_result.is_err() {
        // tracing was already initialised; continue silently
    }

    if let Err(err) = run() {
        eprintln!("weave: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut args = std::env::args().skip(1);
    let logic_path = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let markup_path = args.next().ok_or_else(|| anyhow!(USAGE))?;
    let run_for = match args.next() {
        Some(raw) => raw
            .parse::<u64>()
            .with_context(|| format!("invalid run time '{raw}'"))?,
        None => DEFAULT_RUN_MS,
    };
    let events: Vec<(String, String)> = args
        .map(|raw| {
            raw.split_once(':')
                .map(|(event, id)| (event.to_string(), id.to_string()))
                .ok_or_else(|| anyhow!("expected event:element-id, got '{raw}'"))
        })
        .collect::<Result<_>>()?;

    let config = RuntimeConfig::load(std::env::var("WEAVE_CONFIG").ok().map(PathBuf::from))
        .context("failed to load runtime config")?;
    let logic_source = fs::read_to_string(&logic_path)
        .with_context(|| format!("failed to read {logic_path}"))?;
    let logic = Logic::from_json(&logic_source).context("failed to decode logic descriptors")?;
    let markup = fs::read_to_string(&markup_path)
        .with_context(|| format!("failed to read {markup_path}"))?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let _guard = rt.enter();

    let shell = format!(
        "<!DOCTYPE html><html><body><div id=\"{}\"></div></body></html>",
        config.app_id
    );
    let browser = Rc::new(HeadlessBrowser::new(&shell));
    let queue = Rc::new(StrategyQueue::new());
    let mut runtime = Runtime::new(
        config,
        browser.clone(),
        queue.clone(),
        Box::new(TreePatcher),
    )?;

    runtime.update_dom(&markup)?;
    runtime.init_logic(&logic, |msg: JsonValue| {
        info!(target = "logic", %msg, "outbound message");
    })?;

    for (event_type, id) in &events {
        match browser.document().element_by_id(id) {
            Some(target) => {
                let outcome = browser.document().dispatch(&target, event_type);
                info!(
                    target = "host",
                    %event_type,
                    %id,
                    default_prevented = outcome.default_prevented,
                    "fired event"
                );
            }
            None => warn!(target = "host", %id, "no element to fire event at"),
        }
    }

    rt.block_on(async {
        let deadline = tokio::time::Instant::now() + Duration::from_millis(run_for);
        loop {
            let ticks = browser.pump();
            let delivered = queue.pump();
            if ticks > 0 || delivered > 0 {
                tracing::debug!(target = "host", ticks, delivered, "pumped");
            }
            if tokio::time::timeout_at(deadline, browser.wait_for_ticks())
                .await
                .is_err()
            {
                break;
            }
        }
    });

    runtime.shutdown();
    info!(target = "host", html = %browser.document().to_html(), "final document");
    Ok(())
}
