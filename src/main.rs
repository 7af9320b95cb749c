mod api;
mod client;
mod client_api;
mod codec;
mod config;
mod constants;
mod coordinator;
mod error;
mod inference;
mod params;
mod schedule;
mod simulator;
mod strategy;

use anyhow::{bail, Context};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use crate::client::{ClientId, ClientRegistry, ClientSession};
use crate::codec::{FeatureMapping, RawUserAttributes};
use crate::config::RunConfig;
use crate::coordinator::{spawn_event_logger, Coordinator};
use crate::error::FederationError;
use crate::inference::{predict_rating, LinearRatingModel};
use crate::params::GlobalParameters;
use crate::simulator::SyntheticClient;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    constants::print_banner();
    let args: Vec<String> = std::env::args().collect();
    let cmd = args.get(1).map(|s| s.as_str()).unwrap_or("help");

    match cmd {
        "serve"    => run_serve(&args).await,
        "client"   => run_client(&args).await,
        "simulate" => run_simulate(&args).await,
        "predict"  => run_predict(&args),
        _          => {
            print_help();
            Ok(())
        }
    }
}

fn print_help() {
    println!("fedrec-node — available commands:");
    println!("  serve    [--initial PARAMS.json] [--out PARAMS.json]");
    println!("           coordinator: HTTP API + {} federated rounds", constants::DEFAULT_NUM_ROUNDS);
    println!("  client   <coordinator-url> <listen-addr> <public-url> [seed]");
    println!("           synthetic client served over HTTP, announced to the coordinator");
    println!("  simulate [clients] [seed] [--out PARAMS.json]");
    println!("           in-process run with synthetic clients");
    println!("  predict  <mapping.json> <params.json> <user.json>");
    println!("           encode one user and score it with a trained linear model");
    println!();
    println!("Run parameters come from FEDREC_CONFIG (JSON) and FEDREC_* variables.");
}

/// Value following `--name`, if present.
fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter().position(|a| a == name).and_then(|i| args.get(i + 1)).map(|s| s.as_str())
}

/// Positional arguments after the subcommand, skipping `--flag value` pairs.
fn positional(args: &[String]) -> Vec<&str> {
    let mut out = Vec::new();
    let mut iter = args.iter().skip(2);
    while let Some(a) = iter.next() {
        if a.starts_with("--") {
            iter.next();
        } else {
            out.push(a.as_str());
        }
    }
    out
}

fn save_parameters(params: &GlobalParameters, path: Option<&str>) -> anyhow::Result<()> {
    if let Some(path) = path {
        params.save_json(path).with_context(|| format!("writing {}", path))?;
        log::info!("💾 Parameters written to {}", path);
    }
    Ok(())
}

/// Persist the best model a run ended with, then surface the abort if there was one.
fn conclude(best: Option<&GlobalParameters>, aborted: Option<FederationError>, out: Option<&str>)
    -> anyhow::Result<()> {
    match best {
        Some(params) => {
            save_parameters(params, out)?;
            println!("{}", params);
        }
        None => log::warn!("⚠️ No parameters to keep"),
    }
    match aborted {
        Some(err) => {
            log::error!("❌ Root cause: {}", err.root());
            Err(err.into())
        }
        None => Ok(()),
    }
}

// -----------------------------------------------------------------------------
// serve
// -----------------------------------------------------------------------------

async fn run_serve(args: &[String]) -> anyhow::Result<()> {
    let config = RunConfig::from_env()?;
    log::info!("⚙️ {}", config);

    let initial = match flag(args, "--initial") {
        Some(path) => Some(GlobalParameters::load_json(path)
            .with_context(|| format!("reading initial parameters {}", path))?),
        None => None,
    };

    let registry = ClientRegistry::new();
    let mut coordinator = Coordinator::new(config.clone(), registry.clone(), initial);
    let state = api::AppState {
        registry: registry.clone(),
        status: coordinator.status_handle(),
        client_timeout: config.client_timeout(),
    };
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    log::info!("🌐 Coordinator API on http://{}", listener.local_addr()?);
    let server = tokio::spawn(async move { axum::serve(listener, api::router(state)).await });

    let cancel = coordinator.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::warn!("🛑 Interrupt received, aborting run");
            cancel.cancel();
        }
    });

    log::info!("⏳ Waiting up to {}s for {} clients", config.wait_for_clients_secs, config.min_available_clients);
    let n = registry.wait_for(config.min_available_clients, config.wait_for_clients()).await;
    log::info!("👥 {} clients registered", n);

    let logger = spawn_event_logger(coordinator.subscribe());
    let result = coordinator.run().await;
    let snap = coordinator.snapshot().await;
    log::info!("📌 Final state: {:?} ({}/{} rounds)", coordinator.state(), snap.rounds_completed, snap.num_rounds);
    let (best, aborted) = match result {
        Ok(params) => (Some(params), None),
        Err(err) => (coordinator.parameters().cloned(), Some(err)),
    };
    drop(coordinator);
    let _ = logger.await;
    server.abort();

    conclude(best.as_ref(), aborted, flag(args, "--out"))
}

// -----------------------------------------------------------------------------
// client
// -----------------------------------------------------------------------------

async fn run_client(args: &[String]) -> anyhow::Result<()> {
    let pos = positional(args);
    let (coordinator_url, listen, public) = match pos.as_slice() {
        [c, l, p, ..] => (*c, *l, *p),
        _ => bail!("usage: client <coordinator-url> <listen-addr> <public-url> [seed]"),
    };
    let listen: SocketAddr = listen.parse().with_context(|| format!("listen address `{}`", listen))?;
    let seed: u64 = match pos.get(3) {
        Some(s) => s.parse().with_context(|| format!("seed `{}`", s))?,
        None => rand::random(),
    };

    let id = std::env::var("NODE_ID").map(ClientId::new).unwrap_or_else(|_| ClientId::generate());
    let session: Arc<dyn ClientSession> = Arc::new(SyntheticClient::new(id.clone(), seed));
    let server = tokio::spawn(client_api::serve(session, listen));

    // give the listener a moment before the coordinator can call back
    tokio::time::sleep(Duration::from_millis(200)).await;
    client_api::announce(coordinator_url, &id, public, Duration::from_secs(10)).await
        .map_err(|e| anyhow::anyhow!("announce to {} failed: {}", coordinator_url, e))?;

    server.await??;
    Ok(())
}

// -----------------------------------------------------------------------------
// simulate
// -----------------------------------------------------------------------------

async fn run_simulate(args: &[String]) -> anyhow::Result<()> {
    let pos = positional(args);
    let clients: usize = match pos.first() {
        Some(s) => s.parse().with_context(|| format!("client count `{}`", s))?,
        None => 3,
    };
    let seed: u64 = match pos.get(1) {
        Some(s) => s.parse().with_context(|| format!("seed `{}`", s))?,
        None => 42,
    };
    let config = RunConfig::from_env()?;
    log::info!("🧪 Simulating {} synthetic clients (seed {}): {}", clients, seed, config);

    let report = simulator::run_simulation(config, clients, seed).await?;
    println!("{}", report);
    conclude(report.parameters.as_ref(), report.aborted, flag(args, "--out"))
}

// -----------------------------------------------------------------------------
// predict
// -----------------------------------------------------------------------------

fn run_predict(args: &[String]) -> anyhow::Result<()> {
    let pos = positional(args);
    let (mapping_path, params_path, user_path) = match pos.as_slice() {
        [m, p, u, ..] => (*m, *p, *u),
        _ => bail!("usage: predict <mapping.json> <params.json> <user.json>"),
    };
    let mapping = FeatureMapping::load(mapping_path)
        .with_context(|| format!("loading mapping {}", mapping_path))?;
    let params = GlobalParameters::load_json(params_path)
        .with_context(|| format!("loading parameters {}", params_path))?;
    let model = LinearRatingModel::from_parameters(&params)?;
    let text = std::fs::read_to_string(user_path)
        .with_context(|| format!("reading {}", user_path))?;
    let user: RawUserAttributes = serde_json::from_str(&text)?;

    let (vector, rating) = predict_rating(&user, &mapping, &model)?;

    for (name, value) in vector.named() {
        println!("  {:<24} {:>12.6}", name, value);
    }
    println!("\n  predicted rating: {:.3}", rating);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_skips_flags() {
        let args: Vec<String> = ["fedrec-node", "simulate", "4", "--out", "p.json", "9"]
            .iter().map(|s| s.to_string()).collect();
        assert_eq!(positional(&args), vec!["4", "9"]);
        assert_eq!(flag(&args, "--out"), Some("p.json"));
        assert_eq!(flag(&args, "--initial"), None);
    }

    #[test]
    fn test_aborted_run_still_writes_last_good_parameters() {
        let path = std::env::temp_dir().join(format!("fedrec-conclude-{}.json", std::process::id()));
        let path_str = path.to_str().unwrap();
        let last_good = GlobalParameters::from_vecs(vec![vec![0.5, -1.5], vec![0.25]]);
        let aborted = FederationError::Aborted {
            last_completed_round: Some(3),
            source: Box::new(FederationError::QuorumNotMet { round_index: 4, successes: 1, required: 2 }),
        };

        let err = conclude(Some(&last_good), Some(aborted), Some(path_str)).unwrap_err();
        assert!(err.to_string().contains("round"));
        assert_eq!(GlobalParameters::load_json(path_str).unwrap(), last_good);
        std::fs::remove_file(&path).unwrap();

        assert!(conclude(Some(&last_good), None, None).is_ok());
    }
}
