/*
 * This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

use anyhow::Context;
use colored::Colorize;
use schedcheck::{
    clap_args::{self, Commands},
    config::{Config, RunSettings},
    control_plane::portoctl::PortoCtl,
    filter_plans,
    host::{HostCapabilities, SkipReason},
    orchestrator::Orchestrator,
    report,
    scenario::canonical_suite,
};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{info, subscriber::set_global_default, warn, Subscriber};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "./schedcheck.toml";

fn get_subscriber(env_filter: String) -> impl Subscriber + Sync + Send {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(env_filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .finish()
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::try_from_path(path),
        None if Path::new(DEFAULT_CONFIG).exists() => Config::try_from_path(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

/// Loads the config and probes the host.
fn setup(path: Option<&Path>) -> anyhow::Result<(Config, HostCapabilities, RunSettings)> {
    let config = load_config(path)?;
    let host = HostCapabilities::probe(&config.host.rt_accounting_path);
    let settings = config.run_settings(&host)?;
    Ok((config, host, settings))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = clap_args::parse();

    let level = if args.verbose { "debug" } else { "info" };
    set_global_default(get_subscriber(level.to_string()))
        .context("Failed to set global default subscriber")?;

    match args.command {
        Commands::Init => {
            Config::write_example_to_file(Path::new(DEFAULT_CONFIG))
                .context(format!("Unable to write {}", DEFAULT_CONFIG))?;
            println!("{}", format!("wrote {}", DEFAULT_CONFIG).green());
            Ok(())
        }

        Commands::List => {
            let (_, host, settings) = setup(args.config.as_deref())?;
            let plans = canonical_suite(host.cpu_count, settings.limit_share);
            for plan in &plans {
                match host.skip_reason(plan) {
                    None => println!("{} - {}", plan.name.green(), plan.description),
                    Some(reason) => println!(
                        "{} - {} {}",
                        plan.name.yellow(),
                        plan.description,
                        format!("({})", reason).bright_black()
                    ),
                }
            }
            Ok(())
        }

        Commands::Run { only } => {
            let (config, host, settings) = setup(args.config.as_deref())?;
            let plans = filter_plans(canonical_suite(host.cpu_count, settings.limit_share), &only);
            if plans.is_empty() {
                anyhow::bail!("No scenario matches {}", only.join(", "));
            }

            println!(
                "Available cores: {}, using EPS {}, run duration {} ms",
                host.cpu_count,
                settings.eps_base,
                settings.duration.as_millis()
            );
            if let Some(cpu_name) = &host.cpu_name {
                info!("cpu: {}", cpu_name);
            }
            if !host.rt_accounting {
                warn!("{}", SkipReason::NoRealtimeAccounting);
            }

            let cancel = CancellationToken::new();
            let ctrl_c_token = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("interrupted, tearing down containers");
                    ctrl_c_token.cancel();
                }
            });

            let client = Arc::new(PortoCtl::new(
                &config.control_plane.portoctl,
                config.request_timeout(),
            ));
            let orchestrator = Orchestrator::new(client, host, settings).with_cancellation(cancel);
            info!("run id {}", orchestrator.run_id());

            let suite = orchestrator.run_suite(&plans).await;
            report::print_summary(&suite);

            match suite.failure {
                None => Ok(()),
                Some(err) => Err(err.into()),
            }
        }
    }
}
