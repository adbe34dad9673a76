use std::process::ExitCode;

use dotenvy::dotenv;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use auth_code_harness::{Harness, HarnessConfig, HarnessError, catalog};

const DEFAULT_CONCURRENCY: usize = 4;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "{}=debug,auth_code_harness=debug",
                    env!("CARGO_CRATE_NAME")
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run().await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            e.log();
            ExitCode::from(2)
        }
    }
}

/// Runs the catalog, or only the scenarios whose names contain one of the command line
/// arguments. Returns whether every scenario passed.
async fn run() -> Result<bool, HarnessError> {
    let config = HarnessConfig::from_env()?;
    let concurrency = match std::env::var("HARNESS_CONCURRENCY") {
        Ok(value) => value.parse().map_err(|_| {
            HarnessError::Config(format!("Invalid HARNESS_CONCURRENCY: {value}"))
        })?,
        Err(_) => DEFAULT_CONCURRENCY,
    };

    let filters: Vec<String> = std::env::args().skip(1).collect();
    let scenarios: Vec<_> = catalog(&config)?
        .into_iter()
        .filter(|s| filters.is_empty() || filters.iter().any(|f| s.name.contains(f.as_str())))
        .collect();
    if scenarios.is_empty() {
        return Err(HarnessError::Config(format!(
            "No scenario matches {filters:?}"
        )));
    }

    tracing::info!(
        "Running {} scenario(s) against {} with concurrency {}",
        scenarios.len(),
        config.client_url,
        concurrency
    );
    let harness = Harness::new(config);
    let suite = harness.run_suite(scenarios, concurrency).await;

    for report in &suite.reports {
        match &report.error {
            None => tracing::info!("PASS {} ({:?})", report.name, report.elapsed),
            Some(e) => {
                tracing::error!("FAIL {} ({:?}): {}", report.name, report.elapsed, e);
                if let Some(payload) = e.payload() {
                    tracing::error!("     payload: {}", payload);
                }
            }
        }
    }
    Ok(suite.passed())
}
