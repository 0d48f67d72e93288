#![allow(missing_docs)]

use clap::Parser;
use config::LintOpts;
use dotenvy::dotenv;
use eyre::{Context, Result};
use tracing::info;
use tracing_subscriber::filter::EnvFilter;

fn main() -> Result<()> {
    dotenv().ok();
    let opts = LintOpts::parse();

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let raw = std::fs::read_to_string(&opts.policy_file)
        .wrap_err_with(|| format!("failed to read {}", opts.policy_file.display()))?;
    let json = if opts.strip_comments { policy::strip_comments(&raw) } else { raw };

    let map = policy::parse_document(&json)
        .wrap_err_with(|| format!("{} is not a valid policy document", opts.policy_file.display()))?;

    let mut apns: Vec<_> = map.keys().collect();
    apns.sort();
    for apn in apns {
        let policies = &map[apn];
        println!("{apn}: {} clause(s)", policies.len());
        for policy in policies {
            println!(
                "  {:?}: fallback={} infinite_retries={} unthrottling_events={}",
                policy.error_type(),
                policy.is_fallback(),
                policy.infinite_retries(),
                policy.unthrottling_events().len(),
            );
        }
    }

    info!(file = %opts.policy_file.display(), apns = map.len(), "policy document is valid");
    Ok(())
}
