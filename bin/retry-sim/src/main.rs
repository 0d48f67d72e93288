#![allow(missing_docs)]

use clap::Parser;
use config::SimOpts;
use dotenvy::dotenv;
use eyre::{Context, Result, bail};
use throttle::RetryThrottle;
use tracing_subscriber::filter::EnvFilter;
use types::TunnelError;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    let opts = SimOpts::parse();

    tracing_subscriber::fmt()
        .with_target(true)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let error = parse_error(&opts.error)?;
    let throttle = RetryThrottle::new(0);
    if let Some(path) = &opts.policy_file {
        let json = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read {}", path.display()))?;
        throttle.update_carrier_policies(&json)?;
    }

    println!("replaying {error} against apn {} ({} attempts)", opts.apn, opts.attempts);
    for attempt in 0..opts.attempts {
        match throttle.report(&opts.apn, error) {
            None => println!("attempt {attempt}: no error, retry state cleared"),
            Some(wait_secs) => {
                let fqdn = throttle
                    .current_fqdn_index(opts.num_fqdns)
                    .map_or("-".to_owned(), |index| index.to_string());
                println!(
                    "attempt {attempt}: wait {wait_secs}s, fqdn {fqdn}, initial_attach={}, cause={:?}",
                    throttle.should_retry_with_initial_attach(&opts.apn),
                    throttle.public_cause(&opts.apn),
                );
            }
        }
    }

    throttle.shutdown().await;
    Ok(())
}

/// Parses the error spelling accepted on the command line: `NO_ERROR`,
/// `ike:<notify code>`, a generic detail token, or one of the non-generic
/// error names.
fn parse_error(spec: &str) -> Result<TunnelError> {
    if let Some(code) = spec.strip_prefix("ike:") {
        let code = code.parse().wrap_err_with(|| format!("bad notify code in {spec:?}"))?;
        return Ok(TunnelError::IkeProtocol { code });
    }
    Ok(match spec {
        "NO_ERROR" => TunnelError::NoError,
        "IO_EXCEPTION" => TunnelError::IkeIo,
        "TIMEOUT_EXCEPTION" => TunnelError::Timeout,
        "SERVER_SELECTION_FAILED" => TunnelError::ServerSelectionFailed,
        "TUNNEL_TRANSFORM_FAILED" => TunnelError::TunnelTransformFailed,
        "IKE_NETWORK_LOST_EXCEPTION" => TunnelError::IkeNetworkLost,
        "EPDG_ADDRESS_ONLY_IPV4_ALLOWED" => TunnelError::OnlyIpv4Allowed,
        "EPDG_ADDRESS_ONLY_IPV6_ALLOWED" => TunnelError::OnlyIpv6Allowed,
        "IKE_INIT_TIMEOUT" => TunnelError::IkeInitTimeout,
        "IKE_MOBILITY_TIMEOUT" => TunnelError::IkeMobilityTimeout,
        "IKE_DPD_TIMEOUT" => TunnelError::IkeDpdTimeout,
        "SIM_CARD_CHANGED" => TunnelError::SimCardChanged,
        "TUNNEL_NOT_FOUND" => TunnelError::TunnelNotFound,
        "IKE_SESSION_CLOSED_BEFORE_CHILD_OPENED" => {
            TunnelError::IkeSessionClosedBeforeChildOpened
        }
        other => bail!("unknown error spelling {other:?}"),
    })
}
