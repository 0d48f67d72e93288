//! Command-line configuration for the policy tools.
use std::path::PathBuf;

use clap::Parser;

/// Options for the policy document linter.
#[derive(Debug, Clone, Parser)]
#[command(about = "Validate an ePDG error-policy document")]
pub struct LintOpts {
    /// Path of the policy document to validate
    #[clap(env = "POLICY_FILE")]
    pub policy_file: PathBuf,
    /// Treat the document as a default asset and strip `#` comment lines
    /// before parsing
    #[clap(long, env = "POLICY_STRIP_COMMENTS", default_value_t = false)]
    pub strip_comments: bool,
}

/// Options for the retry simulator.
#[derive(Debug, Clone, Parser)]
#[command(about = "Replay an error sequence against an ePDG error-policy document")]
pub struct SimOpts {
    /// Carrier policy document to install; built-in defaults apply when
    /// omitted
    #[clap(long, env = "POLICY_FILE")]
    pub policy_file: Option<PathBuf>,
    /// APN to report errors against
    #[clap(long, env = "SIM_APN", default_value = "ims")]
    pub apn: String,
    /// Error to replay: NO_ERROR, a generic detail token, or ike:<code>
    #[clap(long, env = "SIM_ERROR", default_value = "IO_EXCEPTION")]
    pub error: String,
    /// Number of attempts to replay
    #[clap(long, env = "SIM_ATTEMPTS", default_value = "8")]
    pub attempts: u32,
    /// Number of discovered ePDG FQDNs, for rotation display
    #[clap(long, env = "SIM_FQDNS", default_value = "1")]
    pub num_fqdns: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_opts_defaults() {
        let opts = SimOpts::parse_from(["retry-sim"]);
        assert_eq!(opts.apn, "ims");
        assert_eq!(opts.error, "IO_EXCEPTION");
        assert_eq!(opts.attempts, 8);
        assert_eq!(opts.num_fqdns, 1);
        assert!(opts.policy_file.is_none());
    }

    #[test]
    fn lint_opts_take_a_positional_path() {
        let opts = LintOpts::parse_from(["policy-lint", "carrier.json", "--strip-comments"]);
        assert_eq!(opts.policy_file, PathBuf::from("carrier.json"));
        assert!(opts.strip_comments);
    }
}
