use std::{collections::HashMap, sync::Arc};

use eyre::{Context, Result, bail, eyre};
use rand::Rng;
use serde::Deserialize;
use types::{GenericDetail, UnthrottleEvent};

use crate::policy::{ErrorDetail, ErrorPolicy, PolicyType, RetryInterval};

/// Compiled policies keyed by trimmed APN name (`*` for the global APN).
pub type ApnPolicyMap = HashMap<String, Vec<Arc<ErrorPolicy>>>;

/// Raw top-level document entry, one per APN.
#[derive(Debug, Deserialize)]
struct ApnEntry {
    #[serde(rename = "ApnName")]
    apn_name: String,
    #[serde(rename = "ErrorTypes")]
    error_types: Vec<ClauseEntry>,
}

/// Raw error-type clause as it appears in a document.
#[derive(Debug, Deserialize)]
struct ClauseEntry {
    #[serde(rename = "ErrorType")]
    error_type: String,
    #[serde(rename = "ErrorDetails")]
    error_details: Vec<String>,
    #[serde(rename = "RetryArray", default)]
    retry_array: Vec<String>,
    #[serde(rename = "UnthrottlingEvents", default)]
    unthrottling_events: Vec<String>,
    #[serde(rename = "NumAttemptsPerFqdn")]
    num_attempts_per_fqdn: Option<u32>,
    #[serde(rename = "HandoverAttemptCount")]
    handover_attempt_count: Option<u32>,
}

/// Strips comment lines from the default policy asset: any line whose first
/// non-whitespace character is `#`. Carrier documents are plain JSON and do
/// not go through this.
pub fn strip_comments(raw: &str) -> String {
    raw.lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses and compiles a policy document. Any malformed token rejects the
/// whole document.
pub fn parse_document(json: &str) -> Result<ApnPolicyMap> {
    let entries: Vec<ApnEntry> =
        serde_json::from_str(json).wrap_err("policy document is not valid JSON")?;

    let mut map = ApnPolicyMap::new();
    for entry in entries {
        let apn = entry.apn_name.trim().to_owned();
        if apn.is_empty() {
            bail!("policy document contains an empty ApnName");
        }
        let mut policies = Vec::with_capacity(entry.error_types.len());
        for clause in entry.error_types {
            policies.push(Arc::new(
                compile_clause(clause)
                    .wrap_err_with(|| format!("invalid policy clause for apn {apn}"))?,
            ));
        }
        map.insert(apn, policies);
    }
    Ok(map)
}

fn compile_clause(clause: ClauseEntry) -> Result<ErrorPolicy> {
    let error_type = match clause.error_type.as_str() {
        "*" => PolicyType::Fallback,
        "GENERIC_ERROR_TYPE" => PolicyType::Generic,
        "IKE_PROTOCOL_ERROR_TYPE" => PolicyType::IkeProtocol,
        other => bail!("unknown ErrorType {other:?}"),
    };

    if clause.handover_attempt_count.is_some() && error_type != PolicyType::IkeProtocol {
        bail!("HandoverAttemptCount is only valid on IKE_PROTOCOL_ERROR_TYPE clauses");
    }
    if clause.num_attempts_per_fqdn == Some(0) {
        bail!("NumAttemptsPerFqdn must be positive");
    }
    if clause.error_details.is_empty() {
        bail!("ErrorDetails must not be empty");
    }

    let error_details = clause
        .error_details
        .iter()
        .map(|token| parse_detail(error_type, token))
        .collect::<Result<Vec<_>>>()?;

    let retry_array = parse_retry_array(&clause.retry_array)?;

    let unthrottling_events = clause
        .unthrottling_events
        .iter()
        .map(|name| {
            UnthrottleEvent::from_token(name)
                .ok_or_else(|| eyre!("unknown unthrottling event {name:?}"))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(ErrorPolicy {
        error_type,
        error_details,
        retry_array,
        unthrottling_events,
        num_attempts_per_fqdn: clause.num_attempts_per_fqdn,
        handover_attempt_count: clause.handover_attempt_count,
    })
}

fn parse_detail(error_type: PolicyType, token: &str) -> Result<ErrorDetail> {
    let token = token.trim();
    if token == "*" {
        return Ok(ErrorDetail::Any);
    }
    match error_type {
        PolicyType::Fallback => bail!("fallback clauses only accept the wildcard detail"),
        PolicyType::Generic => GenericDetail::from_token(token)
            .map(ErrorDetail::Generic)
            .ok_or_else(|| eyre!("unknown generic error detail {token:?}")),
        PolicyType::IkeProtocol => parse_ike_detail(token),
    }
}

fn parse_ike_detail(token: &str) -> Result<ErrorDetail> {
    if let Some((min, max)) = token.split_once('-') {
        let min: u32 = min
            .trim()
            .parse()
            .wrap_err_with(|| format!("bad range start in {token:?}"))?;
        let max: u32 = max
            .trim()
            .parse()
            .wrap_err_with(|| format!("bad range end in {token:?}"))?;
        if min > max {
            bail!("inverted range {token:?}");
        }
        return Ok(ErrorDetail::IkeCodeRange { min, max });
    }
    token
        .parse()
        .map(ErrorDetail::IkeCode)
        .wrap_err_with(|| format!("bad IKE protocol code {token:?}"))
}

/// Parses a retry array, drawing each `B+rS` entry once. The `-1` marker is
/// only legal as the last element of an array with at least two entries.
fn parse_retry_array(tokens: &[String]) -> Result<Vec<RetryInterval>> {
    let mut array = Vec::with_capacity(tokens.len());
    for (position, token) in tokens.iter().enumerate() {
        let token = token.trim();
        let interval = if token == "-1" {
            if position + 1 != tokens.len() || tokens.len() < 2 {
                bail!("-1 is only valid as the last entry of a retry array");
            }
            RetryInterval::RepeatLast
        } else if let Some((base, span)) = token.split_once("+r") {
            let base: u64 = base
                .trim()
                .parse()
                .wrap_err_with(|| format!("bad randomized retry entry {token:?}"))?;
            let span: u64 = span
                .trim()
                .parse()
                .wrap_err_with(|| format!("bad randomized retry entry {token:?}"))?;
            // One draw per slot, at parse time. Waits stay in [base, base + span).
            let jitter = if span == 0 { 0 } else { rand::thread_rng().gen_range(0..span) };
            RetryInterval::Secs(base + jitter)
        } else {
            token
                .parse()
                .map(RetryInterval::Secs)
                .wrap_err_with(|| format!("bad retry entry {token:?}"))?
        };
        array.push(interval);
    }
    Ok(array)
}

#[cfg(test)]
mod tests {
    use super::*;
    use types::TunnelError;

    const DOC: &str = r#"[
        {
            "ApnName": "ims",
            "ErrorTypes": [
                {
                    "ErrorType": "IKE_PROTOCOL_ERROR_TYPE",
                    "ErrorDetails": ["24", "9000-9010"],
                    "RetryArray": ["0", "2", "5", "-1"],
                    "UnthrottlingEvents": ["WIFI_CALLING_DISABLE_EVENT"],
                    "HandoverAttemptCount": 3
                },
                {
                    "ErrorType": "GENERIC_ERROR_TYPE",
                    "ErrorDetails": ["IO_EXCEPTION"],
                    "RetryArray": ["10+r20", "30"],
                    "UnthrottlingEvents": []
                }
            ]
        }
    ]"#;

    #[test]
    fn compiles_a_well_formed_document() {
        let map = parse_document(DOC).unwrap();
        let policies = &map["ims"];
        assert_eq!(policies.len(), 2);

        let ike = &policies[0];
        assert_eq!(ike.error_type(), PolicyType::IkeProtocol);
        assert_eq!(ike.handover_attempt_count(), Some(3));
        assert!(ike.matches(&TunnelError::IkeProtocol { code: 9005 }));
        assert!(ike.infinite_retries());

        let generic = &policies[1];
        assert!(generic.matches(&TunnelError::IkeIo));
        // The randomized draw is baked in at parse time.
        let first = generic.wait_secs(0);
        assert!((10..30).contains(&first), "draw {first} outside [10, 30)");
        assert_eq!(first, generic.wait_secs(0));
    }

    #[test]
    fn trims_apn_names() {
        let doc = r#"[{"ApnName": "  mms  ", "ErrorTypes": [
            {"ErrorType": "*", "ErrorDetails": ["*"], "RetryArray": ["5", "-1"]}
        ]}]"#;
        let map = parse_document(doc).unwrap();
        assert!(map.contains_key("mms"));
    }

    #[test]
    fn rejects_unknown_error_type() {
        let doc = r#"[{"ApnName": "*", "ErrorTypes": [
            {"ErrorType": "SOME_ERROR_TYPE", "ErrorDetails": ["*"], "RetryArray": ["5"]}
        ]}]"#;
        assert!(parse_document(doc).is_err());
    }

    #[test]
    fn rejects_misplaced_repeat_marker() {
        for array in [r#"["-1"]"#, r#"["-1", "5"]"#, r#"["5", "-1", "5"]"#] {
            let doc = format!(
                r#"[{{"ApnName": "*", "ErrorTypes": [
                    {{"ErrorType": "*", "ErrorDetails": ["*"], "RetryArray": {array}}}
                ]}}]"#
            );
            assert!(parse_document(&doc).is_err(), "accepted {array}");
        }
    }

    #[test]
    fn rejects_inverted_ranges() {
        let doc = r#"[{"ApnName": "*", "ErrorTypes": [
            {"ErrorType": "IKE_PROTOCOL_ERROR_TYPE", "ErrorDetails": ["9010-9000"], "RetryArray": ["5"]}
        ]}]"#;
        assert!(parse_document(doc).is_err());
    }

    #[test]
    fn rejects_handover_count_on_generic_clause() {
        let doc = r#"[{"ApnName": "*", "ErrorTypes": [
            {"ErrorType": "GENERIC_ERROR_TYPE", "ErrorDetails": ["IO_EXCEPTION"],
             "RetryArray": ["5"], "HandoverAttemptCount": 2}
        ]}]"#;
        assert!(parse_document(doc).is_err());
    }

    #[test]
    fn rejects_unknown_generic_detail_and_event() {
        let doc = r#"[{"ApnName": "*", "ErrorTypes": [
            {"ErrorType": "GENERIC_ERROR_TYPE", "ErrorDetails": ["NOT_A_DETAIL"], "RetryArray": ["5"]}
        ]}]"#;
        assert!(parse_document(doc).is_err());

        let doc = r#"[{"ApnName": "*", "ErrorTypes": [
            {"ErrorType": "*", "ErrorDetails": ["*"], "RetryArray": ["5"],
             "UnthrottlingEvents": ["NOT_AN_EVENT"]}
        ]}]"#;
        assert!(parse_document(doc).is_err());
    }

    #[test]
    fn strips_hash_comment_lines() {
        let raw = "# header\n  # indented comment\n[\n# inner\n]\n";
        assert_eq!(strip_comments(raw), "[\n]");
    }
}
