use super::*;
use std::time::Duration;

use async_trait::async_trait;
use policy::PolicySet;
use tokio::{sync::mpsc::UnboundedSender, time::timeout};

const CARRIER: &str = r#"[
    {
        "ApnName": "ims",
        "ErrorTypes": [
            {
                "ErrorType": "IKE_PROTOCOL_ERROR_TYPE",
                "ErrorDetails": ["9000-9010"],
                "RetryArray": ["0", "2", "5", "-1"],
                "UnthrottlingEvents": ["WIFI_CALLING_DISABLE_EVENT"],
                "HandoverAttemptCount": 3
            },
            {
                "ErrorType": "GENERIC_ERROR_TYPE",
                "ErrorDetails": ["IO_EXCEPTION"],
                "RetryArray": ["0", "0", "0"],
                "UnthrottlingEvents": ["APM_ENABLE_EVENT"]
            }
        ]
    }
]"#;

/// Notifier that forwards unthrottled APNs to a channel.
struct ChannelNotifier(UnboundedSender<(SlotId, String)>);

#[async_trait]
impl UnthrottleNotifier for ChannelNotifier {
    async fn apn_unthrottled(&self, slot: SlotId, apn: &str) {
        let _ = self.0.send((slot, apn.to_owned()));
    }
}

/// Event source that records every registration change.
#[derive(Default)]
struct RecordingSource(std::sync::Mutex<Vec<(bool, UnthrottleEvent)>>);

impl EventSource for &'static RecordingSource {
    fn subscribe(&self, event: UnthrottleEvent) {
        self.0.lock().expect("lock poisoned").push((true, event));
    }

    fn unsubscribe(&self, event: UnthrottleEvent) {
        self.0.lock().expect("lock poisoned").push((false, event));
    }
}

fn throttle_with_carrier() -> Arc<RetryThrottle> {
    let throttle = RetryThrottle::with_parts(
        0,
        PolicySet::with_defaults("[]").expect("empty defaults"),
        Box::new(NoopNotifier),
        Box::new(NoopEventSource),
    );
    throttle.update_carrier_policies(CARRIER).expect("carrier document");
    throttle
}

#[tokio::test]
async fn report_walks_the_retry_array() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    assert_eq!(throttle.report("ims", error), Some(0));
    assert_eq!(throttle.report("ims", error), Some(2));
    assert_eq!(throttle.report("ims", error), Some(5));
    assert_eq!(throttle.report("ims", error), Some(5));
    throttle.shutdown().await;
}

#[tokio::test]
async fn no_error_clears_state_and_returns_none() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    throttle.report("ims", error);
    throttle.report("ims", error);
    assert!(throttle.remaining_wait("ims").is_some());

    assert_eq!(throttle.report("ims", TunnelError::NoError), None);
    assert!(throttle.remaining_wait("ims").is_none());
    assert_eq!(throttle.last_error("ims"), TunnelError::NoError);
    assert_eq!(throttle.public_cause("ims"), FailCause::None);
    assert!(throttle.can_bring_up("ims"));

    // The retry-index chain restarted.
    assert_eq!(throttle.report("ims", error), Some(0));
    throttle.shutdown().await;
}

#[tokio::test]
async fn throttled_apn_blocks_bring_up_until_wait_elapses() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    throttle.report("ims", error);
    // Second report waits 2s.
    throttle.report("ims", error);
    assert!(!throttle.can_bring_up("ims"));
    let remaining = throttle.remaining_wait("ims").expect("stored action");
    assert!(remaining <= Duration::from_secs(2) && remaining > Duration::from_secs(1));
    // Other APNs are unaffected.
    assert!(throttle.can_bring_up("mms"));
    throttle.shutdown().await;
}

#[tokio::test]
async fn zero_wait_arrays_do_not_block() {
    let throttle = throttle_with_carrier();
    assert_eq!(throttle.report("ims", TunnelError::IkeIo), Some(0));
    assert!(throttle.can_bring_up("ims"));
    throttle.shutdown().await;
}

#[tokio::test]
async fn initial_attach_escalation_after_handover_attempts() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9002 };
    throttle.report("ims", error);
    throttle.report("ims", error);
    assert!(!throttle.should_retry_with_initial_attach("ims"));
    throttle.report("ims", error);
    assert!(throttle.should_retry_with_initial_attach("ims"));
    throttle.shutdown().await;
}

#[tokio::test]
async fn backoff_report_overrides_the_policy_wait() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    assert_eq!(throttle.report_with_backoff("ims", error, 30), Some(30));
    let remaining = throttle.remaining_wait("ims").expect("stored action");
    assert!(remaining > Duration::from_secs(29));
    assert!(!throttle.can_bring_up("ims"));
    throttle.shutdown().await;
}

#[tokio::test]
async fn public_cause_reflects_the_stored_error() {
    let throttle = throttle_with_carrier();
    throttle.report("ims", TunnelError::IkeProtocol { code: 9002 });
    assert_eq!(throttle.public_cause("ims"), FailCause::NoApnSubscription);
    assert_eq!(throttle.most_recent_public_cause(), FailCause::NoApnSubscription);
    // Queries for APNs without state are stale, not errors.
    assert_eq!(throttle.public_cause("mms"), FailCause::None);
    throttle.shutdown().await;
}

#[tokio::test]
async fn fqdn_index_uses_the_most_recent_apn() {
    let doc = r#"[
        {
            "ApnName": "ims",
            "ErrorTypes": [
                {
                    "ErrorType": "GENERIC_ERROR_TYPE",
                    "ErrorDetails": ["IO_EXCEPTION"],
                    "RetryArray": ["0", "0", "0", "0", "0"],
                    "NumAttemptsPerFqdn": 2
                }
            ]
        }
    ]"#;
    let throttle = RetryThrottle::with_parts(
        0,
        PolicySet::with_defaults("[]").expect("empty defaults"),
        Box::new(NoopNotifier),
        Box::new(NoopEventSource),
    );
    throttle.update_carrier_policies(doc).expect("carrier document");

    let mut indices = Vec::new();
    for _ in 0..5 {
        throttle.report("ims", TunnelError::IkeIo);
        indices.push(throttle.current_fqdn_index(3).expect("rotation configured"));
    }
    assert_eq!(indices, [0, 1, 1, 2, 2]);

    // "mms" resolves to the implicit fallback, which has no rotation; the
    // query follows the most recent report, not any particular APN.
    throttle.report("mms", TunnelError::IkeIo);
    assert_eq!(throttle.current_fqdn_index(3), None);
    throttle.shutdown().await;
}

#[tokio::test]
async fn unthrottle_event_clears_state_and_notifies() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let throttle = RetryThrottle::with_parts(
        2,
        PolicySet::with_defaults("[]").expect("empty defaults"),
        Box::new(ChannelNotifier(tx)),
        Box::new(NoopEventSource),
    );
    throttle.update_carrier_policies(CARRIER).expect("carrier document");

    let error = TunnelError::IkeProtocol { code: 9003 };
    throttle.report("ims", error);
    throttle.report("ims", error);
    assert!(!throttle.can_bring_up("ims"));

    throttle
        .event_sender()
        .send(UnthrottleEvent::WifiCallingDisable)
        .expect("consumer alive");
    let (slot, apn) = timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("notification within timeout")
        .expect("channel open");
    assert_eq!((slot, apn.as_str()), (2, "ims"));
    assert!(throttle.can_bring_up("ims"));

    // The chain was dropped with the action.
    assert_eq!(throttle.report("ims", error), Some(0));
    throttle.shutdown().await;
}

#[tokio::test]
async fn events_not_listed_by_the_policy_change_nothing() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    throttle.report("ims", error);
    throttle.report("ims", error);

    // APM_ENABLE_EVENT is registered (the generic clause lists it) but the
    // stored action's policy does not.
    throttle.event_sender().send(UnthrottleEvent::ApmEnable).expect("consumer alive");
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!throttle.can_bring_up("ims"));
    assert_eq!(throttle.report("ims", error), Some(5));
    throttle.shutdown().await;
}

#[tokio::test]
async fn carrier_config_event_clears_every_store() {
    let throttle = throttle_with_carrier();
    throttle.report("ims", TunnelError::IkeProtocol { code: 9003 });
    throttle.report("ims", TunnelError::IkeProtocol { code: 9003 });
    throttle.report("mms", TunnelError::TunnelNotFound);

    throttle
        .event_sender()
        .send(UnthrottleEvent::CarrierConfigChanged)
        .expect("consumer alive");
    timeout(Duration::from_secs(5), async {
        while !throttle.can_bring_up("ims") {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stores cleared within timeout");

    assert!(throttle.remaining_wait("ims").is_none());
    assert!(throttle.remaining_wait("mms").is_none());
    // No residual retry index after the clear.
    assert_eq!(throttle.report("ims", TunnelError::IkeProtocol { code: 9003 }), Some(0));
    throttle.shutdown().await;
}

#[tokio::test]
async fn malformed_carrier_document_keeps_previous_policies() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    assert_eq!(throttle.report("ims", error), Some(0));

    assert!(throttle.update_carrier_policies("{ not json").is_err());
    assert!(throttle.update_carrier_policies(r#"[{"ApnName": "ims", "ErrorTypes": [
        {"ErrorType": "*", "ErrorDetails": ["*"], "RetryArray": ["-1", "5"]}
    ]}]"#).is_err());

    // The old carrier policies still resolve, and stored state survived the
    // rejected reloads.
    assert_eq!(throttle.report("ims", error), Some(2));
    throttle.shutdown().await;
}

#[tokio::test]
async fn successful_reload_clears_state_and_stats() {
    let throttle = throttle_with_carrier();
    let error = TunnelError::IkeProtocol { code: 9003 };
    throttle.report("ims", error);
    throttle.report("ims", error);
    assert_eq!(throttle.error_count("ims", &error), 2);

    throttle.update_carrier_policies(CARRIER).expect("carrier document");
    assert!(throttle.remaining_wait("ims").is_none());
    assert_eq!(throttle.error_count("ims", &error), 0);
    assert_eq!(throttle.report("ims", error), Some(0));
    throttle.shutdown().await;
}

#[tokio::test]
async fn registrations_follow_the_installed_policies() {
    static SOURCE: RecordingSource = RecordingSource(std::sync::Mutex::new(Vec::new()));

    let throttle = RetryThrottle::with_parts(
        0,
        PolicySet::with_defaults("[]").expect("empty defaults"),
        Box::new(NoopNotifier),
        Box::new(&SOURCE),
    );
    {
        let log = SOURCE.0.lock().expect("lock poisoned");
        assert_eq!(log.as_slice(), [(true, UnthrottleEvent::CarrierConfigChanged)]);
    }

    throttle.update_carrier_policies(CARRIER).expect("carrier document");
    {
        let log = SOURCE.0.lock().expect("lock poisoned");
        let subscribed: Vec<_> =
            log.iter().filter(|(added, _)| *added).map(|(_, e)| *e).collect();
        assert!(subscribed.contains(&UnthrottleEvent::WifiCallingDisable));
        assert!(subscribed.contains(&UnthrottleEvent::ApmEnable));
    }

    // Dropping carrier policies unsubscribes what only they referenced.
    throttle.clear_carrier_policies();
    {
        let log = SOURCE.0.lock().expect("lock poisoned");
        let unsubscribed: Vec<_> =
            log.iter().filter(|(added, _)| !*added).map(|(_, e)| *e).collect();
        assert!(unsubscribed.contains(&UnthrottleEvent::WifiCallingDisable));
        assert!(unsubscribed.contains(&UnthrottleEvent::ApmEnable));
        assert!(!unsubscribed.contains(&UnthrottleEvent::CarrierConfigChanged));
    }
    throttle.shutdown().await;
}

#[tokio::test]
async fn shutdown_stops_the_consumer() {
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
    let throttle = RetryThrottle::with_parts(
        0,
        PolicySet::with_defaults("[]").expect("empty defaults"),
        Box::new(ChannelNotifier(tx)),
        Box::new(NoopEventSource),
    );
    throttle.update_carrier_policies(CARRIER).expect("carrier document");
    throttle.report("ims", TunnelError::IkeProtocol { code: 9003 });
    throttle.shutdown().await;

    // Events after shutdown are discarded, not applied.
    let _ = throttle.event_sender().send(UnthrottleEvent::WifiCallingDisable);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(rx.try_recv().is_err());
    assert!(throttle.remaining_wait("ims").is_some());
}
