use super::fake::{FakeTransport, Reply};
use crate::nat::filtering::{probe_candidate, probe_filtering, FilteringTimeouts};
use crate::nat::stun::ATTR_CHANGE_REQUEST;
use crate::nat::{FilteringBehavior, ProbeError};
use std::time::Duration;
use tokio_test::{assert_err, assert_ok};

const CANDIDATE_1: &str = "192.0.2.10:3478";
const CANDIDATE_2: &str = "192.0.2.20:3478";
const ALTERNATE_2: &str = "192.0.2.21:3479";

fn candidates(servers: &[&str]) -> Vec<String> {
    servers.iter().map(|s| s.to_string()).collect()
}

#[tokio::test(start_paused = true)]
async fn test_change_request_timeout_is_address_dependent() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2), Reply::Silent],
    );

    let behavior = assert_ok!(
        probe_candidate(&transport, CANDIDATE_2, FilteringTimeouts::default()).await
    );
    assert_eq!(behavior, FilteringBehavior::AddressDependent);
}

#[tokio::test(start_paused = true)]
async fn test_reply_from_other_ip_is_endpoint_independent() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![
            Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2),
            Reply::mapped_from(ALTERNATE_2, "203.0.113.10:4000"),
        ],
    );

    let behavior = assert_ok!(
        probe_candidate(&transport, CANDIDATE_2, FilteringTimeouts::default()).await
    );
    assert_eq!(behavior, FilteringBehavior::EndpointIndependent);
}

#[tokio::test(start_paused = true)]
async fn test_reply_from_same_ip_is_address_dependent() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![
            Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2),
            // Same IP, different port: the server ignored the IP change
            Reply::mapped_from("192.0.2.20:3479", "203.0.113.10:4000"),
        ],
    );

    let behavior = assert_ok!(
        probe_candidate(&transport, CANDIDATE_2, FilteringTimeouts::default()).await
    );
    assert_eq!(behavior, FilteringBehavior::AddressDependent);
}

#[tokio::test(start_paused = true)]
async fn test_undecodable_reply_is_address_dependent() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2), Reply::Garbage],
    );

    let behavior = assert_ok!(
        probe_candidate(&transport, CANDIDATE_2, FilteringTimeouts::default()).await
    );
    assert_eq!(behavior, FilteringBehavior::AddressDependent);
}

#[tokio::test(start_paused = true)]
async fn test_receive_error_is_address_dependent() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2), Reply::Error],
    );

    let behavior = assert_ok!(
        probe_candidate(&transport, CANDIDATE_2, FilteringTimeouts::default()).await
    );
    assert_eq!(behavior, FilteringBehavior::AddressDependent);
}

#[tokio::test(start_paused = true)]
async fn test_missing_other_address_disqualifies() {
    let transport = FakeTransport::new();
    transport.script(CANDIDATE_1, vec![Reply::mapped("203.0.113.10:4000")]);

    let result = probe_candidate(&transport, CANDIDATE_1, FilteringTimeouts::default()).await;
    assert!(matches!(result, Err(ProbeError::MissingAttribute("OTHER-ADDRESS"))));
    assert_eq!(
        transport.requests_to(CANDIDATE_1).len(),
        1,
        "No CHANGE-REQUEST after disqualification"
    );
}

#[tokio::test(start_paused = true)]
async fn test_silent_first_probe_disqualifies() {
    let transport = FakeTransport::new();
    transport.script(CANDIDATE_1, vec![Reply::Silent]);

    let result = probe_candidate(&transport, CANDIDATE_1, FilteringTimeouts::default()).await;
    assert!(matches!(result, Err(ProbeError::Timeout)));
}

#[tokio::test(start_paused = true)]
async fn test_unresolvable_candidate_disqualifies() {
    let transport = FakeTransport::new();

    assert_err!(probe_candidate(&transport, "not-a-host", FilteringTimeouts::default()).await);
    assert_eq!(transport.bind_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_change_request_asks_for_ip_and_port() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2), Reply::Silent],
    );

    probe_candidate(&transport, CANDIDATE_2, FilteringTimeouts::default())
        .await
        .unwrap();

    let requests = transport.requests_to(CANDIDATE_2);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].len(), 20);

    let second = &requests[1];
    assert_eq!(&second[20..22], &ATTR_CHANGE_REQUEST.to_be_bytes());
    assert_eq!(&second[24..28], &[0, 0, 0, 0x06]);
}

#[tokio::test(start_paused = true)]
async fn test_change_request_uses_secondary_timeout() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_2,
        vec![Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2), Reply::Silent],
    );
    let timeouts = FilteringTimeouts::default();

    let start = tokio::time::Instant::now();
    probe_candidate(&transport, CANDIDATE_2, timeouts).await.unwrap();

    let elapsed = start.elapsed();
    assert!(elapsed >= timeouts.change_request, "elapsed {:?}", elapsed);
    assert!(elapsed < timeouts.probe, "elapsed {:?}", elapsed);
}

#[tokio::test(start_paused = true)]
async fn test_unsupported_candidate_moves_to_next() {
    let transport = FakeTransport::new();
    transport.script(CANDIDATE_1, vec![Reply::mapped("203.0.113.10:4000")]);
    transport.script(
        CANDIDATE_2,
        vec![
            Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2),
            Reply::mapped_from(ALTERNATE_2, "203.0.113.10:4000"),
        ],
    );

    let outcome = probe_filtering(
        &transport,
        &candidates(&[CANDIDATE_1, CANDIDATE_2]),
        FilteringTimeouts::default(),
    )
    .await;

    assert_eq!(outcome.behavior, FilteringBehavior::EndpointIndependent);
    assert_eq!(outcome.server.as_deref(), Some(CANDIDATE_2));
    assert_eq!(transport.requests_to(CANDIDATE_1).len(), 1);
    assert_eq!(transport.bind_count(), 2, "Fresh socket per candidate");
}

#[tokio::test(start_paused = true)]
async fn test_verdict_stops_candidate_loop() {
    let transport = FakeTransport::new();
    transport.script(
        CANDIDATE_1,
        vec![Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2), Reply::Silent],
    );
    transport.script(CANDIDATE_2, vec![Reply::mapped("203.0.113.10:4000")]);

    let outcome = probe_filtering(
        &transport,
        &candidates(&[CANDIDATE_1, CANDIDATE_2]),
        FilteringTimeouts::default(),
    )
    .await;

    assert_eq!(outcome.behavior, FilteringBehavior::AddressDependent);
    assert_eq!(outcome.server.as_deref(), Some(CANDIDATE_1));
    assert!(transport.requests_to(CANDIDATE_2).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_exhausted_candidates_are_unknown() {
    let transport = FakeTransport::new();
    transport.script(CANDIDATE_1, vec![Reply::Silent]);
    transport.script(CANDIDATE_2, vec![Reply::mapped("203.0.113.10:4000")]);

    let outcome = probe_filtering(
        &transport,
        &candidates(&[CANDIDATE_1, "bogus", CANDIDATE_2]),
        FilteringTimeouts::default(),
    )
    .await;

    assert_eq!(outcome.behavior, FilteringBehavior::Unknown);
    assert!(outcome.server.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_empty_candidate_list_is_unknown() {
    let transport = FakeTransport::new();

    let outcome = probe_filtering(&transport, &[], FilteringTimeouts::default()).await;

    assert_eq!(outcome.behavior, FilteringBehavior::Unknown);
    assert_eq!(transport.bind_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stalled_resolution_disqualifies_only_that_candidate() {
    let transport = FakeTransport::new();
    transport.stall_resolve(CANDIDATE_1);
    transport.script(
        CANDIDATE_2,
        vec![
            Reply::mapped_with_other("203.0.113.10:4000", ALTERNATE_2),
            Reply::mapped_from(ALTERNATE_2, "203.0.113.10:4000"),
        ],
    );
    let timeouts = FilteringTimeouts::default();

    let start = tokio::time::Instant::now();
    let outcome = probe_filtering(
        &transport,
        &candidates(&[CANDIDATE_1, CANDIDATE_2]),
        timeouts,
    )
    .await;

    assert_eq!(outcome.behavior, FilteringBehavior::EndpointIndependent);
    assert_eq!(outcome.server.as_deref(), Some(CANDIDATE_2));
    let elapsed = start.elapsed();
    assert!(elapsed >= timeouts.probe && elapsed < timeouts.probe + Duration::from_secs(1));
    assert_eq!(transport.bind_count(), 1);
}
