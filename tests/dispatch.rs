//! End-to-end dispatcher behavior over a scripted transport.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use reqwest::Method;
use turnstile::request::assemble;
use turnstile::{
    routes, ManualClock, MemorySink, RecordingSleeper, ReplayItem, ReplayTransport, Request,
    RestManager, RestOptions, WireResponse,
};

struct Harness {
    manager: RestManager,
    transport: Arc<ReplayTransport>,
    events: MemorySink,
    sleeper: RecordingSleeper,
    clock: ManualClock,
}

fn harness_with(script: Vec<ReplayItem>, options: RestOptions) -> Harness {
    let transport = Arc::new(ReplayTransport::new(script));
    let events = MemorySink::new();
    let sleeper = RecordingSleeper::new();
    let clock = ManualClock::new(0);
    let manager = RestManager::builder()
        .options(options)
        .token("test-token")
        .transport(transport.clone())
        .event_sink(events.clone())
        .clock(clock.clone())
        .sleeper(sleeper.clone())
        .build();
    Harness { manager, transport, events, sleeper, clock }
}

fn harness(script: Vec<ReplayItem>) -> Harness {
    harness_with(script, RestOptions::default())
}

#[tokio::test]
async fn cold_request_succeeds_and_learns_the_bucket() {
    let h = harness(vec![ReplayItem::Respond(
        WireResponse::json(200, serde_json::json!({"id": "1"}))
            .header("x-ratelimit-limit", "5")
            .header("x-ratelimit-remaining", "4")
            .header("x-ratelimit-reset-after", "2")
            .header("x-ratelimit-bucket", "abc"),
    )]);

    let route = routes::user_me();
    let body = h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap();
    assert_eq!(body.json().unwrap()["id"], "1");

    let sent = h.transport.requests();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url, "https://discord.com/api/v7/users/@me");
    assert_eq!(sent[0].header("authorization"), Some("Bot test-token"));
    assert_eq!(sent[0].header("x-ratelimit-precision"), Some("millisecond"));

    assert_eq!(h.manager.bucket_hash(&Method::GET, "/users/@me"), Some("abc".to_string()));

    // The handler that served the cold request is still keyed by the
    // placeholder; its window reflects the response headers plus offset.
    let snap = h.manager.bucket_snapshot("UnknownHash(/users/@me):global").unwrap();
    assert_eq!(snap.limit, 5);
    assert_eq!(snap.remaining, 4);
    assert_eq!(snap.reset_at, 2_100);
    assert!(!snap.limited);
}

#[tokio::test]
async fn cloudflare_framed_429_replays_without_spending_retries() {
    // No Via header means Retry-After is in seconds.
    let h = harness(vec![
        ReplayItem::Respond(WireResponse::new(429).header("retry-after", "1")),
        ReplayItem::Respond(WireResponse::json(200, serde_json::json!({"ok": true}))),
    ]);

    let route = routes::channel("1");
    let body = h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap();
    assert_eq!(body.json().unwrap()["ok"], true);

    assert_eq!(h.transport.requests().len(), 2);
    assert!(h.sleeper.waited_for(Duration::from_millis(1_100)));
    let debug = h.events.debug_messages();
    assert_eq!(debug.len(), 1);
    assert!(debug[0].contains("429"));
    assert!(debug[0].contains("1100ms"));
}

#[tokio::test]
async fn a_429_never_spends_the_retry_budget() {
    let h = harness_with(
        vec![
            ReplayItem::Respond(WireResponse::new(429).header("retry-after", "0")),
            ReplayItem::Respond(WireResponse::new(429).header("retry-after", "0")),
            ReplayItem::Respond(WireResponse::new(204)),
        ],
        // Zero retries: any abort or 5xx would fail immediately, so reaching
        // the third scripted response proves 429s bypass the counter.
        RestOptions::default().retries(0),
    );

    let route = routes::channel("1");
    h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap();
    assert_eq!(h.transport.requests().len(), 3);
}

#[tokio::test]
async fn global_429_stalls_other_buckets_until_the_latch_clears() {
    let transport = Arc::new(ReplayTransport::new(vec![
        ReplayItem::Respond(
            WireResponse::new(429)
                .header("retry-after", "2")
                .header("via", "1.1 proxy")
                .header("x-ratelimit-global", "true"),
        ),
        ReplayItem::Respond(WireResponse::new(204)),
        ReplayItem::Respond(WireResponse::new(204)),
    ]));
    let events = MemorySink::new();
    let manager = RestManager::builder()
        .token("t")
        .transport(transport.clone())
        .event_sink(events.clone())
        .build();

    let first = {
        let manager = manager.clone();
        tokio::spawn(async move {
            let route = routes::channel("1");
            manager.queue(&route.bucket, Request::get(route.path)).await
        })
    };

    // Wait until the 429 engaged the latch, then dispatch on another bucket.
    let started = Instant::now();
    while !manager.global_engaged() {
        assert!(started.elapsed() < Duration::from_secs(2), "latch never engaged");
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let stalled_for = Instant::now();
    let route = routes::channel("2");
    manager.queue(&route.bucket, Request::get(route.path)).await.unwrap();
    // Via was present, so Retry-After is milliseconds: 2 + 100 offset.
    assert!(stalled_for.elapsed() >= Duration::from_millis(50));
    assert!(!manager.global_engaged());

    first.await.unwrap().unwrap();
    assert!(events.debug_messages().iter().any(|m| m.contains("102ms")));
}

#[tokio::test]
async fn bucket_hash_migration_moves_future_requests_to_a_new_handler() {
    let h = harness(vec![
        ReplayItem::Respond(
            WireResponse::new(204)
                .header("x-ratelimit-limit", "10")
                .header("x-ratelimit-remaining", "9")
                .header("x-ratelimit-reset-after", "5")
                .header("x-ratelimit-bucket", "xyz"),
        ),
        ReplayItem::Respond(
            WireResponse::new(204)
                .header("x-ratelimit-limit", "10")
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset-after", "60"),
        ),
    ]);

    let route = routes::guild_member_me("42");
    let patch = || Request::patch(&route.path).data(serde_json::json!({"nick": "n"}));

    h.manager.queue(&route.bucket, patch()).await.unwrap();
    assert_eq!(
        h.manager.bucket_hash(&Method::PATCH, "/guilds/42/members/@me"),
        Some("xyz".to_string())
    );
    assert!(h.events.debug_messages().iter().any(|m| m.contains("xyz")));
    assert_eq!(h.manager.bucket_keys(), vec!["UnknownHash(/guilds/42/members/@me):42".to_string()]);

    // The next request observes the learned hash and lands on a new handler
    // while the old one drains.
    h.manager.queue(&route.bucket, patch()).await.unwrap();
    let mut keys = h.manager.bucket_keys();
    keys.sort();
    assert_eq!(
        keys,
        vec!["UnknownHash(/guilds/42/members/@me):42".to_string(), "xyz:42".to_string()]
    );

    // The drained placeholder handler is sweepable; the new one is mid-window
    // (remaining 0, reset in the future) and must survive.
    assert_eq!(h.manager.sweep(), 1);
    assert_eq!(h.manager.bucket_keys(), vec!["xyz:42".to_string()]);
}

#[tokio::test]
async fn server_errors_surface_after_retries_are_exhausted() {
    let h = harness(vec![
        ReplayItem::Respond(WireResponse::new(503)),
        ReplayItem::Respond(WireResponse::new(503)),
    ]);

    let route = routes::user_me();
    let err = h.manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap_err();
    match err {
        turnstile::RestError::Http { status, status_text, method, url } => {
            assert_eq!(status, 503);
            assert_eq!(status_text, "Service Unavailable");
            assert_eq!(method, Method::GET);
            assert_eq!(url, "https://discord.com/api/v7/users/@me");
        }
        other => panic!("expected http error, got {other}"),
    }
    // retries = 1 by default: the original attempt plus one retry.
    assert_eq!(h.transport.requests().len(), 2);
}

#[tokio::test]
async fn a_server_error_followed_by_success_recovers() {
    let h = harness(vec![
        ReplayItem::Respond(WireResponse::new(502)),
        ReplayItem::Respond(WireResponse::json(200, serde_json::json!({"ok": true}))),
    ]);

    let route = routes::user_me();
    let body = h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap();
    assert_eq!(body.json().unwrap()["ok"], true);
}

#[tokio::test]
async fn api_errors_carry_the_decoded_body() {
    let h = harness(vec![ReplayItem::Respond(WireResponse::json(
        403,
        serde_json::json!({"code": 50013, "message": "Missing Permissions"}),
    ))]);

    let route = routes::guild("1");
    let err = h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap_err();
    match err {
        turnstile::RestError::Api { message, code, status, method, .. } => {
            assert_eq!(message, "Missing Permissions");
            assert_eq!(code, 50013);
            assert_eq!(status, 403);
            assert_eq!(method, Method::GET);
        }
        other => panic!("expected api error, got {other}"),
    }
    // 4xx must not retry.
    assert_eq!(h.transport.requests().len(), 1);
}

#[tokio::test]
async fn aborted_attempts_retry_and_then_surface_a_timeout() {
    let slow = || {
        ReplayItem::Delay(Duration::from_millis(200), WireResponse::new(204))
    };
    let h = harness_with(
        vec![slow(), slow()],
        RestOptions::default().timeout(Duration::from_millis(20)),
    );

    let route = routes::user_me();
    let err = h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap_err();
    assert!(err.is_timeout());
    assert_eq!(h.transport.requests().len(), 2);
}

#[tokio::test]
async fn an_aborted_attempt_followed_by_success_recovers() {
    let h = harness_with(
        vec![
            ReplayItem::Delay(Duration::from_millis(200), WireResponse::new(204)),
            ReplayItem::Respond(WireResponse::new(204)),
        ],
        RestOptions::default().timeout(Duration::from_millis(20)),
    );

    let route = routes::user_me();
    h.manager.queue(&route.bucket, Request::get(route.path)).await.unwrap();
    assert_eq!(h.transport.requests().len(), 2);
}

#[tokio::test]
async fn a_drained_window_stalls_and_emits_ratelimited() {
    let h = harness(vec![
        ReplayItem::Respond(
            WireResponse::new(204)
                .header("x-ratelimit-limit", "2")
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset-after", "1"),
        ),
        ReplayItem::Respond(
            WireResponse::new(204)
                .header("x-ratelimit-limit", "2")
                .header("x-ratelimit-remaining", "1")
                .header("x-ratelimit-reset-after", "1"),
        ),
    ]);

    let route = routes::channel_messages("7");
    h.manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap();
    h.manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap();

    let stalls = h.events.ratelimits();
    assert_eq!(stalls.len(), 1);
    assert_eq!(stalls[0].time_to_reset, Duration::from_millis(1_100));
    assert_eq!(stalls[0].limit, 2);
    assert_eq!(stalls[0].method, "GET");
    assert_eq!(stalls[0].route, "/channels/7/messages");
    assert_eq!(stalls[0].major_parameter, "7");
    assert!(h.sleeper.waited_for(Duration::from_millis(1_100)));
}

#[tokio::test]
async fn a_window_reopens_once_the_clock_passes_reset() {
    let h = harness(vec![
        ReplayItem::Respond(
            WireResponse::new(204)
                .header("x-ratelimit-limit", "1")
                .header("x-ratelimit-remaining", "0")
                .header("x-ratelimit-reset-after", "1"),
        ),
        ReplayItem::Respond(WireResponse::new(204)),
    ]);

    let route = routes::channel("3");
    h.manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap();

    let key = "UnknownHash(/channels/3):3";
    assert!(h.manager.bucket_snapshot(key).unwrap().limited);

    h.clock.advance(2_000);
    assert!(!h.manager.bucket_snapshot(key).unwrap().limited);

    h.manager.queue(&route.bucket, Request::get(&route.path)).await.unwrap();
    // No stall happened the second time around.
    assert!(h.events.ratelimits().is_empty());
    assert_eq!(h.sleeper.wait_count(), 0);
}

#[tokio::test]
async fn multipart_uploads_carry_files_and_payload_json() {
    let h = harness(vec![ReplayItem::Respond(WireResponse::json(
        200,
        serde_json::json!({"id": "9"}),
    ))]);

    let route = routes::channel_messages("5");
    let request = Request::post(&route.path)
        .file("f", vec![0xde, 0xad])
        .data(serde_json::json!({"content": "hi"}));
    h.manager.queue(&route.bucket, request).await.unwrap();

    let sent = h.transport.requests();
    assert_eq!(sent.len(), 1);
    match &sent[0].body {
        turnstile::RequestBody::Multipart(parts) => {
            assert_eq!(parts.len(), 2);
            assert_eq!(parts[0].name, "f");
            assert_eq!(parts[0].bytes, vec![0xde, 0xad]);
            assert_eq!(parts[1].name, "payload_json");
            assert_eq!(parts[1].bytes, br#"{"content":"hi"}"#.to_vec());
        }
        other => panic!("expected multipart body, got {other:?}"),
    }
    // Mandatory headers are still present and unoverridden.
    assert!(sent[0].header("user-agent").unwrap().starts_with("DiscordBot ("));
    assert_eq!(sent[0].header("authorization"), Some("Bot test-token"));
}

#[tokio::test]
async fn same_bucket_requests_complete_in_submission_order() {
    // Each response takes real time, so later submissions pile up behind the
    // serial queue while the first is still in flight.
    let script = (0..5)
        .map(|_| ReplayItem::Delay(Duration::from_millis(5), WireResponse::new(204)))
        .collect();
    let h = harness(script);

    let completions: Arc<Mutex<Vec<usize>>> = Arc::new(Mutex::new(Vec::new()));
    let mut tasks = Vec::new();
    for i in 0..5 {
        let manager = h.manager.clone();
        let completions = completions.clone();
        tasks.push(tokio::spawn(async move {
            let route = routes::channel_messages("7");
            let request = Request::get(route.path).query("marker", Some(i.to_string()));
            manager.queue(&route.bucket, request).await.unwrap();
            completions.lock().unwrap().push(i);
        }));
        // Let the task reach the bucket queue before submitting the next one.
        for _ in 0..4 {
            tokio::task::yield_now().await;
        }
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(*completions.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    let urls: Vec<String> = h.transport.requests().iter().map(|r| r.url.clone()).collect();
    for (i, url) in urls.iter().enumerate() {
        assert!(url.contains(&format!("marker={i}")), "wire order diverged: {urls:?}");
    }
}

#[tokio::test]
async fn an_in_flight_handler_is_never_swept() {
    let h = harness(vec![ReplayItem::Delay(Duration::from_millis(100), WireResponse::new(204))]);

    let task = {
        let manager = h.manager.clone();
        tokio::spawn(async move {
            let route = routes::channel("9");
            manager.queue(&route.bucket, Request::get(route.path)).await
        })
    };
    tokio::time::sleep(Duration::from_millis(30)).await;

    assert_eq!(h.manager.handler_count(), 1);
    assert_eq!(h.manager.sweep(), 0, "in-flight handler must not be swept");

    task.await.unwrap().unwrap();
    assert_eq!(h.manager.sweep(), 1);
    assert_eq!(h.manager.handler_count(), 0);
}

#[test]
fn assembled_urls_round_trip_to_the_original_inputs() {
    let request = Request::get("/guilds/1/members")
        .query("limit", Some("5"))
        .query("after", Some("99"))
        .query("skip", None::<String>)
        .auth(false);
    let assembled = assemble(&request, &RestOptions::default(), None).unwrap();

    let parsed = url::Url::parse(&assembled.url).unwrap();
    assert_eq!(parsed.path(), "/api/v7/guilds/1/members");
    let pairs: Vec<(String, String)> = parsed.query_pairs().into_owned().collect();
    assert_eq!(
        pairs,
        vec![("limit".to_string(), "5".to_string()), ("after".to_string(), "99".to_string())]
    );
}
