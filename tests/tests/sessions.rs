//! Session correlation through the HTTP surface.

use axum::http::StatusCode;
use integration_tests::{fixtures, setup::TestContext};

#[tokio::test]
async fn single_event_session_is_a_bounce() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let ts = fixtures::now_ms();

    server
        .post("/track")
        .json(&fixtures::session_event("p1", "s1", ts, "/landing"))
        .await
        .assert_status(StatusCode::OK);

    let row = ctx.session_row("s1").await.expect("session row");
    assert_eq!(row.get_i64("event_count"), Some(1));
    assert_eq!(row.get_i64("is_bounce"), Some(1));
    assert_eq!(row.get_i64("duration"), Some(0));
    assert_eq!(row.get_str("entry_page"), Some("/landing"));
    assert_eq!(row.get_str("exit_page"), Some("/landing"));
}

#[tokio::test]
async fn three_events_in_any_arrival_order_converge() {
    let base = fixtures::now_ms();
    let (t1, t2, t3) = (base, base + 10_000, base + 20_000);

    let orders: [[usize; 3]; 3] = [[0, 1, 2], [2, 1, 0], [1, 2, 0]];
    for order in orders {
        let ctx = TestContext::new().await;
        let server = ctx.server();
        let events = [
            fixtures::session_event("p1", "s1", t1, "/p1"),
            fixtures::session_event("p1", "s1", t2, "/p2"),
            fixtures::session_event("p1", "s1", t3, "/p3"),
        ];

        for &i in &order {
            server.post("/track").json(&events[i]).await.assert_status(StatusCode::OK);
        }

        let row = ctx.session_row("s1").await.expect("session row");
        assert_eq!(row.get_i64("event_count"), Some(3), "order {:?}", order);
        assert_eq!(row.get_i64("is_bounce"), Some(0), "order {:?}", order);
        assert_eq!(row.get_i64("duration"), Some(t3 - t1), "order {:?}", order);
        assert_eq!(row.get_str("entry_page"), Some("/p1"), "order {:?}", order);
        assert_eq!(row.get_str("exit_page"), Some("/p3"), "order {:?}", order);
    }
}

#[tokio::test]
async fn batch_and_single_contributions_merge() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let base = fixtures::now_ms();

    // Later half of the session arrives first, as a batch.
    let batch = fixtures::batch_body(
        None,
        vec![
            fixtures::session_event("p1", "s1", base + 30_000, "/checkout"),
            fixtures::session_event("p1", "s1", base + 40_000, "/done"),
        ],
    );
    server.post("/track/batch").json(&batch).await.assert_status(StatusCode::OK);

    // Then the opening pageview arrives on its own.
    server
        .post("/track")
        .json(&fixtures::session_event("p1", "s1", base, "/landing"))
        .await
        .assert_status(StatusCode::OK);

    let row = ctx.session_row("s1").await.expect("session row");
    assert_eq!(row.get_i64("event_count"), Some(3));
    assert_eq!(row.get_i64("duration"), Some(40_000));
    assert_eq!(row.get_str("entry_page"), Some("/landing"));
    assert_eq!(row.get_str("exit_page"), Some("/done"));
    assert_eq!(row.get_i64("is_bounce"), Some(0));
}

#[tokio::test]
async fn sessions_do_not_cross_contaminate() {
    let ctx = TestContext::new().await;
    let server = ctx.server();
    let base = fixtures::now_ms();

    server
        .post("/track")
        .json(&fixtures::session_event("p1", "s1", base, "/a"))
        .await
        .assert_status(StatusCode::OK);
    server
        .post("/track")
        .json(&fixtures::session_event("p1", "s2", base + 1_000, "/b"))
        .await
        .assert_status(StatusCode::OK);

    assert_eq!(ctx.count("sessions").await, 2);
    let s1 = ctx.session_row("s1").await.unwrap();
    let s2 = ctx.session_row("s2").await.unwrap();
    assert_eq!(s1.get_i64("is_bounce"), Some(1));
    assert_eq!(s2.get_i64("is_bounce"), Some(1));
    assert_eq!(s2.get_str("entry_page"), Some("/b"));
}
