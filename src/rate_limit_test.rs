use super::*;

const PER_CONNECTION_LIMIT: usize = 3;
const PER_CONNECTION_WINDOW: Duration = Duration::from_secs(10);
const GLOBAL_LIMIT: usize = 5;
const GLOBAL_WINDOW: Duration = Duration::from_secs(1);

fn limiter() -> RateLimiter {
    RateLimiter::new(RateLimitConfig {
        per_connection_limit: PER_CONNECTION_LIMIT,
        per_connection_window: PER_CONNECTION_WINDOW,
        global_limit: GLOBAL_LIMIT,
        global_window: GLOBAL_WINDOW,
    })
}

#[test]
fn per_connection_allows_up_to_limit() {
    let rl = limiter();
    let conn = Uuid::new_v4();
    let now = Instant::now();

    for i in 0..PER_CONNECTION_LIMIT {
        assert!(rl.check_and_record_at(conn, now).is_ok(), "message {i} should pass");
    }
    assert!(matches!(
        rl.check_and_record_at(conn, now),
        Err(RateLimitError::PerConnectionExceeded { limit: PER_CONNECTION_LIMIT, .. })
    ));
}

#[test]
fn global_allows_up_to_limit() {
    let rl = limiter();
    let now = Instant::now();

    // Distinct connections so the per-connection limit never trips first.
    for i in 0..GLOBAL_LIMIT {
        assert!(rl.check_and_record_at(Uuid::new_v4(), now).is_ok(), "message {i} should pass");
    }
    assert!(matches!(
        rl.check_and_record_at(Uuid::new_v4(), now),
        Err(RateLimitError::GlobalExceeded { limit: GLOBAL_LIMIT, .. })
    ));
}

#[test]
fn window_expiry_allows_new_messages() {
    let rl = limiter();
    let conn = Uuid::new_v4();
    let start = Instant::now();

    for _ in 0..PER_CONNECTION_LIMIT {
        rl.check_and_record_at(conn, start).unwrap();
    }
    assert!(rl.check_and_record_at(conn, start).is_err());

    let after_window = start + PER_CONNECTION_WINDOW + Duration::from_millis(1);
    assert!(rl.check_and_record_at(conn, after_window).is_ok());
}

#[test]
fn distinct_connections_do_not_interfere() {
    let rl = limiter();
    let a = Uuid::new_v4();
    let b = Uuid::new_v4();
    let now = Instant::now();

    for _ in 0..PER_CONNECTION_LIMIT {
        rl.check_and_record_at(a, now).unwrap();
    }
    assert!(rl.check_and_record_at(a, now).is_err());
    assert!(rl.check_and_record_at(b, now).is_ok());
}

#[test]
fn rejected_messages_are_not_recorded() {
    let rl = limiter();
    let conn = Uuid::new_v4();
    let now = Instant::now();

    for _ in 0..PER_CONNECTION_LIMIT {
        rl.check_and_record_at(conn, now).unwrap();
    }
    for _ in 0..10 {
        assert!(rl.check_and_record_at(conn, now).is_err());
    }
    // Only the accepted messages count toward the global window.
    let other = Uuid::new_v4();
    assert!(rl.check_and_record_at(other, now).is_ok());
    assert!(rl.check_and_record_at(Uuid::new_v4(), now).is_ok());
}

#[test]
fn forget_clears_connection_history() {
    let rl = limiter();
    let conn = Uuid::new_v4();
    let now = Instant::now();

    for _ in 0..PER_CONNECTION_LIMIT {
        rl.check_and_record_at(conn, now).unwrap();
    }
    rl.forget(conn);
    assert!(rl.check_and_record_at(conn, now).is_ok());
}

#[test]
fn errors_share_the_rate_limited_code() {
    let err = RateLimitError::GlobalExceeded { limit: 1, window_secs: 1 };
    assert_eq!(err.error_code(), "E_RATE_LIMITED");
}
