use super::*;

#[test]
fn status_strings() {
    for status in [MatchStatus::Scheduled, MatchStatus::Completed, MatchStatus::Cancelled] {
        assert_eq!(MatchStatus::parse(status.as_str()), Some(status));
    }
    assert_eq!(MatchStatus::parse("abandoned"), None);
}

#[test]
fn upcoming_sorts_soonest_first() {
    let q = MatchQuery { upcoming: true, ..MatchQuery::default() };
    assert_eq!(q.order(), "starts_at ASC, id ASC");
    assert_eq!(MatchQuery::default().order(), "starts_at DESC, id DESC");
}

#[test]
fn query_deserializes_status_filter() {
    let q: MatchQuery = serde_json::from_value(serde_json::json!({"status": "completed", "limit": 5})).unwrap();
    assert_eq!(q.status, Some(MatchStatus::Completed));
    assert_eq!(q.page().limit(), 5);
    assert!(!q.upcoming);
}

#[test]
fn validation() {
    assert!(validate_opponent("  ").is_err());
    assert_eq!(validate_opponent(" Strikers XI ").unwrap(), "Strikers XI");
    assert!(validate_fee(-1).is_err());
    assert_eq!(validate_fee(0).unwrap(), 0);
}

#[test]
fn new_match_fee_is_optional() {
    let input: NewMatch = serde_json::from_value(serde_json::json!({
        "opponent": "Royal Challengers",
        "starts_at": "2024-01-21T04:30:00Z"
    }))
    .unwrap();
    assert_eq!(input.fee_per_player_paise, None);
    assert!(input.venue.is_empty());
}

#[tokio::test]
async fn invalid_input_fails_before_touching_the_pool() {
    let state = crate::state::test_helpers::test_app_state();
    let input = NewMatch {
        title: String::new(),
        opponent: " ".into(),
        venue: String::new(),
        starts_at: Utc::now(),
        fee_per_player_paise: Some(100),
        notes: String::new(),
    };
    let err = create_match(&state.pool, &state.events, input, 0).await.unwrap_err();
    assert!(matches!(err, ServiceError::Invalid(_)));
}

#[cfg(feature = "live-db-tests")]
mod live {
    use super::*;
    use crate::db::test_support::integration_pool;
    use chrono::Duration;

    fn fixture(opponent: &str, starts_at: DateTime<Utc>) -> NewMatch {
        NewMatch {
            title: "League".into(),
            opponent: opponent.into(),
            venue: "Oval".into(),
            starts_at,
            fee_per_player_paise: None,
            notes: String::new(),
        }
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn crud_publishes_events() {
        let pool = integration_pool().await;
        let events = EventBus::new();
        let mut rx = events.subscribe();

        let m = create_match(&pool, &events, fixture("Strikers", Utc::now() + Duration::days(3)), 40_000)
            .await
            .unwrap();
        assert_eq!(m.fee_per_player_paise, 40_000);
        assert_eq!(rx.recv().await.unwrap().kind, MatchEventKind::Created);

        let updated = update_match(
            &pool,
            &events,
            m.id,
            MatchUpdate { status: Some(MatchStatus::Completed), ..MatchUpdate::default() },
        )
        .await
        .unwrap();
        assert_eq!(updated.status, MatchStatus::Completed);
        assert_eq!(updated.opponent, "Strikers");
        assert_eq!(rx.recv().await.unwrap().kind, MatchEventKind::Updated);

        delete_match(&pool, &events, m.id).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().kind, MatchEventKind::Deleted);
        assert!(matches!(get_match(&pool, m.id).await, Err(ServiceError::NotFound { .. })));
    }

    #[tokio::test]
    #[ignore = "requires TEST_DATABASE_URL/live Postgres"]
    async fn upcoming_excludes_past_matches() {
        let pool = integration_pool().await;
        let events = EventBus::new();
        let past = create_match(&pool, &events, fixture("Past XI", Utc::now() - Duration::days(10)), 0)
            .await
            .unwrap();
        let q = MatchQuery { upcoming: true, limit: Some(100), ..MatchQuery::default() };
        let page = list_matches(&pool, &q).await.unwrap();
        assert!(page.items.iter().all(|m| m.id != past.id));
        assert!(page.items.windows(2).all(|w| w[0].starts_at <= w[1].starts_at));
    }
}
