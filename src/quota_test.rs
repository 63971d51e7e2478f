use super::*;

fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn whitelist_accepts_free_models_only() {
    assert!(is_model_allowed("gemma-3-27b-it"));
    assert!(is_model_allowed("gemini-2.0-flash"));
    assert!(is_model_allowed("meta-llama/llama-3.2-11b-vision-instruct:free"));
    assert!(!is_model_allowed("gpt-4o"));
    assert!(!is_model_allowed("gemini-1.5-pro-002"));
}

#[test]
fn quota_counts_and_reports_remaining() {
    let quota = DailyQuota::new(3);
    assert_eq!(quota.remaining(), 3);
    assert_eq!(quota.try_acquire(), Some(1));
    assert_eq!(quota.try_acquire(), Some(2));
    assert_eq!(quota.requests_today(), 2);
    assert_eq!(quota.remaining(), 1);
    assert!(quota.is_within_limit());
    quota.try_acquire();
    assert!(!quota.is_within_limit());
    assert_eq!(quota.remaining(), 0);
}

#[test]
fn quota_resets_when_day_changes() {
    let quota = DailyQuota::new(10);
    let monday = day(2026, 10, 12);
    let tuesday = day(2026, 10, 13);
    quota.try_acquire_on(monday);
    quota.try_acquire_on(monday);
    assert_eq!(quota.requests_on(monday), 2);
    assert_eq!(quota.requests_on(tuesday), 0);
    assert_eq!(quota.try_acquire_on(tuesday), Some(1));
}

#[test]
fn disabled_service_blocks_first() {
    let guard = Guardrails::new(false, 10);
    assert_eq!(guard.should_block("gpt-4o"), Some(BlockReason::ServiceDisabled));
}

#[test]
fn paid_model_is_blocked() {
    let guard = Guardrails::new(true, 10);
    assert_eq!(guard.should_block("gpt-4o"), Some(BlockReason::ModelNotFree));
    assert_eq!(guard.should_block("gemma-3-27b-it"), None);
}

#[test]
fn exhausted_quota_blocks() {
    let guard = Guardrails::new(true, 1);
    guard.quota().try_acquire();
    assert_eq!(guard.should_block("gemma-3-27b-it"), Some(BlockReason::DailyLimitExceeded));
}

#[test]
fn try_acquire_stops_at_limit() {
    let quota = DailyQuota::new(2);
    let monday = day(2026, 10, 12);
    assert_eq!(quota.try_acquire_on(monday), Some(1));
    assert_eq!(quota.try_acquire_on(monday), Some(2));
    assert_eq!(quota.try_acquire_on(monday), None);
    assert_eq!(quota.requests_on(monday), 2);
    assert_eq!(quota.try_acquire_on(day(2026, 10, 13)), Some(1));
}

#[test]
fn concurrent_admits_never_exceed_limit() {
    let guard = Guardrails::new(true, 50);
    let admitted = std::sync::atomic::AtomicU32::new(0);
    std::thread::scope(|s| {
        for _ in 0..16 {
            s.spawn(|| {
                for _ in 0..20 {
                    if guard.admit("gemma-3-27b-it").is_ok() {
                        admitted.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    }
                }
            });
        }
    });
    assert_eq!(admitted.into_inner(), 50);
    assert_eq!(guard.quota().requests_today(), 50);
    assert_eq!(guard.admit("gemma-3-27b-it"), Err(BlockReason::DailyLimitExceeded));
}

#[test]
fn admit_checks_model_before_quota() {
    let guard = Guardrails::new(true, 1);
    assert_eq!(guard.admit("gpt-4o"), Err(BlockReason::ModelNotFree));
    assert_eq!(guard.quota().requests_today(), 0);
    assert_eq!(guard.admit("gemma-3-27b-it"), Ok(1));
}

#[test]
fn block_reason_renders_wire_code() {
    assert_eq!(BlockReason::DailyLimitExceeded.to_string(), "daily_limit_exceeded");
    assert_eq!(serde_json::to_string(&BlockReason::ModelNotFree).unwrap(), "\"model_not_free\"");
}
