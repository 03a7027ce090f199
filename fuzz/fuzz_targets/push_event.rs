#![no_main]

use std::collections::BTreeSet;

use libfuzzer_sys::fuzz_target;

use taskdeck_core::model::Task;
use taskdeck_core::push::{PushEvent, reconcile_tasks};

const SEED_LIST: &str = r#"[
  {"id":1,"title":"a","status":"TODO","workspace_id":7,"created_at":"2025-03-01T09:30:00","updated_at":"2025-03-01T09:30:00"},
  {"id":2,"title":"b","status":"DONE","workspace_id":7,"created_at":"2025-03-01T09:30:00","updated_at":"2025-03-01T09:30:00"}
]"#;

fuzz_target!(|data: &[u8]| {
    let Ok(raw) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(event) = PushEvent::parse(raw) else {
        return;
    };
    let Ok(current) = serde_json::from_str::<Vec<Task>>(SEED_LIST) else {
        return;
    };

    let once = reconcile_tasks(&current, &event);
    let twice = reconcile_tasks(&once, &event);
    assert_eq!(once, twice, "reconciling {event} is not idempotent");

    let mut seen = BTreeSet::new();
    assert!(once.iter().all(|t| seen.insert(t.id)), "duplicate id after {event}");
});
