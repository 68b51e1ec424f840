// Rule matching and per-rule cooldown.

use crate::models::{EventType, NotificationEvent, NotificationRule};
use crate::store::Store;
use chrono::{DateTime, Duration, Utc};
use glob::{MatchOptions, Pattern};
use std::collections::HashSet;

/// One pending delivery: an event routed to a channel by a rule.
#[derive(Debug, Clone)]
pub struct NotificationTask {
    pub rule_id: i64,
    pub rule_name: String,
    pub channel_id: i64,
    pub event: NotificationEvent,
}

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// Shell-style match over the whole string. `/` is not special. An invalid pattern matches nothing.
pub fn glob_match(pattern: &str, text: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches_with(text, GLOB_OPTIONS),
        Err(e) => {
            tracing::debug!(pattern, error = %e, "invalid glob pattern");
            false
        }
    }
}

fn pattern_allows(pattern: &Option<String>, text: &str) -> bool {
    match pattern.as_deref() {
        None | Some("") => true,
        Some(p) => glob_match(p, text),
    }
}

/// True when the rule reacts to this event. Does not consider `enabled` or cooldown.
pub fn rule_matches_event(rule: &NotificationRule, event: &NotificationEvent) -> bool {
    if !rule.event_types.contains(&event.event_type) {
        return false;
    }
    if rule.host_id.is_some_and(|h| h != event.host_id) {
        return false;
    }
    if !pattern_allows(&rule.container_pattern, &event.container_name) {
        return false;
    }
    if !pattern_allows(&rule.image_pattern, event.match_image()) {
        return false;
    }
    match event.event_type {
        EventType::HighCpu => meets_threshold(rule.cpu_threshold, event.cpu_percent),
        EventType::HighMemory => meets_threshold(rule.memory_threshold, event.memory_percent),
        _ => true,
    }
}

fn meets_threshold(threshold: Option<f64>, value: Option<f64>) -> bool {
    match threshold {
        None => true,
        Some(t) => value.is_some_and(|v| v >= t),
    }
}

/// Whether the last successful delivery for (rule, container) is within the cooldown.
/// A lookup failure is logged and treated as not cooling down.
async fn in_cooldown(
    store: &dyn Store,
    rule: &NotificationRule,
    event: &NotificationEvent,
    now: DateTime<Utc>,
) -> bool {
    if rule.cooldown_secs == 0 {
        return false;
    }
    match store
        .get_last_notification_time(rule.id, &event.container_id, event.host_id)
        .await
    {
        Ok(Some(last)) => now - last < Duration::seconds(rule.cooldown_secs as i64),
        Ok(None) => false,
        Err(e) => {
            tracing::warn!(
                error = %e,
                operation = "get_last_notification_time",
                rule_id = rule.id,
                "cooldown lookup failed"
            );
            false
        }
    }
}

/// Routes events through enabled rules, one task per (rule, channel).
///
/// A rule with a cooldown fires at most once per container within a single call, so two
/// events for the same container in one pass yield one delivery per channel.
pub async fn match_rules(
    store: &dyn Store,
    rules: &[NotificationRule],
    events: &[NotificationEvent],
    now: DateTime<Utc>,
) -> Vec<NotificationTask> {
    let mut tasks = Vec::new();
    let mut fired: HashSet<(i64, &str, i64)> = HashSet::new();
    for event in events {
        for rule in rules.iter().filter(|r| r.enabled) {
            if !rule_matches_event(rule, event) {
                continue;
            }
            let key = (rule.id, event.container_id.as_str(), event.host_id);
            if rule.cooldown_secs > 0 && fired.contains(&key) {
                tracing::debug!(
                    rule_id = rule.id,
                    container = %event.container_name,
                    event_type = %event.event_type,
                    "skipped: rule already fired for container this pass"
                );
                continue;
            }
            if in_cooldown(store, rule, event, now).await {
                tracing::debug!(
                    rule_id = rule.id,
                    container = %event.container_name,
                    event_type = %event.event_type,
                    "skipped: rule in cooldown"
                );
                continue;
            }
            if rule.cooldown_secs > 0 {
                fired.insert(key);
            }
            for &channel_id in &rule.channel_ids {
                tasks.push(NotificationTask {
                    rule_id: rule.id,
                    rule_name: rule.name.clone(),
                    channel_id,
                    event: event.clone(),
                });
            }
        }
    }
    tasks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule() -> NotificationRule {
        NotificationRule {
            id: 1,
            name: "r".into(),
            enabled: true,
            event_types: vec![EventType::ContainerStopped, EventType::NewImage, EventType::HighCpu],
            host_id: None,
            container_pattern: None,
            image_pattern: None,
            cpu_threshold: None,
            memory_threshold: None,
            threshold_duration_secs: 120,
            cooldown_secs: 0,
            channel_ids: vec![1],
        }
    }

    fn event(event_type: EventType, name: &str, image: &str) -> NotificationEvent {
        let mut e = NotificationEvent::test_event();
        e.event_type = event_type;
        e.container_name = name.into();
        e.image = image.into();
        e.host_id = 7;
        e
    }

    #[test]
    fn glob_semantics() {
        assert!(glob_match("web-*", "web-frontend"));
        assert!(!glob_match("web-*", "api-backend"));
        assert!(glob_match("nginx:*", "nginx:1.21"));
        assert!(!glob_match("nginx:*", "apache:2.4"));
        assert!(glob_match("db-?", "db-1"));
        assert!(glob_match("db-[0-9]", "db-3"));
        assert!(!glob_match("Web-*", "web-frontend"));
        assert!(glob_match("*", "registry.io/team/app:1"));
        assert!(!glob_match("[", "x"));
    }

    #[test]
    fn container_pattern_filters() {
        let mut r = rule();
        r.container_pattern = Some("web-*".into());
        assert!(rule_matches_event(&r, &event(EventType::ContainerStopped, "web-frontend", "x")));
        assert!(!rule_matches_event(&r, &event(EventType::ContainerStopped, "api-backend", "x")));
    }

    #[test]
    fn image_pattern_uses_new_image_for_updates() {
        let mut r = rule();
        r.image_pattern = Some("nginx:*".into());
        let mut e = event(EventType::NewImage, "web", "apache:2.4");
        e.new_image = Some("nginx:1.21".into());
        assert!(rule_matches_event(&r, &e));
        assert!(!rule_matches_event(&r, &event(EventType::ContainerStopped, "web", "apache:2.4")));
    }

    #[test]
    fn host_filter_and_event_types() {
        let mut r = rule();
        r.host_id = Some(8);
        assert!(!rule_matches_event(&r, &event(EventType::ContainerStopped, "web", "x")));
        r.host_id = Some(7);
        assert!(rule_matches_event(&r, &event(EventType::ContainerStopped, "web", "x")));
        assert!(!rule_matches_event(&r, &event(EventType::ContainerStarted, "web", "x")));
    }

    #[test]
    fn cpu_threshold_is_inclusive() {
        let mut r = rule();
        r.cpu_threshold = Some(80.0);
        let mut e = event(EventType::HighCpu, "web", "x");
        e.cpu_percent = Some(79.9);
        assert!(!rule_matches_event(&r, &e));
        e.cpu_percent = Some(80.0);
        assert!(rule_matches_event(&r, &e));
    }
}
