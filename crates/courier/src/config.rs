//! Serializable bus configuration.
//!
//! Everything that can be expressed as data (no closures, no sinks) lives in
//! [`BusConfig`], so buses can be described in an application's config file:
//!
//! ```json
//! { "name": "status", "order": "unordered", "sticky": "skip_repeats" }
//! ```
//!
//! Missing fields take their defaults.

use serde::{Deserialize, Serialize};

use crate::sticky::StickyMode;
use crate::strategy::ReceiverOrder;

/// Data-only settings for a bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConfig {
    /// Name used in logs and failure reports.
    pub name: String,
    /// Built-in dispatch ordering.
    pub order: ReceiverOrder,
    /// Repeat handling for sticky buses.
    pub sticky: StickyMode,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            name: "bus".to_string(),
            order: ReceiverOrder::default(),
            sticky: StickyMode::default(),
        }
    }
}

impl BusConfig {
    /// Default configuration with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Bus, EventBus};
    use crate::queue::ManualQueue;
    use crate::receiver::receiver_fn;
    use std::sync::Arc;

    #[test]
    fn test_defaults() {
        let config = BusConfig::default();
        assert_eq!(config.name, "bus");
        assert_eq!(config.order, ReceiverOrder::Insertion);
        assert_eq!(config.sticky, StickyMode::Always);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: BusConfig = serde_json::from_str(r#"{ "sticky": "skip_repeats" }"#).unwrap();
        assert_eq!(config.name, "bus");
        assert_eq!(config.order, ReceiverOrder::Insertion);
        assert_eq!(config.sticky, StickyMode::SkipRepeats);
    }

    #[test]
    fn test_json_shape() {
        let config = BusConfig {
            order: ReceiverOrder::Unordered,
            ..BusConfig::named("status")
        };
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "name": "status", "order": "unordered", "sticky": "always" })
        );
    }

    #[test]
    fn test_builder_applies_config() {
        let queue = Arc::new(ManualQueue::new("test"));
        let config: BusConfig =
            serde_json::from_str(r#"{ "name": "status", "sticky": "skip_repeats" }"#).unwrap();
        let bus = EventBus::<String>::builder(queue.clone())
            .config(config)
            .build_sticky();

        assert_eq!(bus.core().name(), "status");
        assert_eq!(bus.mode(), StickyMode::SkipRepeats);

        bus.register(receiver_fn("r", |_, _: &String| Ok(()))).unwrap();
        assert!(bus.broadcast("a".into()).unwrap());
        assert!(!bus.broadcast("a".into()).unwrap());
        assert_eq!(queue.run_pending(), 1);
    }
}
