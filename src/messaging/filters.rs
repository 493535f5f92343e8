use crate::functions::EntityKind;

use super::{FUNCTION_UPDATED, MESSAGE_ACCEPTED};

/// A topic/content-type pair that feeds one entity kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub topic: &'static str,
    pub content_type_prefix: &'static str,
    pub kind: EntityKind,
}

impl Route {
    #[must_use]
    pub fn matches(&self, topic: &str, content_type: &str) -> bool {
        self.topic == topic && content_type.starts_with(self.content_type_prefix)
    }
}

pub const LEVEL: &str = "application/vnd.diwise.level";
pub const STOPWATCH: &str = "application/vnd.diwise.stopwatch";
pub const DIGITAL_INPUT: &str = "application/vnd.diwise.digitalinput";
pub const TEMPERATURE: &str = "application/vnd.oma.lwm2m.ext.3303";
pub const DISTANCE: &str = "application/vnd.oma.lwm2m.ext.3330";

pub const ROUTES: &[Route] = &[
    Route {
        topic: FUNCTION_UPDATED,
        content_type_prefix: LEVEL,
        kind: EntityKind::WasteContainer,
    },
    Route {
        topic: FUNCTION_UPDATED,
        content_type_prefix: LEVEL,
        kind: EntityKind::Sewer,
    },
    Route {
        topic: FUNCTION_UPDATED,
        content_type_prefix: STOPWATCH,
        kind: EntityKind::CombinedSewageOverflow,
    },
    Route {
        topic: FUNCTION_UPDATED,
        content_type_prefix: STOPWATCH,
        kind: EntityKind::SewagePumpingStation,
    },
    Route {
        topic: FUNCTION_UPDATED,
        content_type_prefix: DIGITAL_INPUT,
        kind: EntityKind::SewagePumpingStation,
    },
    Route {
        topic: MESSAGE_ACCEPTED,
        content_type_prefix: TEMPERATURE,
        kind: EntityKind::WasteContainer,
    },
    Route {
        topic: MESSAGE_ACCEPTED,
        content_type_prefix: DISTANCE,
        kind: EntityKind::Sewer,
    },
];

/// Entity kinds a message fans out to, in table order, without duplicates.
#[must_use]
pub fn matching_kinds(topic: &str, content_type: &str) -> Vec<EntityKind> {
    let mut kinds = Vec::new();

    for route in ROUTES.iter().filter(|r| r.matches(topic, content_type)) {
        if !kinds.contains(&route.kind) {
            kinds.push(route.kind);
        }
    }

    kinds
}

/// Topics with at least one route.
#[must_use]
pub fn topics() -> Vec<&'static str> {
    let mut topics: Vec<&'static str> = Vec::new();

    for route in ROUTES {
        if !topics.contains(&route.topic) {
            topics.push(route.topic);
        }
    }

    topics
}
