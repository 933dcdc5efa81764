//! Protocol constants for the scorer contracts.
//!
//! Topic symbols MUST match the values published by the scorer and scorer
//! factory contracts.

/// First topic of community membership events.
pub const TOPIC_USER: &str = "user";

/// First topic of manager events.
pub const TOPIC_MANAGER: &str = "manager";

/// First topic of badge events.
pub const TOPIC_BADGE: &str = "badge";

/// First topic of the scorer initialization event.
pub const TOPIC_INIT: &str = "init";

/// Second topic of the scorer initialization event.
pub const TOPIC_CONTRACT: &str = "contract";

/// First topic of factory events.
pub const TOPIC_SCORER: &str = "scorer";

/// First topic of token transfer events.
pub const TOPIC_TRANSFER: &str = "transfer";

/// Action topic: add.
pub const ACTION_ADD: &str = "add";

/// Action topic: remove.
pub const ACTION_REMOVE: &str = "remove";

/// Action topic: create.
pub const ACTION_CREATE: &str = "create";

/// Badge type tag written for every badge.
///
/// Contract revisions published "custom", "standard" and "Custom"; the
/// indexer stores a single canonical value.
pub const BADGE_TYPE: &str = "custom";

/// Map key of a badge id's name field.
pub const BADGE_FIELD_NAME: &str = "name";

/// Map key of a badge id's issuer field.
pub const BADGE_FIELD_ISSUER: &str = "issuer";

/// Map key of a badge record's score field.
pub const BADGE_FIELD_SCORE: &str = "score";
