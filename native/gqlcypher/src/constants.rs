// Message constants shared between generated Cypher and host-side error handling.

/// Message of every generated auth validation call
pub const AUTH_FORBIDDEN_ERROR: &str = "FORBIDDEN";

/// Prefix of every generated relationship cardinality validation message
pub const RELATIONSHIP_REQUIREMENT_PREFIX: &str = "RELATIONSHIP-REQUIRED";

/// Name of the parameter that receives resolved callback values
pub const RESOLVED_CALLBACKS_PARAM: &str = "resolvedCallbacks";

/// Name of the parameter that carries the caller's auth state
pub const AUTH_PARAM: &str = "auth";

/// Name of the event-meta accumulator variable
pub const META_VARIABLE: &str = "meta";

/// Key under which each unwind row stores its callback parameter names
pub const UNWIND_CALLBACKS_KEY: &str = "_callbacks";
