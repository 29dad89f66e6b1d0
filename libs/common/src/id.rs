use ulid::Ulid;

/// Generates a new ULID-based ID with the given prefix.
///
/// # Examples
/// ```
/// let id = nikah_common::id::prefixed_ulid("usr");
/// assert!(id.starts_with("usr_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{}_{}", prefix, Ulid::new())
}

/// Marker trait for record types whose identifiers carry a fixed prefix.
pub trait PrefixedId {
    const PREFIX: &'static str;

    fn generate_id() -> String {
        prefixed_ulid(Self::PREFIX)
    }

    /// Cheap shape check used to reject obviously malformed IDs at the edge
    /// before they reach the store.
    fn is_valid_id(id: &str) -> bool {
        id.strip_prefix(Self::PREFIX)
            .and_then(|rest| rest.strip_prefix('_'))
            .is_some_and(|ulid| Ulid::from_string(ulid).is_ok())
    }
}

/// Well-known ID prefixes.
pub mod prefix {
    pub const USER: &str = "usr";
    pub const GATEWAY_SESSION: &str = "gw";
    pub const MATCH: &str = "mtc";
    pub const CONVERSATION: &str = "cnv";
    pub const NOTIFICATION: &str = "ntf";
}
