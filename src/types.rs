//! Common type definitions.
//!
//! All entity identifiers are UUIDs wrapped in type aliases so downstream
//! crates can declare foreign keys against [`UserId`] without depending on
//! the concrete representation.

use uuid::Uuid;

/// User account identifier. Opaque, stable, generated at creation.
pub type UserId = Uuid;

/// Abbreviate a UUID to its first 8 characters for more readable logs and traces
/// Example: "550e8400-e29b-41d4-a716-446655440000" -> "550e8400"
pub fn abbrev_uuid(uuid: &Uuid) -> String {
    uuid.to_string().chars().take(8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_abbrev_uuid() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(abbrev_uuid(&id), "550e8400");
    }
}
