use once_cell::sync::Lazy;
use std::collections::HashMap;

/// Sentinel for state names the lookup table does not recognize. Unrecognized
/// input is never silently dropped; it normalizes to this explicit value.
pub const UNKNOWN_STATE: &str = "XX";

static STATE_CODES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("Alabama", "AL"),
        ("Alaska", "AK"),
        ("Arizona", "AZ"),
        ("Arkansas", "AR"),
        ("California", "CA"),
        ("Colorado", "CO"),
        ("Connecticut", "CT"),
        ("Delaware", "DE"),
        ("Florida", "FL"),
        ("Georgia", "GA"),
        ("Hawaii", "HI"),
        ("Idaho", "ID"),
        ("Illinois", "IL"),
        ("Indiana", "IN"),
        ("Iowa", "IA"),
        ("Kansas", "KS"),
        ("Kentucky", "KY"),
        ("Louisiana", "LA"),
        ("Maine", "ME"),
        ("Maryland", "MD"),
        ("Massachusetts", "MA"),
        ("Michigan", "MI"),
        ("Minnesota", "MN"),
        ("Mississippi", "MS"),
        ("Missouri", "MO"),
        ("Montana", "MT"),
        ("Nebraska", "NE"),
        ("Nevada", "NV"),
        ("New Hampshire", "NH"),
        ("New Jersey", "NJ"),
        ("New Mexico", "NM"),
        ("New York", "NY"),
        ("North Carolina", "NC"),
        ("North Dakota", "ND"),
        ("Ohio", "OH"),
        ("Oklahoma", "OK"),
        ("Oregon", "OR"),
        ("Pennsylvania", "PA"),
        ("Rhode Island", "RI"),
        ("South Carolina", "SC"),
        ("South Dakota", "SD"),
        ("Tennessee", "TN"),
        ("Texas", "TX"),
        ("Utah", "UT"),
        ("Vermont", "VT"),
        ("Virginia", "VA"),
        ("Washington", "WA"),
        ("West Virginia", "WV"),
        ("Wisconsin", "WI"),
        ("Wyoming", "WY"),
    ])
});

/// Normalize free-text whitespace and casing before the lookup, so
/// `" texas "` and `"NEW HAMPSHIRE"` both resolve.
fn title_case(name: &str) -> String {
    name.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Full state name to its two-letter postal code; unrecognized names map to
/// the [`UNKNOWN_STATE`] sentinel.
pub fn to_state_code(name: &str) -> &'static str {
    STATE_CODES
        .get(title_case(name).as_str())
        .copied()
        .unwrap_or(UNKNOWN_STATE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_table_covers_fifty_states() {
        assert_eq!(STATE_CODES.len(), 50);
    }

    #[test]
    fn normalizes_whitespace_and_case() {
        assert_eq!(to_state_code("texas "), "TX");
        assert_eq!(to_state_code("NEW HAMPSHIRE"), "NH");
        assert_eq!(to_state_code("  rhode   island"), "RI");
    }

    #[test]
    fn unrecognized_names_get_the_sentinel() {
        assert_eq!(to_state_code("Puerto Rico"), UNKNOWN_STATE);
        assert_eq!(to_state_code(""), UNKNOWN_STATE);
        // Codes are not names; the lookup is deliberately name-only.
        assert_eq!(to_state_code("TX"), UNKNOWN_STATE);
    }
}
