//! Static keyword → area/domain/device-class pattern tables (C1, `spec.md §4.2`).
//!
//! Ported from the Hungarian/English pattern lists in the original
//! `ha-rag-bridge` conversation analyzer. Kept as plain data (not control flow)
//! so they stay easy to extend or reload from disk/DB, per `spec.md §9`'s design
//! note on language-specific query strings.

use std::collections::HashMap;

/// Area name → list of substring patterns that identify it in an utterance.
#[must_use]
pub fn area_patterns() -> HashMap<&'static str, Vec<&'static str>> {
    HashMap::from([
        (
            "kert",
            vec![
                "kert", "kerti", "kertben", "kertből", "kertnek", "kertet", "garden", "kint",
                "kinn", "outside", "outdoor", "külső", "udvar", "udvari",
            ],
        ),
        (
            "nappali",
            vec![
                "nappali", "nappaliban", "living room", "livingroom", "lounge", "szoba",
            ],
        ),
        (
            "haloszoba",
            vec![
                "hálószoba", "háloszobában", "bedroom", "hálóban", "háló",
            ],
        ),
        (
            "konyha",
            vec!["konyha", "konyhában", "kitchen"],
        ),
        (
            "furdo",
            vec!["fürdő", "fürdőszoba", "bathroom", "wc", "mosdó"],
        ),
        (
            "haz",
            vec![
                "otthon", "ház", "házban", "house", "home", "egész ház", "mindenhol", "indoor",
                "belső",
            ],
        ),
    ])
}

/// Domain pattern set: either a flat list of keywords, or (for `sensor`) a map of
/// device-class name → its own keyword list.
#[derive(Debug, Clone)]
pub enum DomainPatternSet {
    /// Flat keyword list for a domain with no device-class nesting.
    Flat(Vec<&'static str>),
    /// Nested device-class keyword lists (only used for `sensor`).
    Nested(HashMap<&'static str, Vec<&'static str>>),
}

/// Domain name → its pattern set.
#[must_use]
pub fn domain_patterns() -> HashMap<&'static str, DomainPatternSet> {
    HashMap::from([
        (
            "sensor",
            DomainPatternSet::Nested(HashMap::from([
                ("temperature", vec!["hőmérséklet", "fok", "meleg", "hideg", "temperature"]),
                ("humidity", vec!["nedveség", "nedvesség", "páratartalom", "humid"]),
                ("illuminance", vec!["fény", "világítás", "lux", "light"]),
                ("motion", vec!["mozgás", "motion", "jelenl"]),
                ("door", vec!["ajtó", "door"]),
                ("window", vec!["ablak", "window"]),
                ("energy", vec!["energia", "áram", "watt", "energy", "power"]),
                ("air_quality", vec!["levegő", "co2", "air"]),
            ])),
        ),
        ("light", DomainPatternSet::Flat(vec!["világítás", "lámpa", "light", "lamp", "kapcsold"])),
        ("switch", DomainPatternSet::Flat(vec!["kapcsoló", "switch", "kapcsold"])),
        (
            "climate",
            DomainPatternSet::Flat(vec!["klíma", "fűtés", "heating", "cooling", "thermostat"]),
        ),
        (
            "cover",
            DomainPatternSet::Flat(vec!["redőny", "függöny", "blind", "curtain", "cover"]),
        ),
        ("lock", DomainPatternSet::Flat(vec!["zár", "lock", "kulcs"])),
        ("alarm", DomainPatternSet::Flat(vec!["riasztó", "alarm", "security"])),
    ])
}

/// Substrings that flag a follow-up / coreferential utterance.
#[must_use]
pub fn follow_up_patterns() -> Vec<&'static str> {
    vec![
        "és a", "mi a", "what about", "how about", "ott", "itt", "there", "here", "akkor", "then",
        "so", "is", "szintén",
    ]
}

/// Substrings signalling a control-intent verb.
#[must_use]
pub fn control_verb_patterns() -> Vec<&'static str> {
    vec![
        "kapcsold", "indítsd", "állítsd", "turn on", "turn off", "nyisd", "zárd",
    ]
}

/// Substrings signalling a read-intent query.
#[must_use]
pub fn read_patterns() -> Vec<&'static str> {
    vec!["mennyi", "hány", "milyen", "mekkora", "mi", "what", "how", "fok", "status", "állapot", "érték"]
}

/// Quantity/global-scope words that widen scope detection (`spec.md §4.4` rules 1/7/8).
#[must_use]
pub fn quantity_words() -> Vec<&'static str> {
    vec!["összes", "minden", "all"]
}

/// House-wide words that force `OVERVIEW` scope (`spec.md §4.4` rule 7).
#[must_use]
pub fn house_wide_words() -> Vec<&'static str> {
    vec!["otthon", "house", "home"]
}

/// Temperature-query words used by scope rule 4/6.
#[must_use]
pub fn temperature_words() -> Vec<&'static str> {
    vec!["hőmérséklet", "fok", "mennyi", "hány fok"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn area_patterns_cover_kert_and_haz() {
        let areas = area_patterns();
        assert!(areas.contains_key("kert"));
        assert!(areas["kert"].contains(&"kert"));
        assert!(areas.contains_key("haz"));
    }

    #[test]
    fn sensor_domain_is_nested_with_device_classes() {
        let domains = domain_patterns();
        match &domains["sensor"] {
            DomainPatternSet::Nested(map) => {
                assert!(map.contains_key("temperature"));
                assert!(map.contains_key("humidity"));
            }
            DomainPatternSet::Flat(_) => panic!("sensor domain must be nested"),
        }
    }

    #[test]
    fn light_domain_is_flat() {
        let domains = domain_patterns();
        assert!(matches!(domains["light"], DomainPatternSet::Flat(_)));
    }

    #[test]
    fn follow_up_patterns_include_hungarian_cues() {
        let patterns = follow_up_patterns();
        assert!(patterns.contains(&"ott"));
        assert!(patterns.contains(&"és a"));
    }
}
