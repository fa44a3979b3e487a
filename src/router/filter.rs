//! Routing filter rules.
//!
//! Rules are plain data evaluated in order; the first rule that matches an
//! event decides whether it is suppressed or allowed. Events no rule matches
//! are allowed.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::codec::{type_matches, Affiliation, Category, Event, Point};

/// Filter rule handle, returned by [`EventRouter::add_filter`](super::EventRouter::add_filter).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilterId(pub(crate) u64);

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "filter-{}", self.0)
    }
}

/// What a matching rule does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    /// Drop the event before any subscriber sees it.
    Suppress,
    /// Deliver the event, overriding later rules.
    Allow,
}

/// Event predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "match", rename_all = "snake_case")]
pub enum FilterMatch {
    /// Type tag equals or extends `prefix` by whole atoms.
    TypePrefix {
        /// e.g. `b-a`
        prefix: String,
    },
    /// Routing category, by type-tag prefix.
    Category {
        /// Family to match.
        category: Category,
    },
    /// Affiliation atom of `a-` events.
    Affiliation {
        /// Affiliation to match.
        affiliation: Affiliation,
    },
    /// Originating team (group name) of position events.
    Team {
        /// Team name, compared case-insensitively.
        team: String,
    },
    /// Point within `radius_m` of a reference point.
    Within {
        /// Reference latitude.
        lat: f64,
        /// Reference longitude.
        lon: f64,
        /// Radius in metres.
        radius_m: f64,
    },
    /// Point farther than `radius_m` from a reference point.
    Beyond {
        /// Reference latitude.
        lat: f64,
        /// Reference longitude.
        lon: f64,
        /// Radius in metres.
        radius_m: f64,
    },
}

impl FilterMatch {
    /// Evaluate against `event`. Distance predicates never match events
    /// without a point.
    pub fn matches(&self, event: &Event) -> bool {
        match self {
            FilterMatch::TypePrefix { prefix } => type_matches(event.event_type(), prefix),
            FilterMatch::Category { category } => {
                Category::from_type_tag(event.event_type()) == *category
            }
            FilterMatch::Affiliation { affiliation } => event.affiliation() == Some(*affiliation),
            FilterMatch::Team { team } => event
                .team()
                .is_some_and(|t| t.eq_ignore_ascii_case(team)),
            FilterMatch::Within { lat, lon, radius_m } => {
                distance_from(event, *lat, *lon).is_some_and(|d| d <= *radius_m)
            }
            FilterMatch::Beyond { lat, lon, radius_m } => {
                distance_from(event, *lat, *lon).is_some_and(|d| d > *radius_m)
            }
        }
    }
}

fn distance_from(event: &Event, lat: f64, lon: f64) -> Option<f64> {
    event
        .point()
        .map(|p| p.distance_m(&Point::new(lat, lon)))
}

/// One ordered filter rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterRule {
    /// Effect when the predicate matches.
    pub action: FilterAction,
    /// Predicate.
    #[serde(flatten)]
    pub matcher: FilterMatch,
}

impl FilterRule {
    /// Suppress events matching `matcher`.
    pub fn suppress(matcher: FilterMatch) -> Self {
        Self {
            action: FilterAction::Suppress,
            matcher,
        }
    }

    /// Allow events matching `matcher`.
    pub fn allow(matcher: FilterMatch) -> Self {
        Self {
            action: FilterAction::Allow,
            matcher,
        }
    }

    /// Suppress by type prefix.
    pub fn suppress_type(prefix: impl Into<String>) -> Self {
        Self::suppress(FilterMatch::TypePrefix {
            prefix: prefix.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{Group, PositionDetail};

    fn position(type_tag: &str, team: Option<&str>, lat: f64, lon: f64) -> Event {
        let detail = PositionDetail {
            group: team.map(|t| Group::new(t, "Team Member")),
            ..Default::default()
        };
        Event::position("u", type_tag, Point::new(lat, lon), detail)
            .build()
            .unwrap()
    }

    #[test]
    fn test_type_prefix_and_affiliation() {
        let hostile = position("a-h-G", None, 0.0, 0.0);
        assert!(FilterMatch::TypePrefix { prefix: "a-h".into() }.matches(&hostile));
        assert!(!FilterMatch::TypePrefix { prefix: "a-f".into() }.matches(&hostile));
        assert!(FilterMatch::Affiliation {
            affiliation: Affiliation::Hostile
        }
        .matches(&hostile));
        assert!(FilterMatch::Category {
            category: Category::Position
        }
        .matches(&hostile));
    }

    #[test]
    fn test_team() {
        let cyan = position("a-f-G", Some("Cyan"), 0.0, 0.0);
        assert!(FilterMatch::Team { team: "cyan".into() }.matches(&cyan));
        assert!(!FilterMatch::Team { team: "Red".into() }.matches(&cyan));
        assert!(!FilterMatch::Team { team: "Cyan".into() }.matches(&position("a-f-G", None, 0.0, 0.0)));
    }

    #[test]
    fn test_distance() {
        let near = position("a-f-G", None, 38.8977, -77.0365);
        let within = FilterMatch::Within {
            lat: 38.8899,
            lon: -77.0091,
            radius_m: 5_000.0,
        };
        let beyond = FilterMatch::Beyond {
            lat: 38.8899,
            lon: -77.0091,
            radius_m: 5_000.0,
        };
        assert!(within.matches(&near));
        assert!(!beyond.matches(&near));

        let ping = Event::builder("t-x-c-t").build().unwrap();
        assert!(!within.matches(&ping));
        assert!(!beyond.matches(&ping));
    }

    #[test]
    fn test_rule_from_toml() {
        #[derive(Deserialize)]
        struct Rules {
            filters: Vec<FilterRule>,
        }
        let rules: Rules = toml::from_str(
            r#"
            [[filters]]
            action = "allow"
            match = "team"
            team = "Cyan"

            [[filters]]
            action = "suppress"
            match = "type_prefix"
            prefix = "b-a"
            "#,
        )
        .unwrap();
        assert_eq!(
            rules.filters,
            vec![
                FilterRule::allow(FilterMatch::Team { team: "Cyan".into() }),
                FilterRule::suppress_type("b-a"),
            ]
        );
    }
}
