//! Trigger location suggestions
//!
//! Maps parameter names to the places their values usually resurface: a
//! `comment` field lands in a moderation queue, a User-Agent header in an
//! analytics dashboard. Matching is fuzzy over normalized names, so
//! `user_name`, `username`, and `first-name` all hit the `name` pattern.

use crate::models::Injection;
use std::fmt;

/// How likely the payload is to execute at the suggested location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Likelihood {
    High,
    Medium,
    Low,
}

impl fmt::Display for Likelihood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Likelihood::High => write!(f, "high"),
            Likelihood::Medium => write!(f, "medium"),
            Likelihood::Low => write!(f, "low"),
        }
    }
}

/// A place where an injected payload might execute, with the manual steps
/// to get there.
#[derive(Debug, Clone)]
pub struct TriggerSuggestion {
    pub location: &'static str,
    pub likelihood: Likelihood,
    pub description: &'static str,
    pub manual_steps: &'static [&'static str],
}

/// Built-in parameter-pattern map.
fn builtin_map() -> Vec<(&'static str, Vec<TriggerSuggestion>)> {
    vec![
        (
            "name",
            vec![
                TriggerSuggestion {
                    location: "Admin User List",
                    likelihood: Likelihood::High,
                    description: "User names often displayed in admin dashboards",
                    manual_steps: &[
                        "Log into admin panel",
                        "Navigate to User Management",
                        "View user list or search for injected user",
                    ],
                },
                TriggerSuggestion {
                    location: "Activity Logs",
                    likelihood: Likelihood::Medium,
                    description: "User activity may be logged with name field",
                    manual_steps: &[
                        "Access activity/audit log viewer",
                        "Filter by recent activity",
                        "Review entries containing injected data",
                    ],
                },
            ],
        ),
        (
            "comment",
            vec![TriggerSuggestion {
                location: "Content Moderation Queue",
                likelihood: Likelihood::High,
                description: "Comments typically reviewed before publishing",
                manual_steps: &[
                    "Access moderation dashboard",
                    "Review pending comments",
                    "View comment detail page",
                ],
            }],
        ),
        (
            "message",
            vec![TriggerSuggestion {
                location: "Support Ticket Dashboard",
                likelihood: Likelihood::High,
                description: "Messages often reviewed by support staff",
                manual_steps: &[
                    "Access support/helpdesk dashboard",
                    "View pending tickets",
                    "Open ticket detail",
                ],
            }],
        ),
        (
            "user-agent",
            vec![TriggerSuggestion {
                location: "Analytics Dashboard",
                likelihood: Likelihood::Medium,
                description: "User-Agent strings logged for analytics",
                manual_steps: &[
                    "Access analytics or reporting dashboard",
                    "View visitor/session details",
                    "Check raw request logs",
                ],
            }],
        ),
        (
            "referer",
            vec![TriggerSuggestion {
                location: "Access Logs Viewer",
                likelihood: Likelihood::Medium,
                description: "Referer headers displayed in admin logs",
                manual_steps: &[
                    "Access admin log viewer",
                    "Filter by recent requests",
                    "View request details",
                ],
            }],
        ),
        (
            "email",
            vec![TriggerSuggestion {
                location: "Admin User List",
                likelihood: Likelihood::High,
                description: "Email addresses displayed in user management",
                manual_steps: &[
                    "Access admin panel",
                    "Navigate to user list",
                    "Search or filter by email",
                ],
            }],
        ),
        (
            "search",
            vec![TriggerSuggestion {
                location: "Search Analytics",
                likelihood: Likelihood::Medium,
                description: "Search queries often logged for analytics",
                manual_steps: &[
                    "Access search analytics dashboard",
                    "View popular/recent searches",
                    "Check search logs",
                ],
            }],
        ),
        (
            "title",
            vec![TriggerSuggestion {
                location: "Content List Page",
                likelihood: Likelihood::High,
                description: "Titles displayed in content management lists",
                manual_steps: &[
                    "Access admin/CMS dashboard",
                    "View content list",
                    "Check detail page",
                ],
            }],
        ),
        (
            "description",
            vec![TriggerSuggestion {
                location: "Content Preview",
                likelihood: Likelihood::Medium,
                description: "Descriptions shown in content listings",
                manual_steps: &[
                    "Access content management",
                    "View list or search results",
                    "Check detail/preview page",
                ],
            }],
        ),
        (
            "filename",
            vec![TriggerSuggestion {
                location: "File Manager",
                likelihood: Likelihood::High,
                description: "Filenames displayed in file listing",
                manual_steps: &[
                    "Access file manager or media library",
                    "View uploaded files list",
                    "Check file details",
                ],
            }],
        ),
    ]
}

/// Suggestion engine over the parameter-pattern map.
pub struct TriggerSuggester {
    map: Vec<(&'static str, Vec<TriggerSuggestion>)>,
}

impl Default for TriggerSuggester {
    fn default() -> Self {
        Self {
            map: builtin_map(),
        }
    }
}

impl TriggerSuggester {
    pub fn new() -> Self {
        Self::default()
    }

    /// Suggestions for a parameter name, deduplicated by location and
    /// sorted most-likely first.
    pub fn suggestions_for_param(&self, parameter: &str) -> Vec<TriggerSuggestion> {
        let normalized = normalize(parameter);
        let mut matched: Vec<TriggerSuggestion> = Vec::new();

        for (pattern, suggestions) in &self.map {
            let pattern_normalized = normalize(pattern);
            if normalized.contains(&pattern_normalized) || pattern_normalized.contains(&normalized)
            {
                matched.extend(suggestions.iter().cloned());
            }
        }

        let mut seen = std::collections::HashSet::new();
        matched.retain(|s| seen.insert(s.location));
        matched.sort_by_key(|s| s.likelihood);
        matched
    }

    /// Suggestions for a recorded injection.
    pub fn suggestions_for_injection(&self, injection: &Injection) -> Vec<TriggerSuggestion> {
        self.suggestions_for_param(&injection.parameter)
    }
}

fn normalize(name: &str) -> String {
    name.to_lowercase().replace(['_', '-'], "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuzzy_matches_name_variants() {
        let suggester = TriggerSuggester::new();
        for param in ["name", "user_name", "username", "first-name"] {
            let suggestions = suggester.suggestions_for_param(param);
            assert!(
                suggestions.iter().any(|s| s.location == "Admin User List"),
                "{param} should match the name pattern"
            );
        }
    }

    #[test]
    fn test_unknown_param_yields_nothing() {
        let suggester = TriggerSuggester::new();
        assert!(suggester.suggestions_for_param("zzz_opaque").is_empty());
    }

    #[test]
    fn test_sorted_by_likelihood() {
        let suggester = TriggerSuggester::new();
        let suggestions = suggester.suggestions_for_param("name");
        assert!(suggestions.len() >= 2);
        assert!(suggestions
            .windows(2)
            .all(|w| w[0].likelihood <= w[1].likelihood));
    }

    #[test]
    fn test_deduplicates_by_location() {
        let suggester = TriggerSuggester::new();
        // "name" also fuzzily matches "filename" and "username" patterns;
        // locations must still be unique.
        let suggestions = suggester.suggestions_for_param("name");
        let mut locations: Vec<&str> = suggestions.iter().map(|s| s.location).collect();
        locations.sort_unstable();
        locations.dedup();
        assert_eq!(locations.len(), suggestions.len());
    }
}
