//! Filter rule compilation and matching.
//!
//! # Matching
//! - Rules are tried in configuration order
//! - The request method must be in the rule's method set (case-insensitive)
//! - At least one path matcher must match the request path
//! - The first matching rule wins; no match means passthrough

use glob::{MatchOptions, Pattern};
use serde_json::Value;

use crate::config::{BodyFilterConfig, ConfigError, FilterRuleConfig};

/// `*` and `?` never cross a `/`, mirroring shell path globbing.
const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compiled path matcher.
#[derive(Debug, Clone)]
pub enum PathMatcher {
    Glob(Pattern),
    /// A matcher type this build does not know; never matches.
    Unsupported(String),
}

impl PathMatcher {
    fn compile(path: &str, kind: &str) -> Result<Self, ConfigError> {
        match kind {
            "glob" => Pattern::new(path)
                .map(PathMatcher::Glob)
                .map_err(|e| ConfigError::Rule(format!("invalid glob '{}': {}", path, e))),
            other => Ok(PathMatcher::Unsupported(other.to_string())),
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatcher::Glob(pattern) => pattern.matches_with(path, GLOB_OPTIONS),
            PathMatcher::Unsupported(kind) => {
                tracing::warn!(kind = %kind, "Unknown path matcher type, skipping");
                false
            }
        }
    }
}

/// A compiled body filter rule.
#[derive(Debug, Clone)]
pub struct FilterRule {
    methods: Vec<String>,
    paths: Vec<PathMatcher>,
    template: Value,
}

impl FilterRule {
    /// Compile a rule from its configuration.
    pub fn from_config(config: &FilterRuleConfig) -> Result<Self, ConfigError> {
        let paths = config
            .paths
            .iter()
            .map(|p| PathMatcher::compile(&p.path, &p.kind))
            .collect::<Result<Vec<_>, _>>()?;

        let template = serde_json::from_str(&config.filter)
            .map_err(|e| ConfigError::Rule(format!("invalid filter template: {}", e)))?;

        Ok(Self {
            methods: config.methods.clone(),
            paths,
            template,
        })
    }

    /// Template the matched body is projected through.
    pub fn template(&self) -> &Value {
        &self.template
    }

    pub fn methods(&self) -> &[String] {
        &self.methods
    }

    fn accepts_method(&self, method: &str) -> bool {
        self.methods.iter().any(|m| m.eq_ignore_ascii_case(method))
    }

    fn matches_path(&self, path: &str) -> bool {
        self.paths.iter().any(|matcher| matcher.matches(path))
    }
}

/// Ordered set of body filter rules.
#[derive(Debug, Clone, Default)]
pub struct BodyFilter {
    rules: Vec<FilterRule>,
}

impl BodyFilter {
    pub fn new(rules: Vec<FilterRule>) -> Self {
        Self { rules }
    }

    /// Compile every configured rule.
    pub fn from_config(config: &BodyFilterConfig) -> Result<Self, ConfigError> {
        let rules = config
            .rules
            .iter()
            .map(FilterRule::from_config)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(rules))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule applying to this method and path.
    pub fn match_rule(&self, method: &str, path: &str) -> Option<&FilterRule> {
        self.rules
            .iter()
            .filter(|rule| rule.accepts_method(method))
            .find(|rule| rule.matches_path(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FilterPathConfig;

    fn rule(methods: &[&str], paths: &[(&str, &str)], filter: &str) -> FilterRuleConfig {
        FilterRuleConfig {
            methods: methods.iter().map(|m| m.to_string()).collect(),
            paths: paths
                .iter()
                .map(|(path, kind)| FilterPathConfig {
                    path: path.to_string(),
                    kind: kind.to_string(),
                })
                .collect(),
            filter: filter.to_string(),
        }
    }

    fn body_filter(rules: Vec<FilterRuleConfig>) -> BodyFilter {
        BodyFilter::from_config(&BodyFilterConfig {
            enabled: true,
            rules,
        })
        .unwrap()
    }

    const PODS: &str = "/api/v1/namespaces/default/pods";

    #[test]
    fn test_method_and_path_must_match() {
        let filter = body_filter(vec![rule(&["PATCH"], &[(PODS, "glob")], r#"{"metadata":{"name":"*"}}"#)]);

        assert!(filter.match_rule("PATCH", PODS).is_some());
        assert!(filter.match_rule("GET", PODS).is_none());
        assert!(filter.match_rule("POST", PODS).is_none());
        assert!(filter
            .match_rule("PATCH", "/api/v1/namespaces/default/deployments")
            .is_none());
    }

    #[test]
    fn test_method_ignores_case() {
        let filter = body_filter(vec![rule(&["PATCH"], &[(PODS, "glob")], "{}")]);
        assert!(filter.match_rule("patch", PODS).is_some());
    }

    #[test]
    fn test_first_matching_rule_wins() {
        let filter = body_filter(vec![
            rule(&["PATCH"], &[("/api/v1/namespaces/default/deployments", "glob")], r#"{"a":"*"}"#),
            rule(&["PATCH"], &[(PODS, "glob")], r#"{"b":"*"}"#),
            rule(&["PATCH"], &[("/api/v1/namespaces/*/*", "glob")], r#"{"c":"*"}"#),
        ]);

        let matched = filter.match_rule("PATCH", PODS).unwrap();
        assert_eq!(matched.template(), &serde_json::json!({"b": "*"}));
    }

    #[test]
    fn test_glob_does_not_cross_separator() {
        let filter = body_filter(vec![rule(
            &["PATCH"],
            &[("/apis/rbac.authorization.k8s.io/v1/*/*", "glob")],
            "{}",
        )]);

        assert!(filter
            .match_rule("PATCH", "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings/cluster-admin")
            .is_some());
        assert!(filter
            .match_rule("PATCH", "/apis/rbac.authorization.k8s.io/v1/namespaces/default/roles/x")
            .is_none());
    }

    #[test]
    fn test_unknown_matcher_type_is_skipped() {
        let filter = body_filter(vec![
            rule(&["PATCH"], &[(PODS, "regex"), (PODS, "glob")], r#"{"a":"*"}"#),
            rule(&["PATCH"], &[(PODS, "exact")], r#"{"b":"*"}"#),
        ]);

        let matched = filter.match_rule("PATCH", PODS).unwrap();
        assert_eq!(matched.template(), &serde_json::json!({"a": "*"}));

        let only_unknown = body_filter(vec![rule(&["PATCH"], &[(PODS, "exact")], "{}")]);
        assert!(only_unknown.match_rule("PATCH", PODS).is_none());
    }

    #[test]
    fn test_empty_rule_set_never_matches() {
        let filter = BodyFilter::default();
        assert!(filter.is_empty());
        assert!(filter.match_rule("PATCH", PODS).is_none());
    }

    #[test]
    fn test_invalid_rules_fail_compilation() {
        let bad_glob = BodyFilter::from_config(&BodyFilterConfig {
            enabled: true,
            rules: vec![rule(&["PATCH"], &[("/api/[", "glob")], "{}")],
        });
        assert!(matches!(bad_glob, Err(ConfigError::Rule(_))));

        let bad_template = BodyFilter::from_config(&BodyFilterConfig {
            enabled: true,
            rules: vec![rule(&["PATCH"], &[(PODS, "glob")], "{not json")],
        });
        assert!(matches!(bad_template, Err(ConfigError::Rule(_))));
    }
}
