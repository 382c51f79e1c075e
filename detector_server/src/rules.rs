//! Target rules deciding which style class the top prediction maps to.
//!
use std::{fmt, str::FromStr};

use common::protocol::Prediction;
use serde::{Deserialize, Serialize};

/// Style class set while a llama (or anything looking like one) is in view.
pub const LLAMA_CLASS: &str = "llama";
/// Easter egg class.
pub const BADGER_CLASS: &str = "badger";

/// Map labels containing any of `patterns` to the style class `class`.
///
/// Parsed from `class=pattern[,pattern...]`. A bare `class` uses the class name as the only
/// pattern.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct TargetRule {
    pub class: String,
    pub patterns: Vec<String>,
    /// Play the feedback sound whenever this rule matches.
    pub sound: bool,
}

impl TargetRule {
    pub fn new(class: &str, patterns: &[&str], sound: bool) -> Self {
        Self {
            class: class.to_owned(),
            patterns: patterns.iter().map(|p| (*p).to_owned()).collect(),
            sound,
        }
    }

    pub fn matches(&self, label: &str) -> bool {
        self.patterns.iter().any(|pattern| label.contains(pattern.as_str()))
    }
}

impl FromStr for TargetRule {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (class, patterns) = match s.split_once('=') {
            Some((class, patterns)) => (class.trim(), patterns),
            None => (s.trim(), s),
        };
        if class.is_empty() {
            return Err(format!("missing class name in target {s:?}"));
        }

        let patterns: Vec<String> = patterns
            .split(',')
            .map(str::trim)
            .filter(|pattern| !pattern.is_empty())
            .map(str::to_owned)
            .collect();
        if patterns.is_empty() {
            return Err(format!("no label patterns in target {s:?}"));
        }

        Ok(Self {
            class: class.to_owned(),
            patterns,
            sound: false,
        })
    }
}

impl fmt::Display for TargetRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.class, self.patterns.join(","))
    }
}

/// Llamas are rare in ImageNet, iguanas get close enough. Badgers are the easter egg.
pub fn default_rules() -> Vec<TargetRule> {
    vec![
        TargetRule::new(LLAMA_CLASS, &["llama", "iguana"], true),
        TargetRule::new(BADGER_CLASS, &["badger"], false),
    ]
}

/// Outcome of one detection tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Verdict {
    /// Class of the first matching rule.
    pub class: Option<String>,
    pub sound: bool,
    pub top: Option<Prediction>,
}

impl Verdict {
    pub fn is_match(&self) -> bool {
        self.class.is_some()
    }
}

/// Match the highest ranked prediction against the rules in order.
///
/// Only the first prediction is inspected, the rest of the ranking is ignored.
pub fn evaluate(rules: &[TargetRule], predictions: &[Prediction]) -> Verdict {
    let top = match predictions.first() {
        Some(top) => top,
        None => return Verdict::default(),
    };

    let matched = rules.iter().find(|rule| rule.matches(&top.class_name));

    Verdict {
        class: matched.map(|rule| rule.class.clone()),
        sound: matched.map_or(false, |rule| rule.sound),
        top: Some(top.clone()),
    }
}

#[cfg(test)]
mod test {

    use super::*;

    fn ranked(labels: &[(&str, f32)]) -> Vec<Prediction> {
        labels
            .iter()
            .map(|(label, probability)| Prediction::new(*label, *probability))
            .collect()
    }

    #[test]
    fn test_iguana_matches_llama_rule() {
        let verdict = evaluate(&default_rules(), &ranked(&[("iguana-species-7", 0.92)]));

        assert_eq!(verdict.class.as_deref(), Some(LLAMA_CLASS));
        assert!(verdict.sound);
        assert_eq!(verdict.top, Some(Prediction::new("iguana-species-7", 0.92)));
    }

    #[test]
    fn test_badger_is_silent_easter_egg() {
        let verdict = evaluate(&default_rules(), &ranked(&[("badger", 0.6), ("llama", 0.3)]));

        assert_eq!(verdict.class.as_deref(), Some(BADGER_CLASS));
        assert!(!verdict.sound);
    }

    #[test]
    fn test_only_top_prediction_counts() {
        let verdict = evaluate(&default_rules(), &ranked(&[("table", 0.5), ("llama", 0.4)]));

        assert!(!verdict.is_match());
        assert!(!verdict.sound);
        assert_eq!(verdict.top.map(|top| top.class_name), Some("table".to_owned()));
    }

    #[test]
    fn test_empty_predictions() {
        assert_eq!(evaluate(&default_rules(), &[]), Verdict::default());
    }

    #[test]
    fn test_rule_order_decides() {
        let rules = vec![
            TargetRule::new("camelid", &["llama"], false),
            TargetRule::new(LLAMA_CLASS, &["llama"], true),
        ];
        let verdict = evaluate(&rules, &ranked(&[("llama", 0.9)]));

        assert_eq!(verdict.class.as_deref(), Some("camelid"));
    }

    #[test]
    fn test_parse_target_rules() {
        let rule: TargetRule = "llama=llama, iguana".parse().unwrap();
        assert_eq!(rule, TargetRule::new("llama", &["llama", "iguana"], false));
        assert_eq!(rule.to_string(), "llama=llama,iguana");

        let rule: TargetRule = "badger".parse().unwrap();
        assert_eq!(rule.patterns, vec!["badger".to_owned()]);

        assert!("=llama".parse::<TargetRule>().is_err());
        assert!("llama=,".parse::<TargetRule>().is_err());
    }
}
