//! Step condition expressions.
//!
//! ```text
//! condition := clause*
//! clause    := "not" ident | ident
//! ident     := any token other than "not"
//! ```
//!
//! Tokens are separated by whitespace and commas; all clauses must hold.
//! An identifier is asserted true, `not ident` asserted false. Names are
//! looked up in the local build meta first and the project configuration
//! second. Only boolean values constrain a clause: a missing or non-boolean
//! value lets the clause pass.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::config::ProjectConfig;
use crate::error::ConditionError;
use crate::meta::BuildMeta;

const NOT: &str = "not";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Clause {
    pub name: String,
    pub negated: bool,
}

impl Clause {
    /// The value this clause needs to see to pass.
    pub fn expected(&self) -> bool {
        !self.negated
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "not {}", self.name)
        } else {
            f.write_str(&self.name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Condition {
    clauses: Vec<Clause>,
}

impl Condition {
    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    /// Returns the first clause that does not hold, if any.
    pub fn first_failure(&self, meta: &BuildMeta, config: &ProjectConfig) -> Option<&Clause> {
        self.clauses.iter().find(|clause| {
            lookup_flag(&clause.name, meta, config)
                .is_some_and(|actual| actual != clause.expected())
        })
    }

    pub fn holds(&self, meta: &BuildMeta, config: &ProjectConfig) -> bool {
        self.first_failure(meta, config).is_none()
    }
}

impl FromStr for Condition {
    type Err = ConditionError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = input
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|token| !token.is_empty())
            .collect();

        let mut clauses = Vec::new();
        let mut index = 0;
        while index < tokens.len() {
            if tokens[index] == NOT {
                match tokens.get(index + 1) {
                    None => return Err(ConditionError::DanglingNot { position: index }),
                    Some(&NOT) => return Err(ConditionError::DoubleNot { position: index }),
                    Some(name) => {
                        clauses.push(Clause {
                            name: (*name).to_string(),
                            negated: true,
                        });
                        index += 2;
                    }
                }
            } else {
                clauses.push(Clause {
                    name: tokens[index].to_string(),
                    negated: false,
                });
                index += 1;
            }
        }
        Ok(Self { clauses })
    }
}

/// Boolean value of `name`, or `None` when the clause is unconstrained.
/// A key present in meta shadows the configuration even when it is not a
/// boolean.
fn lookup_flag(name: &str, meta: &BuildMeta, config: &ProjectConfig) -> Option<bool> {
    match meta.get(name) {
        Some(value) => value.as_bool(),
        None => config.attribute(name).as_ref().and_then(Value::as_bool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(clean: bool) -> ProjectConfig {
        let mut config = ProjectConfig::default();
        config.clean = clean;
        config.automated = false;
        config
    }

    #[test]
    fn parses_negations_and_separators() {
        let condition: Condition = "not automated, clean,fast".parse().unwrap();
        let rendered: Vec<String> = condition.clauses().iter().map(|c| c.to_string()).collect();
        assert_eq!(rendered, vec!["not automated", "clean", "fast"]);
    }

    #[test]
    fn rejects_dangling_not() {
        assert_eq!(
            "clean not".parse::<Condition>(),
            Err(ConditionError::DanglingNot { position: 1 })
        );
        assert_eq!(
            "not ,".parse::<Condition>(),
            Err(ConditionError::DanglingNot { position: 0 })
        );
        assert_eq!(
            "not not clean".parse::<Condition>(),
            Err(ConditionError::DoubleNot { position: 0 })
        );
    }

    #[test]
    fn empty_condition_always_holds() {
        let condition: Condition = "  ".parse().unwrap();
        assert!(condition.holds(&BuildMeta::new(), &config(true)));
    }

    #[test]
    fn reports_first_failing_clause() {
        let condition: Condition = "not automated, not clean".parse().unwrap();
        let meta = BuildMeta::new();
        let failure = condition.first_failure(&meta, &config(true)).unwrap();
        assert_eq!(failure.to_string(), "not clean");
        assert!(condition.holds(&meta, &config(false)));
    }

    #[test]
    fn a_and_not_b_truth_table() {
        let condition: Condition = "A, not B".parse().unwrap();
        let values = [None, Some(json!(true)), Some(json!(false)), Some(json!("yes"))];
        for a in &values {
            for b in &values {
                let mut meta = BuildMeta::new();
                if let Some(a) = a {
                    meta.set("A", a.clone());
                }
                if let Some(b) = b {
                    meta.set("B", b.clone());
                }
                let a_ok = a.as_ref().and_then(Value::as_bool).unwrap_or(true);
                let b_ok = !b.as_ref().and_then(Value::as_bool).unwrap_or(false);
                assert_eq!(
                    condition.holds(&meta, &config(false)),
                    a_ok && b_ok,
                    "A={a:?} B={b:?}"
                );
            }
        }
    }

    #[test]
    fn meta_shadows_config() {
        let condition: Condition = "clean".parse().unwrap();
        let mut meta = BuildMeta::new();
        assert!(condition.holds(&meta, &config(true)));
        meta.set("clean", json!(false));
        assert!(!condition.holds(&meta, &config(true)));
        meta.set("clean", json!("not a flag"));
        assert!(condition.holds(&meta, &config(false)));
    }

    #[test]
    fn unknown_names_are_unconstrained() {
        let condition: Condition = "typo_flag, not other_typo".parse().unwrap();
        assert!(condition.holds(&BuildMeta::new(), &config(false)));
    }
}
