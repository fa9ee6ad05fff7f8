use glob::Pattern;
use serde::{Deserialize, Serialize};

use stagehand_core::config::MatchSpec;

use crate::error::{EventsError, Result};
use crate::event::Event;

/// Where a constraint reads its left-hand value from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubjectKind {
    /// The event's own property bag.
    EventProperty,
    /// The property bag of the event's subject object.
    SubjectProperty,
    /// A named attribute of the subject (e.g. `"bound-id"`).
    SubjectAttribute,
}

/// Comparison applied to the resolved value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Verb {
    Equals,
    NotEquals,
    InList,
    /// Inclusive numeric bounds; both sides coerced to i64.
    InRange,
    /// Shell glob (`*`, `?`, `[…]`).
    Matches,
    IsPresent,
    IsAbsent,
}

/// Right-hand side of a constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    None,
    Str(String),
    List(Vec<String>),
    /// `[lo, hi]` bounds, kept as strings; numeric parsing happens at
    /// evaluation so a bad bound surfaces as a dispatch fault, not a
    /// registration failure.
    Range(String, String),
}

/// One `(subject_kind, key, verb, operand)` tuple.
#[derive(Debug, Clone)]
pub struct Constraint {
    pub subject: SubjectKind,
    pub key: String,
    pub verb: Verb,
    pub operand: Operand,
}

impl Constraint {
    pub fn equals(subject: SubjectKind, key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            subject,
            key: key.into(),
            verb: Verb::Equals,
            operand: Operand::Str(value.into()),
        }
    }

    pub fn not_equals(
        subject: SubjectKind,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            key: key.into(),
            verb: Verb::NotEquals,
            operand: Operand::Str(value.into()),
        }
    }

    pub fn in_list<I, S>(subject: SubjectKind, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            subject,
            key: key.into(),
            verb: Verb::InList,
            operand: Operand::List(values.into_iter().map(Into::into).collect()),
        }
    }

    pub fn in_range(
        subject: SubjectKind,
        key: impl Into<String>,
        lo: impl Into<String>,
        hi: impl Into<String>,
    ) -> Self {
        Self {
            subject,
            key: key.into(),
            verb: Verb::InRange,
            operand: Operand::Range(lo.into(), hi.into()),
        }
    }

    pub fn matches(subject: SubjectKind, key: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            subject,
            key: key.into(),
            verb: Verb::Matches,
            operand: Operand::Str(pattern.into()),
        }
    }

    pub fn present(subject: SubjectKind, key: impl Into<String>) -> Self {
        Self {
            subject,
            key: key.into(),
            verb: Verb::IsPresent,
            operand: Operand::None,
        }
    }

    pub fn absent(subject: SubjectKind, key: impl Into<String>) -> Self {
        Self {
            subject,
            key: key.into(),
            verb: Verb::IsAbsent,
            operand: Operand::None,
        }
    }

    /// Build a constraint from the stringly-typed config shape.
    pub fn from_match_spec(subject: SubjectKind, spec: &MatchSpec) -> Result<Self> {
        let malformed = |reason: &str| EventsError::MalformedConstraint {
            key: spec.key.clone(),
            reason: reason.to_string(),
        };

        let verb: Verb = serde_json::from_value(serde_json::Value::String(spec.verb.clone()))
            .map_err(|_| malformed("unknown verb"))?;

        let operand = match verb {
            Verb::IsPresent | Verb::IsAbsent => Operand::None,
            Verb::Equals | Verb::NotEquals | Verb::Matches => Operand::Str(
                spec.value
                    .as_str()
                    .ok_or_else(|| malformed("operand must be a string"))?
                    .to_string(),
            ),
            Verb::InList => {
                let items = spec
                    .value
                    .as_array()
                    .ok_or_else(|| malformed("operand must be a list of strings"))?;
                let items: Option<Vec<String>> = items
                    .iter()
                    .map(|v| v.as_str().map(str::to_string))
                    .collect();
                Operand::List(items.ok_or_else(|| malformed("operand must be a list of strings"))?)
            }
            Verb::InRange => {
                let bounds = spec
                    .value
                    .as_array()
                    .filter(|a| a.len() == 2)
                    .ok_or_else(|| malformed("operand must be a [lo, hi] pair"))?;
                let bound = |v: &serde_json::Value| match v {
                    serde_json::Value::String(s) => Some(s.clone()),
                    serde_json::Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                match (bound(&bounds[0]), bound(&bounds[1])) {
                    (Some(lo), Some(hi)) => Operand::Range(lo, hi),
                    _ => return Err(malformed("operand must be a [lo, hi] pair")),
                }
            }
        };

        Ok(Self {
            subject,
            key: spec.key.clone(),
            verb,
            operand,
        })
    }
}

/// A non-empty conjunction of constraints, compiled for evaluation.
///
/// A hook holds a list of interests interpreted disjunctively; an empty
/// interest *list* on a hook matches every event, but an interest itself must
/// carry at least one constraint.
#[derive(Debug, Clone)]
pub struct Interest {
    constraints: Vec<CompiledConstraint>,
}

#[derive(Debug, Clone)]
struct CompiledConstraint {
    constraint: Constraint,
    /// Pre-compiled glob for the `Matches` verb.
    pattern: Option<Pattern>,
}

impl Interest {
    /// Compile a constraint list.
    ///
    /// Rejects an empty list, an empty key, a verb/operand shape mismatch,
    /// and an unparsable glob pattern. Numeric validation of `Range` bounds
    /// is deferred to evaluation (see [`Interest::matches`]).
    pub fn compile(constraints: impl IntoIterator<Item = Constraint>) -> Result<Self> {
        let constraints: Vec<Constraint> = constraints.into_iter().collect();
        if constraints.is_empty() {
            return Err(EventsError::MalformedConstraint {
                key: String::new(),
                reason: "empty constraint list".to_string(),
            });
        }

        let mut compiled = Vec::with_capacity(constraints.len());
        for constraint in constraints {
            let malformed = |reason: &str| EventsError::MalformedConstraint {
                key: constraint.key.clone(),
                reason: reason.to_string(),
            };

            if constraint.key.is_empty() {
                return Err(malformed("empty key"));
            }

            let mut pattern = None;
            match (constraint.verb, &constraint.operand) {
                (Verb::Equals | Verb::NotEquals, Operand::Str(_)) => {}
                (Verb::Matches, Operand::Str(p)) => {
                    pattern = Some(
                        Pattern::new(p).map_err(|e| malformed(&format!("bad pattern: {e}")))?,
                    );
                }
                (Verb::InList, Operand::List(items)) => {
                    if items.is_empty() {
                        return Err(malformed("empty membership list"));
                    }
                }
                (Verb::InRange, Operand::Range(_, _)) => {}
                (Verb::IsPresent | Verb::IsAbsent, Operand::None) => {}
                _ => return Err(malformed("operator not applicable to operand shape")),
            }

            compiled.push(CompiledConstraint {
                constraint,
                pattern,
            });
        }

        Ok(Self {
            constraints: compiled,
        })
    }

    /// Evaluate all constraints against `event` (conjunction).
    ///
    /// `Err` means a malformed tuple was detected at evaluation time — a
    /// non-numeric range bound — and the caller should report it to the error
    /// sink; the interest is then treated as not matching.
    pub fn matches(&self, event: &Event) -> Result<bool> {
        for compiled in &self.constraints {
            if !compiled.eval(event)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl CompiledConstraint {
    fn eval(&self, event: &Event) -> Result<bool> {
        let c = &self.constraint;

        let value: Option<String> = match c.subject {
            SubjectKind::EventProperty => event.properties().get(&c.key).map(str::to_string),
            SubjectKind::SubjectProperty => event.subject().and_then(|s| s.property(&c.key)),
            SubjectKind::SubjectAttribute => event.subject().and_then(|s| s.attribute(&c.key)),
        };

        // An absent value satisfies IsAbsent, fails everything else.
        let value = match value {
            Some(v) => v,
            None => return Ok(c.verb == Verb::IsAbsent),
        };

        match (c.verb, &c.operand) {
            (Verb::IsAbsent, _) => Ok(false),
            (Verb::IsPresent, _) => Ok(true),
            (Verb::Equals, Operand::Str(want)) => Ok(value == *want),
            (Verb::NotEquals, Operand::Str(want)) => Ok(value != *want),
            (Verb::InList, Operand::List(items)) => Ok(items.iter().any(|item| *item == value)),
            (Verb::Matches, _) => Ok(self
                .pattern
                .as_ref()
                .is_some_and(|p| p.matches(&value))),
            (Verb::InRange, Operand::Range(lo, hi)) => {
                let parse_bound = |bound: &str| -> Result<i64> {
                    bound.trim().parse().map_err(|_| EventsError::MalformedConstraint {
                        key: c.key.clone(),
                        reason: format!("non-numeric range bound '{bound}'"),
                    })
                };
                let lo = parse_bound(lo)?;
                let hi = parse_bound(hi)?;
                // A non-numeric *value* fails the constraint without fault.
                match value.trim().parse::<i64>() {
                    Ok(v) => Ok(v >= lo && v <= hi),
                    Err(_) => Ok(false),
                }
            }
            // compile() rejected every other combination
            _ => Err(EventsError::MalformedConstraint {
                key: c.key.clone(),
                reason: "operator not applicable to operand shape".to_string(),
            }),
        }
    }
}
