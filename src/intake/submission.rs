use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::scheduler::job::{JobId, Priority};

/// Priority as producers send it: a tier name or its numeral.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawPriority {
    Numeric(i64),
    Named(String),
}

/// Dependency as producers send it: an id, a numeric string, or `""` for none.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawDependency {
    Id(i64),
    Text(String),
}

/// A raw job submission, exactly as carried on a category queue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub priority: Option<RawPriority>,
    #[serde(default)]
    pub dependency: Option<RawDependency>,
    /// Producer-side receipt time in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_stamp: Option<i64>,
}

/// A submission whose shape has been checked and normalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedSubmission {
    pub name: String,
    pub priority: Priority,
    pub dependency: Option<JobId>,
    pub time_stamp: Option<i64>,
}

impl Submission {
    pub fn from_json(body: &[u8]) -> Result<Self, ValidationError> {
        serde_json::from_slice(body).map_err(|e| ValidationError::MalformedPayload(e.to_string()))
    }

    pub fn to_json(&self) -> Vec<u8> {
        // Plain strings and integers only; serialization cannot fail.
        serde_json::to_vec(self).unwrap_or_default()
    }

    /// Stamp with the ingress receipt time, replacing any value the client sent.
    pub fn stamped(mut self, time_stamp: i64) -> Self {
        self.time_stamp = Some(time_stamp);
        self
    }

    /// Check required fields and normalize priority and dependency.
    pub fn normalize(&self) -> Result<NormalizedSubmission, ValidationError> {
        let name = self
            .name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or(ValidationError::MissingName)?
            .to_string();

        let priority = match &self.priority {
            None => return Err(ValidationError::MissingPriority),
            Some(RawPriority::Numeric(n)) => Priority::try_from(*n)?,
            Some(RawPriority::Named(s)) => Priority::parse(s)?,
        };

        let dependency = match &self.dependency {
            None => None,
            Some(RawDependency::Id(id)) => Some(parse_dependency_id(*id)?),
            Some(RawDependency::Text(s)) if s.trim().is_empty() => None,
            Some(RawDependency::Text(s)) => {
                let id: i64 = s
                    .trim()
                    .parse()
                    .map_err(|_| ValidationError::MalformedDependency(s.clone()))?;
                Some(parse_dependency_id(id)?)
            }
        };

        Ok(NormalizedSubmission {
            name,
            priority,
            dependency,
            time_stamp: self.time_stamp,
        })
    }
}

fn parse_dependency_id(id: i64) -> Result<JobId, ValidationError> {
    u64::try_from(id)
        .ok()
        .filter(|id| *id > 0)
        .map(JobId)
        .ok_or_else(|| ValidationError::MalformedDependency(id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(json: &str) -> Result<NormalizedSubmission, ValidationError> {
        Submission::from_json(json.as_bytes())?.normalize()
    }

    #[test]
    fn named_and_numeric_priorities_normalize() {
        let named = parse(r#"{"name":"welcome","priority":"High"}"#).unwrap();
        assert_eq!(named.priority, Priority::High);
        let numeric = parse(r#"{"name":"welcome","priority":3}"#).unwrap();
        assert_eq!(numeric.priority, Priority::Low);
    }

    #[test]
    fn empty_dependency_means_none() {
        let s = parse(r#"{"name":"a","priority":1,"dependency":""}"#).unwrap();
        assert_eq!(s.dependency, None);
        let s = parse(r#"{"name":"a","priority":1,"dependency":null}"#).unwrap();
        assert_eq!(s.dependency, None);
        let s = parse(r#"{"name":"a","priority":1}"#).unwrap();
        assert_eq!(s.dependency, None);
    }

    #[test]
    fn numeric_and_string_dependencies_normalize() {
        let s = parse(r#"{"name":"a","priority":1,"dependency":4}"#).unwrap();
        assert_eq!(s.dependency, Some(JobId(4)));
        let s = parse(r#"{"name":"a","priority":1,"dependency":"12"}"#).unwrap();
        assert_eq!(s.dependency, Some(JobId(12)));
    }

    #[test]
    fn invalid_shapes_are_rejected() {
        assert_eq!(
            parse(r#"{"priority":1}"#),
            Err(ValidationError::MissingName)
        );
        assert_eq!(
            parse(r#"{"name":"   ","priority":1}"#),
            Err(ValidationError::MissingName)
        );
        assert_eq!(
            parse(r#"{"name":"a"}"#),
            Err(ValidationError::MissingPriority)
        );
        assert_eq!(
            parse(r#"{"name":"a","priority":"Urgent"}"#),
            Err(ValidationError::InvalidPriority("Urgent".to_string()))
        );
        assert_eq!(
            parse(r#"{"name":"a","priority":5}"#),
            Err(ValidationError::InvalidPriority("5".to_string()))
        );
        assert_eq!(
            parse(r#"{"name":"a","priority":1,"dependency":"abc"}"#),
            Err(ValidationError::MalformedDependency("abc".to_string()))
        );
        assert_eq!(
            parse(r#"{"name":"a","priority":1,"dependency":0}"#),
            Err(ValidationError::MalformedDependency("0".to_string()))
        );
        assert!(matches!(
            parse("not json"),
            Err(ValidationError::MalformedPayload(_))
        ));
    }

    #[test]
    fn stamped_replaces_client_timestamp() {
        let s = Submission {
            time_stamp: Some(i64::MAX),
            ..Default::default()
        };
        assert_eq!(s.stamped(9).time_stamp, Some(9));
        assert_eq!(Submission::default().stamped(9).time_stamp, Some(9));
    }
}
