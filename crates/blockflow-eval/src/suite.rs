//! Test case documents.
//!
//! Two shapes are accepted: a single case
//! `{"input": [..], "expectedOutput": [..], "maxSteps": n}` and a named suite
//! `{"testCases": [{"name": .., "input": [..], "expectedOutput": [..]}]}`.
//! Numbers and booleans inside `input` and `expectedOutput` are read as
//! their JSON text, so `[1, true]` is the same as `["1", "true"]`.

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::Error;

/// One input queue and the output trace it should produce.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCase {
    #[serde(default)]
    pub name: String,

    #[serde(default, deserialize_with = "text_lines")]
    pub input: Vec<String>,

    #[serde(deserialize_with = "text_lines")]
    pub expected_output: Vec<String>,

    /// Per-case cap on the length of an explored schedule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_steps: Option<usize>,
}

impl TestCase {
    pub fn new<I, E>(name: impl Into<String>, input: I, expected_output: E) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        Self {
            name: name.into(),
            input: input.into_iter().map(Into::into).collect(),
            expected_output: expected_output.into_iter().map(Into::into).collect(),
            max_steps: None,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = Some(max_steps);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SuiteDocument {
    Named {
        #[serde(rename = "testCases")]
        test_cases: Vec<TestCase>,
    },
    Single(TestCase),
}

/// Parse either document shape into a list of cases.
///
/// Unnamed cases are called `case-<n>`, counting from 1.
pub fn parse_cases(text: &str) -> Result<Vec<TestCase>, Error> {
    let mut cases = match serde_json::from_str(text)? {
        SuiteDocument::Named { test_cases } => test_cases,
        SuiteDocument::Single(case) => vec![case],
    };
    for (i, case) in cases.iter_mut().enumerate() {
        if case.name.is_empty() {
            case.name = format!("case-{}", i + 1);
        }
    }
    Ok(cases)
}

fn text_lines<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error as _;
    use serde_json::Value as Json;

    Vec::<Json>::deserialize(deserializer)?
        .into_iter()
        .map(|item| match item {
            Json::String(s) => Ok(s),
            Json::Number(n) => Ok(n.to_string()),
            Json::Bool(b) => Ok(b.to_string()),
            other => Err(D::Error::custom(format!(
                "expected a string, number or boolean, found {}",
                other
            ))),
        })
        .collect()
}
