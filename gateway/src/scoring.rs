//! Answer scoring for saved study results.

use std::collections::HashMap;

use serde_json::Value;

use crate::app::study::TaskRecord;

/// Only the first response of each task counts toward the score.
fn is_scored_key(key: &str) -> bool {
    key.ends_with(".1")
}

/// An answer is either a raw choice or an object with an `answer`
/// field.
fn answer_of(value: &Value) -> Option<&str> {
    match value {
        Value::String(s) => Some(s),
        Value::Object(map) => map.get("answer").and_then(Value::as_str),
        _ => None,
    }
}

/// Counts correct answers over all scored response keys and reports
/// per-key correctness.
pub fn evaluate_answers(
    tasks: &HashMap<String, TaskRecord>,
    right_choices: &[String],
) -> (u64, HashMap<String, bool>) {
    let mut correct = 0;
    let mut per_key = HashMap::new();
    for task in tasks.values() {
        for (key, value) in &task.responses {
            if !is_scored_key(key) {
                continue;
            }
            let ok = answer_of(value).map_or(false, |a| right_choices.iter().any(|c| c == a));
            if ok {
                correct += 1;
            }
            per_key.insert(key.clone(), ok);
        }
    }
    (correct, per_key)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn tasks(entries: &[(&str, &[(&str, Value)])]) -> HashMap<String, TaskRecord> {
        entries
            .iter()
            .map(|(task, responses)| {
                (
                    task.to_string(),
                    TaskRecord {
                        responses: responses
                            .iter()
                            .map(|(k, v)| (k.to_string(), v.clone()))
                            .collect(),
                    },
                )
            })
            .collect()
    }

    fn choices(cs: &[&str]) -> Vec<String> {
        cs.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn raw_choice_is_scored() {
        let tasks = tasks(&[("5", &[("5.1", json!("A"))])]);
        let (correct, per_key) = evaluate_answers(&tasks, &choices(&["A"]));
        assert_eq!(correct, 1);
        assert_eq!(per_key, HashMap::from([("5.1".to_string(), true)]));
    }

    #[test]
    fn wrapped_answer_is_unwrapped() {
        let tasks = tasks(&[("3", &[("3.1", json!({"answer": "B", "elapsed": 12}))])]);
        let (correct, per_key) = evaluate_answers(&tasks, &choices(&["B"]));
        assert_eq!(correct, 1);
        assert!(per_key["3.1"]);
    }

    #[test]
    fn only_first_responses_count() {
        let tasks = tasks(&[("5", &[("5.1", json!("A")), ("5.2", json!("A"))])]);
        let (correct, per_key) = evaluate_answers(&tasks, &choices(&["A"]));
        assert_eq!(correct, 1);
        assert!(!per_key.contains_key("5.2"));
    }

    #[test]
    fn wrong_and_malformed_answers_score_zero() {
        let tasks = tasks(&[
            ("1", &[("1.1", json!("C"))]),
            ("2", &[("2.1", json!(42))]),
        ]);
        let (correct, per_key) = evaluate_answers(&tasks, &choices(&["A", "B"]));
        assert_eq!(correct, 0);
        assert_eq!(per_key.values().filter(|ok| **ok).count(), 0);
        assert_eq!(per_key.len(), 2);
    }
}
