//! Property-based tests for the gateway.
//!
//! These tests use proptest to verify properties that should hold for all
//! inputs: request validation bounds, reference extraction totality, and the
//! recommendation parser's tolerance for surrounding prose.

use eyecare_gateway::{
    api::models::{validate_sampling, ChatCompletionRequest, Message},
    core::FormatError,
    services::{
        prompts::{select_topic, PromptTopic},
        recommendation::parse_recommendation,
        references::{extract_references, REFERENCES_MARKER},
    },
};
use proptest::prelude::*;

fn chat_request(temperature: f64) -> ChatCompletionRequest {
    ChatCompletionRequest {
        messages: vec![Message::user("hi")],
        model: None,
        temperature: Some(temperature),
        max_tokens: None,
        stream: None,
    }
}

/// Citation-looking lines, some with a year, some malformed
fn reference_line_strategy() -> impl Strategy<Value = String> {
    prop_oneof![
        ("[a-zA-Z ]{1,12}", "[a-zA-Z ]{1,12}", 1900i32..2100).prop_map(|(t, s, y)| format!("- {}, {}, {}", t, s, y)),
        ("[a-zA-Z]{1,12}", "[a-zA-Z]{1,12}").prop_map(|(t, s)| format!("-{}，{}", t, s)),
        "[^,，\n]{0,20}",
        "[^\n]{0,30}",
    ]
}

proptest! {
    /// Property: every temperature inside [0, 2] passes validation
    #[test]
    fn prop_temperature_in_range_accepted(temperature in 0.0f64..=2.0f64) {
        prop_assert!(chat_request(temperature).validate().is_ok());
        prop_assert!(validate_sampling(Some(temperature), None).is_ok());
    }

    /// Property: every temperature outside [0, 2] is rejected
    #[test]
    fn prop_temperature_out_of_range_rejected(
        temperature in prop_oneof![-1000.0f64..-1e-9f64, 2.000000001f64..1000.0f64]
    ) {
        prop_assert!(chat_request(temperature).validate().is_err());
    }

    /// Property: text without the marker never yields references
    #[test]
    fn prop_no_marker_no_references(text in any::<String>()) {
        prop_assume!(!text.contains(REFERENCES_MARKER));
        prop_assert!(extract_references(&text).is_empty());
    }

    /// Property: extraction never panics and only sees the last marker's region
    #[test]
    fn prop_extraction_is_total(
        prefix in any::<String>(),
        earlier in prop::collection::vec(reference_line_strategy(), 0..5),
        lines in prop::collection::vec(reference_line_strategy(), 0..10),
    ) {
        prop_assume!(!lines.iter().any(|l| l.contains(REFERENCES_MARKER)));
        let text = format!(
            "{}{}\n{}\n{}\n{}",
            prefix,
            REFERENCES_MARKER,
            earlier.join("\n"),
            REFERENCES_MARKER,
            lines.join("\n")
        );

        let only_last = format!("{}\n{}", REFERENCES_MARKER, lines.join("\n"));
        let citations = extract_references(&text);
        prop_assert_eq!(&citations, &extract_references(&only_last));
        prop_assert!(citations.len() <= lines.len());
        for citation in &citations {
            prop_assert!(citation.source.is_some());
        }
    }

    /// Property: a valid object survives brace-free prose on both sides
    #[test]
    fn prop_recommendation_found_inside_prose(
        before in "[^{}]{0,20}[^{}\\s][^{}]{0,20}",
        after in "[^{}]{0,40}",
        name in "[a-zA-Z]{1,10}",
    ) {
        let object = format!(
            r#"{{"medications":[{{"medication_name":"{}","dosage":"1","frequency":"daily","side_effects":null}}],"treatment_plan":{{"treatment_type":"drug","treatment_detail":"d"}}}}"#,
            name
        );
        let raw = format!("{}{}{}", before, object, after);
        let recommendation = parse_recommendation(&raw);
        prop_assert!(recommendation.is_ok());
        prop_assert_eq!(&recommendation.unwrap().medications[0].medication_name, &name);
    }

    /// Property: text that already opens with the object is decoded as-is,
    /// so trailing prose makes it invalid JSON
    #[test]
    fn prop_recommendation_with_trailing_prose_rejected(
        leading in "\\s{0,3}",
        after in "[a-zA-Z][^{}]{0,40}",
    ) {
        let raw = format!(
            r#"{}{{"medications":[],"treatment_plan":{{"treatment_type":"t","treatment_detail":"d"}}}}{}"#,
            leading, after
        );
        prop_assert!(matches!(parse_recommendation(&raw), Err(FormatError::InvalidJson(_))));
    }

    /// Property: the parser never panics on arbitrary input
    #[test]
    fn prop_recommendation_parser_is_total(raw in any::<String>()) {
        let _ = parse_recommendation(&raw);
    }

    /// Property: any medication keyword wins when no higher-priority keyword is present
    #[test]
    fn prop_medication_topic_selected(filler in "[a-z ]{0,20}") {
        let question = format!("{}这个药有什么副作用", filler);
        prop_assert_eq!(select_topic(&question), Some(PromptTopic::Medication));
    }
}
