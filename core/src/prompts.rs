//! Prompt synthesis for the two completion modes.
//!
//! Both builders are pure. The respond prompt only ever sees the persona and the
//! transcript; goal and required keywords stay out of it so the simulated customer
//! cannot coach the user.

use std::fmt::Write;

use crate::feedback::{FEEDBACK_KEYS, SCORE_MAX, SCORE_MIN};
use crate::scenario::Scenario;
use crate::transcript::{Transcript, render_lines};

/// Scales the scorer is encouraged to use. Any scale name is accepted back.
pub const SUGGESTED_SCALES: [&str; 4] = ["clarity", "rapport", "objection_handling", "closing"];

/// Prompt asking for the next customer turn.
pub fn build_respond_prompt(scenario: &Scenario, transcript: &Transcript) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are role-playing a customer in a sales conversation with a salesperson.\n\n",
    );
    let _ = writeln!(prompt, "Your persona:\n{}\n", scenario.customer_persona.trim());
    prompt.push_str(
        "Stay in character at all times. Keep your replies natural, conversational and brief \
         (one to three sentences). React the way this person realistically would, raise the \
         doubts they would have, and never mention that you are an AI or that this is a practice \
         session.\n\n",
    );
    prompt.push_str(
        "In the conversation below, lines starting with \"User:\" are the salesperson and lines \
         starting with \"AI:\" are you.\n\n",
    );
    prompt.push_str("Conversation so far:\n");
    if transcript.is_empty() {
        prompt.push_str("(Nothing has been said yet. Open the conversation as the customer.)\n");
    } else {
        prompt.push_str(&render_lines(transcript.lines()));
        prompt.push('\n');
    }
    prompt.push_str("AI:");
    prompt
}

/// Prompt asking for a JSON evaluation of the user's lines only.
pub fn build_analyze_prompt(scenario: &Scenario, transcript: &Transcript) -> String {
    let mut prompt = String::new();
    prompt.push_str(
        "You are an experienced sales coach evaluating a salesperson's performance in a practice \
         call.\n\n",
    );
    let _ = writeln!(prompt, "Scenario goal:\n{}\n", scenario.goal.trim());

    prompt.push_str("Keywords the salesperson was expected to use:\n");
    if scenario.required_keywords.is_empty() {
        prompt.push_str("(none)\n");
    } else {
        for keyword in &scenario.required_keywords {
            let _ = writeln!(prompt, "- {keyword}");
        }
    }
    prompt.push('\n');

    prompt.push_str("What the salesperson said, in order (the customer's lines are omitted):\n");
    let user_segment = render_lines(transcript.user_lines());
    if user_segment.is_empty() {
        prompt.push_str(
            "(The salesperson said nothing. Treat this as no attempt made: \"goalAchieved\" must \
             be false and the assessment should say so.)\n",
        );
    } else {
        prompt.push_str(&user_segment);
        prompt.push('\n');
    }
    prompt.push('\n');

    prompt.push_str(
        "Respond with a single JSON object and nothing else, no Markdown. It must contain exactly \
         these keys:\n",
    );
    for (key, expected) in FEEDBACK_KEYS {
        let _ = writeln!(prompt, "- \"{key}\": {expected}");
    }
    let _ = writeln!(
        prompt,
        "\n\"keywordsUsed\" lists only keywords from the expected list above that the salesperson \
         actually used. Every score in \"scores\" is an integer from {SCORE_MIN} to {SCORE_MAX}; \
         use scales such as {}. \"assessment\" is a short summary with one concrete suggestion.",
        SUGGESTED_SCALES
            .iter()
            .map(|scale| format!("\"{scale}\""))
            .collect::<Vec<_>>()
            .join(", ")
    );
    prompt
}
