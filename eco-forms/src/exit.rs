//! Exit-intent detection for the incident form.

use crate::turn::UserTurn;

/// Intent label the NLU step assigns to an explicit request to leave the form.
pub const EXIT_FORM_INTENT: &str = "exit_form";

pub const EXIT_PHRASES: &[&str] = &[
    "exit",
    "quit",
    "cancel",
    "stop",
    "abort",
    "end",
    "terminate",
    "exit form",
    "quit form",
    "cancel form",
    "stop form",
    "i want to exit",
    "i want to quit",
    "i want to cancel",
    "get me out",
    "take me out",
    "leave form",
    "escape",
    "nevermind",
    "forget it",
    "no thanks",
    "not now",
];

/// Slack allowed between a contained phrase and the whole message.
const SUBSTRING_SLACK_CHARS: usize = 10;

/// True when `text` reads as a request to abandon the form.
///
/// Exact phrase matches always count. A phrase contained in a longer message only
/// counts while the message is at most ten characters longer than the phrase.
pub fn is_exit_command(text: &str) -> bool {
    let normalized = text.trim().to_lowercase();
    if EXIT_PHRASES.contains(&normalized.as_str()) {
        return true;
    }
    let len = normalized.chars().count();
    EXIT_PHRASES.iter().any(|phrase| {
        normalized.contains(phrase) && len <= phrase.chars().count() + SUBSTRING_SLACK_CHARS
    })
}

pub fn wants_exit(turn: &UserTurn) -> bool {
    turn.has_intent(EXIT_FORM_INTENT) || is_exit_command(&turn.text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_phrase_matches_exactly() {
        for phrase in EXIT_PHRASES {
            assert!(is_exit_command(phrase), "{phrase} should exit");
            assert!(is_exit_command(&phrase.to_uppercase()));
            assert!(is_exit_command(&format!("  {phrase}\n")));
        }
    }

    #[test]
    fn short_message_containing_phrase_exits() {
        assert!(is_exit_command("ok cancel pls"));
        assert!(is_exit_command("pls stop now"));
    }

    #[test]
    fn long_sentence_containing_phrase_does_not_exit() {
        let text = "the factory never seems to stop pouring smoke into the river";
        assert_eq!(text.chars().count(), 60);
        assert!(!is_exit_command(text));
    }

    #[test]
    fn slack_boundary_is_inclusive() {
        // "stop" + 10 characters
        assert!(is_exit_command("stop 123456789"));
        assert!(!is_exit_command("stop 1234567890"));
    }

    #[test]
    fn ordinary_answers_do_not_exit() {
        for text in [
            "illegal dumping",
            "Jane Doe",
            "555-123-4567",
            "123 Main Street",
            "yes",
            "no",
            "nah",
        ] {
            assert!(!is_exit_command(text), "{text} should not exit");
        }
    }

    #[test]
    fn exit_intent_wins_over_text() {
        let turn = UserTurn::text("illegal dumping").with_intent(EXIT_FORM_INTENT);
        assert!(wants_exit(&turn));
        let turn = UserTurn::text("illegal dumping").with_intent("inform");
        assert!(!wants_exit(&turn));
    }
}
