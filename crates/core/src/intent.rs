use std::sync::OnceLock;

use regex::Regex;

use crate::dialogue::states::{DialoguePhase, UserIntent};

/// Word and phrase sets consulted by [`IntentClassifier`].
///
/// Entries are matched on whole words, so `"hi"` does not fire inside
/// `"white"` and `"reset"` does not fire inside `"preset"`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntentLexicon {
    pub greeting: Vec<String>,
    pub end: Vec<String>,
    pub restart: Vec<String>,
    pub more_details: Vec<String>,
}

impl Default for IntentLexicon {
    fn default() -> Self {
        Self {
            greeting: words(&[
                "hello",
                "hi",
                "hey",
                "begin",
                "good morning",
                "good afternoon",
                "good evening",
            ]),
            end: words(&["end", "exit", "quit", "bye", "goodbye", "thank you", "thanks"]),
            restart: words(&["restart", "start over", "new search", "reset"]),
            more_details: words(&["details", "more", "information", "specs"]),
        }
    }
}

fn words(entries: &[&str]) -> Vec<String> {
    entries.iter().map(|entry| (*entry).to_string()).collect()
}

#[derive(Clone, Debug, Default)]
pub struct IntentClassifier {
    lexicon: IntentLexicon,
}

impl IntentClassifier {
    pub fn new(lexicon: IntentLexicon) -> Self {
        Self { lexicon }
    }

    /// Ordered cascade; the first matching rule wins.
    pub fn classify(&self, utterance: &str, phase: DialoguePhase) -> UserIntent {
        let tokens = tokenize(utterance);

        if contains_any(&tokens, &self.lexicon.greeting) {
            return UserIntent::Greeting;
        }
        if contains_any(&tokens, &self.lexicon.end) {
            return UserIntent::End;
        }
        if contains_any(&tokens, &self.lexicon.restart) {
            return UserIntent::Restart;
        }
        if selection_pattern().is_match(utterance) {
            return UserIntent::ProductSelection;
        }
        if contains_any(&tokens, &self.lexicon.more_details) {
            return UserIntent::MoreDetails;
        }
        if phase == DialoguePhase::Clarification {
            return UserIntent::ClarificationResponse;
        }
        UserIntent::ProductInquiry
    }
}

fn selection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)\b(?:select|choose|pick)\b|\bnumber\s*\d+")
            .expect("selection pattern is a valid regex")
    })
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_alphanumeric() {
            sanitized.extend(character.to_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

fn contains_any(tokens: &[String], phrases: &[String]) -> bool {
    phrases.iter().any(|phrase| contains_phrase(tokens, phrase))
}

fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || needle.len() > tokens.len() {
        return false;
    }
    tokens.windows(needle.len()).any(|window| window == needle.as_slice())
}

#[cfg(test)]
mod tests {
    use super::IntentClassifier;
    use crate::dialogue::states::{DialoguePhase, UserIntent};

    fn classify(text: &str) -> UserIntent {
        IntentClassifier::default().classify(text, DialoguePhase::Greeting)
    }

    #[test]
    fn greeting_wins_over_farewell() {
        assert_eq!(classify("hello and goodbye"), UserIntent::Greeting);
    }

    #[test]
    fn cascade_order_is_respected() {
        assert_eq!(classify("thanks, that is all"), UserIntent::End);
        assert_eq!(classify("let's start over"), UserIntent::Restart);
        assert_eq!(classify("I'll pick the second one"), UserIntent::ProductSelection);
        assert_eq!(classify("number 3 please"), UserIntent::ProductSelection);
        assert_eq!(classify("show me the specs"), UserIntent::MoreDetails);
        assert_eq!(classify("a brass cabinet knob"), UserIntent::ProductInquiry);
    }

    #[test]
    fn farewell_wins_over_restart() {
        assert_eq!(classify("reset everything, thanks"), UserIntent::End);
    }

    #[test]
    fn words_match_whole_tokens_only() {
        assert_eq!(classify("white kitchen handle"), UserIntent::ProductInquiry);
        assert_eq!(classify("a preset finish"), UserIntent::ProductInquiry);
        assert_eq!(classify("a trendy pull"), UserIntent::ProductInquiry);
    }

    #[test]
    fn clarification_phase_routes_plain_answers() {
        let classifier = IntentClassifier::default();
        assert_eq!(
            classifier.classify("stainless steel", DialoguePhase::Clarification),
            UserIntent::ClarificationResponse
        );
        assert_eq!(
            classifier.classify("goodbye", DialoguePhase::Clarification),
            UserIntent::End
        );
    }
}
