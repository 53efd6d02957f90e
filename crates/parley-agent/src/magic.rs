//! Named `{placeholder}` expansion for system prompts.

use chrono::Local;
use regex::{Captures, Regex};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

// Any brace-free run between braces; only registered names are replaced.
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([^{}]+)\}").expect("placeholder pattern compiles"));

pub const DOCUMENTATION_HEADER: &str =
    "Available magic variables (will be replaced with real values):";

pub type MagicProducer = Arc<dyn Fn() -> Result<String, String> + Send + Sync>;

#[derive(Clone)]
struct MagicVariable {
    name: String,
    description: String,
    producer: MagicProducer,
}

/// Ordered set of magic variables. Registering an existing name replaces it in place.
#[derive(Clone, Default)]
pub struct MagicText {
    variables: Vec<MagicVariable>,
}

impl MagicText {
    pub fn new() -> Self {
        Self::default()
    }

    /// `todays_date`, `current_time` and `user_location`.
    pub fn with_defaults(user_location: Option<String>) -> Self {
        let mut magic = Self::new();
        magic.register(
            "todays_date",
            "Returns today's date in Month DD, YYYY format",
            || Ok(Local::now().format("%B %d, %Y").to_string()),
        );
        magic.register(
            "current_time",
            "Returns the current time in HH:MM AM/PM format",
            || Ok(Local::now().format("%I:%M %p").to_string()),
        );
        magic.register(
            "user_location",
            "Returns the user's configured location",
            move || {
                user_location
                    .clone()
                    .ok_or_else(|| "no user location configured".to_string())
            },
        );
        magic
    }

    pub fn register<F>(&mut self, name: impl Into<String>, description: impl Into<String>, producer: F)
    where
        F: Fn() -> Result<String, String> + Send + Sync + 'static,
    {
        let variable = MagicVariable {
            name: name.into(),
            description: description.into(),
            producer: Arc::new(producer),
        };
        match self
            .variables
            .iter_mut()
            .find(|existing| existing.name == variable.name)
        {
            Some(existing) => *existing = variable,
            None => self.variables.push(variable),
        }
    }

    pub fn names(&self) -> Vec<String> {
        self.variables
            .iter()
            .map(|variable| variable.name.clone())
            .collect()
    }

    fn get(&self, name: &str) -> Option<&MagicVariable> {
        self.variables.iter().find(|variable| variable.name == name)
    }

    /// Replaces registered `{name}` placeholders. Each producer runs at most once
    /// per call; a failing producer renders `<name unavailable>`.
    pub fn expand(&self, template: &str) -> String {
        let mut values: HashMap<String, String> = HashMap::new();
        PLACEHOLDER
            .replace_all(template, |captures: &Captures<'_>| {
                let name = &captures[1];
                let Some(variable) = self.get(name) else {
                    return captures[0].to_string();
                };
                values
                    .entry(name.to_string())
                    .or_insert_with(|| match (variable.producer)() {
                        Ok(value) => value,
                        Err(error) => {
                            tracing::warn!(variable = name, error = %error, "magic variable unavailable");
                            format!("<{name} unavailable>")
                        }
                    })
                    .clone()
            })
            .into_owned()
    }

    pub fn documentation(&self) -> String {
        let mut lines = vec![DOCUMENTATION_HEADER.to_string()];
        for variable in &self.variables {
            match (variable.producer)() {
                Ok(example) => lines.push(format!(
                    "- `{{{}}}` - {} (e.g., {})",
                    variable.name, variable.description, example
                )),
                Err(_) => lines.push(format!(
                    "- `{{{}}}` - {}",
                    variable.name, variable.description
                )),
            }
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn expand_replaces_known_keeps_unknown_and_marks_failures() {
        let mut magic = MagicText::new();
        magic.register("city", "City", || Ok("Austin".to_string()));
        magic.register("broken", "Always fails", || Err("offline".to_string()));

        let expanded = magic.expand("In {city} ({broken}) see {unknown} and {city}.");
        assert_eq!(
            expanded,
            "In Austin (<broken unavailable>) see {unknown} and Austin."
        );
    }

    #[test]
    fn names_with_punctuation_expand_like_any_other() {
        let mut magic = MagicText::new();
        magic.register("user-name", "Display name", || Ok("Ada".to_string()));
        magic.register("app.version", "Build version", || Ok("1.4.2".to_string()));
        magic.register("favorite color", "Spaced name", || Ok("teal".to_string()));

        let expanded = magic.expand(
            "Hi {user-name}, v{app.version}, {favorite color}, {other-name} {\"a\": 1}",
        );
        assert_eq!(expanded, "Hi Ada, v1.4.2, teal, {other-name} {\"a\": 1}");
    }

    #[test]
    fn producers_run_once_per_expansion() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let mut magic = MagicText::new();
        magic.register("tick", "Counts", move || {
            Ok(counter.fetch_add(1, Ordering::SeqCst).to_string())
        });

        assert_eq!(magic.expand("{tick} {tick} {tick}"), "0 0 0");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(magic.expand("no placeholders"), "no placeholders");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn register_replaces_in_place() {
        let mut magic = MagicText::new();
        magic.register("a", "first", || Ok("1".to_string()));
        magic.register("b", "second", || Ok("2".to_string()));
        magic.register("a", "replaced", || Ok("3".to_string()));
        assert_eq!(magic.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(magic.expand("{a}{b}"), "32");
    }

    #[test]
    fn documentation_lists_examples_and_omits_failing_ones() {
        let mut magic = MagicText::new();
        magic.register("city", "Current city", || Ok("Austin".to_string()));
        magic.register("broken", "Always fails", || Err("offline".to_string()));

        assert_eq!(
            magic.documentation(),
            "Available magic variables (will be replaced with real values):\n\
             - `{city}` - Current city (e.g., Austin)\n\
             - `{broken}` - Always fails"
        );
    }

    #[test]
    fn default_location_is_unavailable_until_configured() {
        let unconfigured = MagicText::with_defaults(None);
        assert_eq!(
            unconfigured.expand("near {user_location}"),
            "near <user_location unavailable>"
        );

        let configured = MagicText::with_defaults(Some("Austin, Texas".to_string()));
        assert_eq!(configured.expand("near {user_location}"), "near Austin, Texas");
        assert!(!configured.expand("{todays_date}").contains('{'));
    }
}
