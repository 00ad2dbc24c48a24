use crate::settings::{Settings, TutorSpeed};

const PERSONA: &str = "You are a friendly and encouraging English tutor. \
Keep your responses concise and natural, as if in a real conversation. \
Your goal is to help the user practice speaking. \
Do not correct grammar out loud; written feedback is handled separately. \
Ask one follow-up question at a time so the user does most of the talking.";

const FALLBACK_TOPIC: &str = "The user has not picked a topic. \
Open by suggesting a light everyday topic, like weekend plans or a favourite food, \
and let the user choose.";

fn speed_hint(speed: TutorSpeed) -> Option<&'static str> {
    match speed {
        TutorSpeed::Default => None,
        TutorSpeed::SlightlySlower => {
            Some("Speak slightly slower than usual and pronounce each word clearly.")
        }
        TutorSpeed::Slower => Some(
            "Speak slowly, with short sentences and clear pauses, as the user is still building listening skills.",
        ),
    }
}

fn profile_hint(settings: &Settings) -> Option<String> {
    let mut facts = Vec::new();
    if !settings.name.trim().is_empty() {
        facts.push(format!("Their name is {}.", settings.name.trim()));
    }
    if let Some(age) = settings.age {
        facts.push(format!("They are {age} years old."));
    }
    if !settings.description.trim().is_empty() {
        facts.push(format!(
            "In their own words: \"{}\"",
            settings.description.trim()
        ));
    }
    if facts.is_empty() {
        return None;
    }
    Some(format!(
        "About the user: {} Use this to keep the conversation personal.",
        facts.join(" ")
    ))
}

fn topic_hint(topic: Option<&str>) -> String {
    match topic.map(str::trim).filter(|t| !t.is_empty()) {
        Some(topic) => format!("Today the user wants to talk about: {topic}. Start the conversation on that topic."),
        None => FALLBACK_TOPIC.to_string(),
    }
}

/// Builds the system instruction sent when a session opens.
pub fn compose_instruction(settings: &Settings, topic: Option<&str>) -> String {
    let mut sections = vec![PERSONA.to_string()];
    if let Some(hint) = speed_hint(settings.speed) {
        sections.push(hint.to_string());
    }
    if let Some(hint) = profile_hint(settings) {
        sections.push(hint);
    }
    sections.push(topic_hint(topic));
    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_fall_back_to_a_suggested_topic() {
        let instruction = compose_instruction(&Settings::default(), None);
        assert!(instruction.starts_with(PERSONA));
        assert!(instruction.ends_with(FALLBACK_TOPIC));
        assert!(!instruction.contains("About the user"));
    }

    #[test]
    fn blank_topic_counts_as_no_topic() {
        let instruction = compose_instruction(&Settings::default(), Some("   "));
        assert!(instruction.contains(FALLBACK_TOPIC));
    }

    #[test]
    fn profile_speed_and_topic_are_included() {
        let settings = Settings {
            name: "Jisoo".into(),
            age: Some(31),
            description: "I work in film and love hiking.".into(),
            speed: TutorSpeed::Slower,
            ..Settings::default()
        };
        let instruction = compose_instruction(&settings, Some("job interviews"));
        assert!(instruction.contains("Their name is Jisoo."));
        assert!(instruction.contains("31 years old"));
        assert!(instruction.contains("love hiking"));
        assert!(instruction.contains("Speak slowly"));
        assert!(instruction.contains("job interviews"));
        assert!(!instruction.contains(FALLBACK_TOPIC));
    }
}
