//! Site branding and chat landing texts.

use serde::{Deserialize, Serialize};

/// Branding and chat landing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    pub title: String,
    pub description: String,
    /// Where users are sent when sign-in fails.
    pub portal_url: String,
    pub greeting: Greeting,
    pub welcome_message: String,
    pub recommendation_questions: Vec<String>,
}

/// Greeting shown on an empty chat, by time of day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Greeting {
    pub morning: String,
    pub afternoon: String,
    pub evening: String,
}

impl Default for Greeting {
    fn default() -> Self {
        let text = "Hi, GYS Team \n Can I Help You Today?".to_string();
        Self {
            morning: text.clone(),
            afternoon: text.clone(),
            evening: text,
        }
    }
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            title: "GYS Chat".to_string(),
            description: "Garuda Yamato Steel - An AI powered chat assistant".to_string(),
            portal_url: "https://www.garudayamatosteel.com".to_string(),
            greeting: Greeting::default(),
            welcome_message: "Ready to assist you anything about the company information you need. Let's get started!".to_string(),
            recommendation_questions: vec![
                "What is Garuda Yamato Steel's main product?".to_string(),
                "Can you provide information about Garuda Yamato Steel's sustainability initiatives?".to_string(),
                "How does Garuda Yamato Steel ensure product quality?".to_string(),
                "What industries does Garuda Yamato Steel serve?".to_string(),
            ],
        }
    }
}

impl SiteConfig {
    /// Greeting for a local hour of day (0-23).
    pub fn greeting(&self, hour: u32) -> &str {
        match hour {
            0..=11 => self.greeting.morning.as_str(),
            12..=17 => self.greeting.afternoon.as_str(),
            _ => self.greeting.evening.as_str(),
        }
    }

    /// Text shown when a chat session opens at `hour`. Empty parts are skipped.
    pub fn landing(&self, hour: u32) -> String {
        let header = match (self.title.is_empty(), self.description.is_empty()) {
            (false, false) => format!("{} - {}", self.title, self.description),
            (false, true) => self.title.clone(),
            (true, false) => self.description.clone(),
            (true, true) => String::new(),
        };
        [header.as_str(), self.greeting(hour), self.welcome_message.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Landing text for the current local time.
    pub fn landing_now(&self) -> String {
        use chrono::Timelike;
        self.landing(chrono::Local::now().hour())
    }

    /// Where to go after a rejected sign-in, if a portal is configured.
    pub fn sign_in_hint(&self) -> Option<String> {
        if self.portal_url.is_empty() {
            return None;
        }
        Some(format!("Get a new access token from {}", self.portal_url))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_greeting_by_hour() {
        let site = SiteConfig {
            greeting: Greeting {
                morning: "m".into(),
                afternoon: "a".into(),
                evening: "e".into(),
            },
            ..Default::default()
        };
        assert_eq!(site.greeting(0), "m");
        assert_eq!(site.greeting(11), "m");
        assert_eq!(site.greeting(12), "a");
        assert_eq!(site.greeting(17), "a");
        assert_eq!(site.greeting(18), "e");
        assert_eq!(site.greeting(23), "e");
    }

    #[test]
    fn test_site_defaults() {
        let site = SiteConfig::default();
        assert_eq!(site.title, "GYS Chat");
        assert_eq!(site.recommendation_questions.len(), 4);
    }

    #[test]
    fn test_landing_text() {
        let site = SiteConfig {
            title: "GYS Chat".into(),
            description: "Steel assistant".into(),
            greeting: Greeting {
                morning: "Good morning".into(),
                afternoon: "Good afternoon".into(),
                evening: "Good evening".into(),
            },
            welcome_message: "Ask me anything.".into(),
            ..Default::default()
        };
        assert_eq!(
            site.landing(9),
            "GYS Chat - Steel assistant\nGood morning\nAsk me anything."
        );

        let bare = SiteConfig {
            title: String::new(),
            description: String::new(),
            welcome_message: String::new(),
            ..site
        };
        assert_eq!(bare.landing(20), "Good evening");
    }

    #[test]
    fn test_sign_in_hint_uses_portal() {
        let site = SiteConfig::default();
        let hint = site.sign_in_hint().unwrap();
        assert!(hint.ends_with("https://www.garudayamatosteel.com"));

        let no_portal = SiteConfig {
            portal_url: String::new(),
            ..Default::default()
        };
        assert!(no_portal.sign_in_hint().is_none());
    }

    #[test]
    fn test_legacy_keys_are_ignored() {
        let site: SiteConfig =
            serde_json::from_str(r#"{"name": "Old", "message_limit": 4, "title": "T"}"#).unwrap();
        assert_eq!(site.title, "T");
    }

    #[test]
    fn test_partial_greeting() {
        let site: SiteConfig = serde_json::from_str(r#"{"greeting": {"evening": "Good night"}}"#).unwrap();
        assert_eq!(site.greeting(20), "Good night");
        assert!(site.greeting(8).starts_with("Hi, GYS Team"));
    }
}
