use crate::daemon::storage::entities::AppCategory;

/// Keyword sets in priority order. The first set with a keyword contained in the lower-cased
/// application name decides the category.
const CATEGORY_KEYWORDS: [(AppCategory, &[&str]); 5] = [
    (
        AppCategory::Coding,
        &[
            "code",
            "visual studio",
            "intellij",
            "pycharm",
            "webstorm",
            "rider",
            "sublime",
            "atom",
            "vim",
            "emacs",
            "cursor",
            "antigravity",
        ],
    ),
    (
        AppCategory::Meeting,
        &["teams", "zoom", "meet", "slack", "webex", "skype", "discord"],
    ),
    (
        AppCategory::Browser,
        &["chrome", "firefox", "edge", "safari", "brave", "opera", "browser"],
    ),
    (
        AppCategory::Communication,
        &["outlook", "mail", "thunderbird", "telegram", "whatsapp", "messenger"],
    ),
    (
        AppCategory::Productivity,
        &[
            "excel",
            "word",
            "powerpoint",
            "notion",
            "obsidian",
            "onenote",
            "evernote",
            "trello",
            "asana",
            "jira",
            "office",
        ],
    ),
];

pub fn classify_app(app_name: &str) -> AppCategory {
    let name = app_name.to_lowercase();
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|keyword| name.contains(keyword)))
        .map(|(category, _)| *category)
        .unwrap_or(AppCategory::Other)
}

#[cfg(test)]
mod tests {
    use crate::daemon::storage::entities::AppCategory;

    use super::classify_app;

    #[test]
    fn test_basic_categories() {
        assert_eq!(classify_app("Code"), AppCategory::Coding);
        assert_eq!(classify_app("IntelliJ IDEA"), AppCategory::Coding);
        assert_eq!(classify_app("zoom.us"), AppCategory::Meeting);
        assert_eq!(classify_app("Firefox"), AppCategory::Browser);
        assert_eq!(classify_app("Thunderbird"), AppCategory::Communication);
        assert_eq!(classify_app("Obsidian"), AppCategory::Productivity);
        assert_eq!(classify_app("Spotify"), AppCategory::Other);
        assert_eq!(classify_app(""), AppCategory::Other);
    }

    #[test]
    fn test_earlier_set_wins() {
        // Both "discord" and "browser" match, meetings are checked first.
        assert_eq!(classify_app("Discord Browser Extension"), AppCategory::Meeting);
        // "Slack" is a meeting tool even though it is also used for chat.
        assert_eq!(classify_app("Slack"), AppCategory::Meeting);
        // "Google Meet in Chrome" hits the meeting set before the browser set.
        assert_eq!(classify_app("Google Meet in Chrome"), AppCategory::Meeting);
        // "Xcode" contains "code".
        assert_eq!(classify_app("Xcode"), AppCategory::Coding);
        // "Microsoft Edge" would be a browser, but "Visual Studio Code - Edge" is coding.
        assert_eq!(classify_app("Visual Studio Code - Edge"), AppCategory::Coding);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(classify_app("GOOGLE CHROME"), AppCategory::Browser);
        assert_eq!(classify_app("microsoft outlook"), AppCategory::Communication);
    }
}
