// Data models for tasktally

use crate::color::{Oklch, parse_hex};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Display prefix for external work items
pub const EXTERNAL_ITEM_PREFIX: &str = "WI #";

/// Maximum number of quick-access task names
pub const MAX_QUICK_ACCESS: usize = 6;

/// Built-in accent palette, selected by `AccentSettings::preset_index`
pub const ACCENT_PRESETS: [&str; 6] = ["#3b82f6", "#10b981", "#f59e0b", "#ef4444", "#8b5cf6", "#ec4899"];

/// A tracked task
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub name: String,
    /// Accumulated active time in milliseconds
    pub elapsed: u64,
    pub is_external_item: bool,
}

impl Task {
    pub fn new(name: impl Into<String>, is_external_item: bool) -> Self {
        Self {
            id: new_task_id(),
            name: name.into(),
            elapsed: 0,
            is_external_item,
        }
    }

    /// Whether `name` collides with this task's name, ignoring case
    pub fn name_matches(&self, name: &str) -> bool {
        self.name.to_lowercase() == name.to_lowercase()
    }
}

/// Fresh task identifier (time-ordered UUID)
pub fn new_task_id() -> String {
    Uuid::now_v7().to_string()
}

/// Accent selection: a palette preset, or a custom color that overrides it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AccentSettings {
    pub preset_index: usize,
    pub custom_color: Option<String>,
}

impl AccentSettings {
    pub fn preset(index: usize) -> Self {
        Self {
            preset_index: index,
            custom_color: None,
        }
    }

    /// The hex color in effect.
    ///
    /// A custom color that does not parse, or a preset index outside the
    /// palette, falls back to the first preset.
    pub fn resolved_hex(&self) -> &str {
        match &self.custom_color {
            Some(custom) if parse_hex(custom).is_some() => return custom,
            _ => {}
        }
        ACCENT_PRESETS.get(self.preset_index).copied().unwrap_or(ACCENT_PRESETS[0])
    }
}

/// User preferences that do not affect timing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub accent: AccentSettings,
    pub dark_mode: bool,
    pub quick_access: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            accent: AccentSettings::default(),
            dark_mode: false,
            quick_access: default_quick_access(),
        }
    }
}

impl Settings {
    /// Resolve the settings into a theme for the presentation layer
    pub fn theme(&self) -> Theme {
        let accent_hex = self.accent.resolved_hex().to_string();
        let accent = parse_hex(&accent_hex).map(Oklch::from_srgb).unwrap_or_default();
        Theme {
            accent,
            accent_hex,
            dark: self.dark_mode,
        }
    }
}

/// Presentation-ready styling values.
///
/// A plain value: the core never applies it anywhere itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub accent: Oklch,
    pub accent_hex: String,
    pub dark: bool,
}

pub fn default_quick_access() -> Vec<String> {
    vec!["Meeting".to_string(), "Code Review".to_string(), "Email".to_string()]
}

/// Trim names, drop empties and case-insensitive repeats, keep at most
/// [`MAX_QUICK_ACCESS`].
pub fn normalize_quick_access<I, S>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut result: Vec<String> = Vec::new();
    for name in names {
        let name = name.as_ref().trim();
        if name.is_empty() || result.iter().any(|n| n.to_lowercase() == name.to_lowercase()) {
            continue;
        }
        result.push(name.to_string());
        if result.len() == MAX_QUICK_ACCESS {
            break;
        }
    }
    result
}

/// Outcome of classifying raw task input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedInput {
    /// Numeric input, normalized to `WI #<digits>`
    ExternalItem { name: String },
    /// Anything else, unchanged
    Plain { name: String },
}

impl ClassifiedInput {
    pub fn name(&self) -> &str {
        match self {
            ClassifiedInput::ExternalItem { name } | ClassifiedInput::Plain { name } => name,
        }
    }

    pub fn is_external_item(&self) -> bool {
        matches!(self, ClassifiedInput::ExternalItem { .. })
    }
}

/// Classify raw input as an external work item (`123`, `#123`) or a plain name
pub fn classify_input(raw: &str) -> ClassifiedInput {
    let trimmed = raw.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);

    if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
        ClassifiedInput::ExternalItem {
            name: format!("{}{}", EXTERNAL_ITEM_PREFIX, digits),
        }
    } else {
        ClassifiedInput::Plain { name: raw.to_string() }
    }
}

/// Format milliseconds as `H:MM:SS`
pub fn format_elapsed(ms: u64) -> String {
    let total_secs = ms / 1000;
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    format!("{}:{:02}:{:02}", hours, minutes, seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_serialization_uses_camel_case() {
        let task = Task {
            id: "t1".to_string(),
            name: "Standup".to_string(),
            elapsed: 1500,
            is_external_item: false,
        };

        let json = serde_json::to_string(&task).unwrap();
        assert_eq!(
            json,
            "{\"id\":\"t1\",\"name\":\"Standup\",\"elapsed\":1500,\"isExternalItem\":false}"
        );
    }

    #[test]
    fn test_new_task_ids_are_unique() {
        let a = Task::new("A", false);
        let b = Task::new("B", false);
        assert_ne!(a.id, b.id);
        assert_eq!(a.elapsed, 0);
    }

    #[test]
    fn test_name_matches_ignores_case() {
        let task = Task::new("Meeting", false);
        assert!(task.name_matches("meeting"));
        assert!(task.name_matches("MEETING"));
        assert!(!task.name_matches("Meetings"));
    }

    #[test]
    fn test_classify_numeric_input() {
        let plain = classify_input("12345");
        let hashed = classify_input("#12345");

        assert_eq!(plain, hashed);
        assert!(plain.is_external_item());
        assert_eq!(plain.name(), "WI #12345");
    }

    #[test]
    fn test_classify_plain_input() {
        let result = classify_input("Standup");
        assert_eq!(
            result,
            ClassifiedInput::Plain {
                name: "Standup".to_string()
            }
        );
    }

    #[test]
    fn test_classify_edge_cases() {
        assert!(classify_input("  #42  ").is_external_item());
        assert!(!classify_input("#").is_external_item());
        assert!(!classify_input("##42").is_external_item());
        assert!(!classify_input("42a").is_external_item());
        assert!(!classify_input("").is_external_item());
        assert!(!classify_input("# 42").is_external_item());
    }

    #[test]
    fn test_accent_resolution() {
        assert_eq!(AccentSettings::default().resolved_hex(), ACCENT_PRESETS[0]);
        assert_eq!(AccentSettings::preset(2).resolved_hex(), ACCENT_PRESETS[2]);
        assert_eq!(AccentSettings::preset(99).resolved_hex(), ACCENT_PRESETS[0]);

        let custom = AccentSettings {
            preset_index: 3,
            custom_color: Some("#123456".to_string()),
        };
        assert_eq!(custom.resolved_hex(), "#123456");

        let broken = AccentSettings {
            preset_index: 1,
            custom_color: Some("teal".to_string()),
        };
        assert_eq!(broken.resolved_hex(), ACCENT_PRESETS[1]);
    }

    #[test]
    fn test_accent_serialization() {
        let json = serde_json::to_string(&AccentSettings::default()).unwrap();
        assert_eq!(json, "{\"presetIndex\":0,\"customColor\":null}");
    }

    #[test]
    fn test_theme_from_settings() {
        let settings = Settings {
            dark_mode: true,
            ..Settings::default()
        };
        let theme = settings.theme();

        assert!(theme.dark);
        assert_eq!(theme.accent_hex, ACCENT_PRESETS[0]);
        assert!(theme.accent.l > 0.0 && theme.accent.l < 1.0);
    }

    #[test]
    fn test_normalize_quick_access() {
        let names = normalize_quick_access(["  Meeting ", "", "meeting", "A", "B", "C", "D", "E", "F"]);
        assert_eq!(names, vec!["Meeting", "A", "B", "C", "D", "E"]);
    }

    #[test]
    fn test_format_elapsed() {
        assert_eq!(format_elapsed(0), "0:00:00");
        assert_eq!(format_elapsed(61_999), "0:01:01");
        assert_eq!(format_elapsed(3_723_000), "1:02:03");
    }
}
