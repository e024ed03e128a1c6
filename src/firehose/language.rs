use std::ops::RangeInclusive;

/// Language the consumer keeps: matched either by the post's declared tags or
/// by the presence of a character from one of `scripts`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetLanguage {
    tag: String,
    scripts: Vec<RangeInclusive<char>>,
}

const HIRAGANA: RangeInclusive<char> = '\u{3040}'..='\u{309F}';
const KATAKANA: RangeInclusive<char> = '\u{30A0}'..='\u{30FF}';

impl TargetLanguage {
    /// Japanese: Hiragana and Katakana. Kanji alone is ambiguous with Chinese.
    pub fn japanese() -> Self {
        Self {
            tag: "ja".into(),
            scripts: vec![HIRAGANA, KATAKANA],
        }
    }

    /// Known tags get script detection; anything else matches on the tag only.
    pub fn for_tag(tag: &str) -> Self {
        let scripts = match tag {
            "ja" => return Self::japanese(),
            // Hangul syllables and jamo
            "ko" => vec!['\u{AC00}'..='\u{D7AF}', '\u{1100}'..='\u{11FF}'],
            "ru" => vec!['\u{0400}'..='\u{04FF}'],
            "el" => vec!['\u{0370}'..='\u{03FF}'],
            "th" => vec!['\u{0E00}'..='\u{0E7F}'],
            "ar" => vec!['\u{0600}'..='\u{06FF}'],
            "he" => vec!['\u{0590}'..='\u{05FF}'],
            _ => Vec::new(),
        };
        Self {
            tag: tag.to_string(),
            scripts,
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn matches(&self, text: &str, declared_langs: &[String]) -> bool {
        declared_langs.iter().any(|lang| lang == &self.tag)
            || text
                .chars()
                .any(|c| self.scripts.iter().any(|range| range.contains(&c)))
    }
}

impl Default for TargetLanguage {
    fn default() -> Self {
        Self::japanese()
    }
}

/// Japanese check used by the default consumer.
pub fn is_target_language(text: &str, declared_langs: &[String]) -> bool {
    TargetLanguage::japanese().matches(text, declared_langs)
}
