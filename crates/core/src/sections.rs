use crate::error::IngestError;
use crate::models::IngestionOptions;
use regex::Regex;

/// Derives the page-level section hint used for references.
///
/// Priority order:
/// 1. a law-title line (`חוק …, התש…–YYYY`): law name, plus the first
///    section number found on the page when there is one;
/// 2. a section-heading line (`סעיף N`), prefixed with the law name when the
///    page opens with a law title;
/// 3. the first non-empty line, capped at `section_hint_max_chars`;
/// 4. the configured fallback literal.
pub struct SectionHinter {
    law_title: Regex,
    law_name: Regex,
    section_line: Regex,
    section_anywhere: Regex,
    max_chars: usize,
    fallback: &'static str,
}

impl SectionHinter {
    pub fn new(options: &IngestionOptions) -> Result<Self, IngestError> {
        Ok(Self {
            law_title: Regex::new(options.law_title_regex)?,
            law_name: Regex::new(options.law_name_regex)?,
            section_line: Regex::new(options.section_line_regex)?,
            section_anywhere: Regex::new(options.section_anywhere_regex)?,
            max_chars: options.section_hint_max_chars,
            fallback: options.fallback_section_hint,
        })
    }

    pub fn derive(&self, page_text: &str) -> String {
        for line in page_text.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if self.law_title.is_match(line) {
                if let Some(capture) = self.law_name.captures(line) {
                    let law_name = capture[1].trim().to_string();

                    if let Some(section) = self.section_anywhere.captures(page_text) {
                        return format!("חוק {law_name} §{}", &section[1]);
                    }

                    return format!("חוק {law_name}");
                }
            }

            if let Some(section) = self.section_line.find(line) {
                let section = section.as_str();

                // The title pattern is anchored, so this only fires when the
                // page itself opens with the law title.
                if let Some(title) = self.law_title.find(page_text) {
                    if let Some(name) = self.law_name.captures(title.as_str()) {
                        return format!("חוק {} §{section}", name[1].trim());
                    }
                }

                return section.to_string();
            }
        }

        for line in page_text.lines() {
            let line = line.trim();
            if !line.is_empty() {
                return truncate_chars(line, self.max_chars);
            }
        }

        self.fallback.to_string()
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
