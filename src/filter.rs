//! Posting filters compiled from `[filters]`, `[tech_filters]` and `[keywords]`.
//!
//! A [`JobFilter`] is built once per cycle. Only postings that pass it take
//! part in change detection, so a filtered-out posting is never recorded.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::config::WatchConfig;
use crate::error::ConfigError;
use crate::watch::JobPosting;

static EXP_SINGLE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\b(\d{1,2})\s*(?:\+|plus)?\s*(?:years?|yrs?)\b")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

static EXP_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    RegexBuilder::new(r"\b(\d{1,2})\s*-\s*(\d{1,2})\s*(?:years?|yrs?)\b")
        .case_insensitive(true)
        .build()
        .expect("valid regex")
});

#[derive(Debug)]
pub struct JobFilter {
    titles_must_include: Vec<Regex>,
    titles_must_not: Vec<Regex>,
    exp_max_years: u32,
    exp_must_not: Vec<Regex>,
    locations_must_not: Vec<String>,
    locations_allow_any: Vec<String>,
    state_abbrev: Option<Regex>,
    locations_prefer: Vec<String>,
    tech_must_all: Vec<Regex>,
    tech_must_any: Vec<Regex>,
    keywords_any: Vec<Regex>,
    keywords_must_not: Vec<Regex>,
}

fn compile(field: &'static str, patterns: &[String]) -> Result<Vec<Regex>, ConfigError> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::InvalidPattern {
                    field,
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

fn lowercase_all(values: &[String]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

impl JobFilter {
    pub fn from_config(config: &WatchConfig) -> Result<Self, ConfigError> {
        let f = &config.filters;
        let state_abbrev = match f.state_abbrev_regex.as_deref().filter(|p| !p.is_empty()) {
            Some(pattern) => compile("filters.state_abbrev_regex", &[pattern.to_string()])?.pop(),
            None => None,
        };

        Ok(Self {
            titles_must_include: compile("filters.titles_must_include", &f.titles_must_include)?,
            titles_must_not: compile("filters.titles_must_not", &f.titles_must_not)?,
            exp_max_years: f.exp_max_years,
            exp_must_not: compile("filters.exp_must_not_patterns", &f.exp_must_not_patterns)?,
            locations_must_not: lowercase_all(&f.locations_must_not),
            locations_allow_any: lowercase_all(&f.locations_allow_any),
            state_abbrev,
            locations_prefer: lowercase_all(&f.locations_prefer),
            tech_must_all: compile("tech_filters.must_all", &config.tech_filters.must_all)?,
            tech_must_any: compile("tech_filters.must_any", &config.tech_filters.must_any)?,
            keywords_any: compile("keywords.any", &config.keywords.any)?,
            keywords_must_not: compile("keywords.must_not", &config.keywords.must_not)?,
        })
    }

    /// Whether a posting should be watched at all.
    pub fn passes(&self, posting: &JobPosting) -> bool {
        let text = format!("{}\n{}", posting.title, posting.description);
        self.title_allowed(&posting.title)
            && self.experience_allowed(&text)
            && self.location_allowed(&posting.location)
            && self.tech_allowed(&text)
            && self.keywords_allowed(&text)
    }

    fn title_allowed(&self, title: &str) -> bool {
        if !self.titles_must_include.is_empty()
            && !self.titles_must_include.iter().any(|re| re.is_match(title))
        {
            return false;
        }
        !self.titles_must_not.iter().any(|re| re.is_match(title))
    }

    fn experience_allowed(&self, text: &str) -> bool {
        if self.exp_must_not.iter().any(|re| re.is_match(text)) {
            return false;
        }
        // No explicit mention passes.
        max_years_mentioned(text).is_none_or(|years| years <= self.exp_max_years)
    }

    fn location_allowed(&self, location: &str) -> bool {
        let loc = location.trim().to_lowercase();
        if self.locations_must_not.iter().any(|bad| loc.contains(bad.as_str())) {
            return false;
        }
        if self.state_abbrev.as_ref().is_some_and(|re| re.is_match(location)) {
            return true;
        }
        if self.locations_allow_any.iter().any(|ok| loc.contains(ok.as_str())) {
            return true;
        }
        self.locations_allow_any.is_empty()
    }

    fn tech_allowed(&self, text: &str) -> bool {
        self.tech_must_all.iter().all(|re| re.is_match(text))
            && (self.tech_must_any.is_empty() || self.tech_must_any.iter().any(|re| re.is_match(text)))
    }

    fn keywords_allowed(&self, text: &str) -> bool {
        if self.keywords_must_not.iter().any(|re| re.is_match(text)) {
            return false;
        }
        self.keywords_any.is_empty() || self.keywords_any.iter().any(|re| re.is_match(text))
    }

    /// Ordering score: earlier entries in `locations_prefer` weigh more.
    pub fn location_score(&self, location: &str) -> i64 {
        let loc = location.to_lowercase();
        self.locations_prefer
            .iter()
            .enumerate()
            .filter(|(_, want)| loc.contains(want.as_str()))
            .map(|(i, _)| 100 - i as i64)
            .sum()
    }
}

/// Largest "N years" / "N-M years" / "N+ yrs" figure in the text.
pub fn max_years_mentioned(text: &str) -> Option<u32> {
    let ranges = EXP_RANGE.captures_iter(text).filter_map(|caps| {
        let lo: u32 = caps[1].parse().ok()?;
        let hi: u32 = caps[2].parse().ok()?;
        Some(lo.max(hi))
    });
    let singles = EXP_SINGLE
        .captures_iter(text)
        .filter_map(|caps| caps[1].parse::<u32>().ok());
    ranges.chain(singles).max()
}
