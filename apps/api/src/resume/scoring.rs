//! ATS score: a fixed set of pattern checks summed into a 0–100 score.
//!
//! This is a heuristic, not a model: each check contributes a fixed number
//! of points and missing items produce canned fix suggestions.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

const MAX_SCORE: u32 = 100;
const MAX_FIXES: usize = 6;
const PREVIEW_CHARS: usize = 900;

const EMAIL_POINTS: u32 = 12;
const PHONE_POINTS: u32 = 8;
const SUMMARY_POINTS: u32 = 10;
const EXPERIENCE_POINTS: u32 = 20;
const EDUCATION_POINTS: u32 = 12;
const SKILLS_POINTS: u32 = 18;
const BULLETS_POINTS: u32 = 10;
const METRICS_POINTS: u32 = 10;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref EMAIL: Regex = Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap();
    static ref PHONE: Regex =
        Regex::new(r"(\+?\d{1,3}[\s-]?)?(\(?\d{3}\)?[\s-]?)\d{3}[\s-]?\d{4}").unwrap();
    static ref SUMMARY: Regex = Regex::new(r"(?i)summary|profile|objective").unwrap();
    static ref EXPERIENCE: Regex = Regex::new(r"(?i)experience|employment|work history").unwrap();
    static ref EDUCATION: Regex = Regex::new(r"(?i)education|school|university|college").unwrap();
    static ref SKILLS: Regex =
        Regex::new(r"(?i)skills|technical skills|core competencies").unwrap();
    // Checked against the raw text: normalisation would erase the line starts.
    static ref BULLETS: Regex = Regex::new(r"•|\n- |\n\* ").unwrap();
    static ref METRICS: Regex = Regex::new(r"\b\d+(\.\d+)?%?\b").unwrap();
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AtsChecks {
    pub has_email: bool,
    pub has_phone: bool,
    pub has_bullets: bool,
    pub has_metrics: bool,
    pub summary: bool,
    pub experience: bool,
    pub education: bool,
    pub skills: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AtsReport {
    pub score: u32,
    pub word_count: usize,
    pub checks: AtsChecks,
    pub missing_sections: Vec<String>,
    pub top_fixes: Vec<String>,
    pub preview: String,
}

/// Collapses all whitespace runs to a single space.
pub fn normalize(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}

pub fn score_resume(text: &str) -> AtsReport {
    let normalized = normalize(text);

    let checks = AtsChecks {
        has_email: EMAIL.is_match(&normalized),
        has_phone: PHONE.is_match(&normalized),
        has_bullets: BULLETS.is_match(text),
        has_metrics: METRICS.is_match(&normalized),
        summary: SUMMARY.is_match(&normalized),
        experience: EXPERIENCE.is_match(&normalized),
        education: EDUCATION.is_match(&normalized),
        skills: SKILLS.is_match(&normalized),
    };

    let word_count = if normalized.is_empty() {
        0
    } else {
        normalized.split(' ').count()
    };

    let points = [
        (checks.has_email, EMAIL_POINTS),
        (checks.has_phone, PHONE_POINTS),
        (checks.summary, SUMMARY_POINTS),
        (checks.experience, EXPERIENCE_POINTS),
        (checks.education, EDUCATION_POINTS),
        (checks.skills, SKILLS_POINTS),
        (checks.has_bullets, BULLETS_POINTS),
        (checks.has_metrics, METRICS_POINTS),
    ];
    let score = points
        .iter()
        .filter(|(hit, _)| *hit)
        .map(|(_, pts)| pts)
        .sum::<u32>()
        + length_points(word_count);

    AtsReport {
        score: score.min(MAX_SCORE),
        word_count,
        missing_sections: missing_sections(&checks),
        top_fixes: top_fixes(&checks),
        preview: normalized.chars().take(PREVIEW_CHARS).collect(),
        checks,
    }
}

fn length_points(word_count: usize) -> u32 {
    match word_count {
        350..=900 => 10,
        250..=349 => 6,
        n if n > 900 => 3,
        _ => 0,
    }
}

fn missing_sections(checks: &AtsChecks) -> Vec<String> {
    [
        ("summary", checks.summary),
        ("experience", checks.experience),
        ("education", checks.education),
        ("skills", checks.skills),
    ]
    .into_iter()
    .filter(|(_, present)| !present)
    .map(|(name, _)| name.to_string())
    .collect()
}

fn top_fixes(checks: &AtsChecks) -> Vec<String> {
    [
        (checks.has_email, "Add a professional email address in the header."),
        (checks.has_phone, "Add a phone number (ATS-friendly, plain text)."),
        (checks.skills, "Add a dedicated Skills section with keywords."),
        (
            checks.has_bullets,
            "Use bullet points for experience (ATS-friendly structure).",
        ),
        (
            checks.has_metrics,
            "Add measurable outcomes (%, $, time saved, volume, SLA).",
        ),
        (
            checks.summary,
            "Add a 2–3 line Summary tailored to your target role.",
        ),
    ]
    .into_iter()
    .filter(|(present, _)| !present)
    .map(|(_, fix)| fix.to_string())
    .take(MAX_FIXES)
    .collect()
}
