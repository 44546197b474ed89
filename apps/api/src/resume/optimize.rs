use serde::Serialize;

use super::scoring::normalize;

const MAX_KEYWORD_HINTS: usize = 10;

const SUMMARY_REWRITE_TEMPLATE: &str = "Executive leader with X+ years driving [strategy/ops], \
     delivering [metric outcomes], partnering with [stakeholders], and scaling \
     [teams/process/tech] across [regions/industries].";

const BULLET_UPGRADE_TEMPLATE: &str = "Action verb + what you did + how you did it + measurable \
     outcome (e.g., \u{201c}Led global cost-to-serve program across 4 regions, reducing run-rate \
     costs by 12% while improving SLA by 18%\u{201d}).";

const RECOMMENDED_BULLETS: [&str; 4] = [
    "Start bullets with strong action verbs (Led, Built, Delivered, Owned, Optimized).",
    "Add measurable impact (%, $, time, volume, SLA, headcount).",
    "Move core keywords from the job description into Skills + Experience.",
    "Keep formatting ATS-friendly (single column, consistent headings, plain text dates).",
];

const NOTE: &str = "Template guidance only; a full rewrite with DOCX/PDF export is not available yet.";

/// Job-description trigger terms and the hint they produce.
const KEYWORD_RULES: &[(&[&str], &str)] = &[
    (&["stakeholder"], "Stakeholder management"),
    (&["strategy"], "Strategy & execution"),
    (&["operat"], "Operating model / Ops excellence"),
    (&["data", "analytics"], "Data-driven decision making"),
    (&["program", "pmo"], "Program / PMO leadership"),
];

#[derive(Debug, Clone, Serialize)]
pub struct OptimizationReport {
    pub summary_rewrite_template: String,
    pub bullet_upgrade_template: String,
    pub recommended_bullets: Vec<String>,
    pub keyword_hints: Vec<String>,
    /// Hints whose trigger terms never show up in the resume itself.
    pub missing_from_resume: Vec<String>,
    pub note: String,
}

pub fn optimize_resume(text: &str, job_description: Option<&str>) -> OptimizationReport {
    let resume = normalize(text).to_lowercase();
    let jd = job_description.unwrap_or_default().to_lowercase();

    let mut keyword_hints: Vec<String> = Vec::new();
    let mut missing_from_resume: Vec<String> = Vec::new();

    for (triggers, hint) in KEYWORD_RULES {
        if !triggers.iter().any(|t| jd.contains(t)) {
            continue;
        }
        if keyword_hints.iter().any(|h| h == hint) || keyword_hints.len() >= MAX_KEYWORD_HINTS {
            continue;
        }
        keyword_hints.push(hint.to_string());
        if !triggers.iter().any(|t| resume.contains(t)) {
            missing_from_resume.push(hint.to_string());
        }
    }

    OptimizationReport {
        summary_rewrite_template: SUMMARY_REWRITE_TEMPLATE.to_string(),
        bullet_upgrade_template: BULLET_UPGRADE_TEMPLATE.to_string(),
        recommended_bullets: RECOMMENDED_BULLETS.iter().map(|b| b.to_string()).collect(),
        keyword_hints,
        missing_from_resume,
        note: NOTE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_job_description_gives_templates_only() {
        let report = optimize_resume("Some resume text", None);
        assert!(report.keyword_hints.is_empty());
        assert!(report.missing_from_resume.is_empty());
        assert_eq!(report.recommended_bullets.len(), 4);
        assert!(report.summary_rewrite_template.starts_with("Executive leader"));
        assert!(report.bullet_upgrade_template.starts_with("Action verb"));
    }

    #[test]
    fn test_keyword_hints_follow_rule_order() {
        let jd = "Own PMO strategy, work with stakeholders, improve operations using analytics";
        let report = optimize_resume("", Some(jd));
        assert_eq!(
            report.keyword_hints,
            vec![
                "Stakeholder management",
                "Strategy & execution",
                "Operating model / Ops excellence",
                "Data-driven decision making",
                "Program / PMO leadership",
            ]
        );
    }

    #[test]
    fn test_matching_is_case_insensitive_substring() {
        let report = optimize_resume("", Some("DATABASE OPERATOR"));
        assert_eq!(
            report.keyword_hints,
            vec!["Operating model / Ops excellence", "Data-driven decision making"]
        );
    }

    #[test]
    fn test_hints_are_not_duplicated() {
        let report = optimize_resume("", Some("data data analytics analytics"));
        assert_eq!(report.keyword_hints, vec!["Data-driven decision making"]);
    }

    #[test]
    fn test_missing_from_resume() {
        let resume = "Led Strategy for a\n\nglobal data   platform";
        let jd = "strategy, stakeholder alignment, analytics";
        let report = optimize_resume(resume, Some(jd));
        assert_eq!(report.keyword_hints.len(), 3);
        assert_eq!(report.missing_from_resume, vec!["Stakeholder management"]);
    }
}
