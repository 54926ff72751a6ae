//! Staged query plans.
//!
//! A plan is an explicit ordered configuration: each stage names a purpose
//! and carries the query templates tried in order. Earlier stages are
//! cheaper, narrower searches; the order is fixed and must not be
//! reordered. Within a stage, queries run one at a time and the stage stops
//! as soon as one yields a usable result.

use crate::parse::FullName;
use crate::types::report::Report;

/// What a stage is trying to find, which doubles as its acceptance
/// predicate: `FindName` accepts a plausible personal name, `FindEmail`
/// accepts one or more valid addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePurpose {
    FindName,
    FindEmail,
}

/// One named phase of the enrichment strategy.
#[derive(Debug, Clone)]
pub struct Stage {
    pub name: &'static str,
    pub purpose: StagePurpose,
    /// Query templates with `{domain}`, `{company}` and `{name}`
    /// placeholders, tried in order.
    pub templates: Vec<&'static str>,
    /// Stage only makes sense once an earlier stage found a name.
    pub requires_name: bool,
}

impl Stage {
    /// Interpolate a template against the report context and any name found
    /// by an earlier stage.
    pub fn render(&self, template: &str, report: &Report, name: Option<&FullName>) -> String {
        let mut prompt = template
            .replace("{domain}", &report.domain)
            .replace("{company}", report.company_or_domain());
        if let Some(name) = name {
            prompt = prompt.replace("{name}", &name.full());
        }
        prompt
    }
}

/// An ordered list of stages.
#[derive(Debug, Clone)]
pub struct StagePlan {
    stages: Vec<Stage>,
}

impl StagePlan {
    pub fn new(stages: Vec<Stage>) -> Self {
        Self { stages }
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The production plan: find a decision-maker's name, then their
    /// address, then fall back to any published address on the site.
    pub fn standard() -> Self {
        Self::new(vec![
            Stage {
                name: "owner-name",
                purpose: StagePurpose::FindName,
                requires_name: false,
                templates: vec![
                    "Who is the owner of the business at {domain}? Reply with only their full name, or NOT_FOUND.",
                    "Who founded {company} ({domain})? Reply with only the founder's full name, or NOT_FOUND.",
                    "Who is the CEO of {company}? Reply with only their full name, or NOT_FOUND.",
                    "Who is the president of {company} ({domain})? Reply with only their full name, or NOT_FOUND.",
                    "Who is the managing director of {company}? Reply with only their full name, or NOT_FOUND.",
                    "Who runs the company behind {domain}? Reply with only that person's full name, or NOT_FOUND.",
                    "Find the principal of {company} ({domain}). Reply with only their full name, or NOT_FOUND.",
                    "Who is the general manager of {company}? Reply with only their full name, or NOT_FOUND.",
                    "Search LinkedIn: who is the owner or founder of {company} ({domain})? Reply with only their full name, or NOT_FOUND.",
                    "According to the about page on {domain}, who leads the company? Reply with only their full name, or NOT_FOUND.",
                    "Who is listed as the proprietor of {company}? Reply with only their full name, or NOT_FOUND.",
                    "Who signed press releases for {company} ({domain})? Reply with only that person's full name, or NOT_FOUND.",
                ],
            },
            Stage {
                name: "named-email",
                purpose: StagePurpose::FindEmail,
                requires_name: true,
                templates: vec![
                    "What is the email address of {name} at {company} ({domain})? List any addresses you find, or NOT_FOUND.",
                    "Find the work email address of {name}, who works at {domain}. List any addresses you find, or NOT_FOUND.",
                    "Search for '{name} email {domain}'. List any email addresses you find, or NOT_FOUND.",
                    "What email address does {name} of {company} publish online? List any addresses you find, or NOT_FOUND.",
                    "Find contact details for {name} at {company}. List any email addresses, or NOT_FOUND.",
                    "Search news articles and directories for the email address of {name} ({company}). List any addresses, or NOT_FOUND.",
                    "Does {domain} list an email address for {name}? List any addresses you find, or NOT_FOUND.",
                    "Search for '{name}' '@{domain}'. List any email addresses you find, or NOT_FOUND.",
                ],
            },
            Stage {
                name: "site-email",
                purpose: StagePurpose::FindEmail,
                requires_name: false,
                templates: vec![
                    "List every contact email address published on {domain}, or NOT_FOUND.",
                    "What email addresses appear on the contact page of {domain}? List them, or NOT_FOUND.",
                    "Search for email addresses ending in @{domain}. List them, or NOT_FOUND.",
                    "What is the best email address to reach {company} ({domain})? List any addresses, or NOT_FOUND.",
                    "Find email addresses for {company} in business directories. List them, or NOT_FOUND.",
                    "What email addresses does {company} publish on social media profiles? List them, or NOT_FOUND.",
                    "Search for '{domain} contact email'. List any email addresses you find, or NOT_FOUND.",
                    "List email addresses found in press coverage of {company} ({domain}), or NOT_FOUND.",
                    "What sales or owner email addresses are associated with {domain}? List them, or NOT_FOUND.",
                    "Find any email address for the team behind {domain}. List them, or NOT_FOUND.",
                ],
            },
        ])
    }
}

impl Default for StagePlan {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::FullName;

    #[test]
    fn standard_plan_stage_order() {
        let plan = StagePlan::standard();
        let names: Vec<&str> = plan.stages().iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["owner-name", "named-email", "site-email"]);

        assert_eq!(plan.stages()[0].purpose, StagePurpose::FindName);
        assert!(plan.stages()[1].requires_name);
        assert!(!plan.stages()[2].requires_name);
    }

    #[test]
    fn templates_render_placeholders() {
        let plan = StagePlan::standard();
        let report = Report::new("acme.com", Some("Acme Corp".to_string()));
        let name = FullName {
            first: "Jane".to_string(),
            last: "Doe".to_string(),
        };

        let stage = &plan.stages()[1];
        let prompt = stage.render(stage.templates[0], &report, Some(&name));
        assert!(prompt.contains("Jane Doe"));
        assert!(prompt.contains("Acme Corp"));
        assert!(prompt.contains("acme.com"));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn company_falls_back_to_domain() {
        let plan = StagePlan::standard();
        let report = Report::new("acme.com", None);

        let stage = &plan.stages()[0];
        let prompt = stage.render(stage.templates[2], &report, None);
        assert!(prompt.contains("acme.com"));
        assert!(!prompt.contains('{'));
    }
}
