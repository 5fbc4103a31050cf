use serde_json::{Value, json};
use tracing::{error, info};

use crate::{
    error::{GuardianError, Result},
    gemini::{ContentGenerator, GenerationRequest, Part},
    models::{CarePlan, KeyFinding, PlanIcon},
};

pub const CARE_PLAN_FAILED_MESSAGE: &str =
    "Failed to generate the care plan. The AI model may be unavailable.";

pub const CARE_PLAN_GATE_MESSAGE: &str = "Please upload and analyze a medical document on the Dashboard first to generate a personalized care plan.";

pub fn care_plan_schema() -> Value {
    let icons: Vec<&str> = PlanIcon::ALL.iter().map(PlanIcon::as_str).collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "planTitle": {
                "type": "STRING",
                "description": "A concise title for the care plan, e.g., 'Heart Health Management Plan'."
            },
            "introduction": {
                "type": "STRING",
                "description": "A brief, encouraging introductory paragraph for the patient."
            },
            "sections": {
                "type": "ARRAY",
                "description": "An array of care plan sections.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "title": {
                            "type": "STRING",
                            "description": "Title of the section, e.g., 'Dietary Adjustments', 'Medication Schedule'."
                        },
                        "items": {
                            "type": "ARRAY",
                            "description": "List of actionable items for this section.",
                            "items": { "type": "STRING" }
                        },
                        "icon": {
                            "type": "STRING",
                            "enum": icons,
                            "description": "An icon name representing the section."
                        }
                    },
                    "required": ["title", "items", "icon"]
                }
            }
        },
        "required": ["planTitle", "introduction", "sections"]
    })
}

/// Validated input for care-plan generation: a non-blank summary and at
/// least one key finding.
#[derive(Debug, Clone, Copy)]
pub struct CarePlanRequest<'a> {
    summary: &'a str,
    findings: &'a [KeyFinding],
}

impl<'a> CarePlanRequest<'a> {
    pub fn new(summary: &'a str, findings: &'a [KeyFinding]) -> Result<Self> {
        if summary.trim().is_empty() || findings.is_empty() {
            return Err(GuardianError::MissingInput(CARE_PLAN_GATE_MESSAGE.to_string()));
        }
        Ok(Self { summary, findings })
    }

    fn findings_digest(&self) -> String {
        self.findings
            .iter()
            .map(|f| match &f.value {
                Some(value) => format!("{}: {} ({} risk)", f.term, value, f.risk_level),
                None => format!("{} ({} risk)", f.term, f.risk_level),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn prompt(&self) -> String {
        format!(
            "Based on the following medical summary and key findings, generate a personalized, actionable care plan. \
            Focus on evidence-based lifestyle adjustments, reminders, and questions to ask a doctor. \
            Do not give direct medical advice. The tone should be supportive and clear.

MEDICAL SUMMARY:
{}

KEY FINDINGS:
{}
",
            self.summary,
            self.findings_digest()
        )
    }
}

pub fn parse_care_plan(raw: &str) -> serde_json::Result<CarePlan> {
    serde_json::from_str(raw.trim())
}

/// One attempt, no retry.
pub async fn generate_care_plan(
    generator: &dyn ContentGenerator,
    model: &str,
    request: CarePlanRequest<'_>,
) -> Result<CarePlan> {
    info!(model = %model, findings = request.findings.len(), "Generating care plan");

    let generation = GenerationRequest {
        model: model.to_string(),
        parts: vec![Part::Text(request.prompt())],
        response_schema: care_plan_schema(),
    };

    let raw = generator.generate(generation).await.map_err(|e| {
        error!(error = %e, "Care plan request failed");
        GuardianError::CarePlan(CARE_PLAN_FAILED_MESSAGE.to_string())
    })?;

    let plan = parse_care_plan(&raw).map_err(|e| {
        error!(error = %e, "Model returned a care plan that does not match the schema");
        GuardianError::CarePlan(CARE_PLAN_FAILED_MESSAGE.to_string())
    })?;

    info!(title = %plan.plan_title, sections = plan.sections.len(), "Care plan generated");
    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini::testing::ScriptedGenerator;
    use crate::models::RiskLevel;

    const PLAN_ANSWER: &str = r#"{
        "planTitle": "Blood Health Plan",
        "introduction": "A few gentle steps to support your blood health.",
        "sections": [
            {"title": "Dietary Adjustments", "items": ["Add iron-rich foods like lentils"], "icon": "diet"},
            {"title": "Follow-up", "items": ["Ask your doctor about a repeat blood count"], "icon": "appointment"}
        ]
    }"#;

    fn findings() -> Vec<KeyFinding> {
        vec![
            KeyFinding {
                term: "Hemoglobin".to_string(),
                value: Some("10 g/dL".to_string()),
                normal_range: Some("13-17".to_string()),
                explanation: "Carries oxygen.".to_string(),
                risk_level: RiskLevel::Medium,
            },
            KeyFinding {
                term: "Blood smear".to_string(),
                value: None,
                normal_range: None,
                explanation: "Looks at cell shapes.".to_string(),
                risk_level: RiskLevel::Info,
            },
        ]
    }

    #[test]
    fn test_precondition_requires_summary_and_findings() {
        let findings = findings();
        assert!(matches!(
            CarePlanRequest::new("", &findings),
            Err(GuardianError::MissingInput(_))
        ));
        assert!(matches!(
            CarePlanRequest::new("   ", &findings),
            Err(GuardianError::MissingInput(_))
        ));
        assert!(matches!(
            CarePlanRequest::new("Mild anemia.", &[]),
            Err(GuardianError::MissingInput(_))
        ));
        assert!(CarePlanRequest::new("Mild anemia.", &findings).is_ok());
    }

    #[test]
    fn test_prompt_lists_summary_and_findings() {
        let findings = findings();
        let prompt = CarePlanRequest::new("Mild anemia.", &findings)
            .unwrap()
            .prompt();
        assert!(prompt.contains("MEDICAL SUMMARY:\nMild anemia."));
        assert!(prompt.contains("Hemoglobin: 10 g/dL (Medium risk)"));
        assert!(prompt.contains("Blood smear (Info risk)"));
        assert!(prompt.contains("Do not give direct medical advice."));
    }

    #[tokio::test]
    async fn test_generates_plan_with_declared_schema() {
        let generator = ScriptedGenerator::answering(PLAN_ANSWER);
        let findings = findings();
        let request = CarePlanRequest::new("Mild anemia.", &findings).unwrap();

        let plan = generate_care_plan(&generator, "gemini-2.5-pro", request)
            .await
            .unwrap();
        assert_eq!(plan.plan_title, "Blood Health Plan");
        assert_eq!(plan.sections.len(), 2);
        assert_eq!(plan.sections[1].icon, PlanIcon::Appointment);

        let requests = generator.requests();
        assert_eq!(requests.len(), 1);
        let section = &requests[0].response_schema["properties"]["sections"]["items"];
        assert_eq!(
            section["properties"]["icon"]["enum"],
            json!(["diet", "medication", "activity", "monitoring", "appointment", "general"])
        );
    }

    #[tokio::test]
    async fn test_failures_surface_as_care_plan_errors() {
        let findings = findings();

        let generator = ScriptedGenerator::failing();
        let request = CarePlanRequest::new("Mild anemia.", &findings).unwrap();
        let err = generate_care_plan(&generator, "gemini-2.5-pro", request)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), CARE_PLAN_FAILED_MESSAGE);

        let generator = ScriptedGenerator::answering(PLAN_ANSWER.replace("\"diet\"", "\"food\""));
        let request = CarePlanRequest::new("Mild anemia.", &findings).unwrap();
        let result = generate_care_plan(&generator, "gemini-2.5-pro", request).await;
        assert!(matches!(result, Err(GuardianError::CarePlan(_))));
        assert_eq!(generator.call_count(), 1);
    }
}
