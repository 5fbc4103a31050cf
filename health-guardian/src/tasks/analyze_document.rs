use serde_json::{Value, json};
use tracing::{error, info, warn};

use crate::{
    error::{GuardianError, Result},
    gemini::{ContentGenerator, GenerationRequest, Part},
    intake::DocumentInput,
    models::{AnalysisResult, RiskLevel},
};

pub const ANALYSIS_FAILED_MESSAGE: &str = "Failed to analyze the medical document. The AI model may be overloaded or the document format is unsupported.";

const ANALYSIS_PROMPT: &str = "Analyze the following medical document. Interpret the results, explain complex terms in simple language, and provide structured, actionable guidance. IMPORTANT: Do not provide medical advice. All recommendations should be suggestions to discuss with a healthcare professional.\n\nDOCUMENT:";

/// Output shape the model must produce; mirrors [`AnalysisResult`].
pub fn analysis_schema() -> Value {
    let risk_levels: Vec<&str> = RiskLevel::ALL.iter().map(RiskLevel::as_str).collect();

    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "STRING",
                "description": "A simple, one-paragraph summary of the medical document for a layperson."
            },
            "keyFindings": {
                "type": "ARRAY",
                "description": "An array of key findings from the report.",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "term": { "type": "STRING", "description": "The medical term or test name." },
                        "value": { "type": "STRING", "description": "The measured value from the report." },
                        "normalRange": { "type": "STRING", "description": "The normal range for this value." },
                        "explanation": { "type": "STRING", "description": "A simple explanation of what this term means." },
                        "riskLevel": {
                            "type": "STRING",
                            "enum": risk_levels,
                            "description": "Use 'High' or 'Medium' for results outside normal range, 'Low' for slightly abnormal results, 'Normal' for results within range, and 'Info' for non-numeric findings."
                        }
                    },
                    "required": ["term", "explanation", "riskLevel"]
                }
            },
            "recommendations": {
                "type": "ARRAY",
                "description": "A list of actionable next steps for the patient. Frame these as suggestions to discuss with a doctor, not as direct medical advice.",
                "items": { "type": "STRING" }
            },
            "alerts": {
                "type": "ARRAY",
                "description": "A list of 'When to see a doctor' alerts based on critical findings.",
                "items": { "type": "STRING" }
            }
        },
        "required": ["summary", "keyFindings", "recommendations", "alerts"]
    })
}

/// Builds the single model request for `input`: text goes inline after the
/// prompt, images travel as a second inline-data part.
pub fn build_analysis_request(model: &str, input: &DocumentInput) -> GenerationRequest {
    let parts = match input {
        DocumentInput::Text(text) => vec![Part::Text(format!("{ANALYSIS_PROMPT}\n{text}"))],
        DocumentInput::Image(image) => vec![
            Part::Text(ANALYSIS_PROMPT.to_string()),
            Part::InlineData {
                mime_type: image.media_type().to_string(),
                data: image.to_base64(),
            },
        ],
    };

    GenerationRequest {
        model: model.to_string(),
        parts,
        response_schema: analysis_schema(),
    }
}

pub fn parse_analysis(raw: &str) -> serde_json::Result<AnalysisResult> {
    serde_json::from_str(raw.trim())
}

/// Interprets one document. All-or-nothing: any remote or parse failure
/// yields [`GuardianError::Analysis`] and no partial result.
pub async fn analyze_document(
    generator: &dyn ContentGenerator,
    model: &str,
    input: &DocumentInput,
) -> Result<AnalysisResult> {
    info!(model = %model, kind = input.kind(), "Starting document analysis");

    let request = build_analysis_request(model, input);
    let raw = generator.generate(request).await.map_err(|e| {
        error!(error = %e, "Document analysis request failed");
        GuardianError::Analysis(ANALYSIS_FAILED_MESSAGE.to_string())
    })?;

    let analysis = parse_analysis(&raw).map_err(|e| {
        error!(error = %e, "Model returned an analysis that does not match the schema");
        GuardianError::Analysis(ANALYSIS_FAILED_MESSAGE.to_string())
    })?;

    for finding in analysis.key_findings.iter().filter(|f| !f.is_well_formed()) {
        warn!(term = %finding.term, "Key finding has a value without a normal range or vice versa");
    }

    info!(
        findings = analysis.key_findings.len(),
        recommendations = analysis.recommendations.len(),
        alerts = analysis.alerts.len(),
        "Document analysis completed"
    );

    Ok(analysis)
}
