use serde::{Deserialize, Serialize};
use std::fmt;

/// Clinical concern level attached to every key finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RiskLevel {
    High,
    Medium,
    Low,
    Normal,
    Info,
}

impl RiskLevel {
    pub const ALL: [RiskLevel; 5] = [
        RiskLevel::High,
        RiskLevel::Medium,
        RiskLevel::Low,
        RiskLevel::Normal,
        RiskLevel::Info,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::High => "High",
            RiskLevel::Medium => "Medium",
            RiskLevel::Low => "Low",
            RiskLevel::Normal => "Normal",
            RiskLevel::Info => "Info",
        }
    }

    /// Out-of-range results the user should pay attention to.
    pub fn needs_attention(&self) -> bool {
        matches!(self, RiskLevel::High | RiskLevel::Medium | RiskLevel::Low)
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyFinding {
    pub term: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normal_range: Option<String>,
    pub explanation: String,
    pub risk_level: RiskLevel,
}

impl KeyFinding {
    /// `value` and `normalRange` are expected to travel together.
    pub fn is_well_formed(&self) -> bool {
        self.value.is_some() == self.normal_range.is_some()
    }
}

/// Structured interpretation of one submitted document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisResult {
    pub summary: String,
    pub key_findings: Vec<KeyFinding>,
    pub recommendations: Vec<String>,
    pub alerts: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub text: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            text: text.into(),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanIcon {
    Diet,
    Medication,
    Activity,
    Monitoring,
    Appointment,
    General,
}

impl PlanIcon {
    pub const ALL: [PlanIcon; 6] = [
        PlanIcon::Diet,
        PlanIcon::Medication,
        PlanIcon::Activity,
        PlanIcon::Monitoring,
        PlanIcon::Appointment,
        PlanIcon::General,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanIcon::Diet => "diet",
            PlanIcon::Medication => "medication",
            PlanIcon::Activity => "activity",
            PlanIcon::Monitoring => "monitoring",
            PlanIcon::Appointment => "appointment",
            PlanIcon::General => "general",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarePlanSection {
    pub title: String,
    pub items: Vec<String>,
    pub icon: PlanIcon,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlan {
    pub plan_title: String,
    pub introduction: String,
    pub sections: Vec<CarePlanSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum View {
    #[default]
    Dashboard,
    Chat,
    CarePlan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_parses_camel_case_fields() {
        let json = r#"{
            "summary": "Mild anemia.",
            "keyFindings": [
                {"term": "Hemoglobin", "value": "10 g/dL", "normalRange": "13-17",
                 "explanation": "Protein that carries oxygen.", "riskLevel": "Low"},
                {"term": "Blood type", "explanation": "Your blood group.", "riskLevel": "Info"}
            ],
            "recommendations": ["Ask your doctor about iron levels."],
            "alerts": []
        }"#;

        let analysis: AnalysisResult = serde_json::from_str(json).unwrap();
        assert_eq!(analysis.key_findings.len(), 2);
        assert_eq!(analysis.key_findings[0].risk_level, RiskLevel::Low);
        assert_eq!(analysis.key_findings[0].normal_range.as_deref(), Some("13-17"));
        assert!(analysis.key_findings[1].value.is_none());
        assert!(analysis.key_findings.iter().all(KeyFinding::is_well_formed));
        assert!(analysis.alerts.is_empty());
    }

    #[test]
    fn test_unknown_risk_level_is_rejected() {
        let json = r#"{"term": "LDL", "explanation": "Cholesterol.", "riskLevel": "Critical"}"#;
        assert!(serde_json::from_str::<KeyFinding>(json).is_err());

        let json = r#"{"term": "LDL", "explanation": "Cholesterol.", "riskLevel": "high"}"#;
        assert!(serde_json::from_str::<KeyFinding>(json).is_err());
    }

    #[test]
    fn test_unknown_plan_icon_is_rejected() {
        let json = r#"{"title": "Sleep", "items": ["Go to bed early"], "icon": "sleep"}"#;
        assert!(serde_json::from_str::<CarePlanSection>(json).is_err());

        let json = r#"{"title": "Food", "items": ["Eat greens"], "icon": "diet"}"#;
        let section: CarePlanSection = serde_json::from_str(json).unwrap();
        assert_eq!(section.icon, PlanIcon::Diet);
    }

    #[test]
    fn test_view_and_role_wire_names() {
        assert_eq!(serde_json::to_value(View::CarePlan).unwrap(), "care-plan");
        assert_eq!(serde_json::to_value(View::Dashboard).unwrap(), "dashboard");
        assert_eq!(serde_json::to_value(ChatRole::Assistant).unwrap(), "assistant");
    }

    #[test]
    fn test_enum_names_match_serde() {
        for level in RiskLevel::ALL {
            assert_eq!(serde_json::to_value(level).unwrap(), level.as_str());
        }
        for icon in PlanIcon::ALL {
            assert_eq!(serde_json::to_value(icon).unwrap(), icon.as_str());
        }
    }

    #[test]
    fn test_mismatched_reference_range_is_not_well_formed() {
        let finding = KeyFinding {
            term: "Glucose".to_string(),
            value: Some("130 mg/dL".to_string()),
            normal_range: None,
            explanation: "Blood sugar.".to_string(),
            risk_level: RiskLevel::Medium,
        };
        assert!(!finding.is_well_formed());
        assert!(finding.risk_level.needs_attention());
    }
}
