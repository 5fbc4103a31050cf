use std::fmt::{self, Write};

use crate::models::{AnalysisResult, CarePlan, KeyFinding};

pub const DISCLAIMER: &str = "This is not medical advice. Always consult with a qualified healthcare professional for any health concerns.";

fn write_finding(out: &mut String, finding: &KeyFinding) -> fmt::Result {
    let risk = finding.risk_level.as_str().to_uppercase();
    writeln!(out, "- [{risk}] {}", finding.term)?;
    match (&finding.value, &finding.normal_range) {
        (Some(value), Some(range)) => writeln!(out, "    Value: {value} (normal: {range})")?,
        (Some(value), None) => writeln!(out, "    Value: {value}")?,
        (None, Some(range)) => writeln!(out, "    Normal range: {range}")?,
        (None, None) => {}
    }
    writeln!(out, "    {}", finding.explanation)
}

fn write_list(out: &mut String, items: &[String], empty: &str) -> fmt::Result {
    if items.is_empty() {
        return writeln!(out, "{empty}");
    }
    for item in items {
        writeln!(out, "- {item}")?;
    }
    Ok(())
}

fn write_analysis(out: &mut String, analysis: &AnalysisResult) -> fmt::Result {
    writeln!(out, "SUMMARY\n{}\n", analysis.summary)?;

    writeln!(out, "KEY FINDINGS")?;
    if analysis.key_findings.is_empty() {
        writeln!(out, "No key findings.")?;
    }
    for finding in &analysis.key_findings {
        write_finding(out, finding)?;
    }

    writeln!(out, "\nRECOMMENDATIONS")?;
    write_list(out, &analysis.recommendations, "No recommendations.")?;

    writeln!(out, "\nWHEN TO SEE A DOCTOR")?;
    write_list(out, &analysis.alerts, "No urgent alerts.")?;

    writeln!(out, "\n{DISCLAIMER}")
}

fn write_care_plan(out: &mut String, plan: &CarePlan) -> fmt::Result {
    writeln!(out, "{}\n\n{}", plan.plan_title, plan.introduction)?;

    for section in &plan.sections {
        writeln!(out, "\n[{}] {}", section.icon.as_str(), section.title)?;
        for item in &section.items {
            writeln!(out, "  * {item}")?;
        }
    }

    writeln!(out, "\n{DISCLAIMER}")
}

/// Plain-text report of an analysis: summary, findings, recommendations and
/// doctor-visit alerts.
pub fn render_analysis(analysis: &AnalysisResult) -> String {
    let mut out = String::new();
    // Writing into a String cannot fail.
    let _ = write_analysis(&mut out, analysis);
    out
}

pub fn render_care_plan(plan: &CarePlan) -> String {
    let mut out = String::new();
    let _ = write_care_plan(&mut out, plan);
    out
}
