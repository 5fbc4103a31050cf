//! The single user workspace: which view is active, the current analysis, and
//! the state owned by the chat and care-plan views.

use serde::Serialize;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use crate::{
    busy::{BusyFlag, BusyGuard},
    error::{GuardianError, Result},
    models::{AnalysisResult, CarePlan, ChatMessage, KeyFinding, View},
    tasks::{
        CarePlanRequest, ChatHandle, ChatSession,
        care_plan::CARE_PLAN_GATE_MESSAGE,
    },
};

/// Chat state machine: nothing until the chat view is first opened, then a
/// session grounded on a specific summary.
#[derive(Debug, Default)]
pub enum ChatSlot {
    #[default]
    Uninitialized,
    Ready { grounding: String, handle: ChatHandle },
}

#[derive(Debug, Default)]
pub struct CarePlanState {
    plan: Option<CarePlan>,
    error: Option<String>,
    busy: BusyFlag,
}

#[derive(Debug, Default)]
pub struct Workspace {
    view: View,
    analysis: Option<Arc<AnalysisResult>>,
    analysis_error: Option<String>,
    analysis_busy: BusyFlag,
    chat: ChatSlot,
    care_plan: CarePlanState,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardView {
    pub analysis: Option<AnalysisResult>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatView {
    pub session_id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub is_loading: bool,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CarePlanView {
    pub can_generate: bool,
    pub notice: Option<String>,
    pub plan: Option<CarePlan>,
    pub is_loading: bool,
    pub error: Option<String>,
}

/// Serializable rendering of the active view.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "view", rename_all = "kebab-case")]
pub enum ViewSnapshot {
    Dashboard(DashboardView),
    Chat(ChatView),
    CarePlan(CarePlanView),
}

/// Analysis context handed to the care-plan generator.
#[derive(Debug, Clone)]
pub struct CarePlanContext {
    analysis: Arc<AnalysisResult>,
}

impl CarePlanContext {
    pub fn request(&self) -> Result<CarePlanRequest<'_>> {
        CarePlanRequest::new(&self.analysis.summary, &self.analysis.key_findings)
    }

    pub fn analysis(&self) -> &Arc<AnalysisResult> {
        &self.analysis
    }
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self) -> View {
        self.view
    }

    pub fn analysis(&self) -> Option<&Arc<AnalysisResult>> {
        self.analysis.as_ref()
    }

    pub fn summary(&self) -> &str {
        self.analysis.as_deref().map_or("", |a| a.summary.as_str())
    }

    pub fn key_findings(&self) -> &[KeyFinding] {
        self.analysis
            .as_deref()
            .map_or(&[][..], |a| a.key_findings.as_slice())
    }

    pub fn care_plan(&self) -> Option<&CarePlan> {
        self.care_plan.plan.as_ref()
    }

    pub fn can_generate_care_plan(&self) -> bool {
        !self.summary().trim().is_empty() && !self.key_findings().is_empty()
    }

    /// Switches the active view. Opening the chat readies its session.
    pub fn select(&mut self, view: View) {
        info!(from = ?self.view, to = ?view, "Switching view");
        self.view = view;
        if view == View::Chat {
            self.chat_handle();
        }
    }

    /// Returns the chat session for the current summary, creating it on first
    /// use and replacing it when the summary has changed.
    pub fn chat_handle(&mut self) -> ChatHandle {
        let summary = self.summary().to_string();
        if let ChatSlot::Ready { grounding, handle } = &self.chat {
            if *grounding == summary {
                return handle.clone();
            }
        }
        self.reset_chat(summary)
    }

    fn reset_chat(&mut self, grounding: String) -> ChatHandle {
        info!(grounded = !grounding.trim().is_empty(), "Starting new chat session");
        let handle = ChatSession::new(grounding.clone()).into_handle();
        self.chat = ChatSlot::Ready {
            grounding,
            handle: handle.clone(),
        };
        handle
    }

    pub fn chat_slot(&self) -> &ChatSlot {
        &self.chat
    }

    pub fn begin_analysis(&self) -> Result<BusyGuard> {
        self.analysis_busy.try_acquire().ok_or_else(|| {
            GuardianError::Busy("A document is already being analyzed. Please wait.".to_string())
        })
    }

    pub fn clear_analysis_error(&mut self) {
        self.analysis_error = None;
    }

    /// Stores a new analysis, returns to the dashboard and resets everything
    /// derived from the previous one.
    pub fn complete_analysis(&mut self, analysis: AnalysisResult) -> Arc<AnalysisResult> {
        let analysis = Arc::new(analysis);
        self.analysis = Some(analysis.clone());
        self.analysis_error = None;
        self.view = View::Dashboard;
        self.care_plan.plan = None;
        self.care_plan.error = None;

        if matches!(self.chat, ChatSlot::Ready { .. }) {
            self.reset_chat(analysis.summary.clone());
        }

        info!(findings = analysis.key_findings.len(), "Analysis stored, showing dashboard");
        analysis
    }

    /// Records a failed analysis. Any previous analysis stays in place.
    pub fn fail_analysis(&mut self, message: impl Into<String>) {
        self.analysis_error = Some(message.into());
    }

    /// Checks the care-plan precondition and marks the generator busy.
    pub fn begin_care_plan(&mut self) -> Result<(CarePlanContext, BusyGuard)> {
        let analysis = match &self.analysis {
            Some(analysis) if self.can_generate_care_plan() => analysis.clone(),
            _ => {
                return Err(GuardianError::MissingInput(
                    CARE_PLAN_GATE_MESSAGE.to_string(),
                ));
            }
        };
        let guard = self.care_plan.busy.try_acquire().ok_or_else(|| {
            GuardianError::Busy("A care plan is already being generated. Please wait.".to_string())
        })?;
        self.care_plan.error = None;
        Ok((CarePlanContext { analysis }, guard))
    }

    /// Stores a plan unless the analysis it was built from has been replaced.
    pub fn complete_care_plan(&mut self, context: &CarePlanContext, plan: CarePlan) -> bool {
        let current = self.is_current(context);
        if current {
            self.care_plan.plan = Some(plan);
            self.care_plan.error = None;
        } else {
            info!("Discarding care plan built from a replaced analysis");
        }
        current
    }

    pub fn fail_care_plan(&mut self, context: &CarePlanContext, message: impl Into<String>) {
        if self.is_current(context) {
            self.care_plan.error = Some(message.into());
        }
    }

    fn is_current(&self, context: &CarePlanContext) -> bool {
        self.analysis
            .as_ref()
            .is_some_and(|a| Arc::ptr_eq(a, &context.analysis))
    }

    pub fn dashboard_view(&self) -> DashboardView {
        DashboardView {
            analysis: self.analysis.as_deref().cloned(),
            is_loading: self.analysis_busy.is_busy(),
            error: self.analysis_error.clone(),
        }
    }

    pub fn care_plan_view(&self) -> CarePlanView {
        let can_generate = self.can_generate_care_plan();
        CarePlanView {
            can_generate,
            notice: (!can_generate).then(|| CARE_PLAN_GATE_MESSAGE.to_string()),
            plan: self.care_plan.plan.clone(),
            is_loading: self.care_plan.busy.is_busy(),
            error: self.care_plan.error.clone(),
        }
    }

    pub async fn chat_view(&mut self) -> ChatView {
        let handle = self.chat_handle();
        let session = handle.lock().await;
        ChatView {
            session_id: session.id(),
            messages: session.messages().to_vec(),
            is_loading: session.is_loading(),
            error: session.error().map(str::to_string),
        }
    }

    pub async fn snapshot(&mut self) -> ViewSnapshot {
        match self.view {
            View::Dashboard => ViewSnapshot::Dashboard(self.dashboard_view()),
            View::Chat => ViewSnapshot::Chat(self.chat_view().await),
            View::CarePlan => ViewSnapshot::CarePlan(self.care_plan_view()),
        }
    }
}
