pub mod analyze_document;
pub mod care_plan;
pub mod chat;

pub use analyze_document::analyze_document;
pub use care_plan::{CarePlanRequest, generate_care_plan};
pub use chat::{ChatHandle, ChatSession, PendingTurn, send_message};
