pub mod classification_flow;
pub mod document_ctx;
pub mod subquestion_flow;
pub mod syllabus_flow;

pub use classification_flow::{ClassificationFlow, ProcessResult};
pub use document_ctx::DocumentCtx;
pub use subquestion_flow::{SubQuestionFlow, SubQuestionStats};
pub use syllabus_flow::SyllabusFlow;
