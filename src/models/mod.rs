pub mod bank;
pub mod document;
pub mod embedding;
pub mod loaders;
pub mod question;
pub mod syllabus;

pub use bank::{QuestionBank, RecordUpdate, UpdateSummary};
pub use document::RawDocument;
pub use embedding::{embedding_text, EmbeddingMetadata, EmbeddingStore};
pub use question::{AnchorSet, Independence, QuestionAnchor, QuestionNumber, QuestionRecord};
pub use syllabus::{
    SubtopicGroup, Syllabus, SyllabusTopic, TaggedEntry, TaggedQuestion, TaggedQuestionBank,
    TopicGroup, TopicTag,
};
