pub mod boundary_locator;
pub mod response_parser;
pub mod segmenter;
pub mod similarity;
pub mod subquestion_splitter;
pub mod topic_tagger;

pub use boundary_locator::{locate, locate_all, LocateOutcome, LocatedAnchor};
pub use response_parser::{parse_anchor_blocks, parse_judgment, parse_syllabus};
pub use segmenter::{segment, segment_document, SegmentedQuestion, Segmentation};
pub use similarity::{cosine_similarity, top_k};
pub use subquestion_splitter::{
    apply_judgment, split_text, SplitChild, SplitDecision, SplitResult, SubQuestionJudgment,
};
pub use topic_tagger::{organize_by_topic, primary_tags, SubtopicIndex, TaggingCounts};
