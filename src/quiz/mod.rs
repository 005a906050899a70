mod grading;
mod sampler;

pub use grading::grade;
pub use sampler::{sample_questions, QuizFilters};
