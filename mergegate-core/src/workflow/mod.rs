pub mod models;
pub mod parser;

pub use models::{JobNeeds, JobSpec, Matrix, MatrixAxis, Pipeline, Step};
pub use parser::PipelineParser;
