//! AI classification backends.

mod openai;
mod traits;

pub use openai::OpenAiClassifier;
pub use traits::{Classifier, ClassifierError, Result};
