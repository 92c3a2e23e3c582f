//! Prompt template for multiple-choice scoring

use crate::dataset::QuestionRow;
use crate::providers::Message;

/// Instructions plus question layout, parameterized by option count
#[derive(Debug, Clone, PartialEq)]
pub struct PromptTemplate {
    option_count: usize,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new(4)
    }
}

impl PromptTemplate {
    pub fn new(option_count: usize) -> Self {
        Self { option_count }
    }

    /// `0, 1, 2, or 3` for four options
    fn index_list(&self) -> String {
        let indices: Vec<String> = (0..self.option_count).map(|i| i.to_string()).collect();
        match indices.split_last() {
            Some((last, rest)) if !rest.is_empty() => format!("{}, or {}", rest.join(", "), last),
            Some((last, _)) => last.clone(),
            None => String::new(),
        }
    }

    /// System instruction
    pub fn instructions(&self) -> String {
        let indices = self.index_list();
        format!(
            "Your job is to process multiple choice questions to the best of your knowledge.\n\
             You will be given a question under QUESTION, you will be given {count} answer choices under ANSWERS as array.\n\
             \n\
             ** OBJECTIVE **\n\
             - Respond with json schema RESPONSE_SCHEMA only\n\
             \x20   - response_idx: integer {indices}, from ANSWERS only.\n\
             \x20   - proba: probability of you picking the answer at every index from ANSWERS.\n\
             \n\
             RESPONSE_SCHEMA:\n\
             {{\n\
             \x20   \"proba\": [\"probability of answer index\"],\n\
             \x20   \"response_idx\": \"your answer as integer {indices}, from ANSWERS, no text before or after the answer!\"\n\
             }}\n\
             Respond with JSON only!",
            count = self.option_count,
            indices = indices,
        )
    }

    /// User prompt for one question
    pub fn question(&self, row: &QuestionRow) -> Result<String, serde_json::Error> {
        let options = serde_json::to_string(&row.options)?;
        Ok(format!("QUESTION:\n{}\n\nANSWERS:\n{}", row.question, options)
            .trim()
            .to_string())
    }

    /// Full conversation sent to the model
    pub fn messages(&self, row: &QuestionRow) -> Result<Vec<Message>, serde_json::Error> {
        Ok(vec![
            Message::system(self.instructions()),
            Message::user(self.question(row)?),
        ])
    }
}
