//! Chat prompts sent to the model.

use nlsql_core::{ChatMessage, PromptConfig, QuestionSql};

/// Rough token estimate: four characters per token.
pub fn approx_token_count(text: &str) -> usize {
    text.chars().count() / 4
}

/// Build the conversation asking the model for SQL answering `question`.
///
/// The system message carries the schema (`ddl`) and `documentation`; items
/// are appended only while the estimated size stays under
/// `config.max_tokens`. Each example becomes a user/assistant exchange, and
/// the question is the final user message.
pub fn build_sql_prompt(
    config: &PromptConfig,
    question: &str,
    ddl: &[String],
    documentation: &[String],
    examples: &[QuestionSql],
) -> Vec<ChatMessage> {
    let mut system = format!(
        "You are a {} expert. Please help to generate a SQL query to answer the question. \
         Your response should ONLY be based on the given context and follow the response guidelines and format instructions. ",
        config.dialect
    );

    if !ddl.is_empty() {
        system.push_str("\n===Tables \n");
        append_within_budget(&mut system, ddl, config.max_tokens);
    }

    if !documentation.is_empty() {
        system.push_str("\n===Additional Context \n\n");
        append_within_budget(&mut system, documentation, config.max_tokens);
    }

    system.push_str("===Response Guidelines \n");
    system.push_str(
        "1. If the provided context is sufficient, please generate a valid SQL query without any explanations for the question. \n",
    );
    system.push_str(
        "2. If the provided context is insufficient, please explain why it can't be generated. \n",
    );
    system.push_str("3. Please use the most relevant table(s). \n");
    system.push_str(
        "4. If the question has been asked and answered before, please repeat the answer exactly as it was given before. \n",
    );
    system.push_str(&format!(
        "5. Ensure that the output SQL is {}-compliant and executable, and free of syntax errors. \n",
        config.dialect
    ));

    let mut messages = Vec::with_capacity(examples.len() * 2 + 2);
    messages.push(ChatMessage::system(system));
    for example in examples {
        messages.push(ChatMessage::user(example.question.as_str()));
        messages.push(ChatMessage::assistant(example.sql.as_str()));
    }
    messages.push(ChatMessage::user(question));
    messages
}

fn append_within_budget(prompt: &mut String, items: &[String], max_tokens: usize) {
    for item in items {
        if approx_token_count(prompt) + approx_token_count(item) < max_tokens {
            prompt.push_str(item);
            prompt.push_str("\n\n");
        }
    }
}

/// Conversation asking the model which question `sql` answers.
pub fn build_question_prompt(sql: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(
            "The user will give you SQL and you will try to guess what the business question this query is answering. \
             Return just the question without any additional explanation. Do not reference the table name in the question.",
        ),
        ChatMessage::user(sql),
    ]
}
