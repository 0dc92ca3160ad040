//! Action role — code, test, and documentation generation.

use std::sync::Arc;

use crate::error::InferenceError;
use crate::llm::InferenceProvider;
use crate::swarm::task::{Task, TaskResult};
use crate::swarm::worker::ThinkingLog;

const CODE_SYSTEM_PROMPT: &str = r#"You are an expert programmer. Generate clean, well-documented
code that follows best practices. Include:
- Proper type annotations
- Doc comments
- Error handling
- Comments for complex logic"#;

const TEST_SYSTEM_PROMPT: &str = r#"You are a testing expert. Create comprehensive tests
that cover:
- Normal cases
- Edge cases
- Error conditions
- Boundary values"#;

const DOC_SYSTEM_PROMPT: &str = r#"You are a technical writer. Create clear, comprehensive
documentation that includes:
- Overview and purpose
- Installation instructions
- Usage examples
- API reference
- Configuration options"#;

/// Result of a code generation task.
#[derive(Debug, Clone)]
pub struct CodeResult {
    pub code: String,
    pub language: String,
    pub success: bool,
}

/// Result of a test task.
#[derive(Debug, Clone)]
pub struct TestResult {
    pub total_tests: u32,
    pub passed: u32,
    pub failed: u32,
    pub output: String,
}

/// Execution role: generates code, tests, and documentation.
pub struct ActionWorker {
    inference: Arc<dyn InferenceProvider>,
}

impl ActionWorker {
    pub fn new(inference: Arc<dyn InferenceProvider>) -> Self {
        Self { inference }
    }

    /// Generate code for a task description.
    pub async fn execute_code_task(
        &self,
        description: &str,
        thinking: &mut ThinkingLog,
    ) -> Result<CodeResult, InferenceError> {
        thinking.note(
            format!("Generating code for: {description:.100}"),
            Some("Using action tier model for code generation".to_string()),
        );

        let prompt = format!(
            "Write code for the following task:\n\n{description}\n\n\
             Provide the complete implementation."
        );

        let reply = self
            .inference
            .call_action(&prompt, Some(CODE_SYSTEM_PROMPT))
            .await?;

        Ok(CodeResult {
            code: reply.content,
            language: "rust".to_string(),
            success: true,
        })
    }

    /// Generate tests for a piece of code.
    ///
    /// Tests are generated but NOT executed — running them would need a
    /// sandbox this layer does not own, so the counts below are a fixed stub.
    pub async fn execute_test_task(
        &self,
        code: &str,
        description: &str,
        thinking: &mut ThinkingLog,
    ) -> Result<TestResult, InferenceError> {
        thinking.note(
            format!("Creating tests for: {description:.100}"),
            Some("Generating comprehensive test cases".to_string()),
        );

        let prompt = format!(
            "Write tests for the following code:\n\n```\n{code}\n```\n\n\
             Task: {description}\n\nProvide complete test code."
        );

        let _test_code = self
            .inference
            .call_action(&prompt, Some(TEST_SYSTEM_PROMPT))
            .await?;

        Ok(TestResult {
            total_tests: 3,
            passed: 3,
            failed: 0,
            output: "All tests passed".to_string(),
        })
    }

    /// Generate Markdown documentation.
    pub async fn execute_documentation_task(
        &self,
        description: &str,
        thinking: &mut ThinkingLog,
    ) -> Result<String, InferenceError> {
        thinking.note(
            format!("Writing documentation for: {description:.100}"),
            Some("Creating clear, comprehensive documentation".to_string()),
        );

        let prompt = format!(
            "Write documentation for:\n\n{description}\n\n\
             Format the documentation in Markdown."
        );

        let reply = self
            .inference
            .call_action(&prompt, Some(DOC_SYSTEM_PROMPT))
            .await?;

        Ok(reply.content)
    }

    /// Keyword dispatch over the task description.
    pub async fn execute(
        &self,
        task: &Task,
        thinking: &mut ThinkingLog,
    ) -> Result<TaskResult, InferenceError> {
        let description = task.description.to_lowercase();

        if description.contains("code") || description.contains("implement") {
            let result = self.execute_code_task(&task.description, thinking).await?;
            Ok(TaskResult::Code {
                code: result.code,
                language: result.language,
                success: result.success,
            })
        } else if description.contains("test") {
            // The code under test is not threaded through the task model yet;
            // the prompt carries a placeholder the same way the result counts
            // are stubbed.
            let result = self
                .execute_test_task("// Code to test would go here", &task.description, thinking)
                .await?;
            Ok(TaskResult::Test {
                total_tests: result.total_tests,
                passed: result.passed,
                failed: result.failed,
                output: result.output,
            })
        } else if description.contains("doc") || description.contains("document") {
            let content = self
                .execute_documentation_task(&task.description, thinking)
                .await?;
            Ok(TaskResult::Documentation { content })
        } else {
            thinking.note(
                "Executing general action task",
                Some("Processing task with action model".to_string()),
            );
            let reply = self.inference.call_action(&task.description, None).await?;
            Ok(TaskResult::General {
                content: reply.content,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::OfflineInference;

    fn worker() -> ActionWorker {
        ActionWorker::new(Arc::new(OfflineInference::new()))
    }

    #[tokio::test]
    async fn code_keyword_routes_to_code_generation() {
        let mut thinking = ThinkingLog::default();
        let result = worker()
            .execute(&Task::new("t-1", "Implement a fibonacci function"), &mut thinking)
            .await
            .unwrap();
        match result {
            TaskResult::Code { success, language, .. } => {
                assert!(success);
                assert_eq!(language, "rust");
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_keyword_returns_stub_counts() {
        let mut thinking = ThinkingLog::default();
        let result = worker()
            .execute(&Task::new("t-1", "Write tests for the parser"), &mut thinking)
            .await
            .unwrap();
        match result {
            TaskResult::Test { total_tests, passed, failed, .. } => {
                assert_eq!(total_tests, 3);
                assert_eq!(passed, 3);
                assert_eq!(failed, 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn doc_keyword_routes_to_documentation() {
        let mut thinking = ThinkingLog::default();
        let result = worker()
            .execute(&Task::new("t-1", "Document the public API"), &mut thinking)
            .await
            .unwrap();
        assert!(matches!(result, TaskResult::Documentation { .. }));
    }

    #[tokio::test]
    async fn unmatched_description_is_a_general_round_trip() {
        let mut thinking = ThinkingLog::default();
        let result = worker()
            .execute(&Task::new("t-1", "Summarize the meeting"), &mut thinking)
            .await
            .unwrap();
        assert!(matches!(result, TaskResult::General { .. }));
    }
}
