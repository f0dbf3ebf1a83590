//! Completion candidates for the document server's prompts and resource templates.

use crate::completion::CompletionCatalog;
use crate::types::CompletionReference;

pub const LANGUAGES: [&str; 6] = ["python", "javascript", "typescript", "java", "go", "rust"];

pub const FRAMEWORKS: [(&str, [&str; 3]); 3] = [
    ("python", ["fastapi", "flask", "django"]),
    ("javascript", ["express", "react", "vue"]),
    ("typescript", ["nestjs", "angular", "next"]),
];

pub const REVIEW_FOCUS: [&str; 4] = ["all", "security", "performance", "style"];

pub const GITHUB_OWNERS: [&str; 5] = ["microsoft", "google", "facebook", "openai", "anthropic"];

pub const GITHUB_REPOS: [(&str, [&str; 3]); 3] = [
    ("microsoft", ["vscode", "typescript", "playwright"]),
    ("google", ["angular", "tensorflow", "protobuf"]),
    ("openai", ["openai-python", "gpt-4", "whisper"]),
];

pub const GITHUB_REPO_TEMPLATE: &str = "github://repos/{owner}/{repo}";

pub fn catalog() -> CompletionCatalog {
    let review = CompletionReference::prompt("review_code");
    let setup = CompletionReference::prompt("setup_project");
    let github = CompletionReference::resource_template(GITHUB_REPO_TEMPLATE);

    CompletionCatalog::new()
        .fixed(review.clone(), "language", LANGUAGES)
        .fixed(review, "focus", REVIEW_FOCUS)
        .fixed(setup.clone(), "language", LANGUAGES)
        .dependent(setup, "framework", "language", FRAMEWORKS)
        .fixed(github.clone(), "owner", GITHUB_OWNERS)
        .dependent(github, "repo", "owner", GITHUB_REPOS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::CompletionQuery;

    #[test]
    fn test_language_prefix() {
        let review = CompletionReference::prompt("review_code");
        let query = CompletionQuery::new(review, "language", "j");
        let result = catalog().complete(&query).unwrap();
        assert_eq!(result.values, vec!["javascript", "java"]);
    }

    #[test]
    fn test_repo_depends_on_owner() {
        let reference = CompletionReference::resource_template(GITHUB_REPO_TEMPLATE);
        let query =
            CompletionQuery::new(reference.clone(), "repo", "").with_context("owner", "Google");
        assert_eq!(
            catalog().complete(&query).unwrap().values,
            vec!["angular", "tensorflow", "protobuf"]
        );

        // Owners without a repo list complete to nothing.
        let query = CompletionQuery::new(reference, "repo", "").with_context("owner", "anthropic");
        assert!(catalog().complete(&query).unwrap().values.is_empty());
    }
}
