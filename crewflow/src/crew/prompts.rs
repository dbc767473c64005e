//! Prompt templates for the crew agents.

/// Characters of requirements text forwarded to code generation.
pub const REQUIREMENTS_EXCERPT: usize = 1000;
/// Characters of code forwarded to code review.
pub const REVIEW_EXCERPT: usize = 2000;
/// Characters of code forwarded to test planning.
pub const TESTING_EXCERPT: usize = 1000;

const FALLBACK_CODE: &str = "Standard React/Express application";

/// Returns at most `max_chars` characters of `text`, cut on a char boundary.
#[must_use]
pub fn excerpt(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

/// Asks for a fresh application idea, steering away from titles already used.
#[must_use]
pub fn idea_generation(used_titles: &[String]) -> String {
    let mut prompt = String::from(
        "Generate a unique and marketable full-stack application idea that solves a real-world problem.\n\
         The idea should be innovative, technically feasible, and have clear business value.\n\n\
         Format your response exactly as:\n\
         Title: [App Title]\n\n\
         Description: [One detailed paragraph describing the app, its target users, core features, and the problem it solves]\n\n\
         Make sure the idea is:\n\
         - Technically feasible to build\n\
         - Addresses a genuine pain point\n\
         - Has clear monetization potential\n\
         - Uses modern web technologies\n",
    );
    if !used_titles.is_empty() {
        prompt.push_str("\nDo not repeat any of these previously generated ideas:\n");
        for title in used_titles {
            prompt.push_str("- ");
            prompt.push_str(title);
            prompt.push('\n');
        }
    }
    prompt
}

/// Turns an idea into a requirements document.
#[must_use]
pub fn app_requirements(idea: &str) -> String {
    format!(
        "Based on the app idea \"{idea}\", create a comprehensive requirements document.\n\n\
         Structure your response with these sections:\n\n\
         # Project Overview\nBrief summary of the application\n\n\
         # User Stories\n- As a [user type], I want [functionality] so that [benefit]\n- (Include 5-7 user stories)\n\n\
         # Functional Requirements\n- Core features and functionality\n- User authentication and authorization\n\
         - Data management requirements\n- API requirements\n\n\
         # Non-Functional Requirements\n- Performance expectations\n- Security requirements\n\
         - Scalability considerations\n- Browser compatibility\n\n\
         # Technical Stack Recommendations\n- Frontend technologies\n- Backend technologies\n\
         - Database requirements\n- Third-party integrations\n\n\
         Use markdown formatting and be specific about requirements.\n"
    )
}

/// Asks for boilerplate code built from the idea and a requirements excerpt.
#[must_use]
pub fn code_generation(idea: &str, requirements: &str) -> String {
    let requirements = excerpt(requirements, REQUIREMENTS_EXCERPT);
    format!(
        "Generate production-ready boilerplate code for the application: \"{idea}\"\n\n\
         Based on these requirements: {requirements}...\n\n\
         Provide complete, functional code for:\n\n\
         ## Frontend (React Component)\nCreate a modern React functional component with:\n\
         - State management using hooks\n- Responsive design with Tailwind CSS\n\
         - Form handling and validation\n- API integration\n- Modern UI/UX patterns\n\n\
         ## Backend (Node.js Express Server)\nCreate a REST API server with:\n\
         - Express.js setup\n- Route handlers for main functionality\n\
         - Input validation and error handling\n- Database integration setup\n- Authentication middleware\n\n\
         ## Database Schema\nProvide SQL schema for the main entities\n\n\
         Format each section in clearly labeled markdown code blocks with appropriate language tags.\n\
         Make the code production-ready with proper error handling, validation, and best practices.\n"
    )
}

/// Asks for a structured review of a code excerpt.
#[must_use]
pub fn code_review(code: &str) -> String {
    let code = excerpt(code, REVIEW_EXCERPT);
    format!(
        "Review the following code for a full-stack application.\n\n\
         Code to review:\n{code}...\n\n\
         Provide feedback as a structured review:\n\n\
         ## Security Analysis\n## Performance Issues\n## Code Quality\n## Best Practices\n\
         ## Recommendations\n- Priority fixes (High/Medium/Low)\n\n\
         Use markdown formatting and provide specific, actionable feedback.\n"
    )
}

/// Asks for a deployment strategy.
#[must_use]
pub fn deployment(idea: &str) -> String {
    format!(
        "Create a comprehensive deployment strategy for the application: \"{idea}\"\n\n\
         Provide detailed deployment instructions for:\n\n\
         # Platform Selection\n# Frontend Deployment (Vercel/Netlify)\n# Backend Deployment (Railway/Render)\n\
         # Database Setup\n# CI/CD Pipeline\n# Monitoring & Maintenance\n# Security Configuration\n\n\
         Use markdown formatting with clear step-by-step instructions.\n"
    )
}

/// Asks for a testing plan built from the idea and a code excerpt.
#[must_use]
pub fn testing(idea: &str, code: &str) -> String {
    let code = if code.is_empty() {
        FALLBACK_CODE
    } else {
        excerpt(code, TESTING_EXCERPT)
    };
    format!(
        "Generate a comprehensive testing strategy for the application: \"{idea}\"\n\n\
         Based on this code structure: {code}...\n\n\
         Create testing plans for:\n\n\
         # Testing Strategy Overview\n# Unit Tests (Jest/Vitest)\n# Integration Tests\n\
         # End-to-End Tests (Cypress/Playwright)\n\n\
         Include example test code in markdown code blocks.\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        assert_eq!(excerpt("héllo", 2), "hé");
        assert_eq!(excerpt("short", 100), "short");
        assert_eq!(excerpt("", 3), "");
    }

    #[test]
    fn test_idea_prompt_lists_used_titles() {
        let fresh = idea_generation(&[]);
        assert!(fresh.contains("Title: [App Title]"));
        assert!(!fresh.contains("previously generated"));

        let prompt = idea_generation(&["TaskPilot".to_string(), "MealMate".to_string()]);
        assert!(prompt.contains("- TaskPilot\n"));
        assert!(prompt.contains("- MealMate\n"));
    }

    #[test]
    fn test_code_generation_truncates_requirements() {
        let requirements = "r".repeat(REQUIREMENTS_EXCERPT + 500);
        let prompt = code_generation("Idea", &requirements);
        assert!(prompt.contains(&"r".repeat(REQUIREMENTS_EXCERPT)));
        assert!(!prompt.contains(&"r".repeat(REQUIREMENTS_EXCERPT + 1)));
    }

    #[test]
    fn test_code_review_truncates_code() {
        let code = "c".repeat(REVIEW_EXCERPT * 2);
        let prompt = code_review(&code);
        assert!(prompt.contains(&"c".repeat(REVIEW_EXCERPT)));
        assert!(!prompt.contains(&"c".repeat(REVIEW_EXCERPT + 1)));
    }

    #[test]
    fn test_testing_prompt_falls_back_without_code() {
        assert!(testing("Idea", "").contains(FALLBACK_CODE));
        assert!(testing("Idea", "fn main() {}").contains("fn main() {}"));
    }
}
