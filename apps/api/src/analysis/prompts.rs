// Prompt constants for résumé analysis.
// Reuses cross-cutting fragments from llm_client::prompts.

use crate::llm_client::prompts::{JSON_ONLY_SYSTEM, SPANISH_OUTPUT};

const ANALYSIS_ROLE: &str = "You are an experienced technical recruiter and career advisor. \
    You review résumés and return a concise structured assessment.";

/// Output schema the model must follow. Mirrors `AnalysisResult`.
const ANALYSIS_SCHEMA: &str = r#"Return a JSON object with this EXACT schema (no extra fields):
{
  "industry": "string, e.g. IT, Finanzas, Salud, Marketing, Educación, Ventas or General",
  "role_seniority": "Junior | Semi-Senior | Senior",
  "top_roles": ["up to 5 job titles this person fits"],
  "skills": ["up to 30 distinct skills or tools found in the résumé"],
  "score": 7,
  "red_flags": ["up to 8 concrete problems with the résumé"],
  "summary": "two or three sentences describing the profile",
  "next_steps": ["up to 6 actionable improvements"]
}
"score" is a number from 1 to 10 rating the résumé's overall strength."#;

/// User prompt template. Replace `{resume_text}` before sending.
pub const ANALYSIS_PROMPT_TEMPLATE: &str = r#"Analyze the following résumé.

RÉSUMÉ:
{resume_text}"#;

/// Full system instruction for the analysis call.
pub fn analysis_system_prompt() -> String {
    format!("{ANALYSIS_ROLE}\n\n{ANALYSIS_SCHEMA}\n\n{JSON_ONLY_SYSTEM}\n{SPANISH_OUTPUT}")
}

/// Fills the user prompt. `resume_text` must already be truncated.
pub fn build_analysis_prompt(resume_text: &str) -> String {
    ANALYSIS_PROMPT_TEMPLATE.replace("{resume_text}", resume_text)
}
