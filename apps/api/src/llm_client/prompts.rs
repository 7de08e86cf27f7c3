// Shared prompt fragments for every provider call.
// Feature-specific prompts live next to their feature (see analysis/prompts.rs).

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Output language constraint. User-facing strings are Spanish.
pub const SPANISH_OUTPUT: &str = "Write every string value in Spanish, \
    regardless of the language of the input. Keep technology and tool names \
    in their original form.";
