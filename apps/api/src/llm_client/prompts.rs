// Shared prompt fragments for the text-improvement backend.
// Each service that builds LLM input keeps its own prompts.rs alongside it.

/// Base system prompt for every improvement call.
pub const IMPROVE_SYSTEM_BASE: &str = "\
    You are a senior resume reviewer. \
    Rewrite or advise on the resume text you are given so it reads as concrete, \
    quantified and professional. \
    Never invent employers, dates, titles or metrics that the text does not support. \
    Answer in the language of the resume text. Respond with plain text only.";

/// Builds the system prompt for one improvement call, scoped to a rule category
/// or an evaluation task.
pub fn improve_system(section_type: &str) -> String {
    let section_type = section_type.trim();
    if section_type.is_empty() {
        IMPROVE_SYSTEM_BASE.to_string()
    } else {
        format!("{IMPROVE_SYSTEM_BASE} Focus area: {section_type}.")
    }
}
