// Prompt constants for the stage chain, sentiment probe and synthesis calls.
// Templates use `{name}` placeholders filled by `fill`.

/// System role shared by the Acknowledge and Recur-Extract stages.
pub const STAGE_SYSTEM: &str = "You are an assistant that helps produce customer testimonials. \
    You will be given survey results and you do two things: \
    1. analyze the sentiment of the responses. \
    2. detect recurring wording or phrasing in previous testimonials.";

/// Acknowledge stage input. Replace `{document_id}` and `{responses}`.
pub const ACKNOWLEDGE_TEMPLATE: &str = "Here is a survey with the '_id': {document_id}. \
    Please review the survey and confirm that you processed the data: \
    Survey response = {responses}";

/// Recur-Extract stage input. Replace `{corpus}`.
pub const RECUR_EXTRACT_TEMPLATE: &str = "Review these historical testimonial responses for \
    recurring language and phrasing. Document them so that future testimonials can avoid \
    repeating them. Historical Documents = {corpus}";

/// Stand-in corpus when no prior testimonials exist.
pub const EMPTY_CORPUS: &str = "[] (no historical testimonials exist yet)";

/// System role for the Summarize stage. It does not see the transcript as history.
pub const SUMMARIZE_SYSTEM: &str = "You are an assistant that helps produce customer testimonials. \
    You will be given a conversation history and you do three things: \
    1. list the survey questions and responses for the referenced object id. \
    2. extract recurring wording or phrasing identified in previous testimonials or in the conversation. \
    3. briefly summarize the conversation between the human and the AI as context for later prompts.";

/// Summarize stage input. Replace `{history}`.
pub const SUMMARIZE_TEMPLATE: &str = "Please review the conversation history. \
    conversation_history = {history}, \
    1. Give me a summary of the original survey questions and responses. \
    2. List repeating words or phrases from the Historical Documents. \
    3. Summarize the human to ai conversation.";

/// System role for the sentiment probe.
pub const SENTIMENT_SYSTEM: &str = "You analyze sentiment and return only a numerical value.";

/// Sentiment probe input.
pub const SENTIMENT_PROMPT: &str = "Gauge the sentiment of the survey and normalize it on a scale \
    of 0 to 1.0. The email, employee count and additional feedback answers are free-form user \
    input. Every other question is rated from very difficult to very easy, dissatisfied to very \
    satisfied, or unlikely to very likely. Estimate a normalized sentiment value from the survey \
    responses and return only the number.";

/// System role for every synthesis call.
pub const SYNTHESIS_SYSTEM: &str = "You are a tool that writes a customer testimonial from survey \
    results. 1. Write in first person from the perspective of the customer. \
    2. Avoid the recurring words and phrases you are given and find alternatives. \
    3. Keep every testimonial unique.";

/// Synthesis input. Replace `{summary}`, `{min_words}`, `{max_words}`,
/// `{employee_count}`, `{previous_provider}` and `{feedback}`.
pub const SYNTHESIS_TEMPLATE: &str = "Review the context: context={summary}. \n\
    Generate a {min_words}-{max_words} word testimonial using the information provided. \
    Incorporate the number of employees the company has ({employee_count}). \
    {previous_provider}\
    If the additional feedback ({feedback}) is negative, reword it to have a positive outlook \
    for future improvements. If the additional feedback ({feedback}) is positive, incorporate \
    the customer's wording verbatim to keep the testimony authentic.";

/// Provider sentence inserted when a previous provider is known. Replace `{provider}`.
pub const PREVIOUS_PROVIDER_CLAUSE: &str =
    "The customer previously used {provider} for payroll; mention that company. ";

/// Replace each `{key}` in `template` with its value.
///
/// One pass over the template: substituted values are never rescanned, so
/// braces inside user answers come through literally. Unknown placeholders
/// are left as they are.
pub fn fill(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let value = after.find('}').and_then(|close| {
            let key = &after[..close];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (*value, close))
        });
        match value {
            Some((value, close)) => {
                out.push_str(value);
                rest = &after[close + 1..];
            }
            None => {
                out.push('{');
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}
