use ragline_corpus::Candidate;
use ragline_llm::Message;

pub(crate) const INTENT_PROMPT: &str = "\
Task: intent synthesis.

Read the conversation above and the user's newest message. Decide whether the \
newest message continues an earlier question from the conversation that has not \
been answered yet (for example a short follow-up, a clarification or a bare \
detail such as a name or a date).

If it does, set status to \"valid\" and put in question one self-contained question \
that combines the earlier question with the new detail, in the user's language.
Otherwise set status to \"none\" and omit question.";

pub(crate) const BREAKDOWN_PROMPT: &str = "\
Task: query breakdown.

Split the user's message into the smallest set of standalone questions that \
together cover everything it asks. Keep the user's language and wording. A message \
that asks only one thing yields a single question. Return them in subQueries.";

pub(crate) const KEYWORD_PROMPT_TEMPLATE: &str = "\
Task: keyword extraction.

For each numbered query below, list the search keywords a full-text index should \
match: names, codes, domain terms and short noun phrases. Skip stop words. \
Return keywords as a list of lists with exactly one inner list per query, in the \
same order as the queries.

{queries}";

pub(crate) const RELEVANCE_PROMPT: &str = "\
Task: relevance filtering.

The user message is a JSON object with a query and a list of candidate passages. \
Return in relevantContextIds the ids of the passages that help answer the query. \
Leave out passages that merely share words with it. Return an empty list when \
none help.";

/// Trailing user/assistant window of `history` plus the new query, under the assistant's system prompt.
pub(crate) fn intent_messages(system_prompt: &str, window: &[Message], query: &str) -> Vec<Message> {
    let system = if system_prompt.trim().is_empty() {
        INTENT_PROMPT.to_owned()
    } else {
        format!("{system_prompt}\n\n{INTENT_PROMPT}")
    };
    let mut messages = Vec::with_capacity(window.len() + 2);
    messages.push(Message::system(system));
    messages.extend(window.iter().cloned());
    messages.push(Message::user(query));
    messages
}

pub(crate) fn breakdown_messages(query: &str) -> Vec<Message> {
    vec![Message::system(BREAKDOWN_PROMPT), Message::user(query)]
}

pub(crate) fn keyword_messages(queries: &[String]) -> Vec<Message> {
    let listing = queries
        .iter()
        .enumerate()
        .map(|(i, q)| format!("{}. {q}", i + 1))
        .collect::<Vec<_>>()
        .join("\n");
    vec![
        Message::system(KEYWORD_PROMPT_TEMPLATE.replace("{queries}", &listing)),
        Message::user(serde_json::json!({ "queries": queries }).to_string()),
    ]
}

pub(crate) fn relevance_messages(query: &str, candidates: &[Candidate]) -> Vec<Message> {
    let passages: Vec<_> = candidates
        .iter()
        .map(|c| serde_json::json!({ "id": c.id, "text": c.text }))
        .collect();
    let payload = serde_json::json!({ "query": query, "candidates": passages });
    vec![Message::system(RELEVANCE_PROMPT), Message::user(payload.to_string())]
}
