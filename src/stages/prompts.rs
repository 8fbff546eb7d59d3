//! Prompt assembly for every pipeline stage.
//!
//! Prompts are deliberately rigid about output shape (single diagram,
//! landscape, d2 not mermaid, no legends) so the critique/improve loop
//! converges instead of thrashing on unreachable suggestions.

pub const GENERATION_SYSTEM_PROMPT: &str =
    "You are a d2 diagram generator that can create beautiful and expressive d2 diagrams.";

/// Initial generation prompt: data, its description, and the diagram
/// subject, plus the fixed style rules.
#[must_use]
pub fn generation(data: &str, data_description: &str, subject: &str) -> String {
    format!(
        "DATA:\n```\n{data}\n```\n\nINSTRUCTION: Data is {data_description}. Generate a \
landscape (left to right preferred) d2 diagram code (in d2 markdown blocks) for the DATA \
provided, covering {subject}. 1. Feel free to be creative\n\
2. Provide a single diagram only, with good visual design. 3. Make sure the code is for d2 \
and not mermaid.\n\
4. Keep it simple when possible. Too many disparate unconnected blocks aren't good.\n\
5. Don't make legends and remove any that exist."
    )
}

/// Fix prompt: the renderer errors, and for the live turn the current
/// source with line tags. History replays pass `None` for the source so
/// the model sees which errors already came up without stale code.
#[must_use]
pub fn fix(errors: &str, tagged_source: Option<&str>) -> String {
    let diagram = match tagged_source {
        Some(source) => format!("DIAGRAM (with line numbers):\n```d2\n{source}\n```\n\n"),
        None => String::new(),
    };
    format!(
        "{diagram}Errors in diagram code:\n```\n{errors}\n```\n\nExplain why the errors are \
happening. Then fix the errors in the d2 diagram code provided, and return the fixed code. \
Keep an eye out for recurring errors and try new fixes."
    )
}

/// Assistant-turn text used when replaying a prior fix or improvement.
#[must_use]
pub fn fenced_reply(source: &str) -> String {
    format!("Fixed diagram:\n```d2\n{source}\n```")
}

#[must_use]
pub fn improved_reply(source: &str) -> String {
    format!("Improved diagram:\n```d2\n{source}\n```")
}

/// Critique prompt for the vision model. The data block is optional and
/// controlled by the run config.
#[must_use]
pub fn critique(subject: &str, data: Option<&str>) -> String {
    let (data_block, for_data) = match data {
        Some(data) => (format!("DATA: \n```{data}```\n"), " for the DATA"),
        None => (String::new(), ""),
    };
    format!(
        "{data_block}Critique the provided {subject}{for_data}, including style, positioning, \
etc. Provide just the actionable critiques (relevant to the diagram) and ways to improve and \
simplify, while covering what is useful to keep. Stay within what d2 can do. Stay away from \
vague criticisms, provide actionable changes, even suggest direct changes to the diagram. \
Too many disparate unconnected blocks aren't good. Don't ask to add a legend."
    )
}

/// Improve prompt: critique plus (for the live turn) diagram and data.
/// History replays carry the historical diagram but never the data.
#[must_use]
pub fn improve(
    subject: &str,
    critique: &str,
    diagram: Option<&str>,
    data: Option<&str>,
) -> String {
    let data_block = match data {
        Some(data) => format!("DATA: \n```{data}```\n"),
        None => String::new(),
    };
    let diagram_block = match diagram {
        Some(source) => format!("DIAGRAM: \n\n```d2\n{source}\n```\n"),
        None => String::new(),
    };
    let lead = if diagram.is_some() {
        format!("Provided is a d2 {subject} diagram")
    } else {
        "Here are more suggestions.".to_string()
    };
    let from_data = if data.is_some() {
        " generated from DATA"
    } else {
        ""
    };
    format!(
        "{data_block}{diagram_block}Areas to improve:\n```\n{critique}\n```\n{lead}{from_data}. \
Apply the critiques when possible to improve the diagram but don't make it too complex. \
Explain very shortly how you will improve, then generate and return the improved d2 diagram \
code."
    )
}

/// Prefix each line with an `L<n>:` tag so renderer errors that cite line
/// numbers can be matched against the source.
#[must_use]
pub fn line_tag(source: &str) -> String {
    source
        .lines()
        .enumerate()
        .map(|(i, line)| format!("L{}: {line}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Remove `L<n>:` tags, the inverse of [`line_tag`] for tagged input.
#[must_use]
pub fn strip_line_tags(tagged: &str) -> String {
    tagged
        .lines()
        .map(|line| {
            let rest = line.strip_prefix('L').unwrap_or(line);
            match rest.split_once(':') {
                Some((n, body)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => {
                    body.strip_prefix(' ').unwrap_or(body)
                }
                _ => line,
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}
