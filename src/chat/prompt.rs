//! System prompt rendering. Retrieved documents and model output are
//! untrusted text so the registry is strict and adds no helpers.

use anyhow::{Error, Result};
use handlebars::Handlebars;
use serde_json::json;

use crate::retrieval::Document;

const SYSTEM_PROMPT_TEMPLATE: &str = "system_prompt";

const SYSTEM_PROMPT: &str = r"{{system_message}}
{{#if sources}}

Answer ONLY with facts from the list of sources below. If there isn't enough information, say you don't know. Each source has a name followed by a colon and the content. Cite the name of every source you use in square brackets, for example [info1.txt]. Don't combine sources, list each one separately, for example [info1.txt][info2.pdf].

SOURCES:
{{#each sources}}
[{{source}}]: {{content}}
{{/each}}
{{/if}}
";

fn templates<'a>() -> Result<Handlebars<'a>, Error> {
    let mut registry = Handlebars::new();
    registry.set_strict_mode(true);
    // Output is a prompt, not HTML
    registry.register_escape_fn(handlebars::no_escape);
    registry.register_template_string(SYSTEM_PROMPT_TEMPLATE, SYSTEM_PROMPT)?;
    Ok(registry)
}

pub fn system_prompt(system_message: &str, sources: &[Document]) -> Result<String, Error> {
    let data = json!({
        "system_message": system_message,
        "sources": sources,
    });
    let rendered = templates()?.render(SYSTEM_PROMPT_TEMPLATE, &data)?;
    Ok(rendered.trim_end().to_string())
}
