//! Code blocks embedded in markdown notes.
//!
//! A note can carry one or more fenced blocks tagged `code-script`. The
//! block is picked by a `?codeScriptName=<name>` query on the note path, or
//! by the `codeScriptToolkit.defaultCodeScriptName` frontmatter key, or
//! falls back to the first block in the note.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{TransformError, TransformResult};
use crate::query::split_query;

/// Fence info string marking a runnable block.
pub const CODE_SCRIPT_BLOCK_LANGUAGE: &str = "code-script";

/// Frontmatter key holding [`NoteSettings`].
pub const NOTE_SETTINGS_KEY: &str = "codeScriptToolkit";

static CODE_SCRIPT_NAME_QUERY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\?codeScriptName=(?<CodeScriptName>\S+)$").expect("valid regex")
});

/// Per-note settings read from frontmatter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NoteSettings {
    pub default_code_script_name: String,
    pub invocable_code_script_name: String,
    pub is_invocable: bool,
}

/// A code block picked out of a note.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeScript {
    pub code: String,
    /// `None` when the first block was used without a name.
    pub name: Option<String>,
}

/// A fenced code block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlock {
    /// First word of the info string.
    pub lang: Option<String>,
    /// Content without the trailing newline.
    pub value: String,
}

#[derive(Deserialize)]
struct Frontmatter {
    #[serde(rename = "codeScriptToolkit")]
    settings: Option<NoteSettings>,
}

/// Return the YAML between the leading `---` delimiters, if any.
fn frontmatter_block(content: &str) -> Option<(&str, usize)> {
    let rest = content
        .strip_prefix("---\n")
        .or_else(|| content.strip_prefix("---\r\n"))?;
    let header_len = content.len() - rest.len();

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            return Some((yaml, header_len + offset + line.len()));
        }
        offset += line.len();
    }
    None
}

/// Read [`NoteSettings`] from a note's frontmatter.
///
/// Missing or malformed frontmatter yields the defaults.
pub fn note_settings_from_content(content: &str) -> NoteSettings {
    let Some((yaml, _)) = frontmatter_block(content) else {
        return NoteSettings::default();
    };

    match serde_yaml::from_str::<Frontmatter>(yaml) {
        Ok(frontmatter) => frontmatter.settings.unwrap_or_default(),
        Err(e) => {
            tracing::debug!(error = %e, "ignoring malformed frontmatter");
            NoteSettings::default()
        }
    }
}

struct OpenFence {
    marker: char,
    len: usize,
    indent: usize,
    lang: Option<String>,
    lines: Vec<String>,
}

fn leading_spaces(line: &str) -> usize {
    line.chars().take_while(|&c| c == ' ').count()
}

/// Parse a fence line, returning (marker, length, indent, info string).
fn fence_start(line: &str) -> Option<(char, usize, usize, &str)> {
    let indent = leading_spaces(line);
    if indent > 3 {
        return None;
    }
    let rest = &line[indent..];
    let marker = rest.chars().next().filter(|c| *c == '`' || *c == '~')?;
    let len = rest.chars().take_while(|&c| c == marker).count();
    if len < 3 {
        return None;
    }
    let info = rest[len..].trim();
    if marker == '`' && info.contains('`') {
        return None;
    }
    Some((marker, len, indent, info))
}

fn is_fence_end(line: &str, fence: &OpenFence) -> bool {
    let indent = leading_spaces(line);
    if indent > 3 {
        return false;
    }
    let rest = &line[indent..];
    let len = rest.chars().take_while(|&c| c == fence.marker).count();
    len >= fence.len && rest[len..].trim().is_empty()
}

fn close(fence: OpenFence) -> CodeBlock {
    CodeBlock {
        lang: fence.lang,
        value: fence.lines.join("\n"),
    }
}

/// Collect every fenced code block in document order.
pub fn code_blocks(markdown: &str) -> Vec<CodeBlock> {
    let body = match frontmatter_block(markdown) {
        Some((_, end)) => &markdown[end..],
        None => markdown,
    };

    let mut blocks = Vec::new();
    let mut open: Option<OpenFence> = None;

    for raw in body.lines() {
        let line = raw.trim_end_matches('\r');
        match open.take() {
            Some(fence) if is_fence_end(line, &fence) => blocks.push(close(fence)),
            Some(mut fence) => {
                let strip = leading_spaces(line).min(fence.indent);
                fence.lines.push(line[strip..].to_string());
                open = Some(fence);
            }
            None => {
                if let Some((marker, len, indent, info)) = fence_start(line) {
                    open = Some(OpenFence {
                        marker,
                        len,
                        indent,
                        lang: info.split_whitespace().next().map(str::to_string),
                        lines: Vec::new(),
                    });
                }
            }
        }
    }

    // An unclosed fence runs to the end of the document.
    if let Some(fence) = open {
        blocks.push(close(fence));
    }

    blocks
}

fn code_script_name(markdown: &str, path: &str) -> TransformResult<Option<String>> {
    let (_, query) = split_query(path);

    if query.is_empty() {
        let name = note_settings_from_content(markdown).default_code_script_name;
        return Ok(if name.is_empty() { None } else { Some(name) });
    }

    CODE_SCRIPT_NAME_QUERY
        .captures(query)
        .and_then(|captures| captures.name("CodeScriptName"))
        .map(|name| Some(name.as_str().to_string()))
        .ok_or_else(|| TransformError::InvalidQuery(query.to_string()))
}

/// Pick the code block `path` refers to out of `markdown`.
pub fn extract_code_script(markdown: &str, path: &str) -> TransformResult<CodeScript> {
    let blocks: Vec<CodeBlock> = code_blocks(markdown)
        .into_iter()
        .filter(|block| block.lang.as_deref() == Some(CODE_SCRIPT_BLOCK_LANGUAGE))
        .collect();

    let Some(first) = blocks.first() else {
        return Err(TransformError::Markdown(format!(
            "No {CODE_SCRIPT_BLOCK_LANGUAGE} code block found in {path}"
        )));
    };

    let Some(name) = code_script_name(markdown, path)? else {
        return Ok(CodeScript {
            code: first.value.clone(),
            name: None,
        });
    };

    let marker = format!("// codeScriptName: {name}\n");
    blocks
        .iter()
        .find(|block| block.value.starts_with(&marker))
        .map(|block| CodeScript {
            code: block.value.clone(),
            name: Some(name.clone()),
        })
        .ok_or_else(|| {
            TransformError::Markdown(format!("Code script with name {name} not found in {path}"))
        })
}

/// Synthetic module path a markdown code block is evaluated under.
pub fn code_script_module_path(path: &str, name: Option<&str>) -> String {
    format!("{path}.code-script.{}.ts", name.unwrap_or("(default)"))
}
