//! Incremental parser for streamed assistant output.
//!
//! Assistant text embeds tool invocations as `<tool><param>value</param></tool>`
//! tag runs, with tag names drawn from the registered tool and parameter
//! names. The parser re-scans the full accumulated text after each streaming
//! delta: a single left-to-right pass that keeps at most one construct open
//! (a text run, a tool invocation, or a parameter inside one) and matches
//! candidate tags by exact suffix equality. Anything that matches no known
//! tag stays literal text, and a construct still open at end of input is
//! emitted with its `partial` flag set — so a truncated stream still yields
//! a usable block sequence.

use serde::{Deserialize, Serialize};

use crate::registry::{RawParams, RegistrySnapshot};

/// A tool invocation extracted from assistant output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub name: String,
    /// Raw string parameter values in source order.
    pub params: RawParams,
    #[serde(default)]
    pub partial: bool,
}

/// A parsed unit of assistant output.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text { content: String, partial: bool },
    ToolUse(ToolUse),
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentBlock::Text { content, .. } => Some(content),
            ContentBlock::ToolUse(_) => None,
        }
    }

    pub fn as_tool_use(&self) -> Option<&ToolUse> {
        match self {
            ContentBlock::ToolUse(tool_use) => Some(tool_use),
            ContentBlock::Text { .. } => None,
        }
    }
}

/// Insert or overwrite a raw parameter, preserving first-seen order.
fn set_param(params: &mut RawParams, name: &str, value: String) {
    if let Some(entry) = params.iter_mut().find(|(key, _)| key == name) {
        entry.1 = value;
    } else {
        params.push((name.to_string(), value));
    }
}

/// Parse the full accumulated assistant text against a registry snapshot.
pub fn parse_assistant_message(text: &str, snapshot: &RegistrySnapshot) -> Vec<ContentBlock> {
    parse_with_names(text, &snapshot.tool_names(), &snapshot.param_names())
}

/// Parse against explicit tool and parameter name sets.
pub fn parse_with_names(
    message: &str,
    tool_names: &[String],
    param_names: &[String],
) -> Vec<ContentBlock> {
    let tool_opening_tags: Vec<(usize, String)> = tool_names
        .iter()
        .enumerate()
        .map(|(idx, name)| (idx, format!("<{name}>")))
        .collect();
    let param_opening_tags: Vec<(usize, String)> = param_names
        .iter()
        .enumerate()
        .map(|(idx, name)| (idx, format!("<{name}>")))
        .collect();

    let mut blocks: Vec<ContentBlock> = Vec::new();
    let mut acc = String::with_capacity(message.len());

    // At most one of these is live at a time, except that an open parameter
    // implies an open tool use.
    let mut text_start: Option<usize> = None;
    let mut open_tool: Option<ToolUse> = None;
    let mut tool_body_start = 0usize;
    let mut open_param: Option<(&str, usize)> = None;

    for ch in message.chars() {
        acc.push(ch);

        if let Some(tool) = open_tool.as_mut() {
            if let Some((param_name, value_start)) = open_param {
                // Accumulating a parameter value until its closing tag.
                let closing_tag = format!("</{param_name}>");
                if acc[value_start..].ends_with(&closing_tag) {
                    let value = acc[value_start..acc.len() - closing_tag.len()]
                        .trim()
                        .to_string();
                    set_param(&mut tool.params, param_name, value);
                    open_param = None;
                }
                continue;
            }

            // Inside a tool use, outside any parameter: the tool's own
            // closing tag wins over a new parameter opening.
            let closing_tag = format!("</{}>", tool.name);
            if acc[tool_body_start..].ends_with(&closing_tag) {
                tool.partial = false;
                if let Some(finished) = open_tool.take() {
                    blocks.push(ContentBlock::ToolUse(finished));
                }
                continue;
            }
            for (idx, opening_tag) in &param_opening_tags {
                if acc.ends_with(opening_tag) {
                    open_param = Some((param_names[*idx].as_str(), acc.len()));
                    break;
                }
            }
            continue;
        }

        // No open construct: a known tool opening tag starts a tool use and
        // finalizes the running text (minus the tag fragment that was
        // speculatively accumulated into it).
        let mut started_tool = false;
        for (idx, opening_tag) in &tool_opening_tags {
            if acc.ends_with(opening_tag) {
                if let Some(start) = text_start.take() {
                    let content = acc[start..acc.len() - opening_tag.len()].trim();
                    if !content.is_empty() {
                        blocks.push(ContentBlock::Text {
                            content: content.to_string(),
                            partial: false,
                        });
                    }
                }
                open_tool = Some(ToolUse {
                    name: tool_names[*idx].clone(),
                    params: RawParams::new(),
                    partial: true,
                });
                tool_body_start = acc.len();
                started_tool = true;
                break;
            }
        }

        if !started_tool && text_start.is_none() {
            text_start = Some(acc.len() - ch.len_utf8());
        }
    }

    // Whatever is still open at end of input is a partial tail. An open
    // parameter implies an open tool use, so at most one block is partial.
    if let Some(mut tool) = open_tool {
        if let Some((param_name, value_start)) = open_param {
            let value = acc[value_start..].trim().to_string();
            set_param(&mut tool.params, param_name, value);
        }
        blocks.push(ContentBlock::ToolUse(tool));
    } else if let Some(start) = text_start {
        let content = acc[start..].trim();
        if !content.is_empty() {
            blocks.push(ContentBlock::Text {
                content: content.to_string(),
                partial: true,
            });
        }
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn parse(message: &str) -> Vec<ContentBlock> {
        parse_with_names(message, &names(&["foo"]), &names(&["bar"]))
    }

    fn text(content: &str, partial: bool) -> ContentBlock {
        ContentBlock::Text {
            content: content.to_string(),
            partial,
        }
    }

    #[test]
    fn plain_text_is_a_single_partial_block() {
        let blocks = parse("just some prose");
        assert_eq!(blocks, vec![text("just some prose", true)]);
    }

    #[test]
    fn empty_input_yields_no_blocks() {
        assert!(parse("").is_empty());
    }

    #[test]
    fn round_trips_text_tool_text() {
        let blocks = parse("hello <foo><bar>x</bar></foo>world");
        assert_eq!(
            blocks,
            vec![
                text("hello", false),
                ContentBlock::ToolUse(ToolUse {
                    name: "foo".to_string(),
                    params: vec![("bar".to_string(), "x".to_string())],
                    partial: false,
                }),
                text("world", true),
            ]
        );
    }

    #[test]
    fn truncated_tool_use_is_partial_with_accumulated_param() {
        let blocks = parse("hi <foo><bar>x");
        assert_eq!(
            blocks,
            vec![
                text("hi", false),
                ContentBlock::ToolUse(ToolUse {
                    name: "foo".to_string(),
                    params: vec![("bar".to_string(), "x".to_string())],
                    partial: true,
                }),
            ]
        );
    }

    #[test]
    fn truncated_mid_opening_tag_stays_text() {
        let blocks = parse("hi <fo");
        assert_eq!(blocks, vec![text("hi <fo", true)]);
    }

    #[test]
    fn unknown_tags_are_literal_text() {
        let blocks = parse_with_names(
            "see <other>stuff</other> here",
            &names(&["foo"]),
            &names(&["bar"]),
        );
        assert_eq!(blocks, vec![text("see <other>stuff</other> here", true)]);
    }

    #[test]
    fn tool_without_params_closes_cleanly() {
        let blocks = parse("<foo></foo>");
        assert_eq!(
            blocks,
            vec![ContentBlock::ToolUse(ToolUse {
                name: "foo".to_string(),
                params: RawParams::new(),
                partial: false,
            })]
        );
    }

    #[test]
    fn param_values_are_trimmed() {
        let blocks = parse("<foo><bar>\n  spaced value \n</bar></foo>");
        let tool_use = blocks[0].as_tool_use().unwrap();
        assert_eq!(tool_use.params, vec![("bar".to_string(), "spaced value".to_string())]);
    }

    #[test]
    fn unclosed_tool_without_params_is_partial() {
        let blocks = parse("working on it <foo>");
        assert_eq!(
            blocks,
            vec![
                text("working on it", false),
                ContentBlock::ToolUse(ToolUse {
                    name: "foo".to_string(),
                    params: RawParams::new(),
                    partial: true,
                }),
            ]
        );
    }

    #[test]
    fn text_between_two_tool_uses_is_kept() {
        let blocks = parse("<foo></foo> and then <foo></foo>");
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[1], text("and then", false));
    }

    #[test]
    fn param_content_may_contain_unknown_tags() {
        let blocks = parse("<foo><bar><em>hi</em></bar></foo>");
        let tool_use = blocks[0].as_tool_use().unwrap();
        assert_eq!(
            tool_use.params,
            vec![("bar".to_string(), "<em>hi</em>".to_string())]
        );
    }

    #[test]
    fn repeated_param_overwrites_value_in_place() {
        let blocks = parse("<foo><bar>a</bar><bar>b</bar></foo>");
        let tool_use = blocks[0].as_tool_use().unwrap();
        assert_eq!(tool_use.params, vec![("bar".to_string(), "b".to_string())]);
    }

    #[test]
    fn totality_concatenation_preserves_non_tag_text() {
        // Arbitrary junk, multibyte chars, and half-open tags all terminate
        // and come back out either as text or as tool params.
        for input in [
            "",
            "<",
            "<<foo",
            "a <foo><bar>x</bar>",
            "héllo wörld <foo>",
            "<foo><bar></foo>",
            "text </foo> more",
        ] {
            let blocks = parse(input);
            let partials = blocks
                .iter()
                .filter(|block| match block {
                    ContentBlock::Text { partial, .. } => *partial,
                    ContentBlock::ToolUse(tool_use) => tool_use.partial,
                })
                .count();
            assert!(partials <= 1, "more than one partial block for {input:?}");
            if partials == 1 {
                let last_is_partial = match blocks.last().unwrap() {
                    ContentBlock::Text { partial, .. } => *partial,
                    ContentBlock::ToolUse(tool_use) => tool_use.partial,
                };
                assert!(last_is_partial, "partial block not last for {input:?}");
            }
        }
    }

    #[test]
    fn param_names_match_across_all_registered_tools() {
        // `size` belongs to another tool, but inside <foo> it still opens.
        let blocks = parse_with_names(
            "<foo><size>10</size></foo>",
            &names(&["foo", "resize"]),
            &names(&["bar", "size"]),
        );
        let tool_use = blocks[0].as_tool_use().unwrap();
        assert_eq!(tool_use.params, vec![("size".to_string(), "10".to_string())]);
    }
}
