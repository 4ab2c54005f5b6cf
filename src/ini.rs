use crate::{
    error::BridgeError,
    models::{IniDocument, IniParseMode, IniVariable, KeyBindEntry, KeyBindSection, LineUpdate},
};

/// Documents longer than this are served raw; the editor only works on structured ones.
pub const MAX_STRUCTURED_LINES: usize = 20_000;

const CONDITIONAL_KEYWORDS: [&str; 5] = ["if", "elif", "else", "endif", "else if"];

pub fn split_lines(text: &str) -> Vec<String> {
    text.lines().map(|line| line.to_string()).collect()
}

pub fn parse_ini(file_name: &str, text: &str) -> IniDocument {
    parse_ini_lines(file_name, split_lines(text))
}

pub fn parse_ini_lines(file_name: &str, raw_lines: Vec<String>) -> IniDocument {
    match index_lines(&raw_lines) {
        Some((variables, key_bindings)) => IniDocument {
            file_name: file_name.to_string(),
            mode: IniParseMode::Structured,
            raw_lines,
            variables,
            key_bindings,
        },
        None => IniDocument {
            file_name: file_name.to_string(),
            mode: IniParseMode::RawFallback,
            raw_lines,
            variables: Vec::new(),
            key_bindings: Vec::new(),
        },
    }
}

fn index_lines(lines: &[String]) -> Option<(Vec<IniVariable>, Vec<KeyBindSection>)> {
    if lines.len() > MAX_STRUCTURED_LINES {
        return None;
    }

    let mut variables = Vec::new();
    let mut key_bindings: Vec<KeyBindSection> = Vec::new();
    let mut section: Option<String> = None;
    let mut in_key_section = false;

    for (line_idx, line) in lines.iter().enumerate() {
        // A UTF-8 BOM stays in raw_lines so writes keep it.
        let line = match line_idx {
            0 => line.strip_prefix('\u{feff}').unwrap_or(line),
            _ => line.as_str(),
        };
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with(';') || trimmed.starts_with('#') {
            continue;
        }

        if trimmed.starts_with('[') {
            if !trimmed.ends_with(']') {
                return None;
            }
            let name = trimmed[1..trimmed.len() - 1].trim().to_string();
            in_key_section = is_key_section(&name);
            if in_key_section {
                key_bindings.push(KeyBindSection {
                    section_name: name.clone(),
                    section_line: line_idx,
                    entries: Vec::new(),
                });
            }
            section = Some(name);
            continue;
        }

        let Some(eq) = assignment_index(line) else {
            continue;
        };
        let key = line[..eq].trim().to_string();
        let value = line[eq + 1..].trim().to_string();
        if key.is_empty() {
            continue;
        }

        if in_key_section {
            if let Some(current) = key_bindings.last_mut() {
                current.entries.push(KeyBindEntry {
                    key,
                    value,
                    line_idx,
                });
            }
            continue;
        }

        if let Some(name) = variable_name(&key) {
            variables.push(IniVariable {
                name,
                value,
                line_idx,
                section: section.clone(),
            });
        }
    }

    if section.is_none() {
        return None;
    }
    Some((variables, key_bindings))
}

pub fn is_key_section(name: &str) -> bool {
    name.get(..3)
        .map(|head| head.eq_ignore_ascii_case("key"))
        .unwrap_or(false)
}

/// Byte index of the `=` that separates an assignment's key from its value.
/// Comparison operators and conditional lines are not assignments.
pub fn assignment_index(line: &str) -> Option<usize> {
    let trimmed = line.trim_start();
    if trimmed.starts_with(';') || trimmed.starts_with('[') {
        return None;
    }
    let lowered = trimmed.to_ascii_lowercase();
    if CONDITIONAL_KEYWORDS.iter().any(|keyword| {
        lowered == *keyword
            || lowered
                .strip_prefix(keyword)
                .map(|rest| rest.starts_with(char::is_whitespace))
                .unwrap_or(false)
    }) {
        return None;
    }

    let bytes = line.as_bytes();
    for (idx, byte) in bytes.iter().enumerate() {
        if *byte != b'=' {
            continue;
        }
        let prev = idx.checked_sub(1).map(|p| bytes[p]);
        let next = bytes.get(idx + 1).copied();
        if matches!(prev, Some(b'=' | b'!' | b'<' | b'>')) || next == Some(b'=') {
            continue;
        }
        return Some(idx);
    }
    None
}

fn variable_name(key: &str) -> Option<String> {
    key.split_whitespace()
        .last()
        .filter(|token| token.starts_with('$') && token.len() > 1)
        .map(|token| token.to_string())
}

/// Replaces whole lines of a file's bytes. Every index is checked before any
/// line changes. Only the targeted lines are re-encoded; other bytes, legacy
/// encoded comments included, are copied through with their line endings.
pub fn patch_line_bytes(bytes: &[u8], updates: &[LineUpdate]) -> Result<Vec<u8>, BridgeError> {
    let mut lines: Vec<(&[u8], &[u8])> = Vec::new();
    let mut rest = bytes;
    while !rest.is_empty() {
        let (line, tail) = match rest.iter().position(|&b| b == b'\n') {
            Some(pos) => (&rest[..=pos], &rest[pos + 1..]),
            None => (rest, &rest[rest.len()..]),
        };
        let body_len = if line.ends_with(b"\r\n") {
            line.len() - 2
        } else if line.ends_with(b"\n") {
            line.len() - 1
        } else {
            line.len()
        };
        lines.push((&line[..body_len], &line[body_len..]));
        rest = tail;
    }
    check_updates(lines.len(), updates)?;

    let mut out = Vec::with_capacity(bytes.len());
    for (line_idx, (body, ending)) in lines.into_iter().enumerate() {
        match updates.iter().rev().find(|update| update.line_idx == line_idx) {
            Some(update) => out.extend_from_slice(update.content.as_bytes()),
            None => out.extend_from_slice(body),
        }
        out.extend_from_slice(ending);
    }
    Ok(out)
}

fn check_updates(line_count: usize, updates: &[LineUpdate]) -> Result<(), BridgeError> {
    if let Some(update) = updates.iter().find(|update| update.line_idx >= line_count) {
        return Err(BridgeError::rejected(format!(
            "line {} is out of range ({} lines)",
            update.line_idx, line_count
        )));
    }
    if let Some(update) = updates
        .iter()
        .find(|update| update.content.contains('\n') || update.content.contains('\r'))
    {
        return Err(BridgeError::rejected(format!(
            "line {} update spans multiple lines",
            update.line_idx
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
; Merged mod
[Constants]
global persist $swapvar = 0
global $active = 1

[KeySwap]
condition = $active == 1
key = VK_F6
type = cycle
$swapvar = 0,1,2

[TextureOverrideBody]
hash = 1a2b3c4d
if $swapvar == 0
    ib = ResourceBodyIB
endif
";

    #[test]
    fn indexes_key_sections_and_variables() {
        let doc = parse_ini("merged.ini", SAMPLE);
        assert_eq!(doc.mode, IniParseMode::Structured);
        assert_eq!(doc.key_bindings.len(), 1);

        let section = &doc.key_bindings[0];
        assert_eq!(section.section_name, "KeySwap");
        assert_eq!(section.section_line, 5);
        let keys: Vec<&str> = section.entries.iter().map(|e| e.key.as_str()).collect();
        assert_eq!(keys, vec!["condition", "key", "type", "$swapvar"]);
        assert_eq!(section.entries[0].value, "$active == 1");
        assert_eq!(section.entries[1].value, "VK_F6");
        assert_eq!(section.entries[1].line_idx, 7);

        let names: Vec<&str> = doc.variables.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["$swapvar", "$active"]);
        assert_eq!(doc.variables[0].section.as_deref(), Some("Constants"));
    }

    #[test]
    fn comparisons_are_not_assignments() {
        assert_eq!(assignment_index("if $swapvar == 0"), None);
        assert_eq!(assignment_index("x != 1"), None);
        assert_eq!(assignment_index("endif"), None);
        assert_eq!(assignment_index("key = VK_F6"), Some(4));
        assert_eq!(assignment_index("condition = $a == 1"), Some(10));
    }

    #[test]
    fn leading_bom_does_not_hide_the_first_section() {
        let doc = parse_ini("a.ini", "\u{feff}[KeySwap]\nkey = VK_F1\n");
        assert_eq!(doc.mode, IniParseMode::Structured);
        assert_eq!(doc.key_bindings.len(), 1);
        assert_eq!(doc.key_bindings[0].section_name, "KeySwap");
        assert_eq!(doc.key_bindings[0].entries[0].value, "VK_F1");
        assert!(doc.raw_lines[0].starts_with('\u{feff}'));
    }

    #[test]
    fn missing_sections_fall_back_to_raw() {
        let doc = parse_ini("notes.ini", "key = VK_F1\nback = VK_F2\n");
        assert_eq!(doc.mode, IniParseMode::RawFallback);
        assert!(doc.key_bindings.is_empty());
        assert_eq!(doc.raw_lines.len(), 2);
    }

    #[test]
    fn unterminated_header_falls_back_to_raw() {
        let doc = parse_ini("broken.ini", "[KeySwap\nkey = VK_F1\n");
        assert_eq!(doc.mode, IniParseMode::RawFallback);
    }

    #[test]
    fn oversized_documents_fall_back_to_raw() {
        let mut text = String::from("[KeyA]\n");
        for _ in 0..MAX_STRUCTURED_LINES {
            text.push_str("key = VK_F1\n");
        }
        assert_eq!(parse_ini("big.ini", &text).mode, IniParseMode::RawFallback);
    }

    #[test]
    fn byte_patch_keeps_mixed_endings_and_missing_final_newline() {
        let text = b"[KeyA]\r\nkey = VK_F1\nback = VK_F2";
        let out = patch_line_bytes(
            text,
            &[LineUpdate {
                line_idx: 2,
                content: "back = VK_F9".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(out, b"[KeyA]\r\nkey = VK_F1\nback = VK_F9".to_vec());
    }

    #[test]
    fn byte_patch_leaves_non_utf8_lines_untouched() {
        // "; " followed by Shift-JIS bytes.
        let mut text = vec![b';', b' ', 0x93, 0xfa, 0x96, 0x7b, 0x8c, 0xea, b'\n'];
        text.extend_from_slice(b"[KeySwap]\nkey = VK_F1\n");
        let out = patch_line_bytes(
            &text,
            &[LineUpdate {
                line_idx: 2,
                content: "key = VK_F5".to_string(),
            }],
        )
        .unwrap();
        assert_eq!(&out[..9], &text[..9]);
        assert!(out.ends_with(b"[KeySwap]\nkey = VK_F5\n"));
    }

    #[test]
    fn byte_patch_rejects_bad_updates_before_writing() {
        let text = b"[KeyA]\nkey = VK_F1\n";
        let out_of_range = patch_line_bytes(
            text,
            &[
                LineUpdate {
                    line_idx: 1,
                    content: "key = VK_F2".to_string(),
                },
                LineUpdate {
                    line_idx: 2,
                    content: "key = VK_F3".to_string(),
                },
            ],
        );
        assert!(out_of_range.is_err());

        let multiline = patch_line_bytes(
            text,
            &[LineUpdate {
                line_idx: 1,
                content: "key = VK_F2\nx = 1".to_string(),
            }],
        );
        assert!(multiline.is_err());
    }
}
