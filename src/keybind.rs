use crate::{
    error::{FieldError, SaveError},
    ini,
    models::{IniDocument, IniParseMode, LineUpdate},
};
use std::collections::BTreeMap;

/// One editable assignment inside a `[Key...]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindEditableField {
    pub id: String,
    pub file_name: String,
    pub section_name: String,
    pub label: String,
    pub line_idx: usize,
    /// Raw text up to and including the `=`, indentation preserved.
    pub prefix: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBindGroup {
    pub id: String,
    pub file_name: String,
    pub section_name: String,
    pub fields: Vec<KeyBindEditableField>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePatch {
    pub file_name: String,
    pub updates: Vec<LineUpdate>,
}

pub type FieldValueMap = BTreeMap<String, String>;

pub fn field_id(file_name: &str, section_name: &str, label: &str, line_idx: usize) -> String {
    format!(
        "{}::{}::{}::{}",
        escape_component(file_name),
        escape_component(section_name),
        escape_component(label),
        line_idx
    )
}

pub fn group_id(file_name: &str, section_name: &str) -> String {
    format!(
        "{}::{}",
        escape_component(file_name),
        escape_component(section_name)
    )
}

fn escape_component(value: &str) -> String {
    value.replace('%', "%25").replace(':', "%3A")
}

/// Builds keybind groups from structured documents. Raw fallback documents
/// contribute nothing, and entries whose line no longer holds an assignment
/// are skipped.
pub fn build_key_bind_sections(documents: &[IniDocument]) -> Vec<KeyBindGroup> {
    let mut groups = Vec::new();
    for document in documents {
        if document.mode != IniParseMode::Structured {
            continue;
        }
        for section in &document.key_bindings {
            let fields: Vec<KeyBindEditableField> = section
                .entries
                .iter()
                .filter_map(|entry| {
                    let line = document.raw_lines.get(entry.line_idx)?;
                    let eq = ini::assignment_index(line)?;
                    Some(KeyBindEditableField {
                        id: field_id(
                            &document.file_name,
                            &section.section_name,
                            &entry.key,
                            entry.line_idx,
                        ),
                        file_name: document.file_name.clone(),
                        section_name: section.section_name.clone(),
                        label: entry.key.clone(),
                        line_idx: entry.line_idx,
                        prefix: line[..=eq].trim_end().to_string(),
                        value: entry.value.clone(),
                    })
                })
                .collect();
            if fields.is_empty() {
                continue;
            }
            groups.push(KeyBindGroup {
                id: group_id(&document.file_name, &section.section_name),
                file_name: document.file_name.clone(),
                section_name: section.section_name.clone(),
                fields,
            });
        }
    }
    groups
}

pub fn flatten_fields(groups: &[KeyBindGroup]) -> Vec<KeyBindEditableField> {
    groups
        .iter()
        .flat_map(|group| group.fields.iter().cloned())
        .collect()
}

pub fn to_field_value_map(fields: &[KeyBindEditableField]) -> FieldValueMap {
    fields
        .iter()
        .map(|field| (field.id.clone(), field.value.clone()))
        .collect()
}

pub fn validate_ini_draft_value(value: &str) -> Result<(), FieldError> {
    if value.contains('\n') || value.contains('\r') {
        return Err(FieldError::Multiline);
    }
    if value.trim().is_empty() {
        return Err(FieldError::Empty);
    }
    Ok(())
}

pub fn render_line(field: &KeyBindEditableField, value: &str) -> String {
    format!("{} {}", field.prefix, value.trim())
}

/// Validates every changed field and groups their line updates per file.
/// Files come out in name order; updates within a file in line order.
pub fn build_file_patches(
    fields: &[KeyBindEditableField],
    draft: &FieldValueMap,
    initial: &FieldValueMap,
) -> Result<Vec<FilePatch>, SaveError> {
    let mut by_file: BTreeMap<String, Vec<LineUpdate>> = BTreeMap::new();
    for field in fields {
        let Some(value) = draft.get(&field.id) else {
            continue;
        };
        // Fields that arrived mid-edit may lack an initial entry; their
        // derived value is the baseline.
        let baseline = initial.get(&field.id).unwrap_or(&field.value);
        if value == baseline {
            continue;
        }
        validate_ini_draft_value(value).map_err(|error| SaveError::Validation {
            field_id: field.id.clone(),
            label: format!("{} / {}", field.section_name, field.label),
            error,
        })?;
        by_file
            .entry(field.file_name.clone())
            .or_default()
            .push(LineUpdate {
                line_idx: field.line_idx,
                content: render_line(field, value),
            });
    }

    Ok(by_file
        .into_iter()
        .map(|(file_name, mut updates)| {
            updates.sort_by_key(|update| update.line_idx);
            FilePatch { file_name, updates }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ini::{parse_ini, patch_line_bytes};
    use std::collections::HashSet;

    const SWAP: &str = "\
[Constants]
global persist $swapvar = 0

[KeySwap]
  key = VK_F6
back = VK_F5
$swapvar = 0,1
";

    const TOGGLE: &str = "\
[KeyToggle]
key = ctrl 1
";

    fn docs() -> Vec<IniDocument> {
        vec![parse_ini("swap.ini", SWAP), parse_ini("toggle.ini", TOGGLE)]
    }

    #[test]
    fn builds_groups_per_file_and_section() {
        let groups = build_key_bind_sections(&docs());
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].id, "swap.ini::KeySwap");
        let labels: Vec<&str> = groups[0].fields.iter().map(|f| f.label.as_str()).collect();
        assert_eq!(labels, vec!["key", "back", "$swapvar"]);

        let key = &groups[0].fields[0];
        assert_eq!(key.prefix, "  key =");
        assert_eq!(key.value, "VK_F6");
        assert_eq!(key.line_idx, 4);
        assert_eq!(key.id, "swap.ini::KeySwap::key::4");
    }

    #[test]
    fn raw_fallback_documents_yield_no_groups() {
        let raw = parse_ini("loose.ini", "key = VK_F1\n");
        assert_eq!(raw.mode, IniParseMode::RawFallback);
        assert!(build_key_bind_sections(&[raw]).is_empty());
    }

    #[test]
    fn field_ids_are_unique_across_components() {
        let fields = flatten_fields(&build_key_bind_sections(&docs()));
        let ids: HashSet<&str> = fields.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids.len(), fields.len());

        // Separators inside components cannot make two tuples collide.
        assert_ne!(field_id("a::b", "c", "key", 1), field_id("a", "b::c", "key", 1));
        assert_ne!(field_id("a", "KeyA", "key", 1), field_id("a", "KeyA", "key", 2));
    }

    #[test]
    fn value_map_of_no_fields_is_empty() {
        assert!(to_field_value_map(&[]).is_empty());
    }

    #[test]
    fn validation_rejects_blank_and_multiline() {
        for bad in ["", "   ", "\t", "VK_F1\nVK_F2", "VK_F1\r", "\r\n"] {
            assert!(validate_ini_draft_value(bad).is_err(), "{bad:?} should fail");
        }
        assert_eq!(validate_ini_draft_value("a\nb"), Err(FieldError::Multiline));
        assert_eq!(validate_ini_draft_value("  "), Err(FieldError::Empty));
        assert!(validate_ini_draft_value("ctrl VK_F1").is_ok());
    }

    #[test]
    fn patches_only_changed_fields_grouped_by_file() {
        let fields = flatten_fields(&build_key_bind_sections(&docs()));
        let initial = to_field_value_map(&fields);
        let mut draft = initial.clone();
        assert!(build_file_patches(&fields, &draft, &initial)
            .unwrap()
            .is_empty());

        draft.insert(fields[1].id.clone(), "VK_F8".to_string());
        draft.insert(fields[0].id.clone(), "VK_F7".to_string());
        draft.insert(fields[3].id.clone(), "ctrl 2".to_string());

        let patches = build_file_patches(&fields, &draft, &initial).unwrap();
        assert_eq!(patches.len(), 2);
        assert_eq!(patches[0].file_name, "swap.ini");
        assert_eq!(
            patches[0].updates,
            vec![
                LineUpdate {
                    line_idx: 4,
                    content: "  key = VK_F7".to_string()
                },
                LineUpdate {
                    line_idx: 5,
                    content: "back = VK_F8".to_string()
                },
            ]
        );
        assert_eq!(patches[1].file_name, "toggle.ini");
    }

    #[test]
    fn invalid_draft_produces_no_patch() {
        let fields = flatten_fields(&build_key_bind_sections(&docs()));
        let initial = to_field_value_map(&fields);
        let mut draft = initial.clone();
        draft.insert(fields[0].id.clone(), "VK_F1\nkey = VK_F2".to_string());

        let err = build_file_patches(&fields, &draft, &initial).unwrap_err();
        match err {
            SaveError::Validation { field_id, error, .. } => {
                assert_eq!(field_id, fields[0].id);
                assert_eq!(error, FieldError::Multiline);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn field_without_initial_entry_compares_against_derived_value() {
        let fields = flatten_fields(&build_key_bind_sections(&docs()));
        let toggle = fields.iter().find(|f| f.file_name == "toggle.ini").unwrap();
        let initial: FieldValueMap = to_field_value_map(&fields)
            .into_iter()
            .filter(|(id, _)| *id != toggle.id)
            .collect();
        let mut draft = initial.clone();

        draft.insert(toggle.id.clone(), "ctrl 1".to_string());
        assert!(build_file_patches(&fields, &draft, &initial)
            .unwrap()
            .is_empty());

        draft.insert(toggle.id.clone(), "ctrl 3".to_string());
        let patches = build_file_patches(&fields, &draft, &initial).unwrap();
        assert_eq!(patches.len(), 1);
        assert_eq!(patches[0].updates[0].content, "key = ctrl 3");
    }

    #[test]
    fn rendered_line_round_trips_through_the_parser() {
        let document = parse_ini("swap.ini", SWAP);
        let fields = flatten_fields(&build_key_bind_sections(std::slice::from_ref(&document)));
        let field = &fields[0];

        let patched = patch_line_bytes(
            SWAP.as_bytes(),
            &[LineUpdate {
                line_idx: field.line_idx,
                content: render_line(field, "alt VK_F12"),
            }],
        )
        .unwrap();

        let reparsed = parse_ini("swap.ini", &String::from_utf8(patched).unwrap());
        let refields = flatten_fields(&build_key_bind_sections(&[reparsed]));
        let same = refields.iter().find(|f| f.id == field.id).unwrap();
        assert_eq!(same.value, "alt VK_F12");
        assert_eq!(same.prefix, field.prefix);
    }
}
