//! Prompt construction for metadata extraction.
//!
//! All instruction text lives here so prompt changes never touch retry,
//! worker or parsing code, and tests can inspect the exact string a model
//! receives. [`build_prompt`] is a pure function of its inputs: the same
//! text and fields always produce byte-identical output.

use crate::output::NOT_FOUND;
use crate::templates::FieldDefinition;
use std::fmt::Write as _;

/// Name of the synthetic field every job prepends to its template fields.
pub const FILENAME_FIELD: &str = "filename";

/// Opening role statement.
pub const ROLE_PREAMBLE: &str = r#"You are a metadata extractor. Your task is to analyse the document text below and extract every piece of information that belongs to each of the requested fields.

IMPORTANT: Extract all information that is present in the text. A field may only be reported as "Not found" after you have searched the entire document and are certain the information is absent."#;

/// General search rules that apply to every field.
pub const SEARCH_RULES: &str = r#"SEARCH RULES (apply to every field):
1. Read the ENTIRE text, including:
   - headers, footers and title blocks
   - tables, lists and bullet points
   - footnotes, references and appendices
   - text in parentheses or brackets, and values after colons or semicolons
2. Look for the field name, its variations and abbreviations, and related terms or synonyms
3. Use surrounding context: a value is often in the paragraph or table row next to its label
4. Prefer the most specific and complete value you find
5. If only partial information is present, return the partial information instead of "Not found"
6. If a field has several values, include all of them separated by semicolons
7. Dates: accept any date format and copy it as written
8. Names and organisations: include full names, abbreviations and variants that appear
9. Identifiers and numbers: capture every code or numeric identifier that matches the field"#;

/// Output contract the parser relies on.
pub const OUTPUT_RULES: &str = r#"OUTPUT RULES:
1. Return ONLY a single JSON object. No prose before or after it, no markdown fences.
2. Use exactly the field names listed above as the JSON keys, one key per field, in the listed order.
3. Values are strings. Use a JSON list only when the document itself enumerates several distinct items.
4. Use the literal string "Not found" only as a last resort, after searching the whole text.
5. For "filename": copy the file name exactly as it appears in the text (for example "product-information_en.pdf"). If the text does not contain it, use the known file name given in the field description."#;

/// Render the per-field search instructions block.
fn field_search_instructions(fields: &[FieldDefinition]) -> String {
    let mut out = String::new();
    for field in fields {
        let name = &field.name;
        let variation = name.replace('/', " or ");
        let _ = writeln!(out, "For '{name}':");
        let _ = writeln!(out, "1. Look for exact matches of '{name}'");
        let _ = writeln!(
            out,
            "2. Look for variations (e.g. '{}', '{}')",
            name.to_lowercase(),
            variation
        );
        let _ = writeln!(out, "3. Look for related terms and synonyms");
        let _ = writeln!(out, "4. Check tables, lists, headers, footers and footnotes");
        let _ = writeln!(out, "5. Extract partial information when that is all there is");
    }
    out
}

/// Render the `- name: description` field list.
fn field_descriptions(fields: &[FieldDefinition]) -> String {
    fields
        .iter()
        .map(|f| format!("- {}: {}", f.name, f.description))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render a JSON skeleton keyed by the actual field names.
fn json_skeleton(fields: &[FieldDefinition]) -> String {
    let body = fields
        .iter()
        .map(|f| {
            let hint = if f.name == FILENAME_FIELD {
                "exact file name from the text".to_string()
            } else {
                format!("value of {} from the text, or \"{}\"", f.name, NOT_FOUND)
            };
            // serde_json escapes quotes and backslashes in names and hints
            format!(
                "  {}: {}",
                serde_json::Value::String(f.name.clone()),
                serde_json::Value::String(hint)
            )
        })
        .collect::<Vec<_>>()
        .join(",\n");
    format!("{{\n{body}\n}}")
}

/// Build the full extraction prompt for one document.
///
/// `fields` is presented in order; the order carries no priority.
pub fn build_prompt(text: &str, fields: &[FieldDefinition]) -> String {
    format!(
        "{ROLE_PREAMBLE}\n\n\
         FIELD-SPECIFIC SEARCH INSTRUCTIONS:\n{}\n\
         {SEARCH_RULES}\n\n\
         Fields to extract:\n{}\n\n\
         Text to analyze:\n{text}\n\n\
         {OUTPUT_RULES}\n\n\
         Example format:\n{}\n",
        field_search_instructions(fields),
        field_descriptions(fields),
        json_skeleton(fields),
    )
}

/// The synthetic field that leads every job's field list.
pub fn filename_field(known_name: &str) -> FieldDefinition {
    FieldDefinition::new(FILENAME_FIELD, format!("Known file name: {known_name}"))
}

/// `[filename field] + template fields`.
pub fn job_fields(known_name: &str, template_fields: &[FieldDefinition]) -> Vec<FieldDefinition> {
    let mut fields = Vec::with_capacity(template_fields.len() + 1);
    fields.push(filename_field(known_name));
    fields.extend_from_slice(template_fields);
    fields
}
