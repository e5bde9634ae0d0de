//! Plain-text rendering of conversation history and retrieved documents
//!
//! Stage prompts receive history and documents as pre-rendered text
//! blocks, so the templates stay free of iteration logic.

use alzqa_common::chat::Turn;
use alzqa_common::documents::RetrievedDocument;

/// Render conversation turns as one "role: text" line per turn
pub fn format_history(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|t| format!("{}: {}", t.role.as_str(), t.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Render retrieved documents as metadata-tagged passage blocks
pub fn format_documents(documents: &[RetrievedDocument]) -> String {
    let mut out = String::new();
    for doc in documents {
        out.push_str(&format!(
            "[file: {} | title: {}]\n{}\n\n",
            doc.metadata.file, doc.metadata.title, doc.content
        ));
    }
    out.trim_end().to_string()
}
