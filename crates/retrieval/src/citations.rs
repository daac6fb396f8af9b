//! Normalization of provider grounding metadata into per-file citations.

use docent_core::{DocumentChunk, DocumentSource};
use docent_provider::{GenerateResponse, RetrievedContext};
use std::collections::HashMap;

/// Longest snippet carried per cited chunk.
const SNIPPET_LIMIT: usize = 200;

/// Group the response's retrieved-context chunks by source file.
///
/// Files keep their first-seen order, and every chunk of a file lands under
/// one `DocumentSource`. Chunks without any usable file identity fall under
/// a synthetic "retrieved-context" source rather than being dropped.
pub fn extract_citations(response: &GenerateResponse) -> Vec<DocumentSource> {
    let mut sources: Vec<DocumentSource> = Vec::new();
    let mut index_by_file: HashMap<String, usize> = HashMap::new();

    for chunk in response.grounding_chunks() {
        let Some(context) = &chunk.retrieved_context else {
            continue;
        };

        let file_name = file_identity(context);
        let document_chunk = to_document_chunk(context);

        match index_by_file.get(&file_name) {
            Some(&i) => sources[i].chunks.push(document_chunk),
            None => {
                index_by_file.insert(file_name.clone(), sources.len());
                sources.push(DocumentSource {
                    file_name,
                    document_id: context.document_name.clone(),
                    chunks: vec![document_chunk],
                });
            }
        }
    }

    sources
}

/// Best available file identity: title, then the tail of the document
/// resource name, then the uri, then a fixed placeholder.
fn file_identity(context: &RetrievedContext) -> String {
    if let Some(title) = nonblank(&context.title) {
        return title.to_string();
    }
    if let Some(document_name) = nonblank(&context.document_name) {
        let tail = document_name.rsplit('/').next().unwrap_or(document_name);
        return tail.to_string();
    }
    if let Some(uri) = nonblank(&context.uri) {
        return uri.to_string();
    }
    "retrieved-context".to_string()
}

fn to_document_chunk(context: &RetrievedContext) -> DocumentChunk {
    let text = context
        .rag_chunk
        .as_ref()
        .and_then(|c| nonblank(&c.text))
        .or_else(|| nonblank(&context.text))
        .unwrap_or_default();
    let page_span = context.rag_chunk.as_ref().and_then(|c| c.page_span);

    DocumentChunk {
        chunk_id: None,
        text: truncate_snippet(text),
        page_start: page_span.and_then(|s| s.first_page),
        page_end: page_span.and_then(|s| s.last_page),
        confidence: context.confidence,
    }
}

fn nonblank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn truncate_snippet(text: &str) -> String {
    if text.chars().count() <= SNIPPET_LIMIT {
        text.to_string()
    } else {
        let truncated: String = text.chars().take(SNIPPET_LIMIT).collect();
        format!("{truncated}…")
    }
}
